//! Error types for the parliament engine

use crate::types::{ActorId, OptionId, PolicyId};
use thiserror::Error;

/// Result type alias for parliament operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the parliament engine
#[derive(Debug, Error)]
pub enum Error {
    /// Error from the OpenRouter API
    #[error("OpenRouter API error: {0}")]
    OpenRouter(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Policy id not present in the catalog
    #[error("Unknown policy: {0}")]
    UnknownPolicy(PolicyId),

    /// Option id not present on the given policy
    #[error("Unknown option {option} for policy {policy}")]
    UnknownOption {
        /// Policy that was looked up
        policy: PolicyId,
        /// Option missing from that policy
        option: OptionId,
    },

    /// Actor not registered with the budget ledger
    #[error("Unknown actor: {0}")]
    UnknownActor(ActorId),

    /// Catalog does not have the 7 x {1,2,3} shape
    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    /// Choice would exceed the budget or strand later policies
    #[error(
        "Budget infeasible for {actor} on policy {policy}: option {option} costs {cost}, \
         {remaining} units remain and {reserved} must be reserved"
    )]
    BudgetInfeasible {
        /// Who made the choice
        actor: ActorId,
        /// Policy being decided
        policy: PolicyId,
        /// Option that was refused
        option: OptionId,
        /// Unit cost of that option
        cost: u32,
        /// Units the actor had left before the choice
        remaining: u32,
        /// One unit for each policy after this one
        reserved: u32,
    },

    /// Every individual selection uses the same option
    #[error("All {count} selections use option {option}; vary at least one choice")]
    DegenerateSelection {
        /// Number of selections submitted
        count: usize,
        /// The option shared by all of them
        option: OptionId,
    },

    /// Individual selections submitted before every policy was answered
    #[error("Incomplete selection: {answered} of {required} policies answered")]
    IncompleteSelection {
        /// Policies with an answer
        answered: usize,
        /// Policies in the catalog
        required: usize,
    },

    /// Policy already has a recorded decision
    #[error("Policy {0} has already been decided")]
    AlreadyDecided(PolicyId),

    /// Policy voted before its predecessors
    #[error("Policy {got} voted out of order; expected {expected}")]
    OutOfOrder {
        /// Next undecided policy
        expected: PolicyId,
        /// Policy the caller tried to vote
        got: PolicyId,
    },

    /// Operation not allowed in the current session phase
    #[error("Operation '{operation}' not allowed in phase {phase}")]
    InvalidPhase {
        /// Name of the rejected operation
        operation: String,
        /// Phase the session was in
        phase: String,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an OpenRouter error
    pub fn openrouter(msg: impl Into<String>) -> Self {
        Self::OpenRouter(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid catalog error
    pub fn invalid_catalog(msg: impl Into<String>) -> Self {
        Self::InvalidCatalog(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an invalid phase error
    pub fn invalid_phase(operation: impl Into<String>, phase: impl std::fmt::Display) -> Self {
        Self::InvalidPhase {
            operation: operation.into(),
            phase: phase.to_string(),
        }
    }

    /// Create an other error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error should be shown to the user as a warning rather than
    /// treated as a failure of the engine
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::BudgetInfeasible { .. }
                | Self::DegenerateSelection { .. }
                | Self::IncompleteSelection { .. }
        )
    }
}
