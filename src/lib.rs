//! # Republic of Bean Parliament
//!
//! The rules engine behind the "Republic of Bean" policy role-play: one user and
//! four synthetic parliament members spend a shared-size budget of 14 units
//! across 7 sequential policy decisions, vote, and produce a parliamentary
//! package.
//!
//! ## Features
//!
//! - **Budget Ledger**: per-actor spend tracking with a hard 14 unit ceiling
//! - **Option Selector**: greedy 3→2→1 downgrade keeping every later policy affordable
//! - **Vote Tally**: plurality resolution with an injectable tie-breaker
//! - **Decision Ledger**: write-once per-policy outcomes and budget aggregates
//! - **Variety Guard**: rejects an all-identical individual selection
//! - **Pluggable oracles**: agent preferences from OpenRouter or a scripted stub
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bean_parliament::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GameConfig::default();
//!     let catalog = PolicyCatalog::builtin();
//!     let store = SessionStore::new(MemoryStore::new());
//!     let mut rng = rand::thread_rng();
//!
//!     let mut session = store.load_or_start(&catalog, &config, &mut rng)?;
//!     for policy in catalog.ids() {
//!         session.select_individual(policy, OptionId::new(1 + policy.get() % 3)?)?;
//!     }
//!     session.submit_individual()?;
//!     store.save(&session)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod llm_client;
pub mod openrouter;
pub mod oracle;
pub mod roster;
pub mod selector;
pub mod session;
pub mod storage;
pub mod summary;
pub mod tally;
pub mod tracing_ext;
pub mod types;

// Re-exports for convenience
pub use catalog::{Policy, PolicyCatalog, PolicyOption};
pub use config::{GameConfig, OpenRouterConfig};
pub use error::{Error, Result};
pub use guard::{is_degenerate, IndividualSelections};
pub use ledger::{BudgetLedger, DecisionLedger, DecisionRecord};
pub use oracle::{LlmOracle, OpinionSource, PreferenceOracle, ScriptedOracle};
pub use openrouter::OpenRouterClient;
pub use roster::{AgentProfile, Roster};
pub use selector::OptionSelector;
pub use session::{SessionPhase, SessionState};
pub use storage::{KeyValueStore, MemoryStore, SessionStore, SledStore};
pub use summary::SessionSummary;
pub use tally::{FixedTieBreaker, RandomTieBreaker, Resolution, TieBreaker, Vote};
pub use types::{ActorId, AgentId, OptionId, PolicyId, SessionId};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::catalog::PolicyCatalog;
    pub use crate::config::GameConfig;
    pub use crate::error::{Error, Result};
    pub use crate::oracle::{LlmOracle, OpinionSource, PreferenceOracle, ScriptedOracle};
    pub use crate::session::{SessionPhase, SessionState};
    pub use crate::storage::{MemoryStore, SessionStore, SledStore};
    pub use crate::tally::{RandomTieBreaker, TieBreaker};
    pub use crate::types::*;
}
