//! Ledgers - per-actor budget spend and per-policy decisions
//!
//! Both ledgers start empty at session start, only grow while the 7 policies
//! are voted on, and are read-only once the session reaches its summary.

pub mod budget;
pub mod decision;

// Re-exports
pub use budget::BudgetLedger;
pub use decision::{DecisionLedger, DecisionRecord};
