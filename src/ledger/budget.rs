//! Budget ledger: cumulative units spent by each actor

use crate::catalog::PolicyCatalog;
use crate::config::DEFAULT_BUDGET;
use crate::error::{Error, Result};
use crate::types::{ActorId, OptionId, PolicyId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tracks units spent per actor against a fixed capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLedger {
    capacity: u32,
    spent: BTreeMap<ActorId, u32>,
}

impl Default for BudgetLedger {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET)
    }
}

impl BudgetLedger {
    /// Create an empty ledger
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            spent: BTreeMap::new(),
        }
    }

    /// Create a ledger with every actor at zero
    pub fn with_actors(capacity: u32, actors: impl IntoIterator<Item = ActorId>) -> Self {
        let mut ledger = Self::new(capacity);
        for actor in actors {
            ledger.register(actor);
        }
        ledger
    }

    /// Start tracking an actor at zero; a known actor is left untouched
    pub fn register(&mut self, actor: ActorId) {
        self.spent.entry(actor).or_insert(0);
    }

    /// Total units each actor may spend
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Charge `actor` for choosing `option` on `policy` and return the new total.
    ///
    /// The caller is responsible for only passing affordable options; the
    /// ledger records the spend as given.
    pub fn spend(
        &mut self,
        actor: &ActorId,
        policy: PolicyId,
        option: OptionId,
        catalog: &PolicyCatalog,
    ) -> Result<u32> {
        let weight = catalog.weight(policy, option)?;
        let capacity = self.capacity;
        let spent = self
            .spent
            .get_mut(actor)
            .ok_or_else(|| Error::UnknownActor(actor.clone()))?;

        *spent += weight;
        if *spent > capacity {
            tracing::error!(
                actor = %actor,
                policy = %policy,
                spent = *spent,
                capacity,
                "Budget ceiling crossed"
            );
        }
        tracing::debug!(actor = %actor, policy = %policy, option = %option, spent = *spent, "Units spent");
        Ok(*spent)
    }

    /// Units spent so far
    pub fn spent(&self, actor: &ActorId) -> Result<u32> {
        self.spent
            .get(actor)
            .copied()
            .ok_or_else(|| Error::UnknownActor(actor.clone()))
    }

    /// Units still available
    pub fn remaining(&self, actor: &ActorId) -> Result<u32> {
        Ok(self.capacity.saturating_sub(self.spent(actor)?))
    }

    /// Tracked actors in key order
    pub fn actors(&self) -> impl Iterator<Item = &ActorId> {
        self.spent.keys()
    }

    /// Copy of every actor's spend
    pub fn snapshot(&self) -> BTreeMap<ActorId, u32> {
        self.spent.clone()
    }

    /// Put every actor back to zero
    pub fn reset(&mut self) {
        for spent in self.spent.values_mut() {
            *spent = 0;
        }
    }

    /// Restore one actor's spend from its persisted JSON value.
    ///
    /// Anything that is not a whole number within capacity resets that actor
    /// to zero instead of failing the session.
    pub fn restore_actor(&mut self, actor: ActorId, raw: &serde_json::Value) -> u32 {
        let restored = raw
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v <= self.capacity);

        let value = match restored {
            Some(v) => v,
            None => {
                tracing::warn!(actor = %actor, value = %raw, "Corrupt budget entry, resetting to 0");
                0
            }
        };
        self.spent.insert(actor, value);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pid(id: u8) -> PolicyId {
        PolicyId::new(id).unwrap()
    }

    fn ledger() -> BudgetLedger {
        BudgetLedger::with_actors(14, [ActorId::User, ActorId::agent("local-mayor")])
    }

    #[test]
    fn test_spend_accumulates_weight() {
        let catalog = PolicyCatalog::builtin();
        let mut ledger = ledger();
        let mayor = ActorId::agent("local-mayor");

        assert_eq!(ledger.spend(&mayor, pid(1), OptionId::THREE, &catalog).unwrap(), 3);
        assert_eq!(ledger.spend(&mayor, pid(2), OptionId::TWO, &catalog).unwrap(), 5);
        assert_eq!(ledger.remaining(&mayor).unwrap(), 9);
        assert_eq!(ledger.spent(&ActorId::User).unwrap(), 0);
    }

    #[test]
    fn test_unknown_actor_and_policy() {
        let catalog = PolicyCatalog::builtin();
        let mut ledger = ledger();
        let stranger = ActorId::agent("stranger");

        assert!(matches!(
            ledger.spend(&stranger, pid(1), OptionId::ONE, &catalog),
            Err(Error::UnknownActor(_))
        ));
        assert!(matches!(
            ledger.spend(&ActorId::User, pid(9), OptionId::ONE, &catalog),
            Err(Error::UnknownPolicy(_))
        ));
        assert_eq!(ledger.spent(&ActorId::User).unwrap(), 0);
    }

    #[test]
    fn test_register_is_idempotent() {
        let catalog = PolicyCatalog::builtin();
        let mut ledger = ledger();
        ledger.spend(&ActorId::User, pid(1), OptionId::TWO, &catalog).unwrap();
        ledger.register(ActorId::User);
        assert_eq!(ledger.spent(&ActorId::User).unwrap(), 2);
    }

    #[test]
    fn test_reset() {
        let catalog = PolicyCatalog::builtin();
        let mut ledger = ledger();
        ledger.spend(&ActorId::User, pid(1), OptionId::THREE, &catalog).unwrap();
        ledger.reset();
        assert_eq!(ledger.remaining(&ActorId::User).unwrap(), 14);
        assert_eq!(ledger.actors().count(), 2);
    }

    #[test]
    fn test_restore_self_heals() {
        let mut ledger = ledger();
        assert_eq!(ledger.restore_actor(ActorId::User, &json!(6)), 6);
        assert_eq!(ledger.restore_actor(ActorId::User, &json!("six")), 0);
        assert_eq!(ledger.restore_actor(ActorId::User, &json!(-2)), 0);
        assert_eq!(ledger.restore_actor(ActorId::User, &json!(15)), 0);
        assert_eq!(ledger.restore_actor(ActorId::User, &json!(null)), 0);
    }
}
