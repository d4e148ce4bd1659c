//! Budget-aware option selection
//!
//! Given what an actor would like to pick and how many units it has left,
//! decide what it can actually afford while still reserving one unit for
//! every later policy. The check is a one-policy lookahead: it keeps the
//! session feasible but does not plan the actor's remaining choices.

use crate::catalog::{Policy, PolicyCatalog};
use crate::error::{Error, Result};
use crate::types::{ActorId, OptionId, PolicyId};

/// Applies the 3→2→1 downgrade rule for a fixed-length policy sequence
#[derive(Debug, Clone, Copy)]
pub struct OptionSelector {
    policy_count: u32,
}

impl OptionSelector {
    /// Selector for a sequence of `policy_count` policies
    pub fn new(policy_count: usize) -> Self {
        Self {
            policy_count: u32::try_from(policy_count).unwrap_or(u32::MAX),
        }
    }

    /// Selector sized to a catalog
    pub fn for_catalog(catalog: &PolicyCatalog) -> Self {
        Self::new(catalog.len())
    }

    /// Policies still to be decided, counting `policy` itself
    pub fn policies_left_including(&self, policy: PolicyId) -> u32 {
        self.policy_count
            .saturating_add(1)
            .saturating_sub(u32::from(policy.get()))
    }

    /// Pick the option an actor with `remaining` units can afford on `policy`.
    ///
    /// Never returns an option more expensive than `preferred`.
    pub fn choose_effective_option(
        &self,
        remaining: u32,
        policy: &Policy,
        preferred: OptionId,
    ) -> Result<OptionId> {
        let preferred_weight = policy.weight(preferred)?;
        let left = self.policies_left_including(policy.id);
        let cheapest = cheapest_option(policy);

        // Exactly one unit per policy left (or less): nothing to spare.
        if remaining <= left {
            return Ok(cheapest);
        }

        if fits(remaining, preferred_weight, left) {
            return Ok(preferred);
        }

        let mut cheaper: Vec<_> = policy
            .options
            .iter()
            .filter(|o| o.weight < preferred_weight)
            .collect();
        cheaper.sort_by(|a, b| b.weight.cmp(&a.weight));

        Ok(cheaper
            .into_iter()
            .find(|o| fits(remaining, o.weight, left))
            .map(|o| o.id)
            .unwrap_or(cheapest))
    }

    /// Whether `option` can be taken as-is without a downgrade
    pub fn is_affordable(&self, remaining: u32, policy: &Policy, option: OptionId) -> Result<bool> {
        Ok(self.choose_effective_option(remaining, policy, option)? == option)
    }

    /// Reject a choice the downgrade rule would have to alter.
    ///
    /// Used for the human player, whose choices are refused rather than
    /// silently downgraded.
    pub fn check_affordable(
        &self,
        actor: &ActorId,
        remaining: u32,
        policy: &Policy,
        option: OptionId,
    ) -> Result<()> {
        if self.is_affordable(remaining, policy, option)? {
            return Ok(());
        }
        Err(Error::BudgetInfeasible {
            actor: actor.clone(),
            policy: policy.id,
            option,
            cost: policy.weight(option)?,
            remaining,
            reserved: self.policies_left_including(policy.id).saturating_sub(1),
        })
    }
}

fn fits(remaining: u32, weight: u32, left_including: u32) -> bool {
    match remaining.checked_sub(weight) {
        Some(after) => after >= left_including.saturating_sub(1),
        None => false,
    }
}

fn cheapest_option(policy: &Policy) -> OptionId {
    policy
        .options
        .iter()
        .min_by_key(|o| o.weight)
        .map(|o| o.id)
        .unwrap_or(OptionId::ONE)
}
