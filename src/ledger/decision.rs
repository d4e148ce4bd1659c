//! Decision ledger: the resolved outcome of every voted policy

use crate::catalog::PolicyCatalog;
use crate::error::{Error, Result};
use crate::tally::{Resolution, Vote};
use crate::types::{ActorId, OptionId, PolicyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Votes and outcome for one policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Policy decided
    pub policy: PolicyId,
    /// Every vote cast, in casting order
    pub votes: Vec<Vote>,
    /// Tally outcome including tie-break metadata
    pub resolution: Resolution,
    /// When the decision was recorded
    pub decided_at: DateTime<Utc>,
}

impl DecisionRecord {
    /// Winning option
    pub fn final_option(&self) -> OptionId {
        self.resolution.winner
    }

    /// The vote cast by `actor`, if any
    pub fn vote_of(&self, actor: &ActorId) -> Option<&Vote> {
        self.votes.iter().find(|v| &v.actor == actor)
    }
}

/// Write-once record of policy outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionLedger {
    records: BTreeMap<PolicyId, DecisionRecord>,
}

impl DecisionLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of `policy`. A policy can only be recorded once.
    pub fn record(
        &mut self,
        policy: PolicyId,
        votes: Vec<Vote>,
        resolution: Resolution,
    ) -> Result<&DecisionRecord> {
        if self.records.contains_key(&policy) {
            return Err(Error::AlreadyDecided(policy));
        }

        tracing::info!(
            policy = %policy,
            winner = %resolution.winner,
            tie = resolution.tie_occurred,
            votes = votes.len(),
            "Policy decided"
        );

        let record = DecisionRecord {
            policy,
            votes,
            resolution,
            decided_at: Utc::now(),
        };
        Ok(self.records.entry(policy).or_insert(record))
    }

    /// Full record for a policy
    pub fn get(&self, policy: PolicyId) -> Option<&DecisionRecord> {
        self.records.get(&policy)
    }

    /// Votes cast on a policy
    pub fn votes(&self, policy: PolicyId) -> Option<&[Vote]> {
        self.records.get(&policy).map(|r| r.votes.as_slice())
    }

    /// Winning option of a policy
    pub fn final_option(&self, policy: PolicyId) -> Option<OptionId> {
        self.records.get(&policy).map(DecisionRecord::final_option)
    }

    /// Whether a policy has been decided
    pub fn is_decided(&self, policy: PolicyId) -> bool {
        self.records.contains_key(&policy)
    }

    /// Number of decided policies
    pub fn decided_count(&self) -> usize {
        self.records.len()
    }

    /// Records in policy order
    pub fn iter(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.records.values()
    }

    /// The parliamentary package so far: policy → winning option
    pub fn final_selection(&self) -> BTreeMap<PolicyId, OptionId> {
        self.records
            .iter()
            .map(|(policy, record)| (*policy, record.final_option()))
            .collect()
    }

    /// Unit cost of the option chosen for `policy`
    pub fn chosen_weight(&self, policy: PolicyId, catalog: &PolicyCatalog) -> Result<Option<u32>> {
        self.final_option(policy)
            .map(|option| catalog.weight(policy, option))
            .transpose()
    }

    /// Total unit cost of the package so far
    pub fn total_weight(&self, catalog: &PolicyCatalog) -> Result<u32> {
        self.records
            .values()
            .map(|r| catalog.weight(r.policy, r.final_option()))
            .sum()
    }

    /// Units each actor spent, re-derived from the stored votes
    pub fn recompute_spent(&self, catalog: &PolicyCatalog) -> Result<BTreeMap<ActorId, u32>> {
        let mut totals: BTreeMap<ActorId, u32> = BTreeMap::new();
        for record in self.records.values() {
            for vote in &record.votes {
                *totals.entry(vote.actor.clone()).or_insert(0) += catalog.weight(vote.policy, vote.option)?;
            }
        }
        Ok(totals)
    }

    /// Per-policy unit cost of the package, for budget-usage reporting
    pub fn budget_usage(&self, catalog: &PolicyCatalog) -> Result<BTreeMap<PolicyId, u32>> {
        self.records
            .values()
            .map(|r| Ok((r.policy, catalog.weight(r.policy, r.final_option())?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::{resolve, FixedTieBreaker};

    fn pid(id: u8) -> PolicyId {
        PolicyId::new(id).unwrap()
    }

    fn decide(ledger: &mut DecisionLedger, policy: u8, options: &[OptionId]) -> Result<()> {
        let votes: Vec<Vote> = options
            .iter()
            .enumerate()
            .map(|(i, o)| {
                let actor = if i == 0 {
                    ActorId::User
                } else {
                    ActorId::agent(format!("a{}", i))
                };
                Vote::new(actor, pid(policy), *o)
            })
            .collect();
        let resolution = resolve(pid(policy), &votes, &mut FixedTieBreaker::new(0))?;
        ledger.record(pid(policy), votes, resolution).map(|_| ())
    }

    #[test]
    fn test_write_once() {
        let mut ledger = DecisionLedger::new();
        decide(&mut ledger, 1, &[OptionId::TWO, OptionId::TWO]).unwrap();

        let err = decide(&mut ledger, 1, &[OptionId::THREE, OptionId::THREE]).unwrap_err();
        assert!(matches!(err, Error::AlreadyDecided(p) if p == pid(1)));
        assert_eq!(ledger.final_option(pid(1)), Some(OptionId::TWO));
        assert_eq!(ledger.decided_count(), 1);
    }

    #[test]
    fn test_aggregates() {
        let catalog = PolicyCatalog::builtin();
        let mut ledger = DecisionLedger::new();
        decide(&mut ledger, 1, &[OptionId::THREE, OptionId::THREE, OptionId::ONE]).unwrap();
        decide(&mut ledger, 2, &[OptionId::ONE, OptionId::TWO, OptionId::TWO]).unwrap();

        assert_eq!(ledger.chosen_weight(pid(1), &catalog).unwrap(), Some(3));
        assert_eq!(ledger.chosen_weight(pid(3), &catalog).unwrap(), None);
        assert_eq!(ledger.total_weight(&catalog).unwrap(), 5);

        let spent = ledger.recompute_spent(&catalog).unwrap();
        assert_eq!(spent[&ActorId::User], 4);
        assert_eq!(spent[&ActorId::agent("a1")], 5);
        assert_eq!(spent[&ActorId::agent("a2")], 3);

        let usage = ledger.budget_usage(&catalog).unwrap();
        assert_eq!(usage.get(&pid(2)), Some(&2));
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let catalog = PolicyCatalog::builtin();
        let mut ledger = DecisionLedger::new();
        decide(&mut ledger, 1, &[OptionId::ONE, OptionId::TWO, OptionId::THREE]).unwrap();
        assert_eq!(
            ledger.recompute_spent(&catalog).unwrap(),
            ledger.recompute_spent(&catalog).unwrap()
        );
    }

    #[test]
    fn test_serde_roundtrip_keeps_votes() {
        let mut ledger = DecisionLedger::new();
        decide(&mut ledger, 1, &[OptionId::ONE, OptionId::TWO, OptionId::TWO]).unwrap();
        let json = serde_json::to_value(&ledger).unwrap();
        let back: DecisionLedger = serde_json::from_value(json).unwrap();
        assert_eq!(back, ledger);
        assert_eq!(back.votes(pid(1)).map(|v| v.len()), Some(3));
        assert!(back.get(pid(1)).unwrap().vote_of(&ActorId::User).is_some());
    }
}
