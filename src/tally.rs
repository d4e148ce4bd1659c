//! Vote tally and plurality resolution
//!
//! Every actor casts one vote per policy. The option with the most votes wins;
//! when several options share the top count the injected [`TieBreaker`]
//! picks one of them.

use crate::config::GameConfig;
use crate::error::{Error, Result};
use crate::types::{ActorId, OptionId, PolicyId};
use rand::rngs::StdRng;
use rand::Rng;
use rand_core::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One actor's vote on one policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Who voted
    pub actor: ActorId,
    /// Policy voted on
    pub policy: PolicyId,
    /// Option actually cast (after any budget downgrade)
    pub option: OptionId,
    /// Option the actor wanted before the budget check
    pub preferred: OptionId,
}

impl Vote {
    /// Create a vote with no downgrade
    pub fn new(actor: ActorId, policy: PolicyId, option: OptionId) -> Self {
        Self {
            actor,
            policy,
            option,
            preferred: option,
        }
    }

    /// Record the option the actor originally preferred
    pub fn with_preferred(mut self, preferred: OptionId) -> Self {
        self.preferred = preferred;
        self
    }

    /// Whether the budget forced a cheaper option than preferred
    pub fn was_downgraded(&self) -> bool {
        self.option != self.preferred
    }
}

/// Outcome of resolving one policy's votes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Winning option
    pub winner: OptionId,
    /// Whether a tie-break was needed
    pub tie_occurred: bool,
    /// Options sharing the top count (just the winner when no tie)
    pub tied_options: Vec<OptionId>,
    /// Votes per option, always covering options 1..=3
    pub counts: BTreeMap<OptionId, usize>,
}

impl Resolution {
    /// Highest vote count
    pub fn max_count(&self) -> usize {
        self.counts.values().copied().max().unwrap_or(0)
    }
}

/// Strategy for choosing among tied options
pub trait TieBreaker: Send {
    /// Return an index into `tied`; `tied` is never empty
    fn pick(&mut self, tied: &[OptionId]) -> usize;
}

/// Uniform random tie-break
#[derive(Debug, Clone)]
pub struct RandomTieBreaker {
    rng: StdRng,
}

impl RandomTieBreaker {
    /// Seed from OS entropy
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic tie-breaks for reproducible sessions
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Use the configured seed when present
    pub fn from_config(config: &GameConfig) -> Self {
        match config.tie_break_seed {
            Some(seed) => Self::with_seed(seed),
            None => Self::new(),
        }
    }
}

impl Default for RandomTieBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl TieBreaker for RandomTieBreaker {
    fn pick(&mut self, tied: &[OptionId]) -> usize {
        self.rng.gen_range(0..tied.len())
    }
}

/// Always picks the same position among the tied options (clamped)
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedTieBreaker {
    index: usize,
}

impl FixedTieBreaker {
    /// Pick the tied option at `index`
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl TieBreaker for FixedTieBreaker {
    fn pick(&mut self, tied: &[OptionId]) -> usize {
        self.index.min(tied.len().saturating_sub(1))
    }
}

/// Count votes per option
pub fn count(votes: &[Vote]) -> BTreeMap<OptionId, usize> {
    let mut counts: BTreeMap<OptionId, usize> = OptionId::ALL.iter().map(|id| (*id, 0)).collect();
    for vote in votes {
        *counts.entry(vote.option).or_insert(0) += 1;
    }
    counts
}

/// Resolve the plurality winner for `policy`
pub fn resolve(policy: PolicyId, votes: &[Vote], tie_breaker: &mut dyn TieBreaker) -> Result<Resolution> {
    if votes.is_empty() {
        return Err(Error::invalid_input(format!("no votes cast on policy {}", policy)));
    }
    if let Some(stray) = votes.iter().find(|v| v.policy != policy) {
        return Err(Error::invalid_input(format!(
            "vote by {} is for policy {}, not {}",
            stray.actor, stray.policy, policy
        )));
    }

    let counts = count(votes);
    let max = counts.values().copied().max().unwrap_or(0);
    let tied: Vec<OptionId> = counts
        .iter()
        .filter(|(_, n)| **n == max)
        .map(|(id, _)| *id)
        .collect();

    let (winner, tie_occurred) = if tied.len() == 1 {
        (tied[0], false)
    } else {
        let index = tie_breaker.pick(&tied).min(tied.len() - 1);
        tracing::info!(
            policy = %policy,
            tied = ?tied,
            winner = %tied[index],
            "Tie broken"
        );
        (tied[index], true)
    };

    Ok(Resolution {
        winner,
        tie_occurred,
        tied_options: tied,
        counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PolicyId {
        PolicyId::new(1).unwrap()
    }

    fn votes(options: &[u8]) -> Vec<Vote> {
        options
            .iter()
            .enumerate()
            .map(|(i, o)| {
                let actor = if i == 0 {
                    ActorId::User
                } else {
                    ActorId::agent(format!("agent-{}", i))
                };
                Vote::new(actor, policy(), OptionId::new(*o).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_outright_winner() {
        let resolution = resolve(policy(), &votes(&[3, 3, 1, 2, 3]), &mut FixedTieBreaker::new(0)).unwrap();
        assert_eq!(resolution.winner, OptionId::THREE);
        assert!(!resolution.tie_occurred);
        assert_eq!(resolution.tied_options, vec![OptionId::THREE]);
        assert_eq!(resolution.max_count(), 3);
    }

    #[test]
    fn test_tie_uses_breaker() {
        // User:1, A1:2, A2:1, A3:3, A4:2 -> {1:2, 2:2, 3:1}
        let cast = votes(&[1, 2, 1, 3, 2]);

        let first = resolve(policy(), &cast, &mut FixedTieBreaker::new(0)).unwrap();
        assert!(first.tie_occurred);
        assert_eq!(first.tied_options, vec![OptionId::ONE, OptionId::TWO]);
        assert_eq!(first.winner, OptionId::ONE);

        let second = resolve(policy(), &cast, &mut FixedTieBreaker::new(1)).unwrap();
        assert_eq!(second.winner, OptionId::TWO);

        let clamped = resolve(policy(), &cast, &mut FixedTieBreaker::new(9)).unwrap();
        assert_eq!(clamped.winner, OptionId::TWO);
    }

    #[test]
    fn test_random_tie_break_stays_in_tied_set() {
        let cast = votes(&[1, 2, 1, 3, 2]);
        let mut breaker = RandomTieBreaker::with_seed(42);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            let resolution = resolve(policy(), &cast, &mut breaker).unwrap();
            assert!(resolution.tied_options.contains(&resolution.winner));
            seen.insert(resolution.winner);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_seeded_breaker_is_reproducible() {
        let cast = votes(&[1, 2, 3]);
        let mut a = RandomTieBreaker::with_seed(7);
        let mut b = RandomTieBreaker::with_seed(7);
        for _ in 0..20 {
            assert_eq!(
                resolve(policy(), &cast, &mut a).unwrap().winner,
                resolve(policy(), &cast, &mut b).unwrap().winner
            );
        }
    }

    #[test]
    fn test_counts_cover_all_options() {
        let counts = count(&votes(&[2, 2]));
        assert_eq!(counts.len(), 3);
        assert_eq!(counts[&OptionId::ONE], 0);
        assert_eq!(counts[&OptionId::TWO], 2);
    }

    #[test]
    fn test_rejects_empty_and_stray_votes() {
        assert!(resolve(policy(), &[], &mut FixedTieBreaker::default()).is_err());

        let mut cast = votes(&[1, 2]);
        cast[1].policy = PolicyId::new(2).unwrap();
        assert!(matches!(
            resolve(policy(), &cast, &mut FixedTieBreaker::default()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_downgrade_flag() {
        let vote = Vote::new(ActorId::User, policy(), OptionId::ONE).with_preferred(OptionId::THREE);
        assert!(vote.was_downgraded());
    }
}
