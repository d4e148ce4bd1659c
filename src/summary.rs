//! Final parliamentary package report

use crate::error::{Error, Result};
use crate::session::SessionState;
use crate::types::{ActorId, OptionId, PolicyId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of one policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    /// Policy
    pub policy: PolicyId,
    /// Policy title
    pub title: String,
    /// What the user picked alone, before discussion
    pub individual_choice: Option<OptionId>,
    /// What the user voted
    pub user_vote: OptionId,
    /// Option the parliament adopted
    pub final_option: OptionId,
    /// Text of the adopted option
    pub final_text: String,
    /// Weight of the adopted option
    pub weight: u32,
    /// Whether a tie had to be broken
    pub tie_occurred: bool,
    /// Agents whose vote was downgraded to fit their budget
    pub downgraded: Vec<ActorId>,
}

impl PolicyOutcome {
    /// The user's vote carried
    pub fn user_agreed(&self) -> bool {
        self.user_vote == self.final_option
    }
}

/// Budget position of one actor at the end of play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSpend {
    /// Units spent
    pub spent: u32,
    /// Units left
    pub remaining: u32,
}

/// The adopted package and how each participant fared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session
    pub session_id: SessionId,
    /// One row per policy, in order
    pub outcomes: Vec<PolicyOutcome>,
    /// Spend per actor
    pub spend: BTreeMap<ActorId, ActorSpend>,
    /// Sum of the adopted options' weights
    pub total_weight: u32,
    /// Per-actor capacity
    pub capacity: u32,
    /// Policies where the user's vote became the outcome
    pub agreement_count: usize,
}

impl SessionSummary {
    /// Build from a session with every policy decided
    pub fn build(session: &SessionState) -> Result<Self> {
        let catalog = session.catalog();
        let decisions = session.decisions();

        let mut outcomes = Vec::with_capacity(catalog.len());
        for policy in catalog.iter() {
            let record = decisions
                .get(policy.id)
                .ok_or_else(|| Error::other(format!("policy {} has no decision", policy.id)))?;
            let user_vote = record
                .vote_of(&ActorId::User)
                .map(|v| v.option)
                .ok_or_else(|| Error::UnknownActor(ActorId::User))?;
            let final_option = record.final_option();
            let final_text = policy
                .option(final_option)
                .map(|o| o.text.clone())
                .unwrap_or_default();

            outcomes.push(PolicyOutcome {
                policy: policy.id,
                title: policy.title.clone(),
                individual_choice: session.selections().get(policy.id),
                user_vote,
                final_option,
                final_text,
                weight: policy.weight(final_option)?,
                tie_occurred: record.resolution.tie_occurred,
                downgraded: record
                    .votes
                    .iter()
                    .filter(|v| v.was_downgraded())
                    .map(|v| v.actor.clone())
                    .collect(),
            });
        }

        let budget = session.budget();
        let mut spend = BTreeMap::new();
        for actor in budget.actors() {
            spend.insert(
                actor.clone(),
                ActorSpend {
                    spent: budget.spent(actor)?,
                    remaining: budget.remaining(actor)?,
                },
            );
        }

        let agreement_count = outcomes.iter().filter(|o| o.user_agreed()).count();
        Ok(Self {
            session_id: session.id(),
            total_weight: decisions.total_weight(catalog)?,
            capacity: budget.capacity(),
            outcomes,
            spend,
            agreement_count,
        })
    }

    /// Pretty JSON for export
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Parliamentary package ({} units)", self.total_weight)?;
        for o in &self.outcomes {
            write!(
                f,
                "  {}. {:<34} option {} (weight {})",
                o.policy, o.title, o.final_option, o.weight
            )?;
            if o.tie_occurred {
                write!(f, " [tie]")?;
            }
            writeln!(f)?;
        }
        writeln!(
            f,
            "Your vote carried on {} of {} policies",
            self.agreement_count,
            self.outcomes.len()
        )?;
        for (actor, s) in &self.spend {
            writeln!(f, "  {:<28} spent {:>2}/{}", actor, s.spent, self.capacity)?;
        }
        Ok(())
    }
}
