//! Session state and the forward-only play sequence
//!
//! A session owns everything that changes during play: the roster, the
//! user's individual answers, discussion transcripts, the budget ledger and
//! the decision ledger. It moves strictly forward:
//!
//! individual selection → discussion → voting on policies 1..7 → summary
//!
//! [`SessionState::serialize`] flattens the state into independent JSON
//! slices so it can be kept in a key-value store, and
//! [`SessionState::restore`] rebuilds it, resetting any slice that is missing
//! or corrupt instead of failing.

use crate::catalog::PolicyCatalog;
use crate::config::GameConfig;
use crate::error::{Error, Result};
use crate::guard::IndividualSelections;
use crate::ledger::{BudgetLedger, DecisionLedger, DecisionRecord};
use crate::oracle::{canned_opinion, OpinionSource, PreferenceOracle};
use crate::roster::{persona_pool, Roster};
use crate::selector::OptionSelector;
use crate::summary::SessionSummary;
use crate::tally::{resolve, TieBreaker, Vote};
use crate::types::{ActorId, AgentId, OptionId, PolicyId, SessionId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Storage keys of the persisted slices
pub mod keys {
    /// Session identifier
    pub const SESSION_ID: &str = "session_id";
    /// Current phase
    pub const PHASE: &str = "phase";
    /// Agents taking part
    pub const ROSTER: &str = "roster";
    /// Per-actor spend
    pub const BUDGET: &str = "budget";
    /// Per-policy votes and outcomes
    pub const DECISIONS: &str = "decisions";
    /// User's individual answers
    pub const SELECTIONS: &str = "selections";
    /// Discussion transcripts
    pub const DISCUSSION: &str = "discussion";

    /// Every slice key
    pub const ALL: [&str; 7] = [SESSION_ID, PHASE, ROSTER, BUDGET, DECISIONS, SELECTIONS, DISCUSSION];
}

/// Where the session is in the play sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    /// The user answers each policy alone
    IndividualSelection,
    /// Agents give their opinions
    Discussion,
    /// Policies are voted in order
    Voting {
        /// Next policy to vote on
        next_policy: PolicyId,
    },
    /// Every policy decided
    Summary,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndividualSelection => write!(f, "individual_selection"),
            Self::Discussion => write!(f, "discussion"),
            Self::Voting { next_policy } => write!(f, "voting(policy {})", next_policy),
            Self::Summary => write!(f, "summary"),
        }
    }
}

/// One agent's contribution to the discussion of a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opinion {
    /// Speaker
    pub agent: AgentId,
    /// Opaque model (or canned) text
    pub text: String,
}

/// All mutable state of one play session
#[derive(Debug, Clone)]
pub struct SessionState {
    id: SessionId,
    catalog: PolicyCatalog,
    config: GameConfig,
    roster: Roster,
    phase: SessionPhase,
    selections: IndividualSelections,
    discussion: BTreeMap<PolicyId, Vec<Opinion>>,
    budget: BudgetLedger,
    decisions: DecisionLedger,
    selector: OptionSelector,
}

impl SessionState {
    /// Start a fresh session with the given roster
    pub fn new(catalog: PolicyCatalog, roster: Roster, config: GameConfig) -> Result<Self> {
        config.validate()?;
        let budget = BudgetLedger::with_actors(config.total_budget, roster.actors());
        let selector = OptionSelector::for_catalog(&catalog);

        let session = Self {
            id: SessionId::new(),
            catalog,
            config,
            roster,
            phase: SessionPhase::IndividualSelection,
            selections: IndividualSelections::new(),
            discussion: BTreeMap::new(),
            budget,
            decisions: DecisionLedger::new(),
            selector,
        };
        tracing::info!(session = %session.id, agents = session.roster.len(), "Session started");
        Ok(session)
    }

    /// Start a fresh session with a roster drawn from the persona pool
    pub fn start<R: Rng + ?Sized>(catalog: PolicyCatalog, config: GameConfig, rng: &mut R) -> Result<Self> {
        let roster = Roster::pick(&persona_pool(), config.agents_per_session, rng)?;
        Self::new(catalog, roster, config)
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Policy catalog
    pub fn catalog(&self) -> &PolicyCatalog {
        &self.catalog
    }

    /// Game configuration
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Agents taking part
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// User's individual answers
    pub fn selections(&self) -> &IndividualSelections {
        &self.selections
    }

    /// Budget ledger
    pub fn budget(&self) -> &BudgetLedger {
        &self.budget
    }

    /// Decision ledger
    pub fn decisions(&self) -> &DecisionLedger {
        &self.decisions
    }

    /// Discussion transcript of a policy
    pub fn discussion(&self, policy: PolicyId) -> &[Opinion] {
        self.discussion.get(&policy).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Units `actor` still has
    pub fn remaining(&self, actor: &ActorId) -> Result<u32> {
        self.budget.remaining(actor)
    }

    fn require_phase(&self, operation: &str, allowed: bool) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(Error::invalid_phase(operation, self.phase))
        }
    }

    /// Answer a policy in the individual phase
    pub fn select_individual(&mut self, policy: PolicyId, option: OptionId) -> Result<()> {
        self.require_phase(
            "select_individual",
            self.phase == SessionPhase::IndividualSelection,
        )?;
        self.selections
            .select(policy, option, &self.catalog, self.config.total_budget)
    }

    /// Withdraw an individual answer
    pub fn clear_individual(&mut self, policy: PolicyId) -> Result<Option<OptionId>> {
        self.require_phase(
            "clear_individual",
            self.phase == SessionPhase::IndividualSelection,
        )?;
        Ok(self.selections.clear(policy))
    }

    /// Submit the individual answers and move on to discussion
    pub fn submit_individual(&mut self) -> Result<()> {
        self.require_phase(
            "submit_individual",
            self.phase == SessionPhase::IndividualSelection,
        )?;
        self.selections.validate_submission(&self.catalog)?;
        self.advance(SessionPhase::Discussion);
        Ok(())
    }

    /// Collect every agent's opinion on `policy`, one agent at a time.
    ///
    /// Re-running a policy replaces its transcript.
    pub async fn discuss(&mut self, policy: PolicyId, source: &dyn OpinionSource) -> Result<&[Opinion]> {
        self.require_phase("discuss", self.phase == SessionPhase::Discussion)?;
        let definition = self.catalog.policy(policy)?.clone();

        let mut transcript = Vec::with_capacity(self.roster.len());
        for (index, agent) in self.roster.iter().enumerate() {
            if index > 0 {
                self.pause().await;
            }
            let text = match source.opinion(agent, &definition).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(agent = %agent.id, policy = %policy, error = %e, "Opinion unavailable, using canned text");
                    canned_opinion(agent, &definition)
                }
            };
            transcript.push(Opinion {
                agent: agent.id.clone(),
                text,
            });
        }

        self.discussion.insert(policy, transcript);
        Ok(self.discussion(policy))
    }

    /// Close the discussion and open voting on the first policy
    pub fn finish_discussion(&mut self) -> Result<()> {
        self.require_phase("finish_discussion", self.phase == SessionPhase::Discussion)?;
        let first = self
            .catalog
            .ids()
            .next()
            .ok_or_else(|| Error::invalid_catalog("catalog has no policies"))?;
        self.advance(SessionPhase::Voting { next_policy: first });
        Ok(())
    }

    /// Check whether the user may vote `option` on `policy` without committing anything
    pub fn check_user_vote(&self, policy: PolicyId, option: OptionId) -> Result<()> {
        let definition = self.catalog.policy(policy)?;
        let remaining = self.budget.remaining(&ActorId::User)?;
        self.selector
            .check_affordable(&ActorId::User, remaining, definition, option)
    }

    /// Run the vote on `policy`.
    ///
    /// The user's choice must be affordable as-is; agents ask `oracle` for a
    /// preference and are downgraded when it does not fit their budget.
    /// Nothing is committed unless every step succeeds.
    pub async fn vote_policy(
        &mut self,
        policy: PolicyId,
        user_choice: OptionId,
        oracle: &dyn PreferenceOracle,
        tie_breaker: &mut dyn TieBreaker,
    ) -> Result<&DecisionRecord> {
        if self.decisions.is_decided(policy) {
            return Err(Error::AlreadyDecided(policy));
        }
        let expected = match self.phase {
            SessionPhase::Voting { next_policy } => next_policy,
            _ => return Err(Error::invalid_phase("vote_policy", self.phase)),
        };
        if policy != expected {
            return Err(Error::OutOfOrder {
                expected,
                got: policy,
            });
        }

        let definition = self.catalog.policy(policy)?.clone();
        self.check_user_vote(policy, user_choice)?;

        let mut votes = vec![Vote::new(ActorId::User, policy, user_choice)];
        for (index, agent) in self.roster.iter().enumerate() {
            if index > 0 {
                self.pause().await;
            }
            let preferred = match oracle.preferred_option(agent, &definition).await {
                Ok(option) => option,
                Err(e) => {
                    tracing::warn!(agent = %agent.id, policy = %policy, error = %e, "Preference unavailable, using fallback");
                    OptionId::new(self.config.fallback_option)?
                }
            };
            let actor = agent.actor();
            let remaining = self.budget.remaining(&actor)?;
            let effective = self
                .selector
                .choose_effective_option(remaining, &definition, preferred)?;
            tracing::debug!(
                actor = %actor,
                policy = %policy,
                preferred = %preferred,
                effective = %effective,
                remaining,
                "Agent vote"
            );
            votes.push(Vote::new(actor, policy, effective).with_preferred(preferred));
        }

        let resolution = resolve(policy, &votes, tie_breaker)?;

        let mut budget = self.budget.clone();
        for vote in &votes {
            budget.spend(&vote.actor, policy, vote.option, &self.catalog)?;
        }

        self.decisions.record(policy, votes, resolution)?;
        self.budget = budget;

        let next = match self.catalog.ids().skip_while(|p| *p != policy).nth(1) {
            Some(next_policy) => SessionPhase::Voting { next_policy },
            None => SessionPhase::Summary,
        };
        self.advance(next);

        self.decisions
            .get(policy)
            .ok_or_else(|| Error::other(format!("decision for policy {} missing after record", policy)))
    }

    /// Rebuild every actor's spend from the recorded votes
    pub fn recalculate_budget(&mut self) -> Result<()> {
        let recomputed = self.decisions.recompute_spent(&self.catalog)?;
        let mut budget = BudgetLedger::with_actors(self.config.total_budget, self.roster.actors());
        for (actor, spent) in recomputed {
            budget.restore_actor(actor, &Value::from(spent));
        }
        self.budget = budget;
        Ok(())
    }

    /// Final report; only available once every policy is decided
    pub fn summary(&self) -> Result<SessionSummary> {
        self.require_phase("summary", self.phase == SessionPhase::Summary)?;
        SessionSummary::build(self)
    }

    fn advance(&mut self, next: SessionPhase) {
        tracing::info!(session = %self.id, from = %self.phase, to = %next, "Phase transition");
        self.phase = next;
    }

    async fn pause(&self) {
        let delay = self.config.agent_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Flatten into independently restorable JSON slices
    pub fn serialize(&self) -> Result<BTreeMap<String, Value>> {
        let budget: BTreeMap<String, u32> = self
            .budget
            .snapshot()
            .into_iter()
            .map(|(actor, spent)| (actor.key(), spent))
            .collect();

        let mut slices = BTreeMap::new();
        slices.insert(keys::SESSION_ID.to_string(), serde_json::to_value(self.id)?);
        slices.insert(keys::PHASE.to_string(), serde_json::to_value(self.phase)?);
        slices.insert(keys::ROSTER.to_string(), serde_json::to_value(&self.roster)?);
        slices.insert(keys::BUDGET.to_string(), serde_json::to_value(budget)?);
        slices.insert(keys::DECISIONS.to_string(), serde_json::to_value(&self.decisions)?);
        slices.insert(keys::SELECTIONS.to_string(), serde_json::to_value(&self.selections)?);
        slices.insert(keys::DISCUSSION.to_string(), serde_json::to_value(&self.discussion)?);
        Ok(slices)
    }

    /// Rebuild a session from persisted slices.
    ///
    /// Each slice is restored on its own; a missing or corrupt slice falls
    /// back to its empty value and is logged. A corrupt roster is redrawn.
    pub fn restore<R: Rng + ?Sized>(
        catalog: PolicyCatalog,
        config: GameConfig,
        slices: &BTreeMap<String, Value>,
        rng: &mut R,
    ) -> Result<Self> {
        config.validate()?;

        let id = slice::<SessionId>(slices, keys::SESSION_ID).unwrap_or_default();

        let (roster, roster_redrawn) = match slice::<Roster>(slices, keys::ROSTER)
            .and_then(|r| Roster::new(r.iter().cloned().collect()).ok())
            .filter(|r| !r.is_empty())
        {
            Some(roster) => (roster, false),
            None => {
                tracing::warn!(session = %id, "Roster missing or corrupt, drawing a new one");
                (Roster::pick(&persona_pool(), config.agents_per_session, rng)?, true)
            }
        };
        let actors = roster.actors();

        let stored_decisions = slice::<DecisionLedger>(slices, keys::DECISIONS)
            .filter(|d| decisions_consistent(d, &catalog, &actors, config.total_budget));
        let decisions_intact = stored_decisions.is_some() && !roster_redrawn;
        let decisions = stored_decisions.unwrap_or_else(|| {
            tracing::warn!(session = %id, "Decision slice missing or inconsistent, resetting");
            DecisionLedger::new()
        });

        let budget = if decisions_intact {
            restore_budget(id, slices.get(keys::BUDGET), &actors, &decisions, &catalog, config.total_budget)?
        } else {
            tracing::warn!(session = %id, "Rebuilding budget from surviving decisions");
            rebuild_budget(&actors, &decisions, &catalog, config.total_budget)?
        };

        let selections = slice::<IndividualSelections>(slices, keys::SELECTIONS)
            .filter(|s| s.spent(&catalog).is_ok())
            .unwrap_or_else(|| {
                tracing::warn!(session = %id, "Selection slice missing or corrupt, resetting");
                IndividualSelections::new()
            });

        let discussion = slice::<BTreeMap<PolicyId, Vec<Opinion>>>(slices, keys::DISCUSSION)
            .unwrap_or_else(|| {
                tracing::warn!(session = %id, "Discussion slice missing or corrupt, resetting");
                BTreeMap::new()
            });

        let stored_phase = slice::<SessionPhase>(slices, keys::PHASE);
        let phase = reconcile_phase(stored_phase, &decisions, &selections, &catalog);
        if stored_phase != Some(phase) {
            tracing::warn!(session = %id, stored = ?stored_phase, restored = %phase, "Phase reconciled with stored state");
        }

        let selector = OptionSelector::for_catalog(&catalog);
        tracing::info!(session = %id, phase = %phase, decided = decisions.decided_count(), "Session restored");

        Ok(Self {
            id,
            catalog,
            config,
            roster,
            phase,
            selections,
            discussion,
            budget,
            decisions,
            selector,
        })
    }
}

fn slice<T: serde::de::DeserializeOwned>(slices: &BTreeMap<String, Value>, key: &str) -> Option<T> {
    let raw = slices.get(key)?;
    match serde_json::from_value(raw.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Unparsable slice");
            None
        }
    }
}

/// Policies not yet decided, as units each actor must still hold back
fn undecided_units(decisions: &DecisionLedger, catalog: &PolicyCatalog) -> u32 {
    let undecided = catalog.len().saturating_sub(decisions.decided_count());
    u32::try_from(undecided).unwrap_or(u32::MAX)
}

/// Decided policies must form a prefix of the catalog, every vote must come
/// from a roster actor and name a real option, and what the votes cost must
/// still leave every actor one unit per undecided policy
fn decisions_consistent(
    decisions: &DecisionLedger,
    catalog: &PolicyCatalog,
    actors: &[ActorId],
    capacity: u32,
) -> bool {
    let prefix_ok = decisions
        .iter()
        .zip(catalog.ids())
        .all(|(record, expected)| record.policy == expected)
        && decisions.decided_count() <= catalog.len();

    let votes_ok = decisions.iter().all(|record| {
        record.resolution.counts.values().sum::<usize>() == record.votes.len()
            && record.votes.iter().all(|vote| {
                vote.policy == record.policy
                    && actors.contains(&vote.actor)
                    && catalog.weight(vote.policy, vote.option).is_ok()
            })
    });
    if !(prefix_ok && votes_ok) {
        return false;
    }

    let reserved = undecided_units(decisions, catalog);
    match decisions.recompute_spent(catalog) {
        Ok(spent) => spent
            .values()
            .all(|s| s.saturating_add(reserved) <= capacity),
        Err(_) => false,
    }
}

/// Budget derived from the recorded votes alone
fn rebuild_budget(
    actors: &[ActorId],
    decisions: &DecisionLedger,
    catalog: &PolicyCatalog,
    capacity: u32,
) -> Result<BudgetLedger> {
    let spent = decisions.recompute_spent(catalog)?;
    let mut budget = BudgetLedger::with_actors(capacity, actors.iter().cloned());
    for actor in actors {
        let value = spent.get(actor).copied().unwrap_or(0);
        budget.restore_actor(actor.clone(), &Value::from(value));
    }
    Ok(budget)
}

/// Stored per-actor spend, with any entry that is corrupt or would leave
/// the undecided policies unaffordable reset to zero
fn restore_budget(
    session: SessionId,
    raw: Option<&Value>,
    actors: &[ActorId],
    decisions: &DecisionLedger,
    catalog: &PolicyCatalog,
    capacity: u32,
) -> Result<BudgetLedger> {
    let mut budget = BudgetLedger::with_actors(capacity, actors.iter().cloned());
    match raw.and_then(Value::as_object) {
        Some(entries) => {
            for actor in actors {
                let raw = entries.get(&actor.key()).cloned().unwrap_or(Value::Null);
                budget.restore_actor(actor.clone(), &raw);
            }
        }
        None => tracing::warn!(session = %session, "Budget slice missing or corrupt, resetting all actors"),
    }

    let reserved = undecided_units(decisions, catalog);
    for actor in actors {
        let spent = budget.spent(actor)?;
        if spent.saturating_add(reserved) > capacity {
            tracing::warn!(
                session = %session,
                actor = %actor,
                spent,
                reserved,
                "Restored spend strands undecided policies, resetting to 0"
            );
            budget.restore_actor(actor.clone(), &Value::from(0u32));
        }
    }
    Ok(budget)
}

/// Once any policy is decided the decision ledger is authoritative for where
/// voting stands. Before that, a session can only be past the individual
/// phase if its selections would still pass submission.
fn reconcile_phase(
    stored: Option<SessionPhase>,
    decisions: &DecisionLedger,
    selections: &IndividualSelections,
    catalog: &PolicyCatalog,
) -> SessionPhase {
    let decided = decisions.decided_count();
    if decided > 0 {
        return match catalog.ids().nth(decided) {
            Some(next_policy) => SessionPhase::Voting { next_policy },
            None => SessionPhase::Summary,
        };
    }

    let phase = match stored {
        Some(SessionPhase::Voting { .. }) | Some(SessionPhase::Summary) => SessionPhase::Voting {
            next_policy: PolicyId::FIRST,
        },
        Some(phase) => phase,
        None => SessionPhase::IndividualSelection,
    };
    if phase != SessionPhase::IndividualSelection && selections.validate_submission(catalog).is_err() {
        return SessionPhase::IndividualSelection;
    }
    phase
}
