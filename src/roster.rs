//! Parliament member personas and the per-session roster

use crate::error::{Error, Result};
use crate::types::{ActorId, AgentId};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A synthetic parliament member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Stable slug
    pub id: AgentId,
    /// Display name
    pub name: String,
    /// Role in the Republic of Bean
    pub role: String,
    /// Political stance used to steer the LLM persona
    pub stance: String,
}

impl AgentProfile {
    /// Create a profile
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
        stance: impl Into<String>,
    ) -> Self {
        Self {
            id: AgentId::new(id),
            name: name.into(),
            role: role.into(),
            stance: stance.into(),
        }
    }

    /// Voting identity
    pub fn actor(&self) -> ActorId {
        ActorId::Agent(self.id.clone())
    }

    /// System prompt for persona-driven LLM calls
    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}, {} in the parliament of the Republic of Bean. {} \
             You are debating refugee education policy under a strict budget.",
            self.name, self.role, self.stance
        )
    }
}

/// The full pool agents are drawn from
pub fn persona_pool() -> Vec<AgentProfile> {
    vec![
        AgentProfile::new(
            "finance-minister",
            "Amara Okafor",
            "the Minister of Finance",
            "You are fiscally cautious and favour low-cost options unless the return is clear.",
        ),
        AgentProfile::new(
            "teachers-union",
            "Luca Marin",
            "a representative of the teachers' union",
            "You prioritise teacher workload, training and classroom resources.",
        ),
        AgentProfile::new(
            "human-rights-advocate",
            "Sofia Haddad",
            "a human-rights advocate",
            "You push for full inclusion and equal rights for refugee children.",
        ),
        AgentProfile::new(
            "conservative-mp",
            "Henrik Dahl",
            "a conservative member of parliament",
            "You value national cohesion and are wary of large, untested programmes.",
        ),
        AgentProfile::new(
            "parent-association",
            "Mei Chen",
            "chair of the national parents' association",
            "You care about outcomes for all pupils and about fairness between families.",
        ),
        AgentProfile::new(
            "refugee-community",
            "Yusuf Rahimi",
            "a spokesperson for the refugee community",
            "You speak from lived experience of displacement and interrupted schooling.",
        ),
        AgentProfile::new(
            "education-researcher",
            "Ingrid Novak",
            "an education researcher",
            "You argue from evidence and long-term effects rather than short-term cost.",
        ),
        AgentProfile::new(
            "local-mayor",
            "Tomas Ferreira",
            "the mayor of a border municipality",
            "You represent local services already stretched by new arrivals.",
        ),
    ]
}

/// The agents taking part in one session, in speaking order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    agents: Vec<AgentProfile>,
}

impl Roster {
    /// Use exactly these agents
    pub fn new(agents: Vec<AgentProfile>) -> Result<Self> {
        let mut ids: Vec<&AgentId> = agents.iter().map(|a| &a.id).collect();
        ids.sort();
        ids.dedup();
        if ids.len() != agents.len() {
            return Err(Error::invalid_input("roster contains duplicate agents"));
        }
        Ok(Self { agents })
    }

    /// Draw `count` distinct agents uniformly from `pool`
    pub fn pick<R: Rng + ?Sized>(pool: &[AgentProfile], count: usize, rng: &mut R) -> Result<Self> {
        if count > pool.len() {
            return Err(Error::config(format!(
                "cannot pick {} agents from a pool of {}",
                count,
                pool.len()
            )));
        }
        let agents: Vec<AgentProfile> = pool.choose_multiple(rng, count).cloned().collect();
        tracing::info!(
            agents = ?agents.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            "Roster selected"
        );
        Self::new(agents)
    }

    /// Agents in speaking order
    pub fn iter(&self) -> impl Iterator<Item = &AgentProfile> {
        self.agents.iter()
    }

    /// Look up an agent
    pub fn get(&self, id: &AgentId) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| &a.id == id)
    }

    /// User first, then agents in speaking order
    pub fn actors(&self) -> Vec<ActorId> {
        std::iter::once(ActorId::User)
            .chain(self.agents.iter().map(AgentProfile::actor))
            .collect()
    }

    /// Number of agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// No agents
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_pool_has_unique_ids() {
        let pool = persona_pool();
        assert!(pool.len() > 4);
        Roster::new(pool).unwrap();
    }

    #[test]
    fn test_pick_distinct_agents() {
        let pool = persona_pool();
        let mut rng = StdRng::seed_from_u64(3);
        let roster = Roster::pick(&pool, 4, &mut rng).unwrap();
        assert_eq!(roster.len(), 4);

        let actors = roster.actors();
        assert_eq!(actors.len(), 5);
        assert_eq!(actors[0], ActorId::User);
    }

    #[test]
    fn test_pick_is_seeded() {
        let pool = persona_pool();
        let a = Roster::pick(&pool, 4, &mut StdRng::seed_from_u64(11)).unwrap();
        let b = Roster::pick(&pool, 4, &mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_pick_too_many() {
        let pool = persona_pool();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Roster::pick(&pool, pool.len() + 1, &mut rng).is_err());
    }

    #[test]
    fn test_duplicate_rejected() {
        let pool = persona_pool();
        assert!(Roster::new(vec![pool[0].clone(), pool[0].clone()]).is_err());
    }

    #[test]
    fn test_system_prompt_mentions_persona() {
        let profile = &persona_pool()[0];
        let prompt = profile.system_prompt();
        assert!(prompt.contains(&profile.name));
        assert!(prompt.contains("Republic of Bean"));
    }
}
