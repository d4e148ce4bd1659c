//! Core type definitions for the parliament engine

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of one of the sequential policies (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(u8);

impl PolicyId {
    /// Create a policy id; zero is rejected
    pub fn new(id: u8) -> Result<Self> {
        if id == 0 {
            return Err(Error::invalid_input("policy ids start at 1"));
        }
        Ok(Self(id))
    }

    /// First policy of every sequence
    pub const FIRST: PolicyId = PolicyId(1);

    /// The policy after this one, if the id space allows it
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Get the raw id
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an option within a policy (1, 2 or 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct OptionId(u8);

impl OptionId {
    /// Cheapest option
    pub const ONE: OptionId = OptionId(1);
    /// Middle option
    pub const TWO: OptionId = OptionId(2);
    /// Most expensive option
    pub const THREE: OptionId = OptionId(3);

    /// All options in canonical order
    pub const ALL: [OptionId; 3] = [Self::ONE, Self::TWO, Self::THREE];

    /// Create an option id; only 1..=3 are valid
    pub fn new(id: u8) -> Result<Self> {
        match id {
            1..=3 => Ok(Self(id)),
            other => Err(Error::invalid_input(format!(
                "option id must be 1, 2 or 3, got {}",
                other
            ))),
        }
    }

    /// Get the raw id
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for OptionId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<OptionId> for u8 {
    fn from(id: OptionId) -> Self {
        id.0
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Slug identifying a parliament member persona (e.g. "minister-of-finance")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create a new agent ID from a slug
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A participant in the vote: the human user or one simulated agent
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActorId {
    /// The single human player
    User,
    /// A synthetic parliament member
    Agent(AgentId),
}

impl ActorId {
    /// Shorthand for an agent actor
    pub fn agent(id: impl Into<String>) -> Self {
        Self::Agent(AgentId::new(id))
    }

    /// Whether this is the human user
    pub fn is_user(&self) -> bool {
        matches!(self, Self::User)
    }

    /// Flat string key, `"user"` or `"agent:<slug>"`
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent(id) => write!(f, "agent:{}", id),
        }
    }
}

impl FromStr for ActorId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "user" {
            return Ok(Self::User);
        }
        match s.strip_prefix("agent:") {
            Some(slug) if !slug.is_empty() => Ok(Self::agent(slug)),
            _ => Err(Error::invalid_input(format!("not an actor key: {}", s))),
        }
    }
}

// Actors serialize as their key so they can be used as JSON object keys.
impl Serialize for ActorId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ActorId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Unique identifier for a play session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a session ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_id_sequence() {
        assert!(PolicyId::new(0).is_err());
        assert_eq!(PolicyId::FIRST, PolicyId::new(1).unwrap());
        assert_eq!(PolicyId::FIRST.next(), Some(PolicyId::new(2).unwrap()));
        assert_eq!(PolicyId::new(u8::MAX).unwrap().next(), None);
    }

    #[test]
    fn test_option_id_range() {
        assert!(OptionId::new(0).is_err());
        assert!(OptionId::new(4).is_err());
        assert_eq!(OptionId::new(3).unwrap(), OptionId::THREE);
    }

    #[test]
    fn test_option_id_rejects_out_of_range_json() {
        assert!(serde_json::from_str::<OptionId>("7").is_err());
        assert_eq!(serde_json::from_str::<OptionId>("2").unwrap(), OptionId::TWO);
    }

    #[test]
    fn test_actor_key_roundtrip() {
        let agent = ActorId::agent("minister-of-finance");
        assert_eq!(agent.key(), "agent:minister-of-finance");
        assert_eq!("agent:minister-of-finance".parse::<ActorId>().unwrap(), agent);
        assert_eq!("user".parse::<ActorId>().unwrap(), ActorId::User);
        assert!("agent:".parse::<ActorId>().is_err());
        assert!("someone".parse::<ActorId>().is_err());
    }

    #[test]
    fn test_actor_as_json_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(ActorId::User, 3u32);
        map.insert(ActorId::agent("teacher"), 5u32);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"user":3,"agent:teacher":5}"#);
        let back: std::collections::BTreeMap<ActorId, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
