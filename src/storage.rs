//! Persistent key-value storage for sessions
//!
//! This module provides:
//! - `KeyValueStore` trait over flat string keys and values
//! - In-memory backend for tests and short-lived runs
//! - sled backend for sessions that survive a restart
//! - `SessionStore`, which tells a fresh session from a continuing one

use crate::catalog::PolicyCatalog;
use crate::config::GameConfig;
use crate::error::{Error, Result};
use crate::session::{keys, SessionState};
use parking_lot::RwLock;
use rand::Rng;
use serde_json::Value;
use sled::{Config as SledConfig, Db as SledDb, Tree as SledTree};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Marker written when a session starts and removed when it ends
pub const GAME_STARTED: &str = "game_started";

const TREE_SESSION: &str = "session";

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::storage(err.to_string())
    }
}

/// Flat string storage
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value
    fn remove(&self, key: &str) -> Result<()>;

    /// All stored keys
    fn keys(&self) -> Result<Vec<String>>;

    /// Delete everything
    fn clear(&self) -> Result<()>;

    /// Make previous writes durable
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Volatile store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

/// Store backed by an embedded sled database
pub struct SledStore {
    _db: SledDb,
    tree: SledTree,
}

impl SledStore {
    /// Open (or create) a database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = SledConfig::new().path(path.as_ref()).open()?;
        Self::from_db(db)
    }

    /// Database removed when dropped
    pub fn temporary() -> Result<Self> {
        let db = SledConfig::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: SledDb) -> Result<Self> {
        let tree = db.open_tree(TREE_SESSION)?;
        Ok(Self { _db: db, tree })
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.tree.get(key)? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| Error::storage(format!("value of {} is not UTF-8: {}", key, e))),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.tree.insert(key, value.as_bytes())?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.tree.remove(key)?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for key in self.tree.iter().keys() {
            let key = key?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }

    fn clear(&self) -> Result<()> {
        self.tree.clear()?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }
}

/// Saves sessions into a [`KeyValueStore`] and decides whether a load is a
/// fresh start or a continuation
pub struct SessionStore<S> {
    store: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    /// Wrap a backend
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying backend
    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Whether a session is in progress
    pub fn is_started(&self) -> Result<bool> {
        Ok(self.store.get(GAME_STARTED)?.is_some())
    }

    /// Continue the stored session, or start a new one when none is marked
    /// as in progress.
    ///
    /// A fresh start wipes whatever an earlier session left behind.
    pub fn load_or_start<R: Rng + ?Sized>(
        &self,
        catalog: &PolicyCatalog,
        config: &GameConfig,
        rng: &mut R,
    ) -> Result<SessionState> {
        if !self.is_started()? {
            self.store.clear()?;
            let session = SessionState::start(catalog.clone(), config.clone(), rng)?;
            self.save(&session)?;
            return Ok(session);
        }

        let mut slices = BTreeMap::new();
        for key in keys::ALL {
            let Some(raw) = self.store.get(key)? else {
                continue;
            };
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    slices.insert(key.to_string(), value);
                }
                Err(e) => tracing::warn!(key, error = %e, "Stored slice is not JSON, dropping"),
            }
        }
        SessionState::restore(catalog.clone(), config.clone(), &slices, rng)
    }

    /// Persist every slice of `session` and mark it in progress
    pub fn save(&self, session: &SessionState) -> Result<()> {
        for (key, value) in session.serialize()? {
            self.store.set(&key, &value.to_string())?;
        }
        self.store.set(GAME_STARTED, "true")?;
        self.store.flush()?;
        tracing::debug!(session = %session.id(), phase = %session.phase(), "Session saved");
        Ok(())
    }

    /// Mark the session finished so the next load starts fresh
    pub fn end(&self) -> Result<()> {
        self.store.remove(GAME_STARTED)?;
        self.store.flush()?;
        tracing::info!("Session ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPhase;
    use crate::types::{OptionId, PolicyId};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn exercise(store: &dyn KeyValueStore) {
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);

        store.clear().unwrap();
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sled_store() {
        exercise(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_sled_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store.set(GAME_STARTED, "true").unwrap();
            store.flush().unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.get(GAME_STARTED).unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn test_fresh_start_clears_leftovers() {
        let store = SessionStore::new(MemoryStore::new());
        store.inner().set("budget", "{\"user\": 9}").unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        let session = store
            .load_or_start(&PolicyCatalog::builtin(), &GameConfig::default(), &mut rng)
            .unwrap();
        assert_eq!(session.phase(), SessionPhase::IndividualSelection);
        assert_eq!(session.budget().spent(&crate::types::ActorId::User).unwrap(), 0);
        assert!(store.is_started().unwrap());
    }

    #[test]
    fn test_continue_and_end() {
        let store = SessionStore::new(MemoryStore::new());
        let catalog = PolicyCatalog::builtin();
        let config = GameConfig::default();
        let mut rng = StdRng::seed_from_u64(2);

        let mut session = store.load_or_start(&catalog, &config, &mut rng).unwrap();
        session
            .select_individual(PolicyId::new(1).unwrap(), OptionId::THREE)
            .unwrap();
        store.save(&session).unwrap();

        let resumed = store.load_or_start(&catalog, &config, &mut rng).unwrap();
        assert_eq!(resumed.id(), session.id());
        assert_eq!(resumed.roster(), session.roster());
        assert_eq!(
            resumed.selections().get(PolicyId::new(1).unwrap()),
            Some(OptionId::THREE)
        );

        store.end().unwrap();
        let fresh = store.load_or_start(&catalog, &config, &mut rng).unwrap();
        assert_ne!(fresh.id(), session.id());
        assert!(fresh.selections().is_empty());
    }

    #[test]
    fn test_non_json_slice_heals() {
        let store = SessionStore::new(MemoryStore::new());
        let catalog = PolicyCatalog::builtin();
        let config = GameConfig::default();
        let mut rng = StdRng::seed_from_u64(3);

        let session = store.load_or_start(&catalog, &config, &mut rng).unwrap();
        store.inner().set(keys::ROSTER, "not json").unwrap();

        let resumed = store.load_or_start(&catalog, &config, &mut rng).unwrap();
        assert_eq!(resumed.id(), session.id());
        assert_eq!(resumed.roster().len(), config.agents_per_session);
    }
}
