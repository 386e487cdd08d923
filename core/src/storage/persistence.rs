use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::config::StorageConfig;
use crate::models::FavoriteRecord;
use crate::storage::{Connection, Database, FavoriteRepository};
use crate::{Error, Result};

/// What the store writes and reads back: Key A and Key B.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedFavorites {
    pub records: Vec<FavoriteRecord>,
    pub order: Option<Vec<String>>,
}

/// Durable home of the favorites. Undecodable record data must surface as
/// [`Error::CorruptState`] so the store can start clean.
pub trait FavoritePersistence: Send {
    fn load(&self) -> Result<PersistedFavorites>;
    fn save(&mut self, state: &PersistedFavorites) -> Result<()>;
}

pub struct SqlitePersistence {
    conn: Connection,
    records_key: String,
    order_key: String,
}

impl SqlitePersistence {
    pub fn new(conn: Connection, config: &StorageConfig) -> Self {
        Self {
            conn,
            records_key: config.records_key.clone(),
            order_key: config.order_key.clone(),
        }
    }

    /// Open (creating if needed) the database named by `config`.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let conn = Database::new(&config.db_path).get_or_create()?;
        Ok(Self::new(conn, config))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl FavoritePersistence for SqlitePersistence {
    fn load(&self) -> Result<PersistedFavorites> {
        let records = FavoriteRepository::load_records(&self.conn, &self.records_key)?;
        let order = match FavoriteRepository::load_order(&self.conn, &self.order_key) {
            Ok(order) => order,
            Err(Error::CorruptState { key, details }) => {
                warn!(key = %key, details = %details, "Ignoring undecodable favorites order");
                None
            }
            Err(e) => return Err(e),
        };
        Ok(PersistedFavorites { records, order })
    }

    fn save(&mut self, state: &PersistedFavorites) -> Result<()> {
        FavoriteRepository::save(
            &self.conn,
            &self.records_key,
            &self.order_key,
            &state.records,
            state.order.as_deref().unwrap_or_default(),
        )
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    stored: PersistedFavorites,
    saves: usize,
    failures_remaining: usize,
    corrupt: bool,
}

/// Process-local persistence. Clones share the same storage, so a caller can
/// keep a handle to inspect what the store wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(stored: PersistedFavorites) -> Self {
        let persistence = Self::default();
        persistence.lock().stored = stored;
        persistence
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stored(&self) -> PersistedFavorites {
        self.lock().stored.clone()
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    /// Make the next `count` saves fail.
    pub fn fail_next_saves(&self, count: usize) {
        self.lock().failures_remaining = count;
    }

    /// Make loads report undecodable data.
    pub fn set_corrupt(&self, corrupt: bool) {
        self.lock().corrupt = corrupt;
    }
}

impl FavoritePersistence for MemoryPersistence {
    fn load(&self) -> Result<PersistedFavorites> {
        let state = self.lock();
        if state.corrupt {
            return Err(Error::CorruptState {
                key: "memory".to_string(),
                details: "marked corrupt".to_string(),
            });
        }
        Ok(state.stored.clone())
    }

    fn save(&mut self, stored: &PersistedFavorites) -> Result<()> {
        let mut state = self.lock();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(Error::Persistence("simulated write failure".to_string()));
        }
        state.stored = stored.clone();
        state.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CanonicalId;
    use crate::storage::KvRepository;
    use chrono::Utc;
    use tempfile::tempdir;

    fn config(dir: &tempfile::TempDir) -> StorageConfig {
        StorageConfig {
            db_path: dir.path().join("favorites.db"),
            ..StorageConfig::default()
        }
    }

    #[test]
    fn test_sqlite_round_trip() {
        let dir = tempdir().unwrap();
        let config = config(&dir);
        let state = PersistedFavorites {
            records: vec![FavoriteRecord::new(&CanonicalId::course("c"), "C", "", "", Utc::now())],
            order: Some(vec!["course:c".to_string()]),
        };

        let mut persistence = SqlitePersistence::open(&config).unwrap();
        persistence.save(&state).unwrap();
        drop(persistence);

        let reopened = SqlitePersistence::open(&config).unwrap();
        assert_eq!(reopened.load().unwrap(), state);
    }

    #[test]
    fn test_sqlite_corrupt_order_is_ignored() {
        let dir = tempdir().unwrap();
        let config = config(&dir);
        let persistence = SqlitePersistence::open(&config).unwrap();
        KvRepository::put(persistence.connection(), &config.order_key, "{oops").unwrap();

        let loaded = persistence.load().unwrap();
        assert!(loaded.order.is_none());
        assert!(loaded.records.is_empty());
    }

    #[test]
    fn test_sqlite_corrupt_records_surface() {
        let dir = tempdir().unwrap();
        let config = config(&dir);
        let persistence = SqlitePersistence::open(&config).unwrap();
        KvRepository::put(persistence.connection(), &config.records_key, "not json").unwrap();

        assert!(matches!(persistence.load(), Err(Error::CorruptState { .. })));
    }

    #[test]
    fn test_memory_failures() {
        let mut persistence = MemoryPersistence::new();
        let handle = persistence.clone();
        handle.fail_next_saves(1);

        assert!(persistence.save(&PersistedFavorites::default()).is_err());
        assert!(persistence.save(&PersistedFavorites::default()).is_ok());
        assert_eq!(handle.save_count(), 1);
    }
}
