//! Key-value storage consumed by the registry, dialog engine and adapter.
//!
//! [`Storage`] is the physical engine: versioned JSON values plus append-only
//! lists. [`StateStore`] layers typed get-with-default / set / save on top,
//! using the version read to make every save a compare-and-swap.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::error::StorageError;

/// A stored value and the version it was written at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreItem {
    pub value: Value,
    pub version: u64,
}

/// Condition a write must satisfy against the currently stored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional write.
    Any,
    /// The key must not exist yet.
    Absent,
    /// The stored version must equal this one.
    Version(u64),
}

impl Precondition {
    pub(crate) fn check(&self, key: &str, current: Option<u64>) -> Result<(), StorageError> {
        let ok = match (self, current) {
            (Precondition::Any, _) => true,
            (Precondition::Absent, None) => true,
            (Precondition::Version(expected), Some(actual)) => *expected == actual,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(StorageError::Conflict {
                key: key.to_string(),
            })
        }
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<StoreItem>, StorageError>;

    /// Writes `value` if `precondition` holds and returns the new version.
    async fn write(
        &self,
        key: &str,
        value: Value,
        precondition: Precondition,
    ) -> Result<u64, StorageError>;

    /// Appends `values` to the list stored at `key`, all or nothing.
    async fn append(&self, key: &str, values: Vec<Value>) -> Result<(), StorageError>;

    /// Removes and returns every entry of the list stored at `key`.
    async fn drain(&self, key: &str) -> Result<Vec<Value>, StorageError>;
}

/// A typed value together with the version it was loaded at.
/// `version` is `None` when nothing was stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Option<u64>,
}

/// Typed access to scoped state on top of a [`Storage`].
#[derive(Clone)]
pub struct StateStore {
    storage: Arc<dyn Storage>,
}

impl StateStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Loads the value at `key`, falling back to `T::default()` when absent.
    pub async fn load<T>(&self, key: &str) -> Result<Versioned<T>, StorageError>
    where
        T: DeserializeOwned + Default,
    {
        match self.storage.read(key).await? {
            Some(item) => {
                let value = serde_json::from_value(item.value).map_err(|source| {
                    StorageError::Json {
                        key: key.to_string(),
                        source,
                    }
                })?;
                Ok(Versioned {
                    value,
                    version: Some(item.version),
                })
            }
            None => Ok(Versioned {
                value: T::default(),
                version: None,
            }),
        }
    }

    /// Saves `state` only if the stored version still matches the one loaded,
    /// then bumps `state.version`.
    pub async fn save<T>(&self, key: &str, state: &mut Versioned<T>) -> Result<(), StorageError>
    where
        T: Serialize,
    {
        let value = serde_json::to_value(&state.value).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        let precondition = match state.version {
            Some(version) => Precondition::Version(version),
            None => Precondition::Absent,
        };
        let version = self.storage.write(key, value, precondition).await?;
        state.version = Some(version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        hits: u32,
    }

    fn store() -> StateStore {
        StateStore::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn precondition_rules() {
        assert!(Precondition::Any.check("k", None).is_ok());
        assert!(Precondition::Any.check("k", Some(3)).is_ok());
        assert!(Precondition::Absent.check("k", None).is_ok());
        assert!(Precondition::Absent.check("k", Some(1)).is_err());
        assert!(Precondition::Version(2).check("k", Some(2)).is_ok());
        assert!(Precondition::Version(2).check("k", Some(3)).is_err());
        assert!(Precondition::Version(2).check("k", None).is_err());
    }

    #[tokio::test]
    async fn load_defaults_when_absent() {
        let state: Versioned<Counter> = store().load("missing").await.unwrap();
        assert_eq!(state.value, Counter::default());
        assert_eq!(state.version, None);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = store();
        let mut state: Versioned<Counter> = store.load("c").await.unwrap();
        state.value.hits = 2;
        store.save("c", &mut state).await.unwrap();
        assert_eq!(state.version, Some(1));

        let loaded: Versioned<Counter> = store.load("c").await.unwrap();
        assert_eq!(loaded.value.hits, 2);
        assert_eq!(loaded.version, Some(1));
    }

    #[tokio::test]
    async fn stale_save_is_rejected() {
        let store = store();
        let mut first: Versioned<Counter> = store.load("c").await.unwrap();
        let mut second: Versioned<Counter> = store.load("c").await.unwrap();

        first.value.hits = 1;
        store.save("c", &mut first).await.unwrap();

        second.value.hits = 5;
        let err = store.save("c", &mut second).await.unwrap_err();
        assert!(err.is_conflict());

        let loaded: Versioned<Counter> = store.load("c").await.unwrap();
        assert_eq!(loaded.value.hits, 1);
    }
}
