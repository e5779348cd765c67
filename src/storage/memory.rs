use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{Precondition, Storage, StoreItem};
use crate::error::StorageError;

/// In-process storage. State is lost when the process exits.
#[derive(Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, StoreItem>>,
    lists: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<StoreItem>, StorageError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn write(
        &self,
        key: &str,
        value: Value,
        precondition: Precondition,
    ) -> Result<u64, StorageError> {
        let mut items = self.items.write().await;
        let current = items.get(key).map(|item| item.version);
        precondition.check(key, current)?;

        let version = current.unwrap_or(0) + 1;
        items.insert(key.to_string(), StoreItem { value, version });
        Ok(version)
    }

    async fn append(&self, key: &str, values: Vec<Value>) -> Result<(), StorageError> {
        self.lists
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .extend(values);
        Ok(())
    }

    async fn drain(&self, key: &str) -> Result<Vec<Value>, StorageError> {
        Ok(self.lists.write().await.remove(key).unwrap_or_default())
    }
}
