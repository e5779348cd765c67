//! Shared fixtures for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use crate::conversation::{Account, ChannelAdapter, ConversationReference};
use crate::error::{HeraldError, Result, StorageError};
use crate::storage::{MemoryStorage, Precondition, Storage, StoreItem};

pub fn reference(conversation: &str, user: &str) -> ConversationReference {
    ConversationReference {
        channel_id: "test".into(),
        conversation_id: conversation.into(),
        user: Account::new(user),
        bot: Account::new("herald"),
    }
}

/// Adapter that records deliveries instead of transporting them.
#[derive(Default)]
pub struct RecordingAdapter {
    unreachable: Mutex<HashSet<String>>,
    stall: Option<Duration>,
    opened: AtomicUsize,
    sent: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// An adapter whose `open_turn` takes `delay` before answering.
    pub fn stalling(delay: Duration) -> Self {
        Self {
            stall: Some(delay),
            ..Self::default()
        }
    }

    pub fn make_unreachable(&self, conversation: &str) {
        self.unreachable
            .lock()
            .unwrap()
            .insert(conversation.to_string());
    }

    /// Number of proactive turns that were opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Everything delivered to `conversation`, flattened in order.
    pub fn delivered(&self, conversation: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(conv, _)| conv == conversation)
            .flat_map(|(_, messages)| messages.clone())
            .collect()
    }
}

#[async_trait]
impl ChannelAdapter for RecordingAdapter {
    async fn open_turn(&self, reference: &ConversationReference) -> Result<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.stall {
            tokio::time::sleep(delay).await;
        }
        if self
            .unreachable
            .lock()
            .unwrap()
            .contains(&reference.conversation_id)
        {
            return Err(HeraldError::ResumeUnreachable {
                conversation: reference.to_string(),
                reason: "channel rejected the reference".into(),
            });
        }
        Ok(())
    }

    async fn send(&self, reference: &ConversationReference, messages: Vec<String>) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((reference.conversation_id.clone(), messages));
        Ok(())
    }
}

/// Memory storage with injectable write failures.
///
/// Once armed, writes and appends to keys starting with `prefix` fail with an
/// I/O error. Independently, the first `conflicts` writes report a version
/// conflict.
#[derive(Default)]
pub struct FailingStorage {
    inner: MemoryStorage,
    prefix: Option<String>,
    armed: AtomicBool,
    conflicts: AtomicU32,
}

impl FailingStorage {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
            ..Self::default()
        }
    }

    pub fn conflicting(conflicts: u32) -> Self {
        Self {
            conflicts: AtomicU32::new(conflicts),
            ..Self::default()
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    fn check(&self, key: &str) -> std::result::Result<(), StorageError> {
        let failing = self.armed.load(Ordering::SeqCst)
            && self.prefix.as_deref().is_some_and(|p| key.starts_with(p));
        if failing {
            return Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::other("disk full"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FailingStorage {
    async fn read(&self, key: &str) -> std::result::Result<Option<StoreItem>, StorageError> {
        self.inner.read(key).await
    }

    async fn write(
        &self,
        key: &str,
        value: Value,
        precondition: Precondition,
    ) -> std::result::Result<u64, StorageError> {
        self.check(key)?;
        if self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StorageError::Conflict { key: key.into() });
        }
        self.inner.write(key, value, precondition).await
    }

    async fn append(&self, key: &str, values: Vec<Value>) -> std::result::Result<(), StorageError> {
        self.check(key)?;
        self.inner.append(key, values).await
    }

    async fn drain(&self, key: &str) -> std::result::Result<Vec<Value>, StorageError> {
        self.inner.drain(key).await
    }
}
