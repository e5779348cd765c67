use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use super::reference::ConversationReference;
use crate::error::{HeraldError, Result};
use crate::storage::StateStore;

/// Bot-scope key listing conversations a channel session has attached to.
pub const CONVERSATIONS_KEY: &str = "bot/conversations";

/// Transport seam: opens turns against stored references and delivers text.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Checks that `reference` can be re-entered right now.
    async fn open_turn(&self, reference: &ConversationReference) -> Result<()>;

    async fn send(&self, reference: &ConversationReference, messages: Vec<String>) -> Result<()>;
}

/// Adapter that parks outgoing messages in a per-conversation storage list
/// until the attached chat session drains them.
///
/// Backed by [`FileStorage`](crate::storage::FileStorage) this works across
/// processes: a `complete` run can notify a chat session running elsewhere.
#[derive(Clone)]
pub struct OutboxAdapter {
    state: StateStore,
}

impl OutboxAdapter {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// Marks the conversation of `reference` as reachable.
    pub async fn register(&self, reference: &ConversationReference) -> Result<()> {
        loop {
            let mut known = self
                .state
                .load::<BTreeMap<String, ConversationReference>>(CONVERSATIONS_KEY)
                .await?;
            known
                .value
                .insert(reference.conversation_key(), reference.clone());
            match self.state.save(CONVERSATIONS_KEY, &mut known).await {
                Ok(()) => break,
                Err(err) if err.is_conflict() => continue,
                Err(err) => return Err(err.into()),
            }
        }
        debug!(conversation = %reference, "conversation registered");
        Ok(())
    }

    /// Removes and returns the messages waiting for `reference`.
    pub async fn take_pending(&self, reference: &ConversationReference) -> Result<Vec<String>> {
        let entries = self
            .state
            .storage()
            .drain(&reference.outbox_key())
            .await?;
        Ok(entries
            .into_iter()
            .filter_map(|v| match v {
                Value::String(text) => Some(text),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl ChannelAdapter for OutboxAdapter {
    async fn open_turn(&self, reference: &ConversationReference) -> Result<()> {
        let known = self
            .state
            .load::<BTreeMap<String, ConversationReference>>(CONVERSATIONS_KEY)
            .await?;
        if known.value.contains_key(&reference.conversation_key()) {
            Ok(())
        } else {
            Err(HeraldError::ResumeUnreachable {
                conversation: reference.to_string(),
                reason: "no channel session is attached to it".into(),
            })
        }
    }

    /// Parks the whole batch in one append, so a turn's replies arrive
    /// together or not at all.
    async fn send(&self, reference: &ConversationReference, messages: Vec<String>) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let batch = messages.into_iter().map(Value::String).collect();
        self.state
            .storage()
            .append(&reference.outbox_key(), batch)
            .await?;
        Ok(())
    }
}
