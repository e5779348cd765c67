use std::fmt;

use serde::{Deserialize, Serialize};

/// A participant in a conversation (user or bot).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Account {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Durable handle for re-entering a conversation from outside a live turn.
///
/// Only ever captured from an inbound turn and stored; never assembled by hand
/// on the resume path. Two references are equal when they point at the same
/// channel conversation, regardless of which user or bot account was captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationReference {
    pub channel_id: String,
    pub conversation_id: String,
    pub user: Account,
    pub bot: Account,
}

impl ConversationReference {
    /// Conversation id up to the first `|`, as shown in the job table.
    pub fn conversation_fragment(&self) -> &str {
        self.conversation_id
            .split('|')
            .next()
            .unwrap_or(&self.conversation_id)
    }

    /// Storage key of the conversation scope.
    pub fn conversation_key(&self) -> String {
        format!("conversation/{}/{}", self.channel_id, self.conversation_id)
    }

    /// Storage key of the user scope.
    pub fn user_key(&self) -> String {
        format!("user/{}/{}", self.channel_id, self.user.id)
    }

    /// Storage key of the list holding messages not yet shown to the user.
    pub fn outbox_key(&self) -> String {
        format!("outbox/{}/{}", self.channel_id, self.conversation_id)
    }
}

impl PartialEq for ConversationReference {
    fn eq(&self, other: &Self) -> bool {
        self.channel_id == other.channel_id && self.conversation_id == other.conversation_id
    }
}

impl Eq for ConversationReference {}

impl fmt::Display for ConversationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.conversation_id)
    }
}
