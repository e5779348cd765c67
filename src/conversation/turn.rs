use serde_json::Value;

use super::reference::{Account, ConversationReference};

/// Inbound event carried by a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Human-typed text.
    Message { text: String },
    /// Named system event with an arbitrary payload.
    SystemEvent { name: String, value: Value },
    /// Members joined or left the conversation.
    MembershipChanged {
        added: Vec<Account>,
        removed: Vec<Account>,
    },
}

/// A single turn: the event plus the conversation it arrived on.
///
/// Replies accumulate in `outgoing` and are delivered by whoever drives the
/// turn once the handler returns.
#[derive(Debug)]
pub struct TurnContext {
    pub reference: ConversationReference,
    pub event: TurnEvent,
    outgoing: Vec<String>,
}

impl TurnContext {
    pub fn new(reference: ConversationReference, event: TurnEvent) -> Self {
        Self {
            reference,
            event,
            outgoing: Vec::new(),
        }
    }

    pub fn message(reference: ConversationReference, text: impl Into<String>) -> Self {
        Self::new(reference, TurnEvent::Message { text: text.into() })
    }

    /// Captures the reference of this turn for later proactive use.
    pub fn capture_reference(&self) -> ConversationReference {
        self.reference.clone()
    }

    pub fn send(&mut self, text: impl Into<String>) {
        self.outgoing.push(text.into());
    }

    pub fn extend(&mut self, texts: impl IntoIterator<Item = String>) {
        self.outgoing.extend(texts);
    }

    pub fn outgoing(&self) -> &[String] {
        &self.outgoing
    }

    pub fn into_outgoing(self) -> Vec<String> {
        self.outgoing
    }
}
