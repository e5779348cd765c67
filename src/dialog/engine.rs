use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use super::profile::UserProfile;
use super::state::{DialogFrame, DialogId, DialogInput, DialogState, Effect, transition};
use crate::conversation::ConversationReference;
use crate::error::{Result, StorageError};
use crate::storage::{StateStore, Versioned};

/// One async mutex per conversation. Turns of the same conversation queue up
/// behind each other; different conversations proceed independently.
#[derive(Default)]
struct ConversationLanes {
    lanes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationLanes {
    async fn enter(&self, key: &str) -> LaneGuard<'_> {
        let lane = {
            let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
            lanes.entry(key.to_string()).or_default().clone()
        };
        LaneGuard {
            lanes: self,
            key: key.to_string(),
            guard: Some(lane.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lanes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Releases the lane on drop and forgets it once nobody else holds or
/// waits on it.
struct LaneGuard<'a> {
    lanes: &'a ConversationLanes,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LaneGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut lanes = self.lanes.lanes.lock().unwrap_or_else(|e| e.into_inner());
        if lanes
            .get(&self.key)
            .is_some_and(|lane| Arc::strong_count(lane) == 1)
        {
            lanes.remove(&self.key);
        }
    }
}

#[derive(Clone, Copy)]
enum EngineInput<'a> {
    BeginForProfile,
    Begin(DialogId),
    Reply(&'a str),
}

/// What one engine step produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    /// Dialog started by this step, if any.
    pub started: Option<DialogId>,
    pub replies: Vec<String>,
}

/// Runs the dialog state machine against persisted conversation and user state.
///
/// Every step loads the dialog stack and profile, applies one transition and
/// saves both back before the lane is released. The conversation frame is
/// written first; if the profile write then fails the frame is put back, so a
/// failed step leaves neither advanced. Version conflicts replay the step
/// against fresh state, up to `max_attempts` times.
pub struct DialogEngine {
    state: StateStore,
    lanes: ConversationLanes,
    max_attempts: u32,
}

impl DialogEngine {
    pub fn new(state: StateStore, max_attempts: u32) -> Self {
        Self {
            state,
            lanes: ConversationLanes::default(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Starts HELLO_USER for users with a known city, WHO_ARE_YOU otherwise.
    pub async fn begin_for_profile(&self, reference: &ConversationReference) -> Result<StepOutput> {
        self.step(reference, EngineInput::BeginForProfile).await
    }

    pub async fn begin(
        &self,
        reference: &ConversationReference,
        dialog: DialogId,
    ) -> Result<StepOutput> {
        self.step(reference, EngineInput::Begin(dialog)).await
    }

    /// Feeds a user reply to the active dialog. Without one, nothing happens.
    pub async fn continue_dialog(
        &self,
        reference: &ConversationReference,
        text: &str,
    ) -> Result<StepOutput> {
        self.step(reference, EngineInput::Reply(text)).await
    }

    pub async fn profile(&self, reference: &ConversationReference) -> Result<UserProfile> {
        Ok(self
            .state
            .load::<UserProfile>(&reference.user_key())
            .await?
            .value)
    }

    pub async fn active(&self, reference: &ConversationReference) -> Result<Option<DialogFrame>> {
        let dialog = self
            .state
            .load::<DialogState>(&reference.conversation_key())
            .await?;
        Ok(dialog.value.active().cloned())
    }

    async fn step(
        &self,
        reference: &ConversationReference,
        input: EngineInput<'_>,
    ) -> Result<StepOutput> {
        let _lane = self.lanes.enter(&reference.conversation_key()).await;

        let mut attempt = 1;
        loop {
            match self.try_step(reference, input).await {
                Ok(out) => return Ok(out),
                Err(err) if err.is_conflict() && attempt < self.max_attempts => {
                    debug!(attempt, conversation = %reference, "dialog state changed underneath us, retrying");
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt, conversation = %reference, error = %err, "failed to persist dialog step");
                    return Err(err.into());
                }
            }
        }
    }

    async fn try_step(
        &self,
        reference: &ConversationReference,
        input: EngineInput<'_>,
    ) -> std::result::Result<StepOutput, StorageError> {
        let conversation_key = reference.conversation_key();
        let user_key = reference.user_key();

        let mut dialog = self.state.load::<DialogState>(&conversation_key).await?;
        let mut profile = self.state.load::<UserProfile>(&user_key).await?;

        let input = match input {
            EngineInput::BeginForProfile => {
                DialogInput::Begin(DialogId::for_profile(&profile.value))
            }
            EngineInput::Begin(dialog) => DialogInput::Begin(dialog),
            EngineInput::Reply(text) => {
                if dialog.value.is_empty() {
                    debug!(conversation = %reference, "no active dialog, dropping message");
                    return Ok(StepOutput::default());
                }
                DialogInput::Reply(text)
            }
        };
        let started = match input {
            DialogInput::Begin(id) => Some(id),
            DialogInput::Reply(_) => None,
        };

        let outcome = transition(dialog.value.active(), input, &profile.value);
        let mut replies = Vec::new();
        let mut profile_changed = false;
        for effect in outcome.effects {
            match effect {
                Effect::Say(text) => replies.push(text),
                Effect::SetName(name) => {
                    profile.value.name = Some(name);
                    profile_changed = true;
                }
                Effect::SetCity(city) => {
                    profile.value.city = Some(city);
                    profile_changed = true;
                }
            }
        }

        let previous = dialog.value.clone();
        dialog.value.set_active(outcome.next);
        self.state.save(&conversation_key, &mut dialog).await?;

        if profile_changed
            && let Err(err) = self.state.save(&user_key, &mut profile).await
        {
            let mut restore = Versioned {
                value: previous,
                version: dialog.version,
            };
            if let Err(restore_err) = self.state.save(&conversation_key, &mut restore).await {
                warn!(conversation = %reference, error = %restore_err, "could not restore dialog frame");
            }
            return Err(err);
        }

        debug!(
            conversation = %reference,
            active = ?dialog.value.active().map(|f| (f.dialog, f.step.index())),
            "dialog step persisted"
        );
        Ok(StepOutput { started, replies })
    }
}
