use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::commands::{Command, USAGE_HINT};
use crate::config::HeraldConfig;
use crate::conversation::{ChannelAdapter, TurnContext, TurnEvent};
use crate::dialog::DialogEngine;
use crate::error::Result;
use crate::jobs::{JobId, JobRecord, JobRegistry};
use crate::notifier::{ProactiveNotifier, ResumeScheduler};
use crate::storage::StateStore;

/// System event raised by whatever runs the job once it finishes.
pub const JOB_COMPLETED_EVENT: &str = "jobCompleted";

pub const WELCOME: &str = "Welcome! I run jobs in the background and come back to this \
     conversation when they finish. Type 'run' to start a job, 'show' to list jobs, \
     or 'done <id>' to mark a job as complete.";

pub const COMPLETION_ACK: &str = "Job completed. Notification sent.";

/// Turn handler: routes each inbound event to the registry, the notifier or
/// the dialog engine, and turns every failure into a reply.
pub struct JobBot {
    registry: JobRegistry,
    dialogs: Arc<DialogEngine>,
    notifier: ProactiveNotifier,
}

impl JobBot {
    /// Wires the bot and spawns its resume scheduler on the current runtime.
    pub fn new(state: StateStore, adapter: Arc<dyn ChannelAdapter>, config: &HeraldConfig) -> Self {
        let registry = JobRegistry::new(state.clone(), config.max_persist_attempts);
        let dialogs = Arc::new(DialogEngine::new(state, config.max_persist_attempts));
        let scheduler = ResumeScheduler::spawn(adapter, dialogs.clone());
        let notifier = ProactiveNotifier::new(
            registry.clone(),
            scheduler,
            Duration::from_millis(config.resume_timeout_ms),
        );
        Self {
            registry,
            dialogs,
            notifier,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn dialogs(&self) -> &DialogEngine {
        &self.dialogs
    }

    pub async fn on_turn(&self, turn: &mut TurnContext) {
        if let Err(err) = self.dispatch(turn).await {
            warn!(conversation = %turn.reference, error = %err, "turn failed");
            turn.send(err.user_message());
        }
    }

    async fn dispatch(&self, turn: &mut TurnContext) -> Result<()> {
        match turn.event.clone() {
            TurnEvent::Message { text } => self.on_message(turn, &text).await,
            TurnEvent::SystemEvent { name, value } if name == JOB_COMPLETED_EVENT => {
                match event_job_id(&value) {
                    Some(id) => self.complete_job(turn, id).await,
                    None => {
                        warn!(%value, "jobCompleted event without a numeric job id");
                        turn.send(USAGE_HINT);
                        Ok(())
                    }
                }
            }
            TurnEvent::SystemEvent { name, .. } => {
                debug!(event = %name, "ignoring system event");
                Ok(())
            }
            TurnEvent::MembershipChanged { added, .. } => {
                let bot_id = turn.reference.bot.id.clone();
                for _ in added.iter().filter(|member| member.id != bot_id) {
                    turn.send(WELCOME);
                }
                Ok(())
            }
        }
    }

    async fn on_message(&self, turn: &mut TurnContext, text: &str) -> Result<()> {
        match Command::classify(text) {
            Command::Run => {
                let record = self.registry.create(turn.capture_reference()).await?;
                turn.send(format!(
                    "We're starting job {} for you. We'll notify you when it's complete.",
                    record.id
                ));
            }
            Command::Show => {
                let jobs = self.registry.list().await?;
                turn.send(render_job_table(&jobs));
            }
            Command::Done(id) => self.complete_job(turn, id).await?,
            Command::DoneMissingId => turn.send(USAGE_HINT),
            Command::Unrecognized => {
                let step = self.dialogs.continue_dialog(&turn.reference, text).await?;
                turn.extend(step.replies);
            }
        }
        Ok(())
    }

    async fn complete_job(&self, turn: &mut TurnContext, id: JobId) -> Result<()> {
        self.notifier.complete_and_notify(id).await?;
        turn.send(COMPLETION_ACK);
        Ok(())
    }
}

/// Accepts `42` as well as `"42"`.
fn event_job_id(value: &Value) -> Option<JobId> {
    match value {
        Value::Number(n) => n.as_u64().map(JobId),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Markdown table of the job log.
pub fn render_job_table(jobs: &[JobRecord]) -> String {
    if jobs.is_empty() {
        return "The job log is empty.".to_string();
    }
    let mut table = String::from("| ID | Conversation ID | Completed |\n| :--- | :---: | :---: |");
    for job in jobs {
        table.push_str(&format!(
            "\n| {} | {} | {} |",
            job.id,
            job.reference.conversation_fragment(),
            job.completed
        ));
    }
    table
}
