//! Proactive job-completion notification.
//!
//! Completing a job and notifying its conversation are decoupled: the
//! [`ProactiveNotifier`] marks the job complete, then hands a [`ResumeRequest`]
//! to the [`ResumeScheduler`], which re-enters the stored conversation on its
//! own task and reports back over a oneshot channel.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::conversation::{ChannelAdapter, ConversationReference, TurnContext, TurnEvent};
use crate::dialog::DialogEngine;
use crate::error::{HeraldError, Result};
use crate::jobs::{JobId, JobRecord, JobRegistry};

/// Event name carried by the re-entrant turn opened for a completed job.
pub const RESUME_EVENT: &str = "proactiveResume";

const QUEUE_DEPTH: usize = 64;

/// What to do once the conversation has been re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Announce completion, then start the greeting or onboarding dialog.
    JobCompleted { job_id: JobId },
}

pub struct ResumeRequest {
    pub reference: ConversationReference,
    pub continuation: Continuation,
    report: oneshot::Sender<Result<()>>,
}

/// Queue of "resume conversation" commands executed on a background task.
#[derive(Clone)]
pub struct ResumeScheduler {
    tx: mpsc::Sender<ResumeRequest>,
}

impl ResumeScheduler {
    /// Spawns the worker loop. Must be called inside a Tokio runtime.
    pub fn spawn(adapter: Arc<dyn ChannelAdapter>, dialogs: Arc<DialogEngine>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(run_scheduler(rx, adapter, dialogs));
        Self { tx }
    }

    /// Enqueues a resume and returns the receiver its outcome is reported on.
    pub async fn submit(
        &self,
        reference: ConversationReference,
        continuation: Continuation,
    ) -> Result<oneshot::Receiver<Result<()>>> {
        let (report, outcome) = oneshot::channel();
        let conversation = reference.to_string();
        self.tx
            .send(ResumeRequest {
                reference,
                continuation,
                report,
            })
            .await
            .map_err(|_| HeraldError::ResumeUnreachable {
                conversation,
                reason: "resume scheduler is not running".into(),
            })?;
        Ok(outcome)
    }
}

async fn run_scheduler(
    mut rx: mpsc::Receiver<ResumeRequest>,
    adapter: Arc<dyn ChannelAdapter>,
    dialogs: Arc<DialogEngine>,
) {
    while let Some(request) = rx.recv().await {
        let adapter = adapter.clone();
        let dialogs = dialogs.clone();
        tokio::spawn(async move {
            let ResumeRequest {
                reference,
                continuation,
                mut report,
            } = request;
            // A caller that stopped waiting drops its receiver; the resume is
            // abandoned at its next await point.
            let result = tokio::select! {
                result = resume(adapter.as_ref(), &dialogs, &reference, continuation) => Some(result),
                _ = report.closed() => None,
            };
            match result {
                Some(result) => {
                    if report.send(result).is_err() {
                        debug!(conversation = %reference, "resume finished after caller gave up");
                    }
                }
                None => debug!(conversation = %reference, "resume cancelled, caller gave up"),
            }
        });
    }
    debug!("resume scheduler stopped");
}

/// Runs one re-entrant turn against `reference`.
async fn resume(
    adapter: &dyn ChannelAdapter,
    dialogs: &DialogEngine,
    reference: &ConversationReference,
    continuation: Continuation,
) -> Result<()> {
    adapter.open_turn(reference).await?;

    match continuation {
        Continuation::JobCompleted { job_id } => {
            let mut turn = TurnContext::new(
                reference.clone(),
                TurnEvent::SystemEvent {
                    name: RESUME_EVENT.to_string(),
                    value: json!({ "jobId": job_id }),
                },
            );
            turn.send(format!("Job {job_id} is complete."));
            let step = dialogs.begin_for_profile(&turn.reference).await?;
            turn.extend(step.replies);

            if let Some(dialog) = step.started {
                info!(job_id = %job_id, conversation = %reference, %dialog, "conversation resumed");
            }
            adapter.send(reference, turn.into_outgoing()).await
        }
    }
}

/// Completes jobs and notifies the conversations that started them.
pub struct ProactiveNotifier {
    registry: JobRegistry,
    scheduler: ResumeScheduler,
    timeout: Duration,
}

impl ProactiveNotifier {
    pub fn new(registry: JobRegistry, scheduler: ResumeScheduler, timeout: Duration) -> Self {
        Self {
            registry,
            scheduler,
            timeout,
        }
    }

    /// Marks `job_id` complete and resumes its conversation.
    ///
    /// Unknown and already-completed jobs fail before any resume is attempted.
    /// A resume that fails or outlives the timeout is reported as
    /// [`HeraldError::ResumeUnreachable`]; the job stays completed either way.
    /// A timed-out resume is cancelled, so nothing reaches the conversation
    /// after the caller was told delivery failed.
    pub async fn complete_and_notify(&self, job_id: JobId) -> Result<JobRecord> {
        let record = self.registry.mark_complete(job_id).await?;
        let conversation = record.reference.to_string();

        let outcome = self
            .scheduler
            .submit(
                record.reference.clone(),
                Continuation::JobCompleted { job_id },
            )
            .await?;

        match tokio::time::timeout(self.timeout, outcome).await {
            Ok(Ok(Ok(()))) => {
                info!(job_id = %job_id, conversation = %conversation, "notification sent");
                Ok(record)
            }
            Ok(Ok(Err(err))) => {
                warn!(job_id = %job_id, error = %err, "notification failed");
                Err(err)
            }
            Ok(Err(_)) => Err(HeraldError::ResumeUnreachable {
                conversation,
                reason: "resume was dropped before reporting".into(),
            }),
            Err(_) => {
                warn!(job_id = %job_id, timeout_ms = self.timeout.as_millis() as u64, "resume timed out");
                Err(HeraldError::ResumeUnreachable {
                    conversation,
                    reason: format!("no answer within {}ms", self.timeout.as_millis()),
                })
            }
        }
    }
}
