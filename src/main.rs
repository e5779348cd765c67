use anyhow::{Result, bail};
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use herald::bot::{COMPLETION_ACK, JOB_COMPLETED_EVENT, JobBot, render_job_table};
use herald::cli::{Cli, Command};
use herald::config::HeraldConfig;
use herald::conversation::{Account, ConversationReference, OutboxAdapter, TurnContext, TurnEvent};
use herald::session::ChatSession;
use herald::storage::{FileStorage, StateStore};
use herald::ui::NotifyProgress;

/// Conversation used by `herald complete` to raise the completion event.
const OPERATOR_CONVERSATION: &str = "operator";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = HeraldConfig::load()?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }
    if let Some(timeout) = cli.resume_timeout_ms {
        config.resume_timeout_ms = timeout;
    }

    let storage = FileStorage::new(&config.store_path);
    info!(store = %storage.root().display(), "using file storage");
    let state = StateStore::new(Arc::new(storage));
    let outbox = OutboxAdapter::new(state.clone());
    let bot = JobBot::new(state, Arc::new(outbox.clone()), &config);

    match cli.command {
        Command::Chat { conversation, user } => {
            let reference = reference_for(&config, conversation, user);
            let poll = Duration::from_millis(config.poll_interval_ms);
            ChatSession::new(&bot, &outbox, reference, poll).run().await?;
        }
        Command::Complete { job_id } => {
            let reference = reference_for(
                &config,
                OPERATOR_CONVERSATION.to_string(),
                OPERATOR_CONVERSATION.to_string(),
            );
            let progress = NotifyProgress::start(job_id);
            let mut turn = TurnContext::new(
                reference,
                TurnEvent::SystemEvent {
                    name: JOB_COMPLETED_EVENT.to_string(),
                    value: json!(job_id),
                },
            );
            bot.on_turn(&mut turn).await;
            let ok = turn.outgoing().iter().any(|m| m == COMPLETION_ACK);
            progress.finish(ok, turn.outgoing());
            if !ok {
                bail!("job {job_id} could not be completed");
            }
        }
        Command::Jobs => {
            let jobs = bot.registry().list().await?;
            println!("{}", render_job_table(&jobs));
        }
    }

    Ok(())
}

fn reference_for(config: &HeraldConfig, conversation: String, user: String) -> ConversationReference {
    ConversationReference {
        channel_id: config.channel_id.clone(),
        conversation_id: conversation,
        user: Account::new(user),
        bot: Account::new(config.bot_id.clone()),
    }
}

/// Logs go to stderr so chat output on stdout stays readable.
fn init_tracing(verbose: bool) {
    let default = if verbose { "herald=debug" } else { "herald=warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
