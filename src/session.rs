//! Interactive chat session bound to one conversation.
//!
//! Stdin lines become message turns. Between lines the outbox is polled, so
//! notifications raised by another process show up without user input.

use anyhow::Result;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::bot::JobBot;
use crate::conversation::{ConversationReference, OutboxAdapter, TurnContext, TurnEvent};
use crate::ui::ChatConsole;

pub struct ChatSession<'a> {
    bot: &'a JobBot,
    outbox: &'a OutboxAdapter,
    reference: ConversationReference,
    poll_interval: Duration,
    console: ChatConsole,
}

impl<'a> ChatSession<'a> {
    pub fn new(
        bot: &'a JobBot,
        outbox: &'a OutboxAdapter,
        reference: ConversationReference,
        poll_interval: Duration,
    ) -> Self {
        Self {
            bot,
            outbox,
            reference,
            poll_interval,
            console: ChatConsole::default(),
        }
    }

    pub async fn run(&self) -> Result<()> {
        self.outbox.register(&self.reference).await?;
        info!(conversation = %self.reference, "chat session attached");
        self.console
            .banner(&self.reference.conversation_id, &self.reference.user.id);

        let joined = TurnEvent::MembershipChanged {
            added: vec![self.reference.user.clone()],
            removed: Vec::new(),
        };
        self.turn(joined).await;
        self.flush_outbox().await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(text) = line? else { break };
                    if text.trim() == "/quit" {
                        break;
                    }
                    self.turn(TurnEvent::Message { text }).await;
                    self.flush_outbox().await?;
                }
                _ = ticker.tick() => self.flush_outbox().await?,
            }
        }

        debug!(conversation = %self.reference, "chat session closed");
        Ok(())
    }

    async fn turn(&self, event: TurnEvent) {
        let mut turn = TurnContext::new(self.reference.clone(), event);
        self.bot.on_turn(&mut turn).await;
        self.console.replies(turn.outgoing());
    }

    async fn flush_outbox(&self) -> Result<()> {
        let pending = self.outbox.take_pending(&self.reference).await?;
        if !pending.is_empty() {
            self.console.proactive(&pending);
        }
        Ok(())
    }
}
