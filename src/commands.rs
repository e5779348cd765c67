//! Classification of inbound chat text into bot commands.

use crate::jobs::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start a new job.
    Run,
    /// List all jobs.
    Show,
    /// Complete the given job and notify its conversation.
    Done(JobId),
    /// `done` without a usable id.
    DoneMissingId,
    /// Anything else; handed to the active dialog.
    Unrecognized,
}

pub const USAGE_HINT: &str = "Enter the job ID after \"done\", for example: done 1234";

impl Command {
    /// Trims and lowercases `text`, then matches it against the command set.
    /// Every input maps to exactly one command.
    pub fn classify(text: &str) -> Self {
        let utterance = text.trim().to_lowercase();
        match utterance.as_str() {
            "run" => return Command::Run,
            "show" => return Command::Show,
            _ => {}
        }

        let mut words = utterance.split_whitespace();
        if words.next() != Some("done") {
            return Command::Unrecognized;
        }
        match words.next().map(str::parse::<JobId>) {
            Some(Ok(id)) => Command::Done(id),
            _ => Command::DoneMissingId,
        }
    }
}
