//! herald: a durable job registry for a chat front-end that re-enters the
//! originating conversation when a job completes.

pub mod bot;
pub mod cli;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod dialog;
pub mod error;
pub mod jobs;
pub mod notifier;
pub mod session;
pub mod storage;
pub mod ui;

#[cfg(test)]
mod test_support;
