//! Interface de linha de comando do herald baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (chat, complete, jobs)
//! e flags globais (--store, --resume-timeout-ms, --verbose).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// herald: registro de jobs com notificação proativa de conversas.
#[derive(Debug, Parser)]
#[command(name = "herald", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Diretório de armazenamento (sobrepõe `herald.toml` e `HERALD_STORE`).
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Tempo máximo de espera pela retomada proativa, em milissegundos.
    #[arg(long, global = true)]
    pub resume_timeout_ms: Option<u64>,

    /// Habilita logs detalhados (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Abre uma sessão de chat interativa numa conversa.
    Chat {
        /// Identificador da conversa.
        #[arg(long, default_value = "local")]
        conversation: String,

        /// Identificador do usuário nesta conversa.
        #[arg(long, default_value = "user")]
        user: String,
    },

    /// Marca um job como concluído e notifica a conversa que o iniciou.
    Complete {
        /// ID do job.
        job_id: u64,
    },

    /// Lista todos os jobs registrados.
    Jobs,
}
