//! Interface de terminal do herald: spinner e saída colorida.
//!
//! Usa `indicatif` para o spinner enquanto uma notificação é entregue e
//! `console` para estilizar as mensagens do bot conforme sua origem.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

/// Saída colorida de uma sessão de chat.
pub struct ChatConsole {
    // Respostas à mensagem que o usuário acabou de enviar.
    reply: Style,
    // Mensagens proativas vindas da caixa de saída.
    proactive: Style,
    dim: Style,
}

impl Default for ChatConsole {
    fn default() -> Self {
        Self {
            reply: Style::new().cyan(),
            proactive: Style::new().yellow().bold(),
            dim: Style::new().dim(),
        }
    }
}

impl ChatConsole {
    pub fn banner(&self, conversation: &str, user: &str) {
        println!(
            "{}",
            self.dim.apply_to(format!(
                "conversation {conversation} as {user} (type /quit to leave)"
            ))
        );
    }

    pub fn replies(&self, messages: &[String]) {
        for text in messages {
            println!("{} {text}", self.reply.apply_to("herald ›"));
        }
    }

    /// Mensagens que chegaram sem o usuário ter escrito nada.
    pub fn proactive(&self, messages: &[String]) {
        for text in messages {
            println!("{} {text}", self.proactive.apply_to("herald ⟳"));
        }
    }
}

/// Spinner exibido enquanto `complete` aguarda a retomada da conversa.
pub struct NotifyProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl NotifyProgress {
    pub fn start(job_id: u64) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Completing job {job_id}…"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    /// Finaliza o spinner e mostra as respostas do turno.
    /// `ok` decide entre o checkmark verde e o X vermelho.
    pub fn finish(&self, ok: bool, messages: &[String]) {
        self.pb.finish_and_clear();
        let mark = if ok {
            self.green.apply_to("✓")
        } else {
            self.red.apply_to("✗")
        };
        for text in messages {
            println!("  {mark} {text}");
        }
    }
}
