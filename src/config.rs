//! Configuração do herald carregada a partir de `herald.toml`.
//!
//! A struct [`HeraldConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `HERALD_STORE` tem precedência sobre o arquivo.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{HeraldError, Result};

/// Configuração de nível superior carregada de `herald.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct HeraldConfig {
    /// Diretório onde jobs, perfis e estado de diálogo são persistidos.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Identificador da conta do bot nas conversas.
    #[serde(default = "default_bot_id")]
    pub bot_id: String,

    /// Canal usado pelas sessões de chat da CLI.
    #[serde(default = "default_channel_id")]
    pub channel_id: String,

    /// Tempo máximo de espera por uma retomada proativa, em milissegundos.
    #[serde(default = "default_resume_timeout_ms")]
    pub resume_timeout_ms: u64,

    /// Intervalo de leitura da caixa de saída durante o chat.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Tentativas de gravação do registro de jobs antes de desistir em caso de conflito.
    #[serde(default = "default_max_persist_attempts")]
    pub max_persist_attempts: u32,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".herald")
}

fn default_bot_id() -> String {
    "herald".to_string()
}

fn default_channel_id() -> String {
    "cli".to_string()
}

// 30 segundos: suficiente para uma entrega local, curto o bastante para não travar o `done`.
fn default_resume_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_persist_attempts() -> u32 {
    5
}

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            bot_id: default_bot_id(),
            channel_id: default_channel_id(),
            resume_timeout_ms: default_resume_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_persist_attempts: default_max_persist_attempts(),
        }
    }
}

impl HeraldConfig {
    /// Carrega a configuração de `herald.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("herald.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<HeraldConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(store) = std::env::var("HERALD_STORE")
            && !store.is_empty()
        {
            config.store_path = PathBuf::from(store);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.resume_timeout_ms == 0 {
            return Err(HeraldError::Config("resume_timeout_ms must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(HeraldError::Config("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }
}
