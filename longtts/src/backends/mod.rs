// Synthesis backend adapters

pub mod macos_say;
pub mod openai_speech;

use anyhow::{Result, bail};
use chunked_tts::{BackendFactory, Credential};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::LongttsConfig;

/// Environment variable used when the openai backend has no configured credentials
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    #[default]
    #[serde(rename = "macos-say")]
    MacosSay,
    #[serde(rename = "openai")]
    OpenAi,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::MacosSay => "macos-say",
            BackendKind::OpenAi => "openai",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "macos-say" | "say" => Ok(BackendKind::MacosSay),
            "openai" => Ok(BackendKind::OpenAi),
            _ => bail!("Unknown TTS backend: {}. Available: macos-say, openai", s),
        }
    }
}

/// Build the factory for `kind` from configuration
pub fn create_factory(kind: BackendKind, config: &LongttsConfig) -> Result<Arc<dyn BackendFactory>> {
    match kind {
        BackendKind::MacosSay => Ok(Arc::new(macos_say::SayFactory::new())),
        BackendKind::OpenAi => Ok(Arc::new(openai_speech::SpeechFactory::new(&config.openai)?)),
    }
}

/// Credentials for a run: the configured ones, or a backend-specific fallback
pub fn credentials_for(kind: BackendKind, config: &LongttsConfig) -> Result<Vec<Credential>> {
    let configured = config.resolve_credentials()?;
    if !configured.is_empty() {
        return Ok(configured);
    }

    match kind {
        BackendKind::MacosSay => Ok(vec![Credential::anonymous()]),
        BackendKind::OpenAi => match std::env::var(OPENAI_KEY_ENV) {
            Ok(key) => Ok(vec![Credential::new(OPENAI_KEY_ENV, Some(key))]),
            Err(_) => bail!(
                "No credentials configured. Add [[credentials]] to the config file or set {}",
                OPENAI_KEY_ENV
            ),
        },
    }
}

/// Voices a backend offers
pub fn list_voices(kind: BackendKind) -> Result<Vec<String>> {
    match kind {
        BackendKind::MacosSay => macos_say::list_voices(),
        BackendKind::OpenAi => Ok(openai_speech::VOICES.iter().map(|v| v.to_string()).collect()),
    }
}
