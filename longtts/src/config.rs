// longtts configuration management

use anyhow::{Context, Result, bail};
use chunked_tts::{BreakerSettings, Credential, RetryPolicy, SegmentMode, SegmentOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::backends::BackendKind;

const DEFAULT_MAX_CHARS: usize = 300;
const DEFAULT_OUTPUT_FORMAT: &str = "m4a";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongttsConfig {
    /// Synthesis backend
    #[serde(default)]
    pub backend: BackendKind,

    /// Voice name (None uses the backend default)
    #[serde(default)]
    pub voice: Option<String>,

    #[serde(default)]
    pub mode: SegmentMode,

    /// Target characters per chunk
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Workers sharing each credential (unset: one worker per credential)
    #[serde(default)]
    pub workers_per_credential: Option<usize>,

    #[serde(default)]
    pub strip_trailing_punctuation: bool,

    /// Extension of the merged output file
    #[serde(default = "default_output_format")]
    pub output_format: String,

    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,
}

/// A named credential whose secret is read from an environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub name: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl CredentialConfig {
    pub fn resolve(&self) -> Result<Credential> {
        let secret = match &self.api_key_env {
            Some(var) => Some(std::env::var(var).with_context(|| {
                format!(
                    "Credential '{}' needs environment variable {}",
                    self.name, var
                )
            })?),
            None => None,
        };
        Ok(Credential::new(self.name.clone(), secret))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,
    #[serde(default = "default_jitter")]
    pub jitter_fraction: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay() -> f64 {
    2.0
}

fn default_max_delay() -> f64 {
    30.0
}

fn default_jitter() -> f64 {
    0.5
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            jitter_fraction: default_jitter(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: f64,
}

fn default_threshold() -> u32 {
    3
}

fn default_cooldown() -> f64 {
    30.0
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            cooldown_secs: default_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeToolKind {
    #[default]
    Ffmpeg,
    Concat,
}

impl FromStr for MergeToolKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ffmpeg" => Ok(MergeToolKind::Ffmpeg),
            "concat" => Ok(MergeToolKind::Concat),
            _ => bail!("Unknown merge tool: {}. Available: ffmpeg, concat", s),
        }
    }
}

impl fmt::Display for MergeToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeToolKind::Ffmpeg => f.write_str("ffmpeg"),
            MergeToolKind::Concat => f.write_str("concat"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub tool: MergeToolKind,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            tool: MergeToolKind::default(),
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used by the recovery pass (None reuses `model`)
    #[serde(default)]
    pub conservative_model: Option<String>,
    /// Audio format requested from the endpoint
    #[serde(default = "default_response_format")]
    pub response_format: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini-tts".to_string()
}

fn default_response_format() -> String {
    "mp3".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            conservative_model: None,
            response_format: default_response_format(),
        }
    }
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

fn default_output_format() -> String {
    DEFAULT_OUTPUT_FORMAT.to_string()
}

impl Default for LongttsConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            voice: None,
            mode: SegmentMode::default(),
            max_chars: default_max_chars(),
            workers_per_credential: None,
            strip_trailing_punctuation: false,
            output_format: default_output_format(),
            credentials: Vec::new(),
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
            merge: MergeConfig::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

/// Keys accepted by `config set`
pub const SETTABLE_KEYS: &[&str] = &[
    "backend",
    "voice",
    "mode",
    "max_chars",
    "workers_per_credential",
    "strip_trailing_punctuation",
    "output_format",
    "retry.base_delay_secs",
    "retry.max_delay_secs",
    "retry.jitter_fraction",
    "retry.max_attempts",
    "breaker.threshold",
    "breaker.cooldown_secs",
    "merge.tool",
    "merge.ffmpeg_path",
    "openai.base_url",
    "openai.model",
    "openai.conservative_model",
    "openai.response_format",
];

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value '{}' for {}: {}", value, key, e))
}

/// "none" or an empty string clears an optional value
fn optional(value: &str) -> Option<String> {
    match value {
        "" | "none" => None,
        v => Some(v.to_string()),
    }
}

/// Longest retry delay or breaker cooldown accepted, in seconds
const MAX_DELAY_SECS: f64 = 3600.0;

impl LongttsConfig {
    /// Get the config file path: ~/.config/cli-programs/longtts.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("cli-programs")
            .join("longtts.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: LongttsConfig =
            toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_chars == 0 {
            bail!("max_chars must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_fraction) {
            bail!("retry.jitter_fraction must be between 0 and 1");
        }
        for (key, secs) in [
            ("retry.base_delay_secs", self.retry.base_delay_secs),
            ("retry.max_delay_secs", self.retry.max_delay_secs),
            ("breaker.cooldown_secs", self.breaker.cooldown_secs),
        ] {
            if !(0.0..=MAX_DELAY_SECS).contains(&secs) {
                bail!("{} must be between 0 and {} seconds", key, MAX_DELAY_SECS);
            }
        }
        if self.output_format.trim().is_empty() {
            bail!("output_format must not be empty");
        }
        Ok(())
    }

    /// Update one key from its string form. Nothing changes unless the
    /// result validates.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        match key {
            "backend" => updated.backend = parse(key, value)?,
            "voice" => updated.voice = optional(value),
            "mode" => updated.mode = parse(key, value)?,
            "max_chars" => updated.max_chars = parse(key, value)?,
            "workers_per_credential" => {
                updated.workers_per_credential = match optional(value) {
                    Some(v) => Some(parse(key, &v)?),
                    None => None,
                }
            }
            "strip_trailing_punctuation" => updated.strip_trailing_punctuation = parse(key, value)?,
            "output_format" => updated.output_format = value.trim_start_matches('.').to_string(),
            "retry.base_delay_secs" => updated.retry.base_delay_secs = parse(key, value)?,
            "retry.max_delay_secs" => updated.retry.max_delay_secs = parse(key, value)?,
            "retry.jitter_fraction" => updated.retry.jitter_fraction = parse(key, value)?,
            "retry.max_attempts" => updated.retry.max_attempts = parse(key, value)?,
            "breaker.threshold" => updated.breaker.threshold = parse(key, value)?,
            "breaker.cooldown_secs" => updated.breaker.cooldown_secs = parse(key, value)?,
            "merge.tool" => updated.merge.tool = parse(key, value)?,
            "merge.ffmpeg_path" => updated.merge.ffmpeg_path = value.to_string(),
            "openai.base_url" => updated.openai.base_url = value.to_string(),
            "openai.model" => updated.openai.model = value.to_string(),
            "openai.conservative_model" => updated.openai.conservative_model = optional(value),
            "openai.response_format" => updated.openai.response_format = value.to_string(),
            _ => bail!(
                "Unknown config key: {}. Available: {}",
                key,
                SETTABLE_KEYS.join(", ")
            ),
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    pub fn segment_options(&self) -> SegmentOptions {
        SegmentOptions {
            mode: self.mode,
            max_chars: self.max_chars,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs_f64(self.retry.base_delay_secs),
            max_delay: Duration::from_secs_f64(self.retry.max_delay_secs),
            jitter_fraction: self.retry.jitter_fraction,
            max_attempts: self.retry.max_attempts,
        }
    }

    pub fn breaker_settings(&self) -> BreakerSettings {
        BreakerSettings {
            threshold: self.breaker.threshold,
            cooldown: Duration::from_secs_f64(self.breaker.cooldown_secs),
        }
    }

    /// Resolve every configured credential
    pub fn resolve_credentials(&self) -> Result<Vec<Credential>> {
        self.credentials.iter().map(CredentialConfig::resolve).collect()
    }
}
