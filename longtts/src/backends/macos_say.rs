// macOS say command backend

use anyhow::{Context, Result};
use async_trait::async_trait;
use chunked_tts::{BackendFactory, Engine, SynthesisBackend, SynthesisError, WorkerAssignment};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Speaking rate used by the conservative engine, in words per minute
const CONSERVATIVE_RATE: u32 = 160;

/// Creates one `say` session per worker. `say` needs no secret, so the
/// credential only labels the worker.
#[derive(Debug, Default)]
pub struct SayFactory;

impl SayFactory {
    pub fn new() -> Self {
        Self
    }
}

impl BackendFactory for SayFactory {
    fn connect(
        &self,
        _assignment: &WorkerAssignment,
        engine: Engine,
    ) -> Result<Box<dyn SynthesisBackend>, SynthesisError> {
        let rate = match engine {
            Engine::Standard => None,
            Engine::Conservative => Some(CONSERVATIVE_RATE),
        };
        Ok(Box::new(SayBackend { rate }))
    }

    fn audio_extension(&self) -> &str {
        "aiff"
    }
}

pub struct SayBackend {
    rate: Option<u32>,
}

fn io_error(context: &str, e: std::io::Error) -> SynthesisError {
    SynthesisError::from_message(format!("{}: {}", context, e))
}

#[async_trait]
impl SynthesisBackend for SayBackend {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SynthesisError> {
        let output = tempfile::Builder::new()
            .prefix("longtts-say-")
            .suffix(".aiff")
            .tempfile()
            .map_err(|e| io_error("Failed to create temp file", e))?;

        let mut cmd = Command::new("say");
        if !voice.is_empty() {
            cmd.arg("-v").arg(voice);
        }
        if let Some(rate) = self.rate {
            cmd.arg("-r").arg(rate.to_string());
        }
        cmd.arg("-o").arg(output.path());
        // Text goes through stdin to avoid shell escaping issues
        cmd.stdin(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| SynthesisError::Validation(format!("Failed to spawn say: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| io_error("Failed to write to say stdin", e))?;
        }

        let result = child
            .wait_with_output()
            .await
            .map_err(|e| io_error("Failed to wait for say", e))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SynthesisError::from_message(format!(
                "say failed with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        tokio::fs::read(output.path())
            .await
            .map_err(|e| io_error("Failed to read say output", e))
    }

    fn name(&self) -> &str {
        "macos-say"
    }
}

/// Parse `say -v ?` output into voice names.
///
/// Lines look like `Alex    en_US    # Most people recognize me by my voice.`;
/// names may contain spaces, so the name ends where the locale column starts.
fn parse_voice_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let before_comment = line.split('#').next()?.trim_end();
            let (name, _locale) = before_comment.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

pub fn list_voices() -> Result<Vec<String>> {
    let output = std::process::Command::new("say")
        .arg("-v")
        .arg("?")
        .output()
        .context("Failed to run say -v ?")?;

    if !output.status.success() {
        anyhow::bail!("say -v ? failed");
    }

    Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
}
