//! OpenAI-compatible speech endpoint
//!
//! `POST {base_url}/audio/speech` with a JSON body, answered with raw audio
//! bytes. Works against OpenAI and the local servers that mimic it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chunked_tts::{BackendFactory, Engine, SynthesisBackend, SynthesisError, WorkerAssignment};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::OpenAiConfig;

/// Voices the hosted endpoint accepts
pub const VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer",
];

const DEFAULT_VOICE: &str = "alloy";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

pub struct SpeechFactory {
    client: Client,
    config: OpenAiConfig,
}

impl SpeechFactory {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn model_for(&self, engine: Engine) -> &str {
        match (engine, &self.config.conservative_model) {
            (Engine::Conservative, Some(model)) => model,
            _ => &self.config.model,
        }
    }
}

impl BackendFactory for SpeechFactory {
    fn connect(
        &self,
        assignment: &WorkerAssignment,
        engine: Engine,
    ) -> Result<Box<dyn SynthesisBackend>, SynthesisError> {
        Ok(Box::new(SpeechBackend {
            // Client clones share one connection pool
            client: self.client.clone(),
            url: format!("{}/audio/speech", self.config.base_url.trim_end_matches('/')),
            api_key: assignment.credential.secret.clone(),
            model: self.model_for(engine).to_string(),
            response_format: self.config.response_format.clone(),
        }))
    }

    fn audio_extension(&self) -> &str {
        &self.config.response_format
    }
}

pub struct SpeechBackend {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    response_format: String,
}

fn request_error(e: reqwest::Error) -> SynthesisError {
    if e.is_timeout() || e.is_connect() {
        SynthesisError::Transient {
            message: format!("Request failed: {}", e),
            status_code: None,
        }
    } else {
        SynthesisError::from_message(format!("Request failed: {}", e))
    }
}

/// Pull the message out of an error body, falling back to the raw text
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl SynthesisBackend for SpeechBackend {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SynthesisError> {
        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice: if voice.is_empty() { DEFAULT_VOICE } else { voice },
            response_format: &self.response_format,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SynthesisError::from_status(
                status.as_u16(),
                error_message(&error_text),
            ));
        }

        let audio = response.bytes().await.map_err(request_error)?;
        Ok(audio.to_vec())
    }

    fn name(&self) -> &str {
        "openai"
    }
}
