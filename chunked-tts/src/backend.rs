//! Synthesis backend capability
//!
//! The pipeline never talks to a wire protocol directly. A `BackendFactory`
//! connects one `SynthesisBackend` per worker, bound to that worker's
//! credential and to an engine variant chosen once at construction time.

use async_trait::async_trait;

use crate::error::SynthesisError;
use crate::workers::WorkerAssignment;

/// Engine variant a worker's backend is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    /// Normal throughput-oriented settings
    #[default]
    Standard,
    /// Slower, more reliable settings used by the recovery pass
    Conservative,
}

/// A connected synthesis session for one worker
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Synthesize `text` with `voice`, returning encoded audio bytes
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SynthesisError>;

    /// Backend name
    fn name(&self) -> &str;
}

/// Creates backend sessions for workers
pub trait BackendFactory: Send + Sync {
    /// Connect a new session for `assignment`. Called when a worker starts and
    /// again whenever its circuit breaker forces a reconnect.
    fn connect(
        &self,
        assignment: &WorkerAssignment,
        engine: Engine,
    ) -> Result<Box<dyn SynthesisBackend>, SynthesisError>;

    /// File extension of the audio the backends produce (without the dot)
    fn audio_extension(&self) -> &str;
}
