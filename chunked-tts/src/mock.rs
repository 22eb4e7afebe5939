//! Scripted in-memory backend for tests and dry runs
//!
//! Audio produced by a successful call is the chunk text wrapped in brackets,
//! so a merged output can be checked for ordering byte-for-byte.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendFactory, Engine, SynthesisBackend};
use crate::error::SynthesisError;
use crate::workers::WorkerAssignment;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub worker_id: usize,
    pub credential: String,
    pub engine: Engine,
    pub text: String,
    /// 1-based count of calls made so far for this text, across all workers
    pub attempt: u32,
}

type Script = dyn Fn(&MockCall) -> Result<Vec<u8>, SynthesisError> + Send + Sync;

#[derive(Default)]
struct Log {
    calls: Vec<MockCall>,
    connects: usize,
}

/// Factory whose backends answer according to a script
#[derive(Clone)]
pub struct MockFactory {
    script: Arc<Script>,
    log: Arc<Mutex<Log>>,
    latency: Duration,
}

impl MockFactory {
    /// Audio a successful call returns for `text`
    pub fn audio_for(text: &str) -> Vec<u8> {
        format!("[{}]", text).into_bytes()
    }

    pub fn with_script(
        script: impl Fn(&MockCall) -> Result<Vec<u8>, SynthesisError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Arc::new(script),
            log: Arc::new(Mutex::new(Log::default())),
            latency: Duration::ZERO,
        }
    }

    pub fn always_succeeds() -> Self {
        Self::with_script(|call| Ok(Self::audio_for(&call.text)))
    }

    pub fn always_fails(error: fn() -> SynthesisError) -> Self {
        Self::with_script(move |_| Err(error()))
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.log.lock().calls.clone()
    }

    /// Number of backend calls made for `text`
    pub fn attempts_for(&self, text: &str) -> usize {
        self.log.lock().calls.iter().filter(|c| c.text == text).count()
    }

    pub fn connect_count(&self) -> usize {
        self.log.lock().connects
    }
}

impl BackendFactory for MockFactory {
    fn connect(
        &self,
        assignment: &WorkerAssignment,
        engine: Engine,
    ) -> Result<Box<dyn SynthesisBackend>, SynthesisError> {
        self.log.lock().connects += 1;
        Ok(Box::new(MockBackend {
            factory: self.clone(),
            worker_id: assignment.worker_id,
            credential: assignment.credential.label.clone(),
            engine,
        }))
    }

    fn audio_extension(&self) -> &str {
        "mp3"
    }
}

struct MockBackend {
    factory: MockFactory,
    worker_id: usize,
    credential: String,
    engine: Engine,
}

#[async_trait]
impl SynthesisBackend for MockBackend {
    async fn synthesize(&self, text: &str, _voice: &str) -> Result<Vec<u8>, SynthesisError> {
        let call = {
            let mut log = self.factory.log.lock();
            let attempt = log.calls.iter().filter(|c| c.text == text).count() as u32 + 1;
            let call = MockCall {
                worker_id: self.worker_id,
                credential: self.credential.clone(),
                engine: self.engine,
                text: text.to_string(),
                attempt,
            };
            log.calls.push(call.clone());
            call
        };

        if !self.factory.latency.is_zero() {
            tokio::time::sleep(self.factory.latency).await;
        }

        (self.factory.script)(&call)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
