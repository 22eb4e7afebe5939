//! Worker pool dispatcher
//!
//! One shared FIFO queue is seeded with every chunk of the pass, then one
//! task per worker assignment pulls from it until it is drained. Completion
//! order is whatever the workers race to; ordering is restored at merge time.

use log::Level;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendFactory, Engine, SynthesisBackend};
use crate::error::SynthesisError;
use crate::progress::ProgressReporter;
use crate::results::ResultStore;
use crate::retry::{BreakerSettings, CircuitBreaker, RetryPolicy};
use crate::segment::{TextChunk, is_speakable, strip_trailing_punctuation};
use crate::workers::WorkerAssignment;

/// Per-pass dispatch settings
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub voice: String,
    pub engine: Engine,
    pub retry: RetryPolicy,
    pub breaker: BreakerSettings,
    /// How long a worker waits on the queue before giving up
    pub poll_timeout: Duration,
    /// Strip terminal punctuation before sending a chunk
    pub strip_trailing_punctuation: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            voice: String::new(),
            engine: Engine::Standard,
            retry: RetryPolicy::default(),
            breaker: BreakerSettings::default(),
            poll_timeout: Duration::from_secs(1),
            strip_trailing_punctuation: false,
        }
    }
}

/// A chunk that did not produce audio in this pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedChunk {
    pub chunk_index: usize,
    pub attempts: u32,
    pub reason: String,
}

/// What happened during one pass
#[derive(Debug, Default)]
pub struct PassReport {
    /// Indices that succeeded in this pass, ascending
    pub succeeded: Vec<usize>,
    /// Chunks that exhausted their attempts or failed validation, ascending
    pub failed: Vec<FailedChunk>,
    /// Backend calls made per chunk index
    pub attempts: BTreeMap<usize, u32>,
    pub cancelled: bool,
}

impl PassReport {
    fn absorb(&mut self, worker: PassReport) {
        self.succeeded.extend(worker.succeeded);
        self.failed.extend(worker.failed);
        self.attempts.extend(worker.attempts);
    }
}

/// Shared FIFO of chunks. Fully seeded before workers start and then closed,
/// so a drained queue is observed as the end of the channel.
struct ChunkQueue {
    rx: Mutex<mpsc::UnboundedReceiver<TextChunk>>,
}

impl ChunkQueue {
    fn seeded(chunks: Vec<TextChunk>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for chunk in chunks {
            // Receiver is alive for the lifetime of the queue
            let _ = tx.send(chunk);
        }
        Self { rx: Mutex::new(rx) }
    }

    async fn pull(&self) -> Option<TextChunk> {
        self.rx.lock().await.recv().await
    }
}

struct PassContext {
    factory: Arc<dyn BackendFactory>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
    results: Arc<ResultStore>,
    queue: ChunkQueue,
    settings: DispatchSettings,
    work_dir: PathBuf,
}

impl PassContext {
    fn log(&self, level: Level, message: String) {
        self.reporter.log(level, &message);
    }

    fn connect(&self, assignment: &WorkerAssignment) -> Result<Box<dyn SynthesisBackend>, SynthesisError> {
        self.factory.connect(assignment, self.settings.engine)
    }

    fn chunk_path(&self, index: usize) -> PathBuf {
        chunk_file_path(&self.work_dir, index, self.factory.audio_extension())
    }

    /// Write audio for a chunk and record it. Returns false if the chunk
    /// already had a result.
    async fn store(&self, index: usize, audio: Vec<u8>) -> std::io::Result<bool> {
        if self.results.contains(index) {
            return Ok(false);
        }
        // Resume trusts any chunk file it finds, so only complete audio may
        // land under the final name
        let path = self.chunk_path(index);
        let partial = partial_file_path(&path);
        tokio::fs::write(&partial, audio).await?;
        tokio::fs::rename(&partial, &path).await?;
        Ok(self.results.record_success(index, path))
    }
}

/// Location of the audio file for chunk `index`
pub fn chunk_file_path(work_dir: &std::path::Path, index: usize, extension: &str) -> PathBuf {
    work_dir.join(format!("chunk_{:05}.{}", index, extension))
}

/// Where audio for `path` is staged until the write completes
pub fn partial_file_path(path: &std::path::Path) -> PathBuf {
    let mut staged = path.as_os_str().to_os_string();
    staged.push(".part");
    PathBuf::from(staged)
}

/// True if `name` is a chunk file, finished or staged, for `extension`
pub fn is_chunk_file_name(name: &str, extension: &str) -> bool {
    name.starts_with("chunk_")
        && (name.ends_with(&format!(".{}", extension))
            || name.ends_with(&format!(".{}.part", extension)))
}

/// Runs passes over a shared result store
pub struct Dispatcher {
    factory: Arc<dyn BackendFactory>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
    work_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            factory,
            reporter,
            cancel,
            work_dir,
        }
    }

    pub fn reporter(&self) -> &Arc<dyn ProgressReporter> {
        &self.reporter
    }

    /// Run one pass: every chunk is queued once, one task per assignment
    /// consumes the queue, and the call returns after every task has exited.
    pub async fn run(
        &self,
        chunks: Vec<TextChunk>,
        assignments: &[WorkerAssignment],
        settings: &DispatchSettings,
        results: &Arc<ResultStore>,
    ) -> PassReport {
        let mut report = PassReport::default();

        if chunks.is_empty() {
            return report;
        }
        if assignments.is_empty() {
            self.reporter
                .log(Level::Error, "No workers available, nothing was dispatched");
            return report;
        }

        self.reporter.log(
            Level::Info,
            &format!(
                "Dispatching {} chunk(s) across {} worker(s)",
                chunks.len(),
                assignments.len()
            ),
        );

        let ctx = Arc::new(PassContext {
            factory: Arc::clone(&self.factory),
            reporter: Arc::clone(&self.reporter),
            cancel: self.cancel.clone(),
            results: Arc::clone(results),
            queue: ChunkQueue::seeded(chunks),
            settings: settings.clone(),
            work_dir: self.work_dir.clone(),
        });

        let mut workers = JoinSet::new();
        for assignment in assignments {
            workers.spawn(run_worker(Arc::clone(&ctx), assignment.clone()));
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker_report) => report.absorb(worker_report),
                Err(e) => self
                    .reporter
                    .log(Level::Error, &format!("Worker task aborted: {}", e)),
            }
        }

        report.succeeded.sort_unstable();
        report.failed.sort_by_key(|f| f.chunk_index);
        report.cancelled = self.cancel.is_cancelled();
        report
    }
}

async fn run_worker(ctx: Arc<PassContext>, assignment: WorkerAssignment) -> PassReport {
    let mut report = PassReport::default();
    let worker_id = assignment.worker_id;

    let mut backend = match ctx.connect(&assignment) {
        Ok(backend) => backend,
        Err(e) => {
            ctx.log(
                Level::Error,
                format!(
                    "Worker {} could not connect with credential '{}': {}",
                    worker_id, assignment.credential.label, e
                ),
            );
            return report;
        }
    };
    let mut breaker = CircuitBreaker::new(ctx.settings.breaker);

    loop {
        let chunk = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            pulled = tokio::time::timeout(ctx.settings.poll_timeout, ctx.queue.pull()) => match pulled {
                Ok(Some(chunk)) => chunk,
                // Drained, or nothing arrived within the poll timeout
                Ok(None) | Err(_) => break,
            },
        };

        if ctx.results.contains(chunk.index) {
            continue;
        }

        let (attempts, outcome) =
            synthesize_with_retry(&ctx, &assignment, &mut backend, &mut breaker, &chunk).await;
        if attempts > 0 {
            report.attempts.insert(chunk.index, attempts);
        }

        let failure = match outcome {
            Ok(audio) => match ctx.store(chunk.index, audio).await {
                Ok(true) => {
                    report.succeeded.push(chunk.index);
                    ctx.log(
                        Level::Debug,
                        format!(
                            "Chunk {}/{} done by worker {} ({} attempt(s))",
                            chunk.index,
                            ctx.results.total(),
                            worker_id,
                            attempts
                        ),
                    );
                    ctx.reporter.progress(ctx.results.fraction());
                    None
                }
                Ok(false) => None,
                Err(e) => Some(format!("could not write audio: {}", e)),
            },
            Err(Failure::Cancelled) => None,
            Err(Failure::Synthesis(e)) => Some(e.to_string()),
        };

        if let Some(reason) = failure {
            ctx.log(
                Level::Warn,
                format!("Chunk {} failed after {} attempt(s): {}", chunk.index, attempts, reason),
            );
            report.failed.push(FailedChunk {
                chunk_index: chunk.index,
                attempts,
                reason,
            });
        }
    }

    report
}

enum Failure {
    Synthesis(SynthesisError),
    Cancelled,
}

/// Sleep for `duration` unless cancelled first. Returns false on cancellation.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Attempt a chunk until it succeeds, fails validation, runs out of attempts
/// or the pass is cancelled. Returns the number of backend calls made.
async fn synthesize_with_retry(
    ctx: &PassContext,
    assignment: &WorkerAssignment,
    backend: &mut Box<dyn SynthesisBackend>,
    breaker: &mut CircuitBreaker,
    chunk: &TextChunk,
) -> (u32, Result<Vec<u8>, Failure>) {
    let text = if ctx.settings.strip_trailing_punctuation {
        strip_trailing_punctuation(&chunk.text)
    } else {
        chunk.text.trim()
    };
    if !is_speakable(text) {
        return (
            0,
            Err(Failure::Synthesis(SynthesisError::Validation(format!(
                "chunk {} has nothing to speak",
                chunk.index
            )))),
        );
    }

    let policy = ctx.settings.retry;
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        if ctx.cancel.is_cancelled() {
            return (attempt - 1, Err(Failure::Cancelled));
        }

        let result = match backend.synthesize(text, &ctx.settings.voice).await {
            Ok(audio) if audio.is_empty() => Err(SynthesisError::EmptyAudio),
            other => other,
        };

        let err = match result {
            Ok(audio) => {
                breaker.record_success();
                return (attempt, Ok(audio));
            }
            Err(err) if !err.is_retryable() => {
                return (attempt, Err(Failure::Synthesis(err)));
            }
            Err(err) => err,
        };

        let class = err.class();
        ctx.log(
            Level::Warn,
            format!(
                "Chunk {} attempt {}/{} on worker {} failed: {}",
                chunk.index, attempt, policy.max_attempts, assignment.worker_id, err
            ),
        );

        if breaker.record_failure() {
            ctx.log(
                Level::Warn,
                format!(
                    "Worker {} hit {} consecutive failures, pausing {:?} and reconnecting",
                    assignment.worker_id, ctx.settings.breaker.threshold, breaker.cooldown()
                ),
            );
            if !pause(&ctx.cancel, breaker.cooldown()).await {
                return (attempt, Err(Failure::Cancelled));
            }
            match ctx.connect(assignment) {
                Ok(fresh) => *backend = fresh,
                Err(e) => ctx.log(
                    Level::Error,
                    format!(
                        "Worker {} reconnect failed, keeping previous session: {}",
                        assignment.worker_id, e
                    ),
                ),
            }
        }

        last_error = Some(err);

        if attempt < policy.max_attempts && !pause(&ctx.cancel, policy.delay(attempt, class)).await {
            return (attempt, Err(Failure::Cancelled));
        }
    }

    let err = last_error.unwrap_or_else(|| SynthesisError::Backend {
        message: "no attempts allowed".to_string(),
        status_code: None,
    });
    (policy.max_attempts, Err(Failure::Synthesis(err)))
}
