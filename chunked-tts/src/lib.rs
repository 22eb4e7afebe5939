//! Chunked parallel text-to-speech
//!
//! Splits long text into bounded chunks, synthesizes them concurrently across
//! a pool of credential-bound workers with per-chunk retry and a circuit
//! breaker, re-dispatches whatever is still missing in a smaller recovery
//! pass, and concatenates the chunk audio in index order.
//!
//! The wire protocol is left to the caller: implement [`BackendFactory`] and
//! [`SynthesisBackend`], pick a [`MergeTool`], and hand both to a [`Job`].

pub mod backend;
pub mod chunk_map;
pub mod dispatch;
pub mod error;
pub mod merge;
pub mod mock;
pub mod pipeline;
pub mod progress;
pub mod recovery;
pub mod results;
pub mod retry;
pub mod segment;
pub mod workers;

pub use backend::{BackendFactory, Engine, SynthesisBackend};
pub use chunk_map::{CHUNK_MAP_FILE, ChunkEntry, ChunkMap};
pub use dispatch::{DispatchSettings, Dispatcher, FailedChunk, PassReport};
pub use error::{ErrorClass, MergeError, PipelineError, SynthesisError};
pub use merge::{ByteConcat, FfmpegConcat, MergeTool};
pub use pipeline::{Job, JobReport, PipelineOptions};
pub use progress::{LogReporter, ProgressReporter};
pub use recovery::RecoveryReport;
pub use results::{ResultStore, SynthesisResult};
pub use retry::{BreakerSettings, CircuitBreaker, RetryPolicy};
pub use segment::{SegmentMode, SegmentOptions, TextChunk, segment};
pub use workers::{Credential, WorkerAssignment, assign_workers};
