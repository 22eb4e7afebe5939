//! Job orchestration
//!
//! text -> segments -> chunk map -> main pass -> recovery pass -> merge.
//! A job either produces the merged artifact or fails with the work
//! directory left intact for a later resume.

use log::Level;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::backend::BackendFactory;
use crate::chunk_map::ChunkMap;
use crate::dispatch::{
    DispatchSettings, Dispatcher, PassReport, chunk_file_path, is_chunk_file_name,
};
use crate::error::PipelineError;
use crate::merge::MergeTool;
use crate::progress::ProgressReporter;
use crate::recovery::{RecoveryReport, recover_missing};
use crate::results::ResultStore;
use crate::segment::{SegmentOptions, TextChunk, segment};
use crate::workers::{Credential, assign_workers};

/// Everything that shapes a job apart from its collaborators
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub segment: SegmentOptions,
    pub dispatch: DispatchSettings,
    /// Workers sharing each credential; `None` means one per credential
    pub workers_per_credential: Option<usize>,
    /// Keep chunk files and the chunk map after a successful merge
    pub keep_intermediates: bool,
}

/// Summary of a successful job
#[derive(Debug)]
pub struct JobReport {
    pub total_chunks: usize,
    /// Chunks taken from an earlier run in the same work directory
    pub resumed: usize,
    pub main_pass: PassReport,
    pub recovery: Option<RecoveryReport>,
    pub output: PathBuf,
}

/// A configured synthesis job
pub struct Job {
    factory: Arc<dyn BackendFactory>,
    merge_tool: Arc<dyn MergeTool>,
    reporter: Arc<dyn ProgressReporter>,
    credentials: Vec<Credential>,
    options: PipelineOptions,
    cancel: CancellationToken,
}

impl Job {
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        merge_tool: Arc<dyn MergeTool>,
        reporter: Arc<dyn ProgressReporter>,
        credentials: Vec<Credential>,
        options: PipelineOptions,
    ) -> Self {
        let credentials = if credentials.is_empty() {
            vec![Credential::anonymous()]
        } else {
            credentials
        };

        Self {
            factory,
            merge_tool,
            reporter,
            credentials,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Chunks this job would dispatch for `text`
    pub fn plan(&self, text: &str) -> Vec<TextChunk> {
        segment(text, &self.options.segment)
    }

    /// Synthesize `text` into `output`, keeping intermediates in `work_dir`
    pub async fn run(
        &self,
        text: &str,
        work_dir: &Path,
        output: &Path,
    ) -> Result<JobReport, PipelineError> {
        let chunks = self.plan(text);
        if chunks.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        tokio::fs::create_dir_all(work_dir).await?;
        let (chunk_map, results) = self.prepare(&chunks, work_dir).await?;
        let total = chunk_map.total_chunks;
        let resumed = results.completed();

        self.log(
            Level::Info,
            format!(
                "{} chunk(s) in {} mode, max {} chars{}",
                total,
                self.options.segment.mode,
                self.options.segment.max_chars,
                if resumed > 0 {
                    format!(", {} already done", resumed)
                } else {
                    String::new()
                }
            ),
        );
        self.reporter.progress(results.fraction());

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.factory),
            Arc::clone(&self.reporter),
            self.cancel.clone(),
            work_dir.to_path_buf(),
        );
        let workers = assign_workers(&self.credentials, self.options.workers_per_credential);
        let pending: Vec<TextChunk> = chunk_map
            .to_chunks()
            .into_iter()
            .filter(|chunk| !results.contains(chunk.index))
            .collect();

        let main_pass = dispatcher
            .run(pending, &workers, &self.options.dispatch, &results)
            .await;
        self.check_cancelled(&results, work_dir)?;

        let recovery = match recover_missing(
            &dispatcher,
            &chunk_map,
            &workers,
            &self.options.dispatch,
            &results,
        )
        .await
        {
            Some((report, _pass)) => {
                self.check_cancelled(&results, work_dir)?;
                if !report.is_complete() {
                    return Err(PipelineError::IncompleteJob {
                        missing: report.still_missing,
                        work_dir: work_dir.to_path_buf(),
                    });
                }
                Some(report)
            }
            None => None,
        };

        // No worker is alive past this point, so the map is final
        let inputs = results.ordered_paths();
        self.log(
            Level::Info,
            format!(
                "Merging {} chunk(s) into {} with {}",
                inputs.len(),
                output.display(),
                self.merge_tool.name()
            ),
        );
        self.merge_tool
            .merge(&inputs, output)
            .await
            .map_err(|source| PipelineError::Merge {
                source,
                work_dir: work_dir.to_path_buf(),
            })?;

        if !self.options.keep_intermediates {
            self.clean_up(&inputs, work_dir).await;
        }

        self.reporter.progress(1.0);
        Ok(JobReport {
            total_chunks: total,
            resumed,
            main_pass,
            recovery,
            output: output.to_path_buf(),
        })
    }

    /// Load or write the chunk map and seed results from a previous run
    async fn prepare(
        &self,
        chunks: &[TextChunk],
        work_dir: &Path,
    ) -> Result<(ChunkMap, Arc<ResultStore>), PipelineError> {
        let fresh = ChunkMap::from_chunks(chunks);

        let existing = match ChunkMap::load(work_dir) {
            Ok(existing) => existing,
            Err(e) => {
                self.log(Level::Warn, format!("Ignoring unreadable chunk map: {}", e));
                None
            }
        };

        let reuse_files = match &existing {
            Some(existing) if existing.same_chunks(&fresh) => true,
            Some(_) => {
                self.log(
                    Level::Info,
                    "Text changed since the last run, starting over".to_string(),
                );
                false
            }
            None => false,
        };

        let chunk_map = match existing {
            Some(existing) if reuse_files => existing,
            _ => {
                // Stale audio must be gone before the new map is written
                self.remove_chunk_files(work_dir).await?;
                fresh.save(work_dir)?;
                fresh
            }
        };

        let results = Arc::new(ResultStore::new(chunk_map.total_chunks));
        if reuse_files {
            let extension = self.factory.audio_extension();
            for index in 1..=chunk_map.total_chunks {
                let path = chunk_file_path(work_dir, index, extension);
                let non_empty = tokio::fs::metadata(&path)
                    .await
                    .map(|meta| meta.len() > 0)
                    .unwrap_or(false);
                if non_empty {
                    results.record_success(index, path);
                }
            }
        }

        Ok((chunk_map, results))
    }

    async fn remove_chunk_files(&self, work_dir: &Path) -> Result<(), PipelineError> {
        let extension = self.factory.audio_extension();
        let mut entries = tokio::fs::read_dir(work_dir).await?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if is_chunk_file_name(&name.to_string_lossy(), extension) {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            self.log(
                Level::Debug,
                format!("Removed {} stale chunk file(s)", removed),
            );
        }
        Ok(())
    }

    fn check_cancelled(&self, results: &ResultStore, work_dir: &Path) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                completed: results.completed(),
                total: results.total(),
                work_dir: work_dir.to_path_buf(),
            });
        }
        Ok(())
    }

    async fn clean_up(&self, inputs: &[PathBuf], work_dir: &Path) {
        for path in inputs {
            if let Err(e) = tokio::fs::remove_file(path).await {
                self.log(
                    Level::Debug,
                    format!("Could not remove {}: {}", path.display(), e),
                );
            }
        }
        if let Err(e) = ChunkMap::remove(work_dir) {
            self.log(Level::Debug, e.to_string());
        }
        // Only succeeds if nothing else lives there
        let _ = tokio::fs::remove_dir(work_dir).await;
    }

    fn log(&self, level: Level, message: String) {
        self.reporter.log(level, &message);
    }
}
