//! Second, smaller dispatch round for chunks the main pass left behind

use log::Level;
use std::sync::Arc;

use crate::backend::Engine;
use crate::chunk_map::ChunkMap;
use crate::dispatch::{DispatchSettings, Dispatcher, PassReport};
use crate::results::ResultStore;
use crate::segment::TextChunk;
use crate::workers::{WorkerAssignment, recovery_assignments};

/// Outcome of a recovery pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Indices missing when the pass started
    pub targeted: Vec<usize>,
    /// Workers the pass ran with
    pub workers: usize,
    /// Targeted indices that now have results
    pub recovered: Vec<usize>,
    /// Indices still missing afterwards
    pub still_missing: Vec<usize>,
}

impl RecoveryReport {
    pub fn is_complete(&self) -> bool {
        self.still_missing.is_empty()
    }
}

/// Settings for the recovery pass: one more attempt per chunk and the
/// conservative engine
pub fn recovery_settings(main: &DispatchSettings) -> DispatchSettings {
    DispatchSettings {
        retry: main.retry.for_recovery(),
        engine: Engine::Conservative,
        ..main.clone()
    }
}

/// Re-dispatch every chunk absent from `results`, taking the text from the
/// chunk map. Returns `None` when nothing is missing.
///
/// Must only be called once the main pass has returned, so the results map
/// is settled.
pub async fn recover_missing(
    dispatcher: &Dispatcher,
    chunk_map: &ChunkMap,
    original_workers: &[WorkerAssignment],
    main: &DispatchSettings,
    results: &Arc<ResultStore>,
) -> Option<(RecoveryReport, PassReport)> {
    let targeted = chunk_map.missing(&results.completed_indices());
    if targeted.is_empty() {
        return None;
    }

    let queue: Vec<TextChunk> = targeted
        .iter()
        .filter_map(|&index| chunk_map.chunk(index))
        .collect();
    let workers = recovery_assignments(original_workers);
    let settings = recovery_settings(main);

    dispatcher.reporter().log(
        Level::Warn,
        &format!(
            "Recovery pass: {} missing chunk(s) {:?} with {} worker(s), up to {} attempts each",
            targeted.len(),
            targeted,
            workers.len(),
            settings.retry.max_attempts
        ),
    );

    let pass = dispatcher.run(queue, &workers, &settings, results).await;

    let still_missing = chunk_map.missing(&results.completed_indices());
    let recovered = targeted
        .iter()
        .copied()
        .filter(|index| !still_missing.contains(index))
        .collect::<Vec<_>>();

    let level = if still_missing.is_empty() {
        Level::Info
    } else {
        Level::Error
    };
    dispatcher.reporter().log(
        level,
        &format!(
            "Recovery pass recovered {}/{} chunk(s)",
            recovered.len(),
            targeted.len()
        ),
    );

    Some((
        RecoveryReport {
            targeted,
            workers: workers.len(),
            recovered,
            still_missing,
        },
        pass,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SynthesisError;
    use crate::mock::MockFactory;
    use crate::progress::LogReporter;
    use crate::retry::{BreakerSettings, RetryPolicy};
    use crate::workers::{Credential, assign_workers};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn settings() -> DispatchSettings {
        DispatchSettings {
            retry: RetryPolicy {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                jitter_fraction: 0.0,
                max_attempts: 2,
            },
            breaker: BreakerSettings {
                threshold: 10,
                cooldown: Duration::from_millis(1),
            },
            poll_timeout: Duration::from_millis(200),
            ..DispatchSettings::default()
        }
    }

    fn map(n: usize) -> ChunkMap {
        let chunks: Vec<TextChunk> = (1..=n)
            .map(|i| TextChunk {
                index: i,
                text: format!("part {}", i),
                original_length: 6,
            })
            .collect();
        ChunkMap::from_chunks(&chunks)
    }

    #[test]
    fn test_recovery_settings() {
        let main = settings();
        let recovery = recovery_settings(&main);
        assert_eq!(recovery.retry.max_attempts, 3);
        assert_eq!(recovery.engine, Engine::Conservative);
        assert_eq!(recovery.poll_timeout, main.poll_timeout);
    }

    #[tokio::test]
    async fn test_nothing_missing() {
        let dir = TempDir::new().unwrap();
        let factory = MockFactory::always_succeeds();
        let dispatcher = Dispatcher::new(
            Arc::new(factory.clone()),
            Arc::new(LogReporter),
            CancellationToken::new(),
            dir.path().to_path_buf(),
        );
        let results = Arc::new(ResultStore::new(2));
        results.record_success(1, PathBuf::from("a"));
        results.record_success(2, PathBuf::from("b"));
        let workers = assign_workers(&[Credential::anonymous()], None);

        let outcome = recover_missing(&dispatcher, &map(2), &workers, &settings(), &results).await;

        assert!(outcome.is_none());
        assert_eq!(factory.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_only_missing_chunks_targeted() {
        let dir = TempDir::new().unwrap();
        let factory = MockFactory::with_script(|call| {
            if call.text == "part 3" {
                Err(SynthesisError::from_status(500, "boom"))
            } else {
                Ok(MockFactory::audio_for(&call.text))
            }
        });
        let dispatcher = Dispatcher::new(
            Arc::new(factory.clone()),
            Arc::new(LogReporter),
            CancellationToken::new(),
            dir.path().to_path_buf(),
        );
        let results = Arc::new(ResultStore::new(4));
        results.record_success(1, PathBuf::from("a"));
        results.record_success(4, PathBuf::from("d"));
        let workers = assign_workers(&[Credential::anonymous()], Some(4));

        let (report, pass) = recover_missing(&dispatcher, &map(4), &workers, &settings(), &results)
            .await
            .unwrap();

        assert_eq!(report.targeted, vec![2, 3]);
        assert_eq!(report.workers, 2);
        assert_eq!(report.recovered, vec![2]);
        assert_eq!(report.still_missing, vec![3]);
        assert_eq!(pass.attempts[&3], 3);
        assert!(factory.calls().iter().all(|c| c.engine == Engine::Conservative));
        assert_eq!(factory.attempts_for("part 1"), 0);
    }
}
