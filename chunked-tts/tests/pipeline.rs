// End-to-end job tests against the scripted backend

use chunked_tts::mock::MockFactory;
use chunked_tts::{
    BreakerSettings, ByteConcat, CHUNK_MAP_FILE, ChunkMap, Credential, DispatchSettings, Engine,
    FfmpegConcat, Job, LogReporter, MergeTool, PipelineError, PipelineOptions, ProgressReporter,
    RetryPolicy, SegmentMode, SegmentOptions, SynthesisError,
};
use log::Level;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const LINES: [&str; 4] = [
    "first line here",
    "second line here",
    "third line here",
    "fourth line here",
];

fn text() -> String {
    LINES.join("\n")
}

fn expected_output() -> Vec<u8> {
    LINES
        .iter()
        .flat_map(|line| MockFactory::audio_for(line))
        .collect()
}

fn options() -> PipelineOptions {
    PipelineOptions {
        segment: SegmentOptions {
            mode: SegmentMode::Paragraph,
            max_chars: 20,
        },
        dispatch: DispatchSettings {
            voice: "narrator".to_string(),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                jitter_fraction: 0.5,
                max_attempts: 5,
            },
            breaker: BreakerSettings {
                threshold: 3,
                cooldown: Duration::from_millis(2),
            },
            poll_timeout: Duration::from_millis(500),
            ..DispatchSettings::default()
        },
        workers_per_credential: None,
        keep_intermediates: false,
    }
}

fn credentials(n: usize) -> Vec<Credential> {
    (1..=n)
        .map(|i| Credential::new(format!("key{}", i), Some(format!("secret{}", i))))
        .collect()
}

fn job(factory: &MockFactory, credentials: Vec<Credential>, options: PipelineOptions) -> Job {
    Job::new(
        Arc::new(factory.clone()),
        Arc::new(ByteConcat),
        Arc::new(LogReporter),
        credentials,
        options,
    )
}

#[derive(Default)]
struct Recorder {
    fractions: Mutex<Vec<f64>>,
    messages: Mutex<Vec<String>>,
}

impl ProgressReporter for Recorder {
    fn progress(&self, fraction: f64) {
        self.fractions.lock().unwrap().push(fraction);
    }

    fn log(&self, _level: Level, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fan_out_job_completes_without_recovery() {
    let dir = TempDir::new().unwrap();
    let work_dir = dir.path().join("work");
    let output = dir.path().join("book.mp3");
    let factory = MockFactory::always_succeeds().with_latency(Duration::from_millis(5));
    let job = job(
        &factory,
        credentials(2),
        PipelineOptions {
            workers_per_credential: Some(2),
            ..options()
        },
    );

    let report = job.run(&text(), &work_dir, &output).await.unwrap();

    assert_eq!(report.total_chunks, 4);
    assert_eq!(report.main_pass.succeeded, vec![1, 2, 3, 4]);
    assert!(report.recovery.is_none());
    assert_eq!(factory.connect_count(), 4);
    assert_eq!(std::fs::read(&output).unwrap(), expected_output());
    assert!(!work_dir.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_recovery_pass_restricted_to_failed_chunk() {
    let dir = TempDir::new().unwrap();
    let work_dir = dir.path().join("work");
    let output = dir.path().join("book.mp3");
    let factory = MockFactory::with_script(|call| {
        if call.text == LINES[1] && call.attempt <= 5 {
            Err(SynthesisError::from_status(500, "internal error"))
        } else {
            Ok(MockFactory::audio_for(&call.text))
        }
    });
    let job = job(&factory, credentials(2), options());

    let report = job.run(&text(), &work_dir, &output).await.unwrap();

    let recovery = report.recovery.expect("recovery pass should run");
    assert_eq!(recovery.targeted, vec![2]);
    assert_eq!(recovery.recovered, vec![2]);
    assert_eq!(recovery.workers, 2);
    assert_eq!(report.main_pass.failed.len(), 1);
    assert_eq!(report.main_pass.failed[0].chunk_index, 2);
    assert_eq!(report.main_pass.attempts[&2], 5);

    let second = factory
        .calls()
        .into_iter()
        .filter(|c| c.text == LINES[1])
        .collect::<Vec<_>>();
    assert_eq!(second.len(), 6);
    assert!(second[..5].iter().all(|c| c.engine == Engine::Standard));
    assert_eq!(second[5].engine, Engine::Conservative);

    assert_eq!(std::fs::read(&output).unwrap(), expected_output());
}

#[tokio::test]
async fn test_unrecoverable_chunk_keeps_intermediates() {
    let dir = TempDir::new().unwrap();
    let work_dir = dir.path().join("work");
    let output = dir.path().join("book.mp3");
    let factory = MockFactory::with_script(|call| {
        if call.text == LINES[2] {
            Err(SynthesisError::from_message("connection refused"))
        } else {
            Ok(MockFactory::audio_for(&call.text))
        }
    });
    let job = job(&factory, credentials(1), options());

    let err = job.run(&text(), &work_dir, &output).await.unwrap_err();

    match err {
        PipelineError::IncompleteJob { missing, work_dir: kept } => {
            assert_eq!(missing, vec![3]);
            assert_eq!(kept, work_dir);
        }
        other => panic!("unexpected error: {}", other),
    }
    // Five main-pass attempts plus six in recovery
    assert_eq!(factory.attempts_for(LINES[2]), 11);
    assert!(!output.exists());
    assert!(work_dir.join(CHUNK_MAP_FILE).exists());
    assert!(work_dir.join("chunk_00001.mp3").exists());
    assert!(!work_dir.join("chunk_00003.mp3").exists());
}

#[tokio::test]
async fn test_resume_skips_finished_chunks() {
    let dir = TempDir::new().unwrap();
    let work_dir = dir.path().join("work");
    let output = dir.path().join("book.mp3");

    let flaky = MockFactory::with_script(|call| {
        if call.text == LINES[3] {
            Err(SynthesisError::Validation("rejected".to_string()))
        } else {
            Ok(MockFactory::audio_for(&call.text))
        }
    });
    let first = job(&flaky, credentials(1), options())
        .run(&text(), &work_dir, &output)
        .await;
    assert!(matches!(first, Err(PipelineError::IncompleteJob { .. })));

    let healthy = MockFactory::always_succeeds();
    let report = job(&healthy, credentials(1), options())
        .run(&text(), &work_dir, &output)
        .await
        .unwrap();

    assert_eq!(report.resumed, 3);
    assert_eq!(report.main_pass.succeeded, vec![4]);
    let sent: Vec<String> = healthy.calls().into_iter().map(|c| c.text).collect();
    assert_eq!(sent, vec![LINES[3].to_string()]);
    assert_eq!(std::fs::read(&output).unwrap(), expected_output());
}

#[tokio::test]
async fn test_changed_text_starts_over() {
    let dir = TempDir::new().unwrap();
    let work_dir = dir.path().join("work");
    let output = dir.path().join("book.mp3");
    let options = PipelineOptions {
        keep_intermediates: true,
        ..options()
    };

    job(&MockFactory::always_succeeds(), credentials(1), options.clone())
        .run("an older draft\nof the text", &work_dir, &output)
        .await
        .unwrap();

    let factory = MockFactory::always_succeeds();
    let report = job(&factory, credentials(1), options)
        .run(&text(), &work_dir, &output)
        .await
        .unwrap();

    assert_eq!(report.resumed, 0);
    assert_eq!(factory.calls().len(), 4);
    assert_eq!(std::fs::read(&output).unwrap(), expected_output());
    assert!(work_dir.join(CHUNK_MAP_FILE).exists());
}

#[tokio::test]
async fn test_abandoned_text_never_leaks_into_new_job() {
    let dir = TempDir::new().unwrap();
    let work_dir = dir.path().join("work");
    let output = dir.path().join("book.mp3");
    let old_lines = ["old draft line one", "old draft line two", "old draft line three"];

    // Old text stops short, leaving audio for its first two chunks
    let flaky = MockFactory::with_script(move |call| {
        if call.text == old_lines[2] {
            Err(SynthesisError::Validation("rejected".to_string()))
        } else {
            Ok(MockFactory::audio_for(&call.text))
        }
    });
    let first = job(&flaky, credentials(1), options())
        .run(&old_lines.join("\n"), &work_dir, &output)
        .await;
    assert!(matches!(first, Err(PipelineError::IncompleteJob { .. })));
    assert!(work_dir.join("chunk_00001.mp3").exists());

    // New text is cancelled before any chunk is synthesized
    let cancel = CancellationToken::new();
    cancel.cancel();
    let idle = MockFactory::always_succeeds();
    let second = job(&idle, credentials(1), options())
        .with_cancel_token(cancel)
        .run(&text(), &work_dir, &output)
        .await;
    assert!(matches!(second, Err(PipelineError::Cancelled { .. })));
    assert!(idle.calls().is_empty());
    assert!(!work_dir.join("chunk_00001.mp3").exists());

    let healthy = MockFactory::always_succeeds();
    let report = job(&healthy, credentials(1), options())
        .run(&text(), &work_dir, &output)
        .await
        .unwrap();

    assert_eq!(report.resumed, 0);
    assert_eq!(healthy.calls().len(), 4);
    assert_eq!(std::fs::read(&output).unwrap(), expected_output());
}

#[tokio::test]
async fn test_interrupted_write_is_not_resumed() {
    let dir = TempDir::new().unwrap();
    let work_dir = dir.path().join("work");
    let output = dir.path().join("book.mp3");
    let job = job(&MockFactory::always_succeeds(), credentials(1), options());

    // State left by a run killed while writing chunk 2
    let planned = job.plan(&text());
    ChunkMap::from_chunks(&planned).save(&work_dir).unwrap();
    std::fs::write(
        work_dir.join("chunk_00001.mp3"),
        MockFactory::audio_for(LINES[0]),
    )
    .unwrap();
    std::fs::write(work_dir.join("chunk_00002.mp3.part"), "[seco").unwrap();

    let report = job.run(&text(), &work_dir, &output).await.unwrap();

    assert_eq!(report.resumed, 1);
    assert_eq!(report.main_pass.succeeded, vec![2, 3, 4]);
    assert_eq!(std::fs::read(&output).unwrap(), expected_output());
}

#[tokio::test]
async fn test_cancelled_job_reports_progress() {
    let dir = TempDir::new().unwrap();
    let work_dir = dir.path().join("work");
    let output = dir.path().join("book.mp3");
    let factory = MockFactory::always_succeeds().with_latency(Duration::from_millis(40));
    let cancel = CancellationToken::new();
    let many: Vec<String> = (1..=10).map(|i| format!("paragraph number {}", i)).collect();

    let job = job(&factory, credentials(1), options()).with_cancel_token(cancel.clone());
    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
    });

    let err = job
        .run(&many.join("\n"), &work_dir, &output)
        .await
        .unwrap_err();
    trigger.await.unwrap();

    match err {
        PipelineError::Cancelled {
            completed, total, ..
        } => {
            assert_eq!(total, 10);
            assert!(completed >= 1 && completed < 10, "completed {}", completed);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(factory.calls().len() < 10);
    assert!(!output.exists());
}

#[tokio::test]
async fn test_merge_failure_keeps_work_dir() {
    let dir = TempDir::new().unwrap();
    let work_dir = dir.path().join("work");
    let output = dir.path().join("book.mp3");
    let missing_tool: Arc<dyn MergeTool> =
        Arc::new(FfmpegConcat::new(dir.path().join("no-such-ffmpeg")));
    let job = Job::new(
        Arc::new(MockFactory::always_succeeds()),
        missing_tool,
        Arc::new(LogReporter),
        credentials(1),
        options(),
    );

    let err = job.run(&text(), &work_dir, &output).await.unwrap_err();

    assert!(matches!(err, PipelineError::Merge { .. }));
    assert!(work_dir.join("chunk_00004.mp3").exists());
}

#[tokio::test]
async fn test_empty_input() {
    let dir = TempDir::new().unwrap();
    let factory = MockFactory::always_succeeds();

    let err = job(&factory, credentials(1), options())
        .run("  \n ... \n", &dir.path().join("work"), &dir.path().join("out.mp3"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::EmptyInput));
    assert!(factory.calls().is_empty());
}

#[tokio::test]
async fn test_progress_reaches_one() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let job = Job::new(
        Arc::new(MockFactory::always_succeeds()),
        Arc::new(ByteConcat),
        recorder.clone(),
        Vec::new(),
        options(),
    );

    job.run(&text(), &dir.path().join("work"), &dir.path().join("out.mp3"))
        .await
        .unwrap();

    let fractions = recorder.fractions.lock().unwrap().clone();
    assert_eq!(fractions.first(), Some(&0.0));
    assert_eq!(fractions.last(), Some(&1.0));
    assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
    assert!(!recorder.messages.lock().unwrap().is_empty());
}
