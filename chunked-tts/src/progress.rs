//! Progress and log callbacks exposed to the surrounding application

use log::Level;

/// Receives progress and log events from the dispatcher and recovery pass
pub trait ProgressReporter: Send + Sync {
    /// Completed fraction of the job, in `[0, 1]`
    fn progress(&self, fraction: f64);

    fn log(&self, level: Level, message: &str);
}

/// Forwards log events to the `log` facade and ignores progress
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn progress(&self, _fraction: f64) {}

    fn log(&self, level: Level, message: &str) {
        log::log!(target: "chunked_tts", level, "{}", message);
    }
}
