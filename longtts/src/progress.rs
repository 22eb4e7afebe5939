// Terminal progress bar for a running job

use chunked_tts::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use log::Level;
use std::time::Duration;

const STEPS: u64 = 1000;

/// Drives an indicatif bar from job progress and routes log events through
/// the `log` facade without tearing the bar
pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new(STEPS);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")
                .unwrap()
                .progress_chars("=> "),
        );
        bar.set_message("Synthesizing speech...");
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}

impl Default for BarReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn position(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * STEPS as f64).round() as u64
}

impl ProgressReporter for BarReporter {
    fn progress(&self, fraction: f64) {
        // Workers report concurrently; never move the bar backwards
        let position = position(fraction);
        if position > self.bar.position() {
            self.bar.set_position(position);
        }
    }

    fn log(&self, level: Level, message: &str) {
        self.bar
            .suspend(|| log::log!(target: "longtts", level, "{}", message));
    }
}
