//! Error types for the synthesis pipeline
//!
//! Per-chunk failures (`SynthesisError`) are absorbed by the retry loop and
//! only ever surface as log events. Job-level failures (`PipelineError`) are
//! what the caller sees.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

/// Failure signatures that indicate a transient connection or capacity problem
static CONNECTION_SIGNATURES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)time[d ]?\s?out|timeout|connection (reset|refused|closed|aborted)|reset by peer|refused|rate[ _-]?limit|too many requests|\b429\b|\b5\d\d\b|zero[ -]byte|\b0 bytes|empty audio|unavailable|overloaded|broken pipe",
    )
    .unwrap()
});

/// How a failed attempt should be treated by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timeouts, resets, rate limits, 5xx: retried with a longer backoff
    Connection,
    /// Any other backend failure: retried with the plain backoff
    Generic,
    /// The request itself can never succeed: not retried
    Validation,
}

/// Returns true if the message matches a known connection-class signature
pub fn classify_message(message: &str) -> bool {
    CONNECTION_SIGNATURES.is_match(message)
}

/// A single failed synthesis attempt
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Invalid chunk text: {0}")]
    Validation(String),

    #[error("Transient backend error: {message}")]
    Transient {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Backend overloaded or quota exceeded: {message}")]
    Overloaded {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Backend returned zero bytes of audio")]
    EmptyAudio,

    #[error("Backend error: {message}")]
    Backend {
        message: String,
        status_code: Option<u16>,
    },
}

impl SynthesisError {
    /// Build an error from a status code and response message
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 | 503 | 529 => SynthesisError::Overloaded {
                message,
                status_code: Some(status),
            },
            500..=599 | 408 => SynthesisError::Transient {
                message,
                status_code: Some(status),
            },
            _ => SynthesisError::Backend {
                message,
                status_code: Some(status),
            },
        }
    }

    /// Build an error from a free-form message, classifying it by content
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if classify_message(&message) {
            SynthesisError::Transient {
                message,
                status_code: None,
            }
        } else {
            SynthesisError::Backend {
                message,
                status_code: None,
            }
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            SynthesisError::Validation(_) => ErrorClass::Validation,
            SynthesisError::Transient { .. }
            | SynthesisError::Overloaded { .. }
            | SynthesisError::EmptyAudio => ErrorClass::Connection,
            SynthesisError::Backend {
                message,
                status_code,
            } => {
                if classify_message(message)
                    || status_code.is_some_and(|s| s == 429 || s >= 500)
                {
                    ErrorClass::Connection
                } else {
                    ErrorClass::Generic
                }
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() != ErrorClass::Validation
    }
}

/// Failure of the external concatenation step
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("No chunk files to merge")]
    NothingToMerge,

    #[error("Merge tool '{tool}' could not be started: {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Merge tool '{tool}' failed: {stderr}")]
    ToolFailed { tool: String, stderr: String },

    #[error("I/O error during merge: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal job errors surfaced to the caller
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input text contains nothing to synthesize")]
    EmptyInput,

    #[error("Chunk map error at {}: {message}", .path.display())]
    ChunkMap { path: PathBuf, message: String },

    #[error(
        "{} chunk(s) still missing after recovery: {:?} (intermediates kept in {})",
        .missing.len(),
        .missing,
        .work_dir.display()
    )]
    IncompleteJob {
        missing: Vec<usize>,
        work_dir: PathBuf,
    },

    #[error("Merge failed (intermediates kept in {}): {source}", .work_dir.display())]
    Merge {
        #[source]
        source: MergeError,
        work_dir: PathBuf,
    },

    #[error(
        "Cancelled with {completed}/{total} chunks complete (intermediates kept in {})",
        .work_dir.display()
    )]
    Cancelled {
        completed: usize,
        total: usize,
        work_dir: PathBuf,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_message_connection_signatures() {
        assert!(classify_message("operation timed out"));
        assert!(classify_message("Connection reset by peer"));
        assert!(classify_message("connection refused"));
        assert!(classify_message("Rate limit exceeded"));
        assert!(classify_message("HTTP 503 Service Unavailable"));
        assert!(classify_message("status 429"));
        assert!(classify_message("model is overloaded"));
    }

    #[test]
    fn test_classify_message_generic() {
        assert!(!classify_message("invalid voice name"));
        assert!(!classify_message("unauthorized"));
        assert!(!classify_message("status 401"));
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(
            SynthesisError::from_status(429, "slow down"),
            SynthesisError::Overloaded { .. }
        ));
        assert!(matches!(
            SynthesisError::from_status(502, "bad gateway"),
            SynthesisError::Transient { .. }
        ));
        assert!(matches!(
            SynthesisError::from_status(401, "bad key"),
            SynthesisError::Backend { .. }
        ));
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(
            SynthesisError::Validation("empty".into()).class(),
            ErrorClass::Validation
        );
        assert_eq!(SynthesisError::EmptyAudio.class(), ErrorClass::Connection);
        assert_eq!(
            SynthesisError::from_status(400, "bad request").class(),
            ErrorClass::Generic
        );
        assert_eq!(
            SynthesisError::from_message("read timeout").class(),
            ErrorClass::Connection
        );
        assert!(!SynthesisError::Validation("x".into()).is_retryable());
    }

    #[test]
    fn test_incomplete_job_message_lists_missing() {
        let err = PipelineError::IncompleteJob {
            missing: vec![2, 7],
            work_dir: PathBuf::from("/tmp/job"),
        };
        let msg = err.to_string();
        assert!(msg.contains("[2, 7]"));
        assert!(msg.contains("/tmp/job"));
    }
}
