//! Ordered concatenation of chunk audio files

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::MergeError;

const CONCAT_LIST_FILE: &str = "concat_list.txt";

/// Joins chunk files, in the order given, into one output file
#[async_trait]
pub trait MergeTool: Send + Sync {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError>;

    fn name(&self) -> &str;
}

/// Concatenate with ffmpeg's concat demuxer.
///
/// Streams are copied when the output container matches the inputs,
/// otherwise ffmpeg re-encodes to whatever the output extension implies.
#[derive(Debug, Clone)]
pub struct FfmpegConcat {
    ffmpeg_path: PathBuf,
}

impl FfmpegConcat {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Body of the concat demuxer list file
    pub fn list_file_contents(inputs: &[PathBuf]) -> String {
        inputs
            .iter()
            .map(|path| {
                let escaped = path.to_string_lossy().replace('\'', r"'\''");
                format!("file '{}'\n", escaped)
            })
            .collect()
    }

    fn can_stream_copy(inputs: &[PathBuf], output: &Path) -> bool {
        let out_ext = output.extension().map(|e| e.to_ascii_lowercase());
        out_ext.is_some()
            && inputs
                .iter()
                .all(|p| p.extension().map(|e| e.to_ascii_lowercase()) == out_ext)
    }
}

impl Default for FfmpegConcat {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl MergeTool for FfmpegConcat {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
        let first = inputs.first().ok_or(MergeError::NothingToMerge)?;
        let list_dir = first.parent().unwrap_or_else(|| Path::new("."));
        let list_path = list_dir.join(CONCAT_LIST_FILE);
        tokio::fs::write(&list_path, Self::list_file_contents(inputs)).await?;

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path);
        if Self::can_stream_copy(inputs, output) {
            cmd.args(["-c", "copy"]);
        }
        cmd.arg(output);

        let tool = self.ffmpeg_path.display().to_string();
        let result = cmd.output().await;
        let _ = tokio::fs::remove_file(&list_path).await;

        let out = result.map_err(|source| MergeError::ToolUnavailable {
            tool: tool.clone(),
            source,
        })?;

        if !out.status.success() {
            return Err(MergeError::ToolFailed {
                tool,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Append the files byte-for-byte. Only sound for formats whose streams
/// tolerate naive concatenation, such as MP3 or ADTS AAC.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteConcat;

#[async_trait]
impl MergeTool for ByteConcat {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
        if inputs.is_empty() {
            return Err(MergeError::NothingToMerge);
        }

        let mut out = tokio::fs::File::create(output).await?;
        for input in inputs {
            let bytes = tokio::fs::read(input).await?;
            out.write_all(&bytes).await?;
        }
        out.flush().await?;

        Ok(())
    }

    fn name(&self) -> &str {
        "concat"
    }
}
