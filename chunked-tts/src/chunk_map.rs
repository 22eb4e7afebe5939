//! Durable index-to-text record for a job
//!
//! Written to the job's work directory before dispatch so a crashed or
//! cancelled job can be resumed, and so the recovery pass re-queues the exact
//! original text of each missing chunk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::segment::TextChunk;

/// File name of the chunk map inside a job work directory
pub const CHUNK_MAP_FILE: &str = "chunk_map.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub text: String,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMap {
    pub total_chunks: usize,
    /// Keyed by 1-based chunk index; serialized with string keys
    pub chunks: BTreeMap<usize, ChunkEntry>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ChunkMap {
    /// Build a map from segmenter output
    pub fn from_chunks(chunks: &[TextChunk]) -> Self {
        let chunks: BTreeMap<usize, ChunkEntry> = chunks
            .iter()
            .map(|c| {
                (
                    c.index,
                    ChunkEntry {
                        text: c.text.clone(),
                        length: c.original_length,
                    },
                )
            })
            .collect();

        Self {
            total_chunks: chunks.len(),
            chunks,
            created_at: Utc::now(),
        }
    }

    /// Path of the chunk map file inside `work_dir`
    pub fn path_in(work_dir: &Path) -> PathBuf {
        work_dir.join(CHUNK_MAP_FILE)
    }

    /// Load the chunk map from `work_dir`, if one exists
    pub fn load(work_dir: &Path) -> Result<Option<Self>, PipelineError> {
        let path = Self::path_in(work_dir);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| chunk_map_error(&path, e))?;
        let map: ChunkMap = serde_json::from_str(&content).map_err(|e| chunk_map_error(&path, e))?;
        map.validate().map_err(|message| PipelineError::ChunkMap {
            path: path.clone(),
            message,
        })?;
        Ok(Some(map))
    }

    /// Write the chunk map into `work_dir`, creating the directory if needed
    pub fn save(&self, work_dir: &Path) -> Result<PathBuf, PipelineError> {
        let path = Self::path_in(work_dir);

        if !work_dir.exists() {
            fs::create_dir_all(work_dir).map_err(|e| chunk_map_error(&path, e))?;
        }

        let content = serde_json::to_string_pretty(self).map_err(|e| chunk_map_error(&path, e))?;
        fs::write(&path, content).map_err(|e| chunk_map_error(&path, e))?;
        Ok(path)
    }

    /// Delete the chunk map file from `work_dir`
    pub fn remove(work_dir: &Path) -> Result<(), PipelineError> {
        let path = Self::path_in(work_dir);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| chunk_map_error(&path, e))?;
        }
        Ok(())
    }

    /// Check that indices are exactly `1..=total_chunks`
    pub fn validate(&self) -> Result<(), String> {
        if self.chunks.len() != self.total_chunks {
            return Err(format!(
                "total_chunks is {} but {} chunks are recorded",
                self.total_chunks,
                self.chunks.len()
            ));
        }
        for (expected, index) in (1..=self.total_chunks).zip(self.chunks.keys()) {
            if expected != *index {
                return Err(format!("chunk index {} missing", expected));
            }
        }
        Ok(())
    }

    /// True if both maps describe the same chunk texts
    pub fn same_chunks(&self, other: &ChunkMap) -> bool {
        self.total_chunks == other.total_chunks && self.chunks == other.chunks
    }

    /// Rebuild the chunk for `index`
    pub fn chunk(&self, index: usize) -> Option<TextChunk> {
        self.chunks.get(&index).map(|entry| TextChunk {
            index,
            text: entry.text.clone(),
            original_length: entry.length,
        })
    }

    /// All chunks in ascending index order
    pub fn to_chunks(&self) -> Vec<TextChunk> {
        self.chunks
            .keys()
            .filter_map(|&index| self.chunk(index))
            .collect()
    }

    /// Indices in `1..=total_chunks` that are not in `completed`
    pub fn missing(&self, completed: &BTreeSet<usize>) -> Vec<usize> {
        (1..=self.total_chunks)
            .filter(|index| !completed.contains(index))
            .collect()
    }
}

fn chunk_map_error(path: &Path, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::ChunkMap {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
