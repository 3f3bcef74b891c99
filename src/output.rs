//! Result types for a completed run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The successful side of a run: the document and how it was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    /// `<output_dir>/<slug>-v<volume>.pdf`
    pub output_path: PathBuf,
    pub stats: RunStats,
}

/// Counters and timings for one volume build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Chapters laid out (each contributes one title sheet).
    pub chapters: usize,
    /// Page images laid out.
    pub pages: usize,
    /// Sheets in the final document.
    pub sheets: usize,
    pub total_duration_ms: u64,
    /// Time spent in sequential page downloads.
    pub download_duration_ms: u64,
    /// Time spent waiting for parallel normalization.
    pub normalize_duration_ms: u64,
    /// Time spent serialising the document.
    pub write_duration_ms: u64,
}

/// Outcome delivered once through a [`crate::convert::RunHandle`].
pub type RunResult = Result<RunOutput, crate::error::MangaPdfError>;
