//! Error types for the mangalib-pdf library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`MangaPdfError`] is **fatal**: the run cannot produce its document
//!   (series page unreachable, projection failed, tool missing, a chapter
//!   failed). Returned as `Err(MangaPdfError)` from every public operation.
//!
//! * [`PageError`]: a single page could not be downloaded from any mirror
//!   or could not be normalized. A volume is all-or-nothing: the first page
//!   error (in page order) fails its chapter and travels verbatim inside
//!   [`MangaPdfError::ChapterFailed`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the mangalib-pdf library.
#[derive(Debug, Error)]
pub enum MangaPdfError {
    // ── Transport errors ──────────────────────────────────────────────────
    /// Connection failure or non-2xx status on a GET.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// GET exceeded the configured client timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Integrity errors ──────────────────────────────────────────────────
    /// Downloaded bytes failed the external identify check. The file is
    /// left at `path` for inspection and no completion marker is written.
    #[error("Downloaded image from '{url}' is not a valid image: '{path}'")]
    CorruptImage { url: String, path: PathBuf },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The script interpreter could not be created or configured.
    #[error("Script sandbox unavailable: {0}")]
    SandboxFailed(String),

    /// The projection expression threw or produced no value.
    #[error("Projection evaluation failed: {detail}")]
    ProjectionFailed { detail: String },

    /// The projection produced JSON that does not match the expected shape.
    #[error("Projection result could not be decoded: {source}")]
    ProjectionDecode {
        #[source]
        source: serde_json::Error,
    },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The external image tool could not be started at all.
    #[error("Image tool '{program}' could not be started: {source}\nInstall ImageMagick or set MANGALIB_MAGICK.")]
    ToolUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Re-encoding an image to the normalized format failed.
    #[error("Error converting image '{path}'")]
    ConversionFailed { path: PathBuf },

    /// The dimension query exited non-zero.
    #[error("Can't identify image dimensions: '{path}'")]
    DimensionsUnavailable { path: PathBuf },

    /// The dimension query output was not `<width>x<height>`.
    #[error("Error parsing image dimensions of '{path}': got {output:?}")]
    BadDimensions { path: PathBuf, output: String },

    // ── Chapter failures ──────────────────────────────────────────────────
    /// One page of a chapter failed; no document is produced for the volume.
    #[error("Chapter {chapter} failed: {source}")]
    ChapterFailed {
        chapter: String,
        #[source]
        source: PageError,
    },

    // ── Invariant violations ──────────────────────────────────────────────
    /// A chapter index or volume label is not a finite decimal number.
    #[error("Malformed numeric index {value:?}")]
    MalformedIndex { value: String },

    /// The requested volume label is not a key of the chapter grouping.
    #[error("Bad volume selected: {volume:?} is not one of the extracted volumes")]
    VolumeNotFound { volume: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading or writing a working file (cache, downloaded page, marker).
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or move the finished document into place.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document sink rejected a drawing or serialisation call.
    #[error("Failed to build document '{path}': {detail}")]
    DocumentWriteFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (worker task vanished, join failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MangaPdfError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MangaPdfError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A failure attributable to a single page of a chapter.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Every mirror candidate failed (or the page had none).
    #[error("Page {page}: all {attempts} mirror candidates failed. Last error: {last_error}")]
    AllMirrorsFailed {
        page: u32,
        attempts: usize,
        last_error: String,
    },

    /// The downloaded page could not be normalized.
    #[error("Page {page}: normalization failed: {detail}")]
    NormalizeFailed { page: u32, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_failed_carries_page_error_verbatim() {
        let page = PageError::AllMirrorsFailed {
            page: 7,
            attempts: 2,
            last_error: "HTTP 404 Not Found".into(),
        };
        let e = MangaPdfError::ChapterFailed {
            chapter: "v1 c12".into(),
            source: page.clone(),
        };
        let msg = e.to_string();
        assert!(msg.contains("v1 c12"), "got: {msg}");
        assert!(msg.contains(&page.to_string()), "got: {msg}");
    }

    #[test]
    fn volume_not_found_display() {
        let e = MangaPdfError::VolumeNotFound {
            volume: "1.0".into(),
        };
        assert!(e.to_string().contains("\"1.0\""));
    }

    #[test]
    fn bad_dimensions_display() {
        let e = MangaPdfError::BadDimensions {
            path: PathBuf::from("/tmp/1.png.jpg"),
            output: "garbage".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("1.png.jpg"));
        assert!(msg.contains("garbage"));
    }

    #[test]
    fn normalize_failed_display() {
        let e = PageError::NormalizeFailed {
            page: 3,
            detail: "Error converting image".into(),
        };
        assert!(e.to_string().starts_with("Page 3:"));
    }
}
