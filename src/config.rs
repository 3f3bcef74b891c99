//! Configuration types for a volume-to-PDF run.
//!
//! All run behaviour is controlled through [`RunConfig`], built via its
//! [`RunConfigBuilder`]. The same config is shared by the series fetch, the
//! per-chapter download and normalization stages and the document writer,
//! so every stage agrees on where files live and which tool is invoked.
//!
//! # On-disk layout
//! ```text
//! <cache_root>/mangalib/cache/<md5-of-url>          raw page bytes
//! <cache_root>/mangalib/tmp/<slug>_cover<ext>       cover art
//! <cache_root>/mangalib/tmp/<chapter-slug>/<n><ext> downloaded pages
//! <file>.done                                       completion markers
//! <file>.jpg                                        normalized images
//! ```

use crate::error::MangaPdfError;
use crate::pipeline::tool::{ImageTool, Magick};
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable overriding the default cache root.
pub const CACHE_DIR_ENV: &str = "MANGALIB_CACHE_DIR";

/// Configuration for fetching a series and building one volume.
///
/// Built via [`RunConfig::builder()`] or using [`RunConfig::default()`].
///
/// # Example
/// ```rust
/// use mangalib_pdf::RunConfig;
///
/// let config = RunConfig::builder()
///     .cache_root("/tmp/mangalib-test")
///     .jpeg_quality(80)
///     .concurrency(8)
///     .build()
///     .unwrap();
/// assert!(config.cache_dir().ends_with("mangalib/cache"));
/// ```
#[derive(Clone)]
pub struct RunConfig {
    /// Base directory holding the `mangalib/` tree. Default: the user cache
    /// directory, overridable with `MANGALIB_CACHE_DIR`.
    pub cache_root: PathBuf,

    /// External identify/convert tool. Default: [`Magick`].
    pub image_tool: Arc<dyn ImageTool>,

    /// Lossy re-encode quality for normalized images (1–100). Default: 75.
    pub jpeg_quality: u8,

    /// Maximum concurrent normalizations per chapter. `None` (default)
    /// starts one per page.
    pub concurrency: Option<usize>,

    /// Whole-request timeout for every GET. `None` (default) keeps the HTTP
    /// client's own behaviour.
    pub download_timeout_secs: Option<u64>,

    /// Optional `Referer` header sent with every GET.
    pub referer: Option<String>,

    /// TrueType font used for the title sheets. `None` uses the bundled
    /// DejaVu Sans (Latin, Greek, Cyrillic).
    pub font_path: Option<PathBuf>,

    /// Interpreter limits applied to every extraction call.
    pub sandbox: SandboxLimits,

    /// Optional per-chapter / per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

/// Resource limits for the page-script interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Heap ceiling for one interpreter instance. Default: 64 MiB.
    pub memory_limit_bytes: usize,
    /// Wall-clock budget for all scripts plus the projection of one call.
    /// Default: 10 000 ms.
    pub script_time_budget_ms: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 64 * 1024 * 1024,
            script_time_budget_ms: 10_000,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            image_tool: Arc::new(Magick::from_env()),
            jpeg_quality: 75,
            concurrency: None,
            download_timeout_secs: None,
            referer: None,
            font_path: None,
            sandbox: SandboxLimits::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("cache_root", &self.cache_root)
            .field("image_tool", &self.image_tool.name())
            .field("jpeg_quality", &self.jpeg_quality)
            .field("concurrency", &self.concurrency)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("referer", &self.referer)
            .field("font_path", &self.font_path)
            .field("sandbox", &self.sandbox)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn RunProgressCallback>"),
            )
            .finish()
    }
}

impl RunConfig {
    /// Create a new builder for `RunConfig`.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder {
            config: Self::default(),
        }
    }

    /// `<cache_root>/mangalib/cache`
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_root.join("mangalib").join("cache")
    }

    /// `<cache_root>/mangalib/tmp`
    pub fn tmp_dir(&self) -> PathBuf {
        self.cache_root.join("mangalib").join("tmp")
    }
}

/// Resolve the default cache root.
///
/// `MANGALIB_CACHE_DIR` wins; otherwise the platform cache directory
/// (`~/.cache`, `~/Library/Caches`, `%LOCALAPPDATA%`), then the temp dir.
pub fn default_cache_root() -> PathBuf {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
}

/// Builder for [`RunConfig`].
#[derive(Debug)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    pub fn cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.cache_root = root.into();
        self
    }

    pub fn image_tool(mut self, tool: Arc<dyn ImageTool>) -> Self {
        self.config.image_tool = tool;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = Some(n.max(1));
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = Some(secs);
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.config.referer = Some(referer.into());
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = Some(path.into());
        self
    }

    pub fn sandbox(mut self, limits: SandboxLimits) -> Self {
        self.config.sandbox = limits;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RunConfig, MangaPdfError> {
        let c = &self.config;
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(MangaPdfError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.download_timeout_secs == Some(0) {
            return Err(MangaPdfError::InvalidConfig(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        if c.sandbox.memory_limit_bytes < 1024 * 1024 {
            return Err(MangaPdfError::InvalidConfig(format!(
                "Sandbox memory limit must be at least 1 MiB, got {} bytes",
                c.sandbox.memory_limit_bytes
            )));
        }
        if c.sandbox.script_time_budget_ms == 0 {
            return Err(MangaPdfError::InvalidConfig(
                "Sandbox time budget must be ≥ 1 ms".into(),
            ));
        }
        if let Some(ref font) = c.font_path {
            if !font.is_file() {
                return Err(MangaPdfError::InvalidConfig(format!(
                    "Font file not found: {}",
                    font.display()
                )));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = RunConfig::default();
        assert_eq!(c.jpeg_quality, 75);
        assert_eq!(c.concurrency, None);
        assert_eq!(c.download_timeout_secs, None);
        assert!(c.font_path.is_none());
    }

    #[test]
    fn layout_dirs_hang_off_cache_root() {
        let c = RunConfig::builder().cache_root("/var/tmp/x").build().unwrap();
        assert_eq!(c.cache_dir(), PathBuf::from("/var/tmp/x/mangalib/cache"));
        assert_eq!(c.tmp_dir(), PathBuf::from("/var/tmp/x/mangalib/tmp"));
    }

    #[test]
    fn concurrency_is_clamped_to_one() {
        let c = RunConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, Some(1));
    }

    #[test]
    fn rejects_out_of_range_quality() {
        assert!(RunConfig::builder().jpeg_quality(0).build().is_err());
        assert!(RunConfig::builder().jpeg_quality(101).build().is_err());
        assert!(RunConfig::builder().jpeg_quality(100).build().is_ok());
    }

    #[test]
    fn rejects_missing_font() {
        let err = RunConfig::builder()
            .font_path("/definitely/not/a/font.ttf")
            .build()
            .unwrap_err();
        assert!(matches!(err, MangaPdfError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_timeout_and_tiny_sandbox() {
        assert!(RunConfig::builder().download_timeout_secs(0).build().is_err());
        let limits = SandboxLimits {
            memory_limit_bytes: 1024,
            ..SandboxLimits::default()
        };
        assert!(RunConfig::builder().sandbox(limits).build().is_err());
    }

    #[test]
    fn debug_hides_trait_objects() {
        let s = format!("{:?}", RunConfig::default());
        assert!(s.contains("RunConfig"));
        assert!(s.contains("jpeg_quality"));
    }
}
