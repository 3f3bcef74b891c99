//! # mangalib-pdf
//!
//! Turn one volume of a MangaLib series into a single paginated PDF.
//!
//! MangaLib pages carry their data in inline scripts rather than markup, so
//! the series and chapter listings are recovered by running those scripts
//! in a short-lived QuickJS sandbox and evaluating a fixed projection
//! against the resulting `window` state. Page images are then downloaded
//! (falling back across mirror servers), re-encoded to JPEG by ImageMagick
//! and laid out one per A4 sheet behind a title sheet per chapter.
//!
//! ## Pipeline Overview
//!
//! ```text
//! series URL
//!  │
//!  ├─ 1. Cache      HTML by URL digest under <cache>/mangalib/cache
//!  ├─ 2. Extract    bootstrap scripts + projection in QuickJS (spawn_blocking)
//!  ├─ 3. Select     volume by label, chapters by numeric index
//!  │   per chapter, in order:
//!  ├─ 4. Acquire    page images, sequential, first working mirror wins
//!  ├─ 5. Normalize  JPEG q75 + size, concurrent, back in page order
//!  ├─ 6. Layout     title sheet + contained image sheets
//!  └─ 7. Write      <out>/<slug>-v<volume>.pdf, atomically, once
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mangalib_pdf::{fetch_series, list_volumes, build_volume, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let url = "https://mangalib.me/berserk";
//!     let config = RunConfig::default();
//!     let series = fetch_series(url, &config).await?;
//!     let volumes = list_volumes(&series)?;
//!     let out = build_volume(url, &series, &volumes[0], std::path::Path::new("."), &config).await?;
//!     eprintln!("{} sheets → {}", out.stats.sheets, out.output_path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mangalib2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! mangalib-pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! Image checks and re-encoding go through the [`ImageTool`] trait. The
//! default, [`Magick`], runs ImageMagick 7 (`magick`, or `$MANGALIB_MAGICK`).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{RunConfig, RunConfigBuilder, SandboxLimits};
pub use convert::{
    build_volume, convert, convert_sync, fetch_series, list_volumes, select_chapters, spawn_run,
    RunHandle,
};
pub use error::{MangaPdfError, PageError};
pub use model::{ChapterContent, ChapterRef, ImageAsset, PageSpec, SeriesMetadata};
pub use output::{RunOutput, RunResult, RunStats};
pub use pipeline::tool::{ImageTool, Magick};
pub use progress::{NoopProgressCallback, ProgressCallback, RunProgressCallback};
