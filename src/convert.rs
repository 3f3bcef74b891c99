//! Run orchestration: series fetch, volume selection and the volume build.
//!
//! A run is all-or-nothing. Chapters are processed strictly one after
//! another in ascending chapter order; inside a chapter, pages download
//! sequentially and normalize in parallel. The first fatal error ends the
//! run and no document is written. Only after every chapter has been laid
//! out is the PDF serialised, once.
//!
//! [`spawn_run`] moves the whole build onto a background task and hands back
//! a [`RunHandle`] whose single result is consumed by [`RunHandle::wait`].

use crate::config::RunConfig;
use crate::error::MangaPdfError;
use crate::model::{self, ChapterRef, ImageAsset, SeriesMetadata};
use crate::output::{RunOutput, RunResult, RunStats};
use crate::pipeline::acquire::{self, url_extension};
use crate::pipeline::cache::ContentCache;
use crate::pipeline::extract;
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::font::FontFace;
use crate::pipeline::layout::DocumentLayout;
use crate::pipeline::normalize;
use crate::pipeline::pdf;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

// ── Naming scheme ───────────────────────────────────────────────────────

/// `<series_url>/v<volume>/c<index>`, ignoring a trailing `/` on the series
/// URL.
pub fn chapter_url(series_url: &str, chapter: &ChapterRef) -> String {
    format!(
        "{}/v{}/c{}",
        series_url.trim_end_matches('/'),
        chapter.volume,
        chapter.index
    )
}

/// Working directory name for a chapter's images: `<slug>-v<volume>-c<index>`.
pub fn chapter_dir_name(slug: &str, chapter: &ChapterRef) -> String {
    format!("{}-v{}-c{}", slug, chapter.volume, chapter.index)
}

/// `<slug>-v<volume>.pdf`
pub fn output_file_name(slug: &str, volume: &str) -> String {
    format!("{}-v{}.pdf", slug, volume)
}

// ── Series ──────────────────────────────────────────────────────────────

/// Fetch a series page (through the cache) and extract its metadata.
///
/// The cover is best effort: a page without one, or a cover that fails to
/// download or normalize, yields `cover: None`.
pub async fn fetch_series(series_url: &str, config: &RunConfig) -> Result<SeriesMetadata, MangaPdfError> {
    info!("Fetching series: {}", series_url);
    let fetcher = Fetcher::new(config)?;
    let cache = ContentCache::new(config.cache_dir(), fetcher.clone());

    let html = cache.fetch_cached_text(series_url).await?;
    let series = extract::series(html.clone(), config.sandbox).await?;
    info!(
        "Series '{}' ({}): {} volume(s)",
        series.display_name,
        series.slug,
        series.chapters_by_volume.len()
    );

    let cover = fetch_cover(&fetcher, config, series_url, &series.slug, html).await;

    Ok(SeriesMetadata {
        display_name: series.display_name,
        slug: series.slug,
        cover,
        chapters_by_volume: series.chapters_by_volume,
    })
}

async fn fetch_cover(
    fetcher: &Fetcher,
    config: &RunConfig,
    series_url: &str,
    slug: &str,
    html: String,
) -> Option<ImageAsset> {
    let src = match extract::cover_url(html).await {
        Ok(Some(src)) => src,
        Ok(None) => {
            info!("Cover image not found");
            return None;
        }
        Err(e) => {
            warn!("Cover lookup failed: {}", e);
            return None;
        }
    };

    // Relative `src` values resolve against the series page.
    let url = reqwest::Url::parse(series_url)
        .and_then(|base| base.join(&src))
        .map(|u| u.to_string())
        .unwrap_or(src);
    debug!("Cover image: {}", url);

    let dest = config
        .tmp_dir()
        .join(format!("{}_cover{}", slug, url_extension(&url)));
    let tool = config.image_tool.as_ref();

    let result = async {
        acquire::fetch_image(fetcher, tool, &url, &dest).await?;
        normalize::normalize(tool, &dest, config.jpeg_quality).await
    }
    .await;

    match result {
        Ok(asset) => Some(asset),
        Err(e) => {
            warn!("Error loading cover image: {}", e);
            None
        }
    }
}

/// Volume labels, ascending by numeric value.
pub fn list_volumes(series: &SeriesMetadata) -> Result<Vec<String>, MangaPdfError> {
    let mut labels: Vec<String> = series.chapters_by_volume.keys().cloned().collect();
    model::sort_volume_labels(&mut labels)?;
    Ok(labels)
}

/// Chapters of `volume` in ascending chapter order.
///
/// The lookup is exact string equality on the extracted label, so `"1.0"`
/// does not select volume `"1"`.
pub fn select_chapters(series: &SeriesMetadata, volume: &str) -> Result<Vec<ChapterRef>, MangaPdfError> {
    let mut chapters = series
        .chapters_by_volume
        .get(volume)
        .cloned()
        .ok_or_else(|| MangaPdfError::VolumeNotFound {
            volume: volume.to_string(),
        })?;
    model::sort_chapters(&mut chapters)?;
    Ok(chapters)
}

// ── Volume build ────────────────────────────────────────────────────────

/// Build the PDF for one volume of an already-fetched series.
///
/// # Errors
/// The first fatal error of any chapter, verbatim. Nothing is written to
/// `output_dir` in that case.
pub async fn build_volume(
    series_url: &str,
    series: &SeriesMetadata,
    volume: &str,
    output_dir: &Path,
    config: &RunConfig,
) -> RunResult {
    let total_start = Instant::now();
    let chapters = select_chapters(series, volume)?;
    let total_chapters = chapters.len();
    info!(
        "Building '{}' volume {} ({} chapters)",
        series.display_name, volume, total_chapters
    );

    let fetcher = Fetcher::new(config)?;
    let font = FontFace::load(config.font_path.as_deref())?;
    let missing = font.missing_glyphs(&series.display_name);
    if !missing.is_empty() {
        warn!(
            "Title font has no glyphs for {:?}; they will not render",
            missing.iter().collect::<String>()
        );
    }
    let cache = ContentCache::new(config.cache_dir(), fetcher.clone());
    let tool = config.image_tool.as_ref();
    let progress = config.progress_callback.as_ref();

    if let Some(cb) = progress {
        cb.on_run_start(total_chapters);
    }

    let mut layout = DocumentLayout::new(series.display_name.clone());
    let mut stats = RunStats::default();
    let mut download_ms = 0u64;
    let mut normalize_ms = 0u64;

    for (i, chapter) in chapters.iter().enumerate() {
        let label = chapter.label();
        if let Some(cb) = progress {
            cb.on_chapter_start(i + 1, total_chapters, &label);
        }

        // ── Step 1: Chapter page ─────────────────────────────────────────
        let url = chapter_url(series_url, chapter);
        let html = cache.fetch_cached_text(&url).await?;
        let pages = extract::chapter(html, config.sandbox).await?;
        debug!("{}: {} page(s)", label, pages.len());

        // ── Step 2: Sequential download with mirror fallback ─────────────
        let dir = config.tmp_dir().join(chapter_dir_name(&series.slug, chapter));
        let started = Instant::now();
        let downloaded =
            acquire::download_chapter(&fetcher, tool, &dir, &label, &pages, progress).await?;
        download_ms += started.elapsed().as_millis() as u64;

        // ── Step 3: Parallel normalization, back in page order ───────────
        let started = Instant::now();
        let assets = normalize::normalize_chapter(
            tool,
            &downloaded,
            config.jpeg_quality,
            config.concurrency,
            &label,
            progress,
        )
        .await?;
        normalize_ms += started.elapsed().as_millis() as u64;

        // ── Step 4: Title sheet + one sheet per page ─────────────────────
        layout.push_chapter(series, volume, chapter, &assets, &font);
        stats.chapters += 1;
        stats.pages += assets.len();

        if let Some(cb) = progress {
            cb.on_chapter_complete(i + 1, total_chapters, assets.len());
        }
    }

    // ── Step 5: Serialise once ───────────────────────────────────────────
    stats.sheets = layout.sheet_count();
    let output_path = output_dir.join(output_file_name(&series.slug, volume));
    info!("Making PDF: {}", output_path.display());
    let started = Instant::now();
    pdf::write_pdf(layout, font, output_path.clone()).await?;

    stats.write_duration_ms = started.elapsed().as_millis() as u64;
    stats.download_duration_ms = download_ms;
    stats.normalize_duration_ms = normalize_ms;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    if let Some(cb) = progress {
        cb.on_run_complete(&output_path);
    }
    info!(
        "Done: {} chapters, {} pages, {} sheets in {}ms",
        stats.chapters, stats.pages, stats.sheets, stats.total_duration_ms
    );

    Ok(RunOutput { output_path, stats })
}

/// Fetch the series and build one volume.
///
/// This is the primary entry point for the library.
///
/// # Example
/// ```rust,no_run
/// use mangalib_pdf::{convert, RunConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = RunConfig::default();
///     let out = convert("https://mangalib.me/berserk", "1", ".", &config).await?;
///     println!("{}", out.output_path.display());
///     Ok(())
/// }
/// ```
pub async fn convert(
    series_url: &str,
    volume: &str,
    output_dir: impl AsRef<Path>,
    config: &RunConfig,
) -> RunResult {
    let series = fetch_series(series_url, config).await?;
    build_volume(series_url, &series, volume, output_dir.as_ref(), config).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    series_url: &str,
    volume: &str,
    output_dir: impl AsRef<Path>,
    config: &RunConfig,
) -> RunResult {
    tokio::runtime::Runtime::new()
        .map_err(|e| MangaPdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(series_url, volume, output_dir, config))
}

// ── Background worker ───────────────────────────────────────────────────

/// Completion handle for a run started with [`spawn_run`].
///
/// The result is delivered exactly once; `wait` consumes the handle.
#[derive(Debug)]
pub struct RunHandle {
    rx: oneshot::Receiver<RunResult>,
}

impl RunHandle {
    /// Wait for the run to finish and take its result.
    pub async fn wait(self) -> RunResult {
        self.rx
            .await
            .map_err(|_| MangaPdfError::Internal("Run worker exited without a result".into()))?
    }
}

/// Build a volume on a background tokio task.
///
/// Must be called from within a tokio runtime. There is no cancellation:
/// the run proceeds to completion or to its first fatal error.
pub fn spawn_run(
    series_url: impl Into<String>,
    series: SeriesMetadata,
    volume: impl Into<String>,
    output_dir: impl Into<PathBuf>,
    config: RunConfig,
) -> RunHandle {
    let (tx, rx) = oneshot::channel();
    let series_url = series_url.into();
    let volume = volume.into();
    let output_dir = output_dir.into();

    tokio::spawn(async move {
        let result = build_volume(&series_url, &series, &volume, &output_dir, &config).await;
        if let Err(ref e) = result {
            warn!("Run failed: {}", e);
        }
        // The receiver may have been dropped; nobody is left to tell.
        let _ = tx.send(result);
    });

    RunHandle { rx }
}
