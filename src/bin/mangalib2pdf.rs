//! CLI binary for mangalib-pdf.
//!
//! A thin shim over the library crate that maps CLI flags to `RunConfig`,
//! lists volumes or builds one, and prints the result.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mangalib_pdf::{
    build_volume, fetch_series, list_volumes, select_chapters, Magick, ProgressCallback,
    RunConfig, RunProgressCallback, SandboxLimits,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live bar over the chapters of the volume, with one log line per chapter.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_chapters: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chapters  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_chapters as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Building");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Building {total_chapters} chapter(s)…"))
        ));
    }

    fn on_chapter_start(&self, _chapter_num: usize, _total: usize, label: &str) {
        self.bar.set_message(format!("{label}: downloading"));
    }

    fn on_page_downloaded(&self, page_index: u32, total_pages: usize) {
        self.bar
            .set_message(format!("page {page_index}/{total_pages} downloaded"));
    }

    fn on_page_normalized(&self, page_index: u32, total_pages: usize) {
        self.bar
            .set_message(format!("page {page_index}/{total_pages} converted"));
    }

    fn on_chapter_complete(&self, chapter_num: usize, total: usize, pages: usize) {
        self.bar.println(format!(
            "  {} Chapter {:>3}/{:<3}  {}",
            green("✓"),
            chapter_num,
            total,
            dim(&format!("{pages:>4} pages")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, output_path: &Path) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", green("✔"), bold(&output_path.display().to_string()));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Show the series name and its volumes
  mangalib2pdf https://mangalib.me/berserk --list-volumes

  # Build volume 3 into ./berserk-v3.pdf
  mangalib2pdf https://mangalib.me/berserk --volume 3

  # Into another directory, with a different title font
  mangalib2pdf https://mangalib.me/berserk -v 3 -o ~/manga --font PTRootUI.ttf

  # Machine-readable result
  mangalib2pdf https://mangalib.me/berserk -v 3 --json

ENVIRONMENT VARIABLES:
  MANGALIB_CACHE_DIR   Cache root (default: the user cache directory)
  MANGALIB_MAGICK      ImageMagick 7 binary (default: magick on PATH)
  RUST_LOG             tracing filter, e.g. mangalib_pdf=debug

FILES:
  <cache>/mangalib/cache/<md5>        cached series and chapter pages
  <cache>/mangalib/tmp/...            downloaded and converted images
"#;

#[derive(Parser, Debug)]
#[command(
    name = "mangalib2pdf",
    version,
    about = "Turn a MangaLib series volume into a single PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Series page URL, e.g. https://mangalib.me/berserk
    url: String,

    /// Print series info and the available volumes, then exit.
    #[arg(long)]
    list_volumes: bool,

    /// Volume label to build, exactly as listed by --list-volumes.
    #[arg(short = 'v', long, env = "MANGALIB_VOLUME")]
    volume: Option<String>,

    /// Output directory for <slug>-v<volume>.pdf.
    #[arg(short, long, env = "MANGALIB_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Cache root; `mangalib/` is created beneath it.
    #[arg(long, env = "MANGALIB_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// ImageMagick 7 binary.
    #[arg(long, env = "MANGALIB_MAGICK")]
    magick: Option<PathBuf>,

    #[arg(long, env = "MANGALIB_QUALITY", default_value_t = 75,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Maximum concurrent conversions per chapter (default: one per page).
    #[arg(short, long, env = "MANGALIB_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Per-request timeout in seconds (default: none).
    #[arg(long, env = "MANGALIB_DOWNLOAD_TIMEOUT")]
    download_timeout: Option<u64>,

    #[arg(long, env = "MANGALIB_REFERER")]
    referer: Option<String>,

    /// TrueType font for title sheets (default: bundled DejaVu Sans).
    #[arg(long, env = "MANGALIB_FONT")]
    font: Option<PathBuf>,

    /// Script time budget for page extraction, in milliseconds.
    #[arg(long, env = "MANGALIB_SCRIPT_BUDGET_MS", default_value_t = 10_000)]
    script_budget_ms: u64,

    #[arg(long, env = "MANGALIB_JSON")]
    json: bool,

    #[arg(long, env = "MANGALIB_NO_PROGRESS")]
    no_progress: bool,

    #[arg(long, env = "MANGALIB_VERBOSE")]
    verbose: bool,

    #[arg(short, long, env = "MANGALIB_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs are suppressed while the progress bar is drawing.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list_volumes;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Config ───────────────────────────────────────────────────────────
    let mut builder = RunConfig::builder()
        .jpeg_quality(cli.quality)
        .sandbox(SandboxLimits {
            script_time_budget_ms: cli.script_budget_ms,
            ..SandboxLimits::default()
        });
    if let Some(ref dir) = cli.cache_dir {
        builder = builder.cache_root(dir);
    }
    if let Some(ref magick) = cli.magick {
        builder = builder.image_tool(Arc::new(Magick::new(magick)));
    }
    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(secs) = cli.download_timeout {
        builder = builder.download_timeout_secs(secs);
    }
    if let Some(ref referer) = cli.referer {
        builder = builder.referer(referer);
    }
    if let Some(ref font) = cli.font {
        builder = builder.font_path(font);
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Series ───────────────────────────────────────────────────────────
    let series = fetch_series(&cli.url, &config)
        .await
        .with_context(|| format!("Failed to read series page {}", cli.url))?;

    if cli.list_volumes {
        let volumes = list_volumes(&series).context("Failed to list volumes")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&series).context("Failed to serialize series")?
            );
            return Ok(());
        }
        println!("Name:     {}", series.display_name);
        println!("Slug:     {}", series.slug);
        match series.cover {
            Some(ref c) => println!("Cover:    {} ({}x{})", c.local_path.display(), c.width, c.height),
            None => println!("Cover:    -"),
        }
        println!("Volumes:");
        for v in &volumes {
            let n = select_chapters(&series, v)?.len();
            println!("  {v:<8} {n} chapter(s)");
        }
        return Ok(());
    }

    let Some(volume) = cli.volume.as_deref() else {
        bail!("No volume selected (use --volume, see --list-volumes)");
    };

    // ── Build ────────────────────────────────────────────────────────────
    let output = build_volume(&cli.url, &series, volume, &cli.output, &config)
        .await
        .with_context(|| format!("Failed to build volume {volume}"))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialize result")?
        );
    } else {
        println!("{}", output.output_path.display());
        if !cli.quiet {
            eprintln!(
                "{}",
                dim(&format!(
                    "{} chapters, {} pages, {} sheets in {:.1}s",
                    output.stats.chapters,
                    output.stats.pages,
                    output.stats.sheets,
                    output.stats.total_duration_ms as f64 / 1000.0
                ))
            );
        }
    }
    Ok(())
}
