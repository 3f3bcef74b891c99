//! Sandboxed extraction of embedded page state.
//!
//! MangaLib renders its pages client-side: the series and chapter data live
//! in inline `<script>` blocks that assign to `window.__DATA__`,
//! `window.__pg` and `window.__info`. Each extraction call:
//!
//! 1. parses the HTML (best effort, never fails),
//! 2. creates a fresh QuickJS runtime with a memory limit and an interrupt
//!    deadline, and defines an empty `window` object,
//! 3. evaluates, in document order, only the scripts that mention one of the
//!    bootstrap markers; a script that throws is logged and skipped,
//! 4. evaluates one of the two fixed [`Projection`]s and returns its
//!    `JSON.stringify` text, which is decoded into a typed structure.
//!
//! A projection that throws or yields nothing, or JSON that does not match
//! the expected shape, is fatal. Nothing survives between calls.
//!
//! Everything here is synchronous and CPU-bound; the async wrappers at the
//! bottom move the work onto the blocking pool.

use crate::config::SandboxLimits;
use crate::error::MangaPdfError;
use crate::model::{ChapterContent, ChapterRef};
use once_cell::sync::Lazy;
use rquickjs::{CatchResultExt, Context, Runtime, Value};
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Substrings identifying the data-bootstrapping scripts.
pub const SCRIPT_MARKERS: [&str; 3] = ["window.__DATA__", "window.__pg", "window.__info"];

static SCRIPT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script").expect("valid selector"));

static COVER_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".media-sidebar__cover img").expect("valid selector"));

/// The two projections the extractor knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Series page → name, slug and chapters grouped by volume.
    Series,
    /// Chapter page → pages with their mirror URLs.
    Chapter,
}

impl Projection {
    fn expression(self) -> &'static str {
        match self {
            Projection::Series => SERIES_PROJECTION,
            Projection::Chapter => CHAPTER_PROJECTION,
        }
    }
}

const SERIES_PROJECTION: &str = r#"(() => {
  const data = window.__DATA__;
  const manga = data.manga;
  return {
    name: manga.rusName || manga.engName || manga.slug,
    slug: String(manga.slug),
    chaptersByVolume: data.chapters.list.reduce((rv, x) => {
      const volume = String(x.chapter_volume);
      (rv[volume] = rv[volume] || []).push({
        name: x.chapter_name == null ? '' : String(x.chapter_name),
        index: String(x.chapter_number),
        volume,
      });
      return rv;
    }, {}),
  };
})()"#;

// Server iteration order is the mirror fallback order.
const CHAPTER_PROJECTION: &str = r#"window.__pg.map(pg => ({
  index: pg.p,
  urls: Object.values(window.__info.servers).map(srv => srv + window.__info.img.url + pg.u),
}))"#;

/// Decoded series projection. The cover is located separately.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeriesInfo {
    #[serde(rename = "name")]
    pub display_name: String,
    pub slug: String,
    #[serde(rename = "chaptersByVolume")]
    pub chapters_by_volume: BTreeMap<String, Vec<ChapterRef>>,
}

/// Collect the text of every marker script, in document order.
pub fn bootstrap_scripts(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    doc.select(&SCRIPT_SELECTOR)
        .map(|el| el.text().collect::<String>())
        .filter(|src| SCRIPT_MARKERS.iter().any(|m| src.contains(m)))
        .collect()
}

/// `src` of the first cover image on a series page, if any.
pub fn locate_cover(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&COVER_SELECTOR)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .map(str::to_string)
}

/// Run the page's bootstrap scripts, then `projection`, returning JSON text.
pub fn extract(
    html: &str,
    projection: Projection,
    limits: SandboxLimits,
) -> Result<String, MangaPdfError> {
    let scripts = bootstrap_scripts(html);
    debug!("Evaluating {} bootstrap script(s)", scripts.len());
    evaluate(&scripts, projection.expression(), limits)
}

/// Evaluate `scripts` in a fresh interpreter, then `JSON.stringify(expr)`.
fn evaluate(scripts: &[String], expr: &str, limits: SandboxLimits) -> Result<String, MangaPdfError> {
    let rt = Runtime::new().map_err(|e| MangaPdfError::SandboxFailed(e.to_string()))?;
    rt.set_memory_limit(limits.memory_limit_bytes);
    let deadline = Instant::now() + Duration::from_millis(limits.script_time_budget_ms);
    rt.set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)));

    let ctx = Context::full(&rt).map_err(|e| MangaPdfError::SandboxFailed(e.to_string()))?;

    ctx.with(|ctx| {
        ctx.eval::<(), _>("var window = {};")
            .catch(&ctx)
            .map_err(|e| MangaPdfError::SandboxFailed(e.to_string()))?;

        for (i, script) in scripts.iter().enumerate() {
            if let Err(e) = ctx.eval::<Value, _>(script.as_str()).catch(&ctx) {
                warn!("Bootstrap script #{} failed, continuing: {}", i, e);
            }
        }

        let wrapped = format!("JSON.stringify(({expr}))");
        let json = ctx
            .eval::<Option<String>, _>(wrapped)
            .catch(&ctx)
            .map_err(|e| MangaPdfError::ProjectionFailed {
                detail: e.to_string(),
            })?;

        json.ok_or_else(|| MangaPdfError::ProjectionFailed {
            detail: "projection produced no value".into(),
        })
    })
}

/// Extract and decode the series projection.
pub fn extract_series(html: &str, limits: SandboxLimits) -> Result<SeriesInfo, MangaPdfError> {
    let json = extract(html, Projection::Series, limits)?;
    serde_json::from_str(&json).map_err(|source| MangaPdfError::ProjectionDecode { source })
}

/// Extract and decode the chapter projection, sorted by page index.
pub fn extract_chapter(html: &str, limits: SandboxLimits) -> Result<ChapterContent, MangaPdfError> {
    let json = extract(html, Projection::Chapter, limits)?;
    let mut pages: ChapterContent =
        serde_json::from_str(&json).map_err(|source| MangaPdfError::ProjectionDecode { source })?;
    pages.sort_by_key(|p| p.page_index);
    Ok(pages)
}

// ── Async wrappers ──────────────────────────────────────────────────────

/// [`extract_series`] on the blocking pool.
pub async fn series(html: String, limits: SandboxLimits) -> Result<SeriesInfo, MangaPdfError> {
    tokio::task::spawn_blocking(move || extract_series(&html, limits))
        .await
        .map_err(|e| MangaPdfError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// [`extract_chapter`] on the blocking pool.
pub async fn chapter(html: String, limits: SandboxLimits) -> Result<ChapterContent, MangaPdfError> {
    tokio::task::spawn_blocking(move || extract_chapter(&html, limits))
        .await
        .map_err(|e| MangaPdfError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// [`locate_cover`] on the blocking pool.
pub async fn cover_url(html: String) -> Result<Option<String>, MangaPdfError> {
    tokio::task::spawn_blocking(move || locate_cover(&html))
        .await
        .map_err(|e| MangaPdfError::Internal(format!("Cover lookup task panicked: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERIES_HTML: &str = r#"<!doctype html>
<html><head>
<script>window.dataLayer = []; throw new Error("analytics must never run");</script>
<script>
  window.__DATA__ = {"manga":{"rusName":"","engName":"Berserk","slug":"berserk"},
    "chapters":{"list":[
      {"chapter_name":"The Black Swordsman","chapter_number":"1","chapter_volume":1},
      {"chapter_name":null,"chapter_number":"2","chapter_volume":1},
      {"chapter_name":"Guardians","chapter_number":"10.5","chapter_volume":2}
    ]}};
</script>
</head><body>
<div class="media-sidebar__cover"><img src=" https://cover.lib/berserk.jpg " alt=""></div>
</body></html>"#;

    const CHAPTER_HTML: &str = r#"<html><body>
<script>window.__info = {"servers":{"main":"https://img1.lib","secondary":"https://img2.lib"},
  "img":{"url":"/manga/berserk/chapters/1/"}};</script>
<script>window.__pg = [{"p":2,"u":"02.png"},{"p":1,"u":"01.jpg"}];</script>
</body></html>"#;

    #[test]
    fn only_marker_scripts_are_selected() {
        let scripts = bootstrap_scripts(SERIES_HTML);
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains("window.__DATA__"));
    }

    #[test]
    fn series_projection_applies_name_fallback_and_grouping() {
        let info = extract_series(SERIES_HTML, SandboxLimits::default()).unwrap();
        assert_eq!(info.display_name, "Berserk");
        assert_eq!(info.slug, "berserk");
        assert_eq!(info.chapters_by_volume.len(), 2);

        let v1 = &info.chapters_by_volume["1"];
        assert_eq!(v1.len(), 2);
        assert_eq!(v1[0].name, "The Black Swordsman");
        assert_eq!(v1[1].name, "");
        assert_eq!(v1[1].index, "2");
        assert_eq!(info.chapters_by_volume["2"][0].index, "10.5");
        assert_eq!(info.chapters_by_volume["2"][0].volume, "2");
    }

    #[test]
    fn slug_is_last_resort_for_name() {
        let html = r#"<script>window.__DATA__ = {"manga":{"slug":"solo"},"chapters":{"list":[]}};</script>"#;
        let info = extract_series(html, SandboxLimits::default()).unwrap();
        assert_eq!(info.display_name, "solo");
        assert!(info.chapters_by_volume.is_empty());
    }

    #[test]
    fn chapter_projection_crosses_servers_and_sorts() {
        let pages = extract_chapter(CHAPTER_HTML, SandboxLimits::default()).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_index, 1);
        assert_eq!(
            pages[0].candidate_urls,
            vec![
                "https://img1.lib/manga/berserk/chapters/1/01.jpg",
                "https://img2.lib/manga/berserk/chapters/1/01.jpg",
            ]
        );
        assert_eq!(pages[1].page_index, 2);
    }

    #[test]
    fn failing_script_is_skipped() {
        let html = r#"
<script>window.__pg = undefinedFunction();</script>
<script>window.__DATA__ = {"manga":{"rusName":"Имя","slug":"s"},"chapters":{"list":[]}};</script>"#;
        let info = extract_series(html, SandboxLimits::default()).unwrap();
        assert_eq!(info.display_name, "Имя");
    }

    #[test]
    fn projection_error_is_fatal() {
        let err = extract_series("<html></html>", SandboxLimits::default()).unwrap_err();
        assert!(matches!(err, MangaPdfError::ProjectionFailed { .. }), "got {err:?}");
    }

    #[test]
    fn shape_mismatch_is_decode_error() {
        let html = r#"<script>window.__info = {"servers":{"a":"x"},"img":{"url":"/"}};
window.__pg = [{"p":"one","u":"1.png"}];</script>"#;
        let err = extract_chapter(html, SandboxLimits::default()).unwrap_err();
        assert!(matches!(err, MangaPdfError::ProjectionDecode { .. }), "got {err:?}");
    }

    #[test]
    fn runaway_script_is_interrupted() {
        let html = r#"<script>window.__DATA__ = 1; while (true) {}</script>"#;
        let limits = SandboxLimits {
            script_time_budget_ms: 50,
            ..SandboxLimits::default()
        };
        let started = Instant::now();
        let err = extract_series(html, limits).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(err, MangaPdfError::ProjectionFailed { .. }));
    }

    #[test]
    fn calls_do_not_share_state() {
        extract_series(SERIES_HTML, SandboxLimits::default()).unwrap();
        let err = extract_series("<p>no scripts</p>", SandboxLimits::default()).unwrap_err();
        assert!(matches!(err, MangaPdfError::ProjectionFailed { .. }));
    }

    #[test]
    fn cover_src_is_trimmed() {
        assert_eq!(
            locate_cover(SERIES_HTML).as_deref(),
            Some("https://cover.lib/berserk.jpg")
        );
        assert_eq!(locate_cover("<img src='x.jpg'>"), None);
    }
}
