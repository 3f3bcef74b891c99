//! Format normalization: re-encode each page to JPEG and read its size.
//!
//! `normalize` is memoized by its output: a target that already exists and
//! passes identify is reused, so a second run performs no conversions. A
//! target left corrupt by an earlier crash fails identify and is rebuilt.
//!
//! Within a chapter, pages are normalized concurrently (one future per page
//! unless a cap is configured) and collected back into page order.

use crate::error::{MangaPdfError, PageError};
use crate::model::ImageAsset;
use crate::pipeline::acquire::{with_suffix, DownloadedPage};
use crate::pipeline::tool::{self, ImageTool};
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `<source>.jpg`
pub fn target_path(source: &Path) -> PathBuf {
    with_suffix(source, ".jpg")
}

/// Normalize one image and report its pixel dimensions.
pub async fn normalize(
    tool: &dyn ImageTool,
    source: &Path,
    quality: u8,
) -> Result<ImageAsset, MangaPdfError> {
    let target = target_path(source);

    let reusable = target.exists() && tool::identify(tool, &target).await?;
    if reusable {
        debug!("Reusing normalized image {}", target.display());
    } else {
        debug!("Converting {} → {}", source.display(), target.display());
        if !tool::convert_first_frame(tool, source, &target, quality).await? {
            return Err(MangaPdfError::ConversionFailed {
                path: source.to_path_buf(),
            });
        }
    }

    let (width, height) = tool::dimensions(tool, &target).await?;
    Ok(ImageAsset {
        local_path: target,
        width,
        height,
    })
}

/// Drive index-tagged futures with at most `cap` in flight and return every
/// result sorted by index, whatever order they completed in.
pub async fn collect_ordered<F, T>(jobs: Vec<(u32, F)>, cap: usize) -> Vec<(u32, T)>
where
    F: Future<Output = T>,
{
    let mut results: Vec<(u32, T)> = stream::iter(jobs)
        .map(|(idx, fut)| async move { (idx, fut.await) })
        .buffer_unordered(cap.max(1))
        .collect()
        .await;
    results.sort_by_key(|(idx, _)| *idx);
    results
}

/// Normalize every downloaded page of a chapter concurrently.
///
/// All `pages.len()` results are drained before deciding. The first failure
/// in page order fails the whole chapter; a tool that cannot be started is
/// returned as-is.
pub async fn normalize_chapter(
    tool: &dyn ImageTool,
    pages: &[DownloadedPage],
    quality: u8,
    concurrency: Option<usize>,
    chapter_label: &str,
    progress: Option<&ProgressCallback>,
) -> Result<Vec<ImageAsset>, MangaPdfError> {
    let total = pages.len();
    let cap = concurrency.unwrap_or(total);
    info!(
        "Normalizing {} page(s) of {} ({} in flight)",
        total,
        chapter_label,
        cap.max(1).min(total.max(1))
    );

    let jobs = pages
        .iter()
        .map(|page| {
            let fut = async move {
                let res = normalize(tool, &page.path, quality).await;
                if res.is_ok() {
                    if let Some(cb) = progress {
                        cb.on_page_normalized(page.page_index, total);
                    }
                }
                res
            };
            (page.page_index, fut)
        })
        .collect();

    let mut assets = Vec::with_capacity(total);
    for (page, result) in collect_ordered(jobs, cap).await {
        match result {
            Ok(asset) => assets.push(asset),
            Err(e @ MangaPdfError::ToolUnavailable { .. }) => return Err(e),
            Err(e) => {
                return Err(MangaPdfError::ChapterFailed {
                    chapter: chapter_label.to_string(),
                    source: PageError::NormalizeFailed {
                        page,
                        detail: e.to_string(),
                    },
                })
            }
        }
    }
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn target_keeps_source_extension() {
        assert_eq!(
            target_path(Path::new("/t/c1/4.webp")),
            PathBuf::from("/t/c1/4.webp.jpg")
        );
        assert_eq!(target_path(Path::new("/t/c1/4")), PathBuf::from("/t/c1/4.jpg"));
    }

    #[tokio::test]
    async fn fan_in_is_sorted_regardless_of_completion_order() {
        // Later indices finish first.
        let jobs: Vec<(u32, _)> = (0..8u32)
            .map(|i| {
                (i, async move {
                    tokio::time::sleep(Duration::from_millis(u64::from(8 - i) * 5)).await;
                    i * 10
                })
            })
            .collect();
        let out = collect_ordered(jobs, 8).await;
        let idx: Vec<u32> = out.iter().map(|(i, _)| *i).collect();
        assert_eq!(idx, (0..8).collect::<Vec<_>>());
        assert!(out.iter().all(|(i, v)| *v == i * 10));
    }

    #[tokio::test]
    async fn fan_in_respects_cap_of_one() {
        async fn label(s: &'static str) -> &'static str {
            s
        }
        let jobs = vec![(2, label("b")), (1, label("a"))];
        let out = collect_ordered(jobs, 0).await;
        assert_eq!(out, vec![(1, "a"), (2, "b")]);
    }
}
