//! Image acquisition: download one page image, verify it, mark it done.
//!
//! A download is complete only when a sibling `<file>.done` marker exists.
//! The marker is written after the external identify check passes, so a
//! truncated or corrupt download is never reused by a later run.

use crate::error::{MangaPdfError, PageError};
use crate::model::PageSpec;
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::tool::{self, ImageTool};
use crate::progress::ProgressCallback;
use futures::StreamExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Marker file content. Only its presence is ever checked.
pub const MARKER_BYTES: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

/// `path` with `suffix` appended to the full file name (`1.png` → `1.png.done`).
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}

/// Completion marker for `dest`.
pub fn marker_path(dest: &Path) -> PathBuf {
    with_suffix(dest, ".done")
}

/// Download `url` to `dest`, verify it and write the completion marker.
///
/// A no-op when both `dest` and its marker already exist. When verification
/// fails the downloaded file is left in place and no marker is written.
pub async fn fetch_image(
    fetcher: &Fetcher,
    tool: &dyn ImageTool,
    url: &str,
    dest: &Path,
) -> Result<(), MangaPdfError> {
    let marker = marker_path(dest);
    if dest.exists() && marker.exists() {
        debug!("Already downloaded: {}", dest.display());
        return Ok(());
    }

    info!("Downloading {} → {}", url, dest.display());
    let response = fetcher.get(url).await?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MangaPdfError::io(parent, e))?;
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| MangaPdfError::io(dest, e))?;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| fetcher.transport_error(url, e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| MangaPdfError::io(dest, e))?;
    }
    file.flush().await.map_err(|e| MangaPdfError::io(dest, e))?;
    drop(file);

    if !tool::identify(tool, dest).await? {
        return Err(MangaPdfError::CorruptImage {
            url: url.to_string(),
            path: dest.to_path_buf(),
        });
    }

    tokio::fs::write(&marker, MARKER_BYTES)
        .await
        .map_err(|e| MangaPdfError::io(&marker, e))?;
    Ok(())
}

/// Extension of the URL's path including the dot, or `""`.
///
/// Query strings and fragments are ignored; anything that is not a short
/// alphanumeric suffix is dropped so it cannot escape the page file name.
pub fn url_extension(url: &str) -> String {
    let path = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let file_name = path.rsplit('/').next().unwrap_or_default();
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => {
            let ext = &file_name[dot + 1..];
            if !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                format!(".{ext}")
            } else {
                String::new()
            }
        }
        _ => String::new(),
    }
}

/// A page image that was downloaded and verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedPage {
    pub page_index: u32,
    pub path: PathBuf,
}

/// Download every page of a chapter into `dir`, one page at a time.
///
/// Each page walks its mirror candidates in order until one succeeds. A page
/// whose candidates all fail aborts the chapter with
/// [`MangaPdfError::ChapterFailed`]; no partial chapter is returned. A tool
/// that cannot be started at all is returned as-is, since no mirror can fix
/// it.
pub async fn download_chapter(
    fetcher: &Fetcher,
    tool: &dyn ImageTool,
    dir: &Path,
    chapter_label: &str,
    pages: &[PageSpec],
    progress: Option<&ProgressCallback>,
) -> Result<Vec<DownloadedPage>, MangaPdfError> {
    info!("Downloading chapter {} ({} pages)", chapter_label, pages.len());
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| MangaPdfError::io(dir, e))?;

    let total = pages.len();
    let mut downloaded = Vec::with_capacity(total);

    for page in pages {
        let mut last_error = String::from("no mirror candidates");
        let mut got = None;

        for url in &page.candidate_urls {
            let dest = dir.join(format!("{}{}", page.page_index, url_extension(url)));
            match fetch_image(fetcher, tool, url, &dest).await {
                Ok(()) => {
                    got = Some(dest);
                    break;
                }
                Err(e @ MangaPdfError::ToolUnavailable { .. }) => return Err(e),
                Err(e) => {
                    warn!("Error downloading page {} from {}: {}", page.page_index, url, e);
                    last_error = e.to_string();
                }
            }
        }

        let Some(path) = got else {
            return Err(MangaPdfError::ChapterFailed {
                chapter: chapter_label.to_string(),
                source: PageError::AllMirrorsFailed {
                    page: page.page_index,
                    attempts: page.candidate_urls.len(),
                    last_error,
                },
            });
        };

        if let Some(cb) = progress {
            cb.on_page_downloaded(page.page_index, total);
        }
        downloaded.push(DownloadedPage {
            page_index: page.page_index,
            path,
        });
    }

    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_comes_from_url_path() {
        assert_eq!(url_extension("https://img.lib/a/b/01.png"), ".png");
        assert_eq!(url_extension("https://img.lib/a/b/01.JPEG?x=1.gif#f"), ".JPEG");
        assert_eq!(url_extension("https://img.lib/a/b/01"), "");
        assert_eq!(url_extension("https://img.lib/a.dir/01"), "");
        assert_eq!(url_extension("https://img.lib/a/.hidden"), "");
        assert_eq!(url_extension("https://img.lib/a/x.p/ng"), "");
        assert_eq!(url_extension("relative/3.webp?v=2"), ".webp");
    }

    #[test]
    fn marker_sits_next_to_file() {
        assert_eq!(
            marker_path(Path::new("/tmp/s-v1-c1/3.png")),
            PathBuf::from("/tmp/s-v1-c1/3.png.done")
        );
        assert_eq!(
            marker_path(Path::new("/tmp/s-v1-c1/3")),
            PathBuf::from("/tmp/s-v1-c1/3.done")
        );
    }
}
