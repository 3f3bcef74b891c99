//! Content cache: URL → raw bytes on disk.
//!
//! The key is the MD5 of the URL, not of the content, so a hit never touches
//! the network. Entries never expire. Writes go through a temp file in the
//! cache directory and a rename, so two runs racing on the same key both
//! leave a complete entry behind.

use crate::error::MangaPdfError;
use crate::pipeline::fetch::Fetcher;
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Hex MD5 digest of `url`, used as the cache file name.
pub fn cache_key(url: &str) -> String {
    format!("{:x}", Md5::digest(url.as_bytes()))
}

/// Disk-backed cache of fetched pages.
#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
    fetcher: Fetcher,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>, fetcher: Fetcher) -> Self {
        Self {
            dir: dir.into(),
            fetcher,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the bytes for `url` live (whether or not they exist yet).
    pub fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(cache_key(url))
    }

    /// Return the cached bytes for `url`, fetching and storing them on a miss.
    ///
    /// Failed fetches are never cached.
    pub async fn fetch_cached(&self, url: &str) -> Result<Vec<u8>, MangaPdfError> {
        let path = self.entry_path(url);

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("Cache hit for {} ({})", url, path.display());
                return Ok(bytes);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(MangaPdfError::io(&path, e)),
        }

        info!("Cache miss, fetching {}", url);
        let bytes = self.fetcher.get_bytes(url).await?;
        self.store(&path, &bytes).await?;
        Ok(bytes)
    }

    /// Convenience wrapper decoding the body as UTF-8 (lossy).
    pub async fn fetch_cached_text(&self, url: &str) -> Result<String, MangaPdfError> {
        let bytes = self.fetch_cached(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn store(&self, path: &Path, bytes: &[u8]) -> Result<(), MangaPdfError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| MangaPdfError::io(&self.dir, e))?;

        let dir = self.dir.clone();
        let path = path.to_path_buf();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || -> Result<(), MangaPdfError> {
            use std::io::Write;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| MangaPdfError::io(&dir, e))?;
            tmp.write_all(&bytes).map_err(|e| MangaPdfError::io(tmp.path(), e))?;
            tmp.persist(&path).map_err(|e| MangaPdfError::io(&path, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| MangaPdfError::Internal(format!("Cache write task panicked: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;

    fn cache_in(dir: &Path) -> ContentCache {
        let fetcher = Fetcher::new(&RunConfig::default()).unwrap();
        ContentCache::new(dir, fetcher)
    }

    #[test]
    fn key_is_md5_of_url() {
        assert_eq!(cache_key(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            cache_key("https://mangalib.me/berserk"),
            cache_key("https://mangalib.me/berserk")
        );
        assert_ne!(cache_key("https://a/1"), cache_key("https://a/2"));
        assert_eq!(cache_key("x").len(), 32);
    }

    #[tokio::test]
    async fn hit_returns_stored_bytes_without_network() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path());
        // Unroutable URL: a miss would fail.
        let url = "http://127.0.0.1:1/never-fetched";
        std::fs::write(cache.entry_path(url), b"<html>cached</html>").unwrap();

        let body = cache.fetch_cached_text(url).await.unwrap();
        assert_eq!(body, "<html>cached</html>");
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path());
        let url = "http://127.0.0.1:1/missing";
        assert!(cache.fetch_cached(url).await.is_err());
        assert!(!cache.entry_path(url).exists());
    }
}
