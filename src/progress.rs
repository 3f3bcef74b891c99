//! Progress-callback trait for per-chapter and per-page run events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::RunConfigBuilder::progress_callback`] to receive events
//! as the orchestrator walks the selected volume.
//!
//! Downloads are sequential, but normalization fans out, so
//! `on_page_normalized` is called from concurrently polled futures in
//! completion order, not page order.
//!
//! # Example
//!
//! ```rust
//! use mangalib_pdf::{RunConfig, RunProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter(AtomicUsize);
//!
//! impl RunProgressCallback for PageCounter {
//!     fn on_page_normalized(&self, _page_index: u32, _total_pages: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = RunConfig::builder()
//!     .progress_callback(Arc::new(PageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the orchestrator as it processes a volume.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait RunProgressCallback: Send + Sync {
    /// Called once the chapter list of the selected volume is known.
    fn on_run_start(&self, total_chapters: usize) {
        let _ = total_chapters;
    }

    /// Called before a chapter page is fetched.
    ///
    /// # Arguments
    /// * `chapter_num`: 1-indexed position within the volume
    /// * `label`: e.g. `v1 c3`
    fn on_chapter_start(&self, chapter_num: usize, total_chapters: usize, label: &str) {
        let _ = (chapter_num, total_chapters, label);
    }

    /// Called after a page image has been downloaded and verified.
    fn on_page_downloaded(&self, page_index: u32, total_pages: usize) {
        let _ = (page_index, total_pages);
    }

    /// Called after a page image has been normalized.
    fn on_page_normalized(&self, page_index: u32, total_pages: usize) {
        let _ = (page_index, total_pages);
    }

    /// Called after a chapter's sheets have been laid out.
    fn on_chapter_complete(&self, chapter_num: usize, total_chapters: usize, pages: usize) {
        let _ = (chapter_num, total_chapters, pages);
    }

    /// Called once the document has been written.
    fn on_run_complete(&self, output_path: &Path) {
        let _ = output_path;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RunConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        chapters: AtomicUsize,
        downloaded: AtomicUsize,
        normalized: AtomicUsize,
        labels: Mutex<Vec<String>>,
    }

    impl RunProgressCallback for TrackingCallback {
        fn on_chapter_start(&self, _chapter_num: usize, _total: usize, label: &str) {
            self.chapters.fetch_add(1, Ordering::SeqCst);
            self.labels.lock().unwrap().push(label.to_string());
        }

        fn on_page_downloaded(&self, _page_index: u32, _total_pages: usize) {
            self.downloaded.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_normalized(&self, _page_index: u32, _total_pages: usize) {
            self.normalized.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(2);
        cb.on_chapter_start(1, 2, "v1 c1");
        cb.on_page_downloaded(1, 10);
        cb.on_page_normalized(1, 10);
        cb.on_chapter_complete(1, 2, 10);
        cb.on_run_complete(Path::new("/tmp/x-v1.pdf"));
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_chapter_start(1, 2, "v1 c1");
        tracker.on_page_downloaded(1, 2);
        tracker.on_page_downloaded(2, 2);
        tracker.on_page_normalized(2, 2);
        tracker.on_chapter_start(2, 2, "v1 c2");

        assert_eq!(tracker.chapters.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.downloaded.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.normalized.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.labels.lock().unwrap(), vec!["v1 c1", "v1 c2"]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
        cb.on_page_normalized(3, 10);
    }
}
