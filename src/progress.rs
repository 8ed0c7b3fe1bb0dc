//! Progress-callback trait for per-item convert events.
//!
//! The task registry is the source of truth for progress queries. This trait
//! is an additional push channel: inject an
//! [`Arc<dyn StageProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the convert stage walks its batch. The CLI uses it to drive a
//! terminal progress bar.
//!
//! # Example
//!
//! ```rust
//! use pdfbatch::{PipelineConfig, StageProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl StageProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, index: usize, total: usize, item: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{item} ({index}/{total}) done");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn StageProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the convert stage as it processes each item.
///
/// Items are converted strictly one at a time, so calls arrive in order, but
/// several tasks may convert concurrently on different threads: keep any
/// shared state behind `Mutex`/atomics.
pub trait StageProgressCallback: Send + Sync {
    /// Called once after discovery, before the conversion session opens.
    fn on_convert_start(&self, total: usize) {
        let _ = total;
    }

    /// Called just before an item is handed to the converter.
    ///
    /// # Arguments
    /// * `index`: 1-indexed position in the batch
    /// * `total`: batch size
    /// * `item`: file name of the source document
    fn on_item_start(&self, index: usize, total: usize, item: &str) {
        let _ = (index, total, item);
    }

    /// Called when an item converted successfully.
    fn on_item_complete(&self, index: usize, total: usize, item: &str) {
        let _ = (index, total, item);
    }

    /// Called when an item failed; the batch continues.
    fn on_item_error(&self, index: usize, total: usize, item: &str, reason: &str) {
        let _ = (index, total, item, reason);
    }

    /// Called once after every item has been attempted.
    fn on_convert_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl StageProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn StageProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        final_success: AtomicUsize,
    }

    impl StageProgressCallback for TrackingCallback {
        fn on_item_start(&self, _index: usize, _total: usize, _item: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_complete(&self, _index: usize, _total: usize, _item: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_error(&self, _index: usize, _total: usize, _item: &str, _reason: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_convert_complete(&self, _total: usize, success_count: usize) {
            self.final_success.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_convert_start(3);
        cb.on_item_start(1, 3, "a.docx");
        cb.on_item_complete(1, 3, "a.docx");
        cb.on_item_error(2, 3, "b.docx", "boom");
        cb.on_convert_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_item_start(1, 2, "a.docx");
        tracker.on_item_complete(1, 2, "a.docx");
        tracker.on_item_start(2, 2, "b.docx");
        tracker.on_item_error(2, 2, "b.docx", "locked");
        tracker.on_convert_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.final_success.load(Ordering::SeqCst), 1);
    }
}
