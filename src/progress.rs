//! Progress-callback trait for per-image job events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::config::ServiceConfigBuilder::progress_callback`] to receive
//! events as the processor works through each job. Polling the store remains
//! the canonical way to observe results; callbacks exist for terminal progress
//! bars, metrics and tests.
//!
//! # Example
//!
//! ```rust
//! use ocr_jobs::{JobProgressCallback, ServiceConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl JobProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, _job_id: &str, index: usize, total: usize, words: usize) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("image {}/{} done ({} words)", index + 1, total, words);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { finished: AtomicUsize::new(0) });
//!
//! let config = ServiceConfig::builder()
//!     .progress_callback(counter as Arc<dyn JobProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the image processor as it handles each job.
///
/// Images of a job run concurrently on the tokio runtime, so every method
/// may be called from several threads at once. All methods default to no-ops.
/// Indices are 0-based and match the record index in the job.
pub trait JobProgressCallback: Send + Sync {
    /// Called once when a job's images are handed to the processor.
    fn on_job_start(&self, job_id: &str, total_images: usize) {
        let _ = (job_id, total_images);
    }

    /// Called when an image acquires an engine slot and recognition begins.
    fn on_image_start(&self, job_id: &str, index: usize, total_images: usize) {
        let _ = (job_id, index, total_images);
    }

    /// Called when an image's record is written as a success.
    fn on_image_complete(&self, job_id: &str, index: usize, total_images: usize, word_count: usize) {
        let _ = (job_id, index, total_images, word_count);
    }

    /// Called when an image's record is written as a failure.
    fn on_image_error(&self, job_id: &str, index: usize, total_images: usize, error: &str) {
        let _ = (job_id, index, total_images, error);
    }

    /// Called once after every image of the job has a terminal record.
    fn on_job_complete(&self, job_id: &str, total_images: usize, success_count: usize) {
        let _ = (job_id, total_images, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ServiceConfig`].
pub type JobProgress = Arc<dyn JobProgressCallback>;
