//! # ocr-jobs
//!
//! Asynchronous batch OCR: accept a set of images, return a job id at once,
//! recognise every image in the background with Tesseract, and let clients
//! poll per-image results until all of them are done.
//!
//! ## Pipeline Overview
//!
//! ```text
//! images (upload or sample corpus)
//!  │
//!  ├─ 1. Submit   JobStore::create → N records, all `processing`
//!  ├─ 2. Admit    global semaphore bounds live engine instances
//!  ├─ 3. Engine   tesseract → plain text + word-level TSV
//!  ├─ 4. Parse    TSV rows → `Word` values (level 5 only)
//!  └─ 5. Record   JobStore::update_record → `done`, text/words or error
//! ```
//!
//! A failure in one image is recorded on that image's record and never
//! touches the others. A [`RetentionSweeper`] deletes stale uploads and
//! evicts expired jobs in the background.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr_jobs::{
//!     ImageDescriptor, ImageProcessor, JobStore, JobSubmitter, MemoryJobStore, ServiceConfig,
//!     TesseractEngine,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::default();
//!     let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::with_ttl(config.job_ttl));
//!     let engine = Arc::new(TesseractEngine::new(&config.tesseract_bin));
//!     let processor = ImageProcessor::new(store.clone(), engine, &config);
//!     let submitter = JobSubmitter::new(processor, &config);
//!
//!     let (submission, handle) = submitter
//!         .submit(vec![ImageDescriptor::new("page.png", "scans/page.png")])
//!         .await?;
//!     handle.wait().await?;
//!
//!     for record in store.get(&submission.job_id).await?.records {
//!         println!("{}: {}", record.filename, record.text.unwrap_or_default());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-jobs` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! ocr-jobs = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod submit;
pub mod sweep;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::{ImageError, OcrJobError, ParseDefect, StorageSweepError};
pub use pipeline::annotation::{parse_annotations, parse_annotations_strict, to_tsv, Annotations};
pub use pipeline::engine::{OcrEngine, OcrSession, Recognition, TesseractEngine};
pub use pipeline::process::{ImageProcessor, JobHandle};
pub use progress::{JobProgress, JobProgressCallback, NoopProgressCallback};
pub use record::{
    ImageDescriptor, ImageRecord, Job, JobId, JobStatus, JobSummary, RecordOutcome, RecordStatus,
    Submission, Word,
};
pub use server::{router, serve, AppState};
pub use shutdown::Shutdown;
pub use store::{JobStore, MemoryJobStore};
pub use submit::{select_sample, JobSubmitter};
pub use sweep::{RetentionSweeper, SweepReport};
