//! Pipeline stages for turning one submitted image into a finished record.
//!
//! ## Data Flow
//!
//! ```text
//! engine ──▶ annotation ──▶ process
//! (tesseract)  (TSV → Word)   (tasks, deadlines, store writes)
//! ```
//!
//! 1. [`engine`]    : acquire a scoped OCR engine instance and recognise one
//!    image into raw text plus a TSV word table
//! 2. [`annotation`]: keep word-level rows, validate their shape, and build
//!    [`crate::record::Word`] values
//! 3. [`process`]   : run one task per image under a shared concurrency cap,
//!    a per-image deadline and a shutdown token, writing each terminal
//!    outcome into the job store

pub mod annotation;
pub mod engine;
pub mod process;
