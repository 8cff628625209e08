//! Error types for the ocr-jobs library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OcrJobError`] is **fatal** to the operation that returned it. The job
//!   does not exist, the batch is empty, the sample corpus cannot be read.
//!   Returned as `Err(OcrJobError)` from store, submitter and sweeper calls.
//!
//! * [`ImageError`] is **non-fatal**. A single image failed (engine could not
//!   start, file missing, recognition crashed, deadline elapsed) but every
//!   other image in the job is unaffected. Stored inside
//!   [`crate::record::ImageRecord::error`] and only ever observed by polling.
//!
//! A third type, [`ParseDefect`], describes one rejected annotation row. It is
//! reported next to the words that did parse, or wrapped in
//! [`ImageError::Parse`] when strict parsing is requested.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the ocr-jobs library.
#[derive(Debug, Error)]
pub enum OcrJobError {
    // ── Job store ────────────────────────────────────────────────────────
    /// No job with this id exists (never created, or evicted by TTL).
    #[error("Job '{job_id}' not found")]
    UnknownJob { job_id: String },

    /// A job must contain at least one image.
    #[error("Cannot create a job with no images")]
    EmptyBatch,

    /// The record index does not exist in the job.
    #[error("Job '{job_id}' has {len} records; index {index} is out of range")]
    RecordOutOfRange {
        job_id: String,
        index: usize,
        len: usize,
    },

    /// The record already reached its terminal state and cannot change again.
    #[error("Record {index} of job '{job_id}' is already done")]
    RecordAlreadyDone { job_id: String, index: usize },

    // ── Storage ──────────────────────────────────────────────────────────
    /// The sample corpus directory contains no files to choose from.
    #[error("Sample corpus '{path}' contains no files")]
    EmptyCorpus { path: PathBuf },

    /// A storage directory could not be read or written.
    #[error("Storage '{path}' is unavailable: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An uploaded file was rejected before a job was created.
    #[error("Upload rejected: {0}")]
    Upload(String),

    // ── HTTP server ──────────────────────────────────────────────────────
    /// The listener could not be bound or the server loop failed.
    #[error("HTTP server on {addr} failed: {source}")]
    Server {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image.
///
/// Serialised as `{"kind": ..., "message": ..., "cause": ...}` so pollers
/// see the same shape for every variant.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ImageError {
    /// The OCR engine could not start or load the language model.
    #[error("OCR engine failed to initialise for language '{language}': {detail}")]
    EngineInit { language: String, detail: String },

    /// The engine ran but recognition failed (missing file, engine fault).
    #[error("Recognition failed for '{path}': {detail}")]
    Recognition { path: PathBuf, detail: String },

    /// Annotation output was rejected under strict parsing.
    #[error("Annotation output is malformed: {0}")]
    Parse(ParseDefect),

    /// Recognition exceeded its deadline.
    #[error("Recognition timed out after {after:?}")]
    Timeout { after: Duration },

    /// The processor shut down before this image finished.
    #[error("Processing was cancelled before completion")]
    Cancelled,

    /// The per-image task failed unexpectedly (e.g. panicked).
    #[error("Internal processing error: {0}")]
    Internal(String),
}

impl ImageError {
    /// Short machine-readable discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            ImageError::EngineInit { .. } => "engine_init",
            ImageError::Recognition { .. } => "recognition",
            ImageError::Parse(_) => "parse",
            ImageError::Timeout { .. } => "timeout",
            ImageError::Cancelled => "cancelled",
            ImageError::Internal(_) => "internal",
        }
    }

    /// Human-readable headline, without the underlying detail.
    pub fn message(&self) -> &'static str {
        match self {
            ImageError::EngineInit { .. } => "OCR engine initialisation failed",
            ImageError::Recognition { .. } => "Recognition failed",
            ImageError::Parse(_) => "Annotation output is malformed",
            ImageError::Timeout { .. } => "Recognition timed out",
            ImageError::Cancelled => "Processing was cancelled",
            ImageError::Internal(_) => "Internal processing error",
        }
    }

    /// Underlying cause, formatted for display.
    pub fn cause(&self) -> String {
        self.to_string()
    }
}

impl Serialize for ImageError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ImageError", 3)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", self.message())?;
        s.serialize_field("cause", &self.cause())?;
        s.end()
    }
}

/// One annotation row that failed schema validation.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("line {line}: expected {expected} tab-separated fields, found {fields}")]
pub struct ParseDefect {
    /// 1-indexed line number within the annotation blob.
    pub line: usize,
    /// Number of fields actually present.
    pub fields: usize,
    /// Number of fields a word row must have.
    pub expected: usize,
}

/// A per-file failure during a retention sweep. Logged and counted, never
/// propagated.
#[derive(Debug, Error)]
pub enum StorageSweepError {
    #[error("Failed to stat '{path}': {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete '{path}': {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_job_display() {
        let e = OcrJobError::UnknownJob {
            job_id: "abc".into(),
        };
        assert!(e.to_string().contains("abc"), "got: {e}");
    }

    #[test]
    fn record_out_of_range_display() {
        let e = OcrJobError::RecordOutOfRange {
            job_id: "j".into(),
            index: 7,
            len: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("index 7"));
        assert!(msg.contains("2 records"));
    }

    #[test]
    fn image_error_serialises_message_and_cause() {
        let e = ImageError::Recognition {
            path: PathBuf::from("/tmp/missing.png"),
            detail: "No such file".into(),
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["kind"], "recognition");
        assert_eq!(v["message"], "Recognition failed");
        assert!(v["cause"].as_str().unwrap().contains("missing.png"));
    }

    #[test]
    fn timeout_display() {
        let e = ImageError::Timeout {
            after: Duration::from_secs(30),
        };
        assert!(e.to_string().ends_with("after 30s"));
        assert_eq!(e.kind(), "timeout");

        let short = ImageError::Timeout {
            after: Duration::from_millis(250),
        };
        assert!(short.to_string().ends_with("after 250ms"));
    }

    #[test]
    fn parse_defect_display() {
        let d = ParseDefect {
            line: 4,
            fields: 9,
            expected: 12,
        };
        assert_eq!(
            d.to_string(),
            "line 4: expected 12 tab-separated fields, found 9"
        );
    }
}
