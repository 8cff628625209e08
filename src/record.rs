//! Job and record types shared by the store, processor and HTTP surface.
//!
//! A [`Job`] is created once with one [`ImageRecord`] per submitted image.
//! The record at index `i` always describes image `i` of the submission; the
//! index is the only correlation key between an upload and its result.

use crate::error::{ImageError, ParseDefect};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque, process-unique job identifier.
pub type JobId = String;

/// An image accepted for processing: display name plus where its bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDescriptor {
    pub filename: String,
    pub storage_path: PathBuf,
}

impl ImageDescriptor {
    pub fn new(filename: impl Into<String>, storage_path: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            storage_path: storage_path.into(),
        }
    }
}

/// Per-image processing state. Moves from `Processing` to `Done` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Processing,
    Done,
}

/// One recognised word and its position metadata.
///
/// Every field is kept in the engine's raw string form so the JSON mirrors
/// the engine's TSV output exactly. Use [`Word::confidence`] and
/// [`Word::bbox`] for numeric access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub level: String,
    pub page_num: String,
    pub block_num: String,
    pub par_num: String,
    pub line_num: String,
    pub word_num: String,
    pub left: String,
    pub top: String,
    pub width: String,
    pub height: String,
    pub conf: String,
    pub text: String,
}

impl Word {
    /// Confidence score in `0.0..=100.0`, or `None` if the engine wrote a
    /// non-numeric value.
    pub fn confidence(&self) -> Option<f32> {
        self.conf.trim().parse().ok()
    }

    /// Bounding box as `(left, top, width, height)` in pixels.
    pub fn bbox(&self) -> Option<(u32, u32, u32, u32)> {
        Some((
            self.left.trim().parse().ok()?,
            self.top.trim().parse().ok()?,
            self.width.trim().parse().ok()?,
            self.height.trim().parse().ok()?,
        ))
    }

    /// Fields in TSV column order.
    pub fn fields(&self) -> [&str; 12] {
        [
            self.level.as_str(),
            self.page_num.as_str(),
            self.block_num.as_str(),
            self.par_num.as_str(),
            self.line_num.as_str(),
            self.word_num.as_str(),
            self.left.as_str(),
            self.top.as_str(),
            self.width.as_str(),
            self.height.as_str(),
            self.conf.as_str(),
            self.text.as_str(),
        ]
    }

    /// Render the word back into a single TSV row.
    pub fn to_tsv_row(&self) -> String {
        self.fields().join("\t")
    }
}

/// Terminal result of processing one image.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Recognised {
        text: String,
        words: Vec<Word>,
        defects: Vec<ParseDefect>,
    },
    Failed(ImageError),
}

/// Processing state and result for one image of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub filename: String,
    pub status: RecordStatus,
    pub text: Option<String>,
    pub ocr_data: Option<Vec<Word>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ImageError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_defects: Option<Vec<ParseDefect>>,
}

impl ImageRecord {
    /// A fresh record in the processing state.
    pub fn processing(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: RecordStatus::Processing,
            text: None,
            ocr_data: None,
            error: None,
            parse_defects: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == RecordStatus::Done
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Move to `Done`, filling exactly one of the success or failure fields.
    ///
    /// Callers must check [`ImageRecord::is_done`] first; the store does.
    pub(crate) fn complete(&mut self, outcome: RecordOutcome) {
        self.status = RecordStatus::Done;
        match outcome {
            RecordOutcome::Recognised {
                text,
                words,
                defects,
            } => {
                self.text = Some(text);
                self.ocr_data = Some(words);
                self.parse_defects = (!defects.is_empty()).then_some(defects);
            }
            RecordOutcome::Failed(err) => {
                self.error = Some(err);
            }
        }
    }
}

/// Aggregate status derived from a job's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// At least one record is still processing.
    Processing,
    /// Every record is done and none failed.
    Completed,
    /// Every record is done and some, but not all, failed.
    Partial,
    /// Every record is done and every one failed.
    Failed,
}

/// A batch submission and its per-image records.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub created_at: DateTime<Utc>,
    pub records: Vec<ImageRecord>,
}

impl Job {
    pub fn new(id: JobId, images: &[ImageDescriptor]) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            records: images
                .iter()
                .map(|img| ImageRecord::processing(img.filename.clone()))
                .collect(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.records.iter().all(ImageRecord::is_done)
    }

    pub fn status(&self) -> JobStatus {
        if !self.is_finished() {
            return JobStatus::Processing;
        }
        let failed = self.records.iter().filter(|r| r.is_failed()).count();
        match failed {
            0 => JobStatus::Completed,
            n if n == self.records.len() => JobStatus::Failed,
            _ => JobStatus::Partial,
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id.clone(),
            status: self.status(),
            total: self.records.len(),
            done: self.records.iter().filter(|r| r.is_done()).count(),
            failed: self.records.iter().filter(|r| r.is_failed()).count(),
        }
    }
}

/// Compact progress view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    pub total: usize,
    pub done: usize,
    pub failed: usize,
}

/// What a submission returns to the caller before any processing completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub job_id: JobId,
    pub images: Vec<ImageDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn word(conf: &str) -> Word {
        Word {
            level: "5".into(),
            page_num: "1".into(),
            block_num: "1".into(),
            par_num: "1".into(),
            line_num: "1".into(),
            word_num: "1".into(),
            left: "10".into(),
            top: "20".into(),
            width: "30".into(),
            height: "12".into(),
            conf: conf.into(),
            text: "hello".into(),
        }
    }

    fn job_of(n: usize) -> Job {
        let images: Vec<_> = (0..n)
            .map(|i| ImageDescriptor::new(format!("{i}.png"), format!("/up/{i}.png")))
            .collect();
        Job::new("job".into(), &images)
    }

    #[test]
    fn new_record_serialises_with_null_results() {
        let v = serde_json::to_value(ImageRecord::processing("a.png")).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "filename": "a.png",
                "status": "processing",
                "text": null,
                "ocr_data": null,
            })
        );
    }

    #[test]
    fn word_numeric_accessors() {
        let w = word("96.5");
        assert_eq!(w.confidence(), Some(96.5));
        assert_eq!(w.bbox(), Some((10, 20, 30, 12)));
        assert_eq!(word("n/a").confidence(), None);
    }

    #[test]
    fn word_tsv_row_has_twelve_fields() {
        assert_eq!(word("90").to_tsv_row().split('\t').count(), 12);
    }

    #[test]
    fn complete_success_sets_text_and_words() {
        let mut r = ImageRecord::processing("a.png");
        r.complete(RecordOutcome::Recognised {
            text: "hello".into(),
            words: vec![word("90")],
            defects: vec![],
        });
        assert!(r.is_done());
        assert_eq!(r.text.as_deref(), Some("hello"));
        assert_eq!(r.ocr_data.as_ref().map(Vec::len), Some(1));
        assert!(r.error.is_none());
        assert!(r.parse_defects.is_none());
    }

    #[test]
    fn complete_failure_leaves_results_null() {
        let mut r = ImageRecord::processing("a.png");
        r.complete(RecordOutcome::Failed(ImageError::Cancelled));
        assert!(r.is_done());
        assert!(r.text.is_none());
        assert!(r.ocr_data.is_none());
        assert_eq!(r.error, Some(ImageError::Cancelled));
    }

    #[test]
    fn job_status_is_derived_from_records() {
        let mut job = job_of(2);
        assert_eq!(job.status(), JobStatus::Processing);

        job.records[0].complete(RecordOutcome::Failed(ImageError::Cancelled));
        assert_eq!(job.status(), JobStatus::Processing);

        job.records[1].complete(RecordOutcome::Recognised {
            text: String::new(),
            words: vec![],
            defects: vec![],
        });
        assert_eq!(job.status(), JobStatus::Partial);

        let summary = job.summary();
        assert_eq!((summary.total, summary.done, summary.failed), (2, 2, 1));
    }

    #[test]
    fn job_status_all_failed() {
        let mut job = job_of(1);
        job.records[0].complete(RecordOutcome::Failed(ImageError::Timeout {
            after: Duration::from_secs(1),
        }));
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn descriptor_uses_camel_case() {
        let v = serde_json::to_value(ImageDescriptor::new("a.png", "/up/a.png")).unwrap();
        assert_eq!(v["storagePath"], "/up/a.png");
    }
}
