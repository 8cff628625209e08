//! Concurrent per-image processing.
//!
//! [`ImageProcessor::spawn_job`] launches one tokio task per image and
//! returns at once. Each task owns exactly one record index and writes it
//! exactly once, so records of the same job are filled independently and in
//! completion order.
//!
//! ## Failure isolation
//!
//! Every path out of a task ends in a terminal record:
//!
//! | Path | Recorded as |
//! |------|-------------|
//! | engine fails to start | [`ImageError::EngineInit`] |
//! | file missing / engine fault | [`ImageError::Recognition`] |
//! | malformed TSV (strict mode) | [`ImageError::Parse`] |
//! | deadline elapsed | [`ImageError::Timeout`] |
//! | processor shut down | [`ImageError::Cancelled`] |
//! | task panicked | [`ImageError::Internal`] |
//!
//! None of these touch sibling images or the caller that submitted the job.
//!
//! ## Admission control
//!
//! A semaphore shared by all jobs caps how many images are inside the engine
//! at once (`ServiceConfig::concurrency`). Tasks beyond the cap are spawned
//! but park on the semaphore, so a large batch queues rather than starting
//! hundreds of tesseract processes.

use crate::config::ServiceConfig;
use crate::error::{ImageError, OcrJobError};
use crate::pipeline::annotation::{parse_annotations, parse_annotations_strict, Annotations};
use crate::pipeline::engine::OcrEngine;
use crate::progress::JobProgress;
use crate::record::{ImageDescriptor, JobId, RecordOutcome};
use crate::shutdown::Shutdown;
use crate::store::JobStore;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Runs OCR for submitted jobs and writes results into a [`JobStore`].
#[derive(Clone)]
pub struct ImageProcessor {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    engine: Arc<dyn OcrEngine>,
    permits: Semaphore,
    shutdown: Shutdown,
    language: String,
    ocr_timeout: Duration,
    strict_parsing: bool,
    progress: Option<JobProgress>,
}

impl ImageProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        engine: Arc<dyn OcrEngine>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                engine,
                permits: Semaphore::new(config.concurrency.max(1)),
                shutdown: Shutdown::new(),
                language: config.language.clone(),
                ocr_timeout: config.ocr_timeout,
                strict_parsing: config.strict_parsing,
                progress: config.progress_callback.clone(),
            }),
        }
    }

    /// The store this processor writes into.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    /// Token that cancels every in-flight and queued image when fired.
    pub fn shutdown_signal(&self) -> Shutdown {
        self.inner.shutdown.clone()
    }

    /// Cancel all in-flight and queued images. Their records become
    /// [`ImageError::Cancelled`].
    pub fn shutdown(&self) {
        info!("Image processor shutting down");
        self.inner.shutdown.trigger();
    }

    /// Start processing `images` for an existing job and return immediately.
    ///
    /// `images[i]` is written to record `i`. The returned handle may be
    /// awaited or dropped; dropping it does not stop processing.
    pub fn spawn_job(&self, job_id: JobId, images: Vec<ImageDescriptor>) -> JobHandle {
        let inner = Arc::clone(&self.inner);
        let id = job_id.clone();
        let handle = tokio::spawn(async move { inner.run_job(id, images).await });
        JobHandle { job_id, handle }
    }
}

impl Inner {
    async fn run_job(self: Arc<Self>, job_id: JobId, images: Vec<ImageDescriptor>) -> usize {
        let total = images.len();
        let start = Instant::now();
        info!("Job {}: processing {} images", job_id, total);
        if let Some(ref cb) = self.progress {
            cb.on_job_start(&job_id, total);
        }

        let mut tasks = JoinSet::new();
        for (index, image) in images.into_iter().enumerate() {
            let inner = Arc::clone(&self);
            let job_id = job_id.clone();
            tasks.spawn(async move { inner.process_image(&job_id, index, total, image).await });
        }

        let mut succeeded = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => succeeded += 1,
                Ok(false) => {}
                Err(e) => warn!("Job {}: image task aborted: {}", job_id, e),
            }
        }

        info!(
            "Job {}: {}/{} images recognised in {}ms",
            job_id,
            succeeded,
            total,
            start.elapsed().as_millis()
        );
        if let Some(ref cb) = self.progress {
            cb.on_job_complete(&job_id, total, succeeded);
        }
        succeeded
    }

    /// Process one image and write its record. Returns `true` on success.
    async fn process_image(
        &self,
        job_id: &str,
        index: usize,
        total: usize,
        image: ImageDescriptor,
    ) -> bool {
        let work = AssertUnwindSafe(self.admit_and_recognise(job_id, index, total, &image))
            .catch_unwind();

        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.triggered() => RecordOutcome::Failed(ImageError::Cancelled),
            result = work => match result {
                Ok(outcome) => outcome,
                Err(panic) => RecordOutcome::Failed(ImageError::Internal(panic_message(&*panic))),
            },
        };

        let event = match &outcome {
            RecordOutcome::Recognised { words, defects, .. } => {
                debug!(
                    "Job {} image {} ({}): {} words, {} defects",
                    job_id,
                    index,
                    image.filename,
                    words.len(),
                    defects.len()
                );
                Ok(words.len())
            }
            RecordOutcome::Failed(err) => {
                warn!(
                    "Job {} image {} ({}) failed: {}",
                    job_id, index, image.filename, err
                );
                Err(err.to_string())
            }
        };

        if let Err(e) = self.store.update_record(job_id, index, outcome).await {
            warn!("Job {} image {}: could not store result: {}", job_id, index, e);
            return false;
        }

        if let Some(ref cb) = self.progress {
            match &event {
                Ok(words) => cb.on_image_complete(job_id, index, total, *words),
                Err(msg) => cb.on_image_error(job_id, index, total, msg),
            }
        }
        event.is_ok()
    }

    /// Wait for an engine slot, then recognise under the deadline.
    async fn admit_and_recognise(
        &self,
        job_id: &str,
        index: usize,
        total: usize,
        image: &ImageDescriptor,
    ) -> RecordOutcome {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return RecordOutcome::Failed(ImageError::Cancelled),
        };
        if let Some(ref cb) = self.progress {
            cb.on_image_start(job_id, index, total);
        }

        match tokio::time::timeout(self.ocr_timeout, self.recognise(image)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => RecordOutcome::Failed(err),
            Err(_) => RecordOutcome::Failed(ImageError::Timeout {
                after: self.ocr_timeout,
            }),
        }
    }

    async fn recognise(&self, image: &ImageDescriptor) -> Result<RecordOutcome, ImageError> {
        let session = self.engine.acquire(&self.language).await?;
        let recognition = session.recognize(&image.storage_path).await;
        drop(session);
        let recognition = recognition?;

        if self.strict_parsing {
            let words = parse_annotations_strict(&recognition.tsv).map_err(ImageError::Parse)?;
            return Ok(RecordOutcome::Recognised {
                text: recognition.text,
                words,
                defects: Vec::new(),
            });
        }
        let Annotations { words, defects } = parse_annotations(&recognition.tsv);
        Ok(RecordOutcome::Recognised {
            text: recognition.text,
            words,
            defects,
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("task panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("task panicked: {s}")
    } else {
        "task panicked".to_string()
    }
}

/// Handle to a job's background processing.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    handle: JoinHandle<usize>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Wait until every image of the job has a terminal record.
    /// Returns how many images were recognised successfully.
    pub async fn wait(self) -> Result<usize, OcrJobError> {
        self.handle
            .await
            .map_err(|e| OcrJobError::Internal(format!("job {} driver failed: {e}", self.job_id)))
    }

    /// Let processing continue without anyone waiting on it.
    pub fn detach(self) {
        debug!("Job {} detached", self.job_id);
    }
}
