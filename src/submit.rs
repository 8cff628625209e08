//! Job submission entry points.
//!
//! Both entry points follow accept-and-continue semantics: the job and all
//! of its `processing` records exist in the store before the call returns,
//! and recognition continues in the background. The caller gets a
//! [`Submission`] to hand back to its client plus a [`JobHandle`] it may
//! await or drop.
//!
//! ```rust,no_run
//! use ocr_jobs::{ImageDescriptor, ImageProcessor, JobStore, JobSubmitter,
//!                MemoryJobStore, ServiceConfig, TesseractEngine};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::default();
//! let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
//! let engine = Arc::new(TesseractEngine::new(&config.tesseract_bin));
//! let submitter = JobSubmitter::new(ImageProcessor::new(store, engine, &config), &config);
//!
//! let (submission, handle) = submitter
//!     .submit(vec![ImageDescriptor::new("scan.png", "uploads/scan.png")])
//!     .await?;
//! println!("accepted job {}", submission.job_id);
//! handle.wait().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::ServiceConfig;
use crate::error::OcrJobError;
use crate::pipeline::process::{ImageProcessor, JobHandle};
use crate::record::{ImageDescriptor, Submission};
use crate::store::JobStore;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Creates jobs and hands them to the [`ImageProcessor`].
#[derive(Clone)]
pub struct JobSubmitter {
    processor: ImageProcessor,
    sample_dir: PathBuf,
    sample_count: usize,
}

impl JobSubmitter {
    pub fn new(processor: ImageProcessor, config: &ServiceConfig) -> Self {
        Self {
            processor,
            sample_dir: config.sample_dir.clone(),
            sample_count: config.sample_count,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        self.processor.store()
    }

    pub fn processor(&self) -> &ImageProcessor {
        &self.processor
    }

    /// Submit already-stored images.
    pub async fn submit(
        &self,
        images: Vec<ImageDescriptor>,
    ) -> Result<(Submission, JobHandle), OcrJobError> {
        let job_id = self.store().create(&images).await?;
        info!("Accepted job {} ({} images)", job_id, images.len());

        let handle = self.processor.spawn_job(job_id.clone(), images.clone());
        Ok((Submission { job_id, images }, handle))
    }

    /// Submit a random selection from the sample corpus.
    pub async fn submit_sample(&self) -> Result<(Submission, JobHandle), OcrJobError> {
        let images = self.sample_images().await?;
        self.submit(images).await
    }

    /// Pick `sample_count` distinct files from the sample corpus.
    pub async fn sample_images(&self) -> Result<Vec<ImageDescriptor>, OcrJobError> {
        let corpus = list_corpus(&self.sample_dir).await?;
        if corpus.is_empty() {
            return Err(OcrJobError::EmptyCorpus {
                path: self.sample_dir.clone(),
            });
        }
        let picked = select_sample(corpus, self.sample_count, &mut rand::thread_rng());
        debug!("Sampled {} files from {}", picked.len(), self.sample_dir.display());
        Ok(picked
            .into_iter()
            .map(|name| {
                let path = self.sample_dir.join(&name);
                ImageDescriptor::new(name, path)
            })
            .collect())
    }
}

/// Choose up to `count` distinct entries uniformly at random.
///
/// Shuffles with Fisher–Yates and keeps the prefix, so every subset of size
/// `count` is equally likely. A corpus smaller than `count` is returned whole
/// (in shuffled order).
pub fn select_sample<R: Rng + ?Sized>(mut corpus: Vec<String>, count: usize, rng: &mut R) -> Vec<String> {
    corpus.shuffle(rng);
    corpus.truncate(count);
    corpus
}

/// Regular, non-hidden files directly inside `dir`, sorted by name.
async fn list_corpus(dir: &Path) -> Result<Vec<String>, OcrJobError> {
    let unavailable = |source| OcrJobError::StorageUnavailable {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(unavailable)?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
