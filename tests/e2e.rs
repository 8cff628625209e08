//! End-to-end tests against a real `tesseract` binary.
//!
//! Gated behind the `TESSERACT_E2E` environment variable so they do not run
//! in CI unless explicitly requested.
//!
//! Run with:
//!   TESSERACT_E2E=1 cargo test --test e2e -- --nocapture
//!
//! Put extra images with known text in `./test_cases/` to exercise
//! real recognition (see `recognises_test_case_images`).

mod common;

use common::png_bytes;
use ocr_jobs::{
    ImageDescriptor, ImageProcessor, JobStatus, JobStore, JobSubmitter, MemoryJobStore,
    OcrEngine, ServiceConfig, TesseractEngine,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("TESSERACT_E2E").is_err() {
            println!("SKIP: set TESSERACT_E2E=1 to run e2e tests");
            return;
        }
    };
}

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn service(config: &ServiceConfig) -> (Arc<dyn JobStore>, JobSubmitter) {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let engine = Arc::new(TesseractEngine::new(&config.tesseract_bin));
    let processor = ImageProcessor::new(store.clone(), engine, config);
    (store, JobSubmitter::new(processor, config))
}

#[tokio::test]
async fn english_language_is_installed() {
    e2e_skip_unless_enabled!();
    let engine = TesseractEngine::default();
    assert!(engine.acquire("eng").await.is_ok());
}

#[tokio::test]
async fn blank_image_and_missing_file_in_one_job() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let blank = dir.path().join("blank.png");
    std::fs::write(&blank, png_bytes()).unwrap();

    let config = ServiceConfig::builder()
        .ocr_timeout(Duration::from_secs(60))
        .build()
        .unwrap();
    let (store, submitter) = service(&config);

    let (submission, handle) = submitter
        .submit(vec![
            ImageDescriptor::new("blank.png", &blank),
            ImageDescriptor::new("absent.png", dir.path().join("absent.png")),
        ])
        .await
        .unwrap();
    assert_eq!(handle.wait().await.unwrap(), 1);

    let job = store.get(&submission.job_id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Partial);

    let blank = &job.records[0];
    assert!(blank.error.is_none(), "blank image failed: {:?}", blank.error);
    assert!(blank.text.is_some());
    assert!(blank.ocr_data.is_some());

    let absent = &job.records[1];
    assert_eq!(absent.error.as_ref().map(|e| e.kind()), Some("recognition"));
}

#[tokio::test]
async fn unknown_language_fails_at_engine_init() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("blank.png");
    std::fs::write(&image, png_bytes()).unwrap();

    let config = ServiceConfig::builder()
        .language("qqq")
        .build()
        .unwrap();
    let (store, submitter) = service(&config);

    let (submission, handle) = submitter
        .submit(vec![ImageDescriptor::new("blank.png", &image)])
        .await
        .unwrap();
    assert_eq!(handle.wait().await.unwrap(), 0);

    let job = store.get(&submission.job_id).await.unwrap();
    assert_eq!(
        job.records[0].error.as_ref().map(|e| e.kind()),
        Some("engine_init")
    );
}

/// Each `test_cases/<name>.png` with a sibling `<name>.txt` must recognise
/// every word listed in the text file.
#[tokio::test]
async fn recognises_test_case_images() {
    e2e_skip_unless_enabled!();
    let Ok(entries) = std::fs::read_dir(test_cases_dir()) else {
        println!("SKIP: no test_cases directory");
        return;
    };

    let mut cases = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "png") && path.with_extension("txt").exists() {
            cases.push(path);
        }
    }
    if cases.is_empty() {
        println!("SKIP: no test_cases/*.png with expected text");
        return;
    }

    let (store, submitter) = service(&ServiceConfig::default());
    let images = cases
        .iter()
        .map(|p| ImageDescriptor::new(p.file_name().unwrap().to_string_lossy(), p))
        .collect();
    let (submission, handle) = submitter.submit(images).await.unwrap();
    handle.wait().await.unwrap();

    let job = store.get(&submission.job_id).await.unwrap();
    for (record, path) in job.records.iter().zip(&cases) {
        let expected = std::fs::read_to_string(path.with_extension("txt")).unwrap();
        let text = record.text.as_deref().unwrap_or_default().to_lowercase();
        for word in expected.split_whitespace() {
            assert!(
                text.contains(&word.to_lowercase()),
                "[{}] missing word {word:?} in {text:?}",
                record.filename
            );
        }
        println!("✓ {} ({} words)", record.filename, record.ocr_data.as_ref().map_or(0, Vec::len));
    }
}
