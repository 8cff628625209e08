//! Shared helpers: a scripted engine that needs no tesseract install.

#![allow(dead_code)]

use async_trait::async_trait;
use ocr_jobs::{
    ImageError, ImageProcessor, JobStore, JobSubmitter, MemoryJobStore, OcrEngine, OcrSession,
    Recognition, ServiceConfig,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const TSV_HEADER: &str =
    "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

/// Language that makes [`FakeEngine::acquire`] fail.
pub const BROKEN_LANGUAGE: &str = "zzz";

/// Reads the image file as text and reports one word per whitespace token.
///
/// Files that sniff as real images are recognised as the single word
/// `IMAGE`. A missing file is a recognition error.
pub struct FakeEngine {
    pub delay: Duration,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay })
    }
}

#[async_trait]
impl OcrEngine for FakeEngine {
    async fn acquire(&self, language: &str) -> Result<Box<dyn OcrSession>, ImageError> {
        if language == BROKEN_LANGUAGE {
            return Err(ImageError::EngineInit {
                language: language.to_string(),
                detail: "no traineddata".into(),
            });
        }
        Ok(Box::new(FakeSession { delay: self.delay }))
    }
}

struct FakeSession {
    delay: Duration,
}

#[async_trait]
impl OcrSession for FakeSession {
    async fn recognize(&self, image: &Path) -> Result<Recognition, ImageError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|e| ImageError::Recognition {
                path: image.to_path_buf(),
                detail: e.to_string(),
            })?;
        let text = if image::guess_format(&bytes).is_ok() {
            "IMAGE".to_string()
        } else {
            String::from_utf8_lossy(&bytes).trim().to_string()
        };
        Ok(Recognition {
            tsv: tsv_for(&text),
            text,
        })
    }
}

/// Page summary row followed by one level-5 row per word.
pub fn tsv_for(text: &str) -> String {
    let mut rows = vec![
        TSV_HEADER.to_string(),
        "1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t".to_string(),
    ];
    for (i, word) in text.split_whitespace().enumerate() {
        rows.push(format!(
            "5\t1\t1\t1\t1\t{}\t{}\t10\t40\t20\t95.5\t{}",
            i + 1,
            i * 50,
            word
        ));
    }
    rows.join("\n")
}

pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub submitter: JobSubmitter,
    pub config: ServiceConfig,
}

/// Route library logs to the test output; `RUST_LOG=ocr_jobs=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn harness(engine: Arc<dyn OcrEngine>, config: ServiceConfig) -> Harness {
    init_tracing();
    let store = Arc::new(MemoryJobStore::with_ttl(config.job_ttl));
    let dyn_store: Arc<dyn JobStore> = store.clone();
    let processor = ImageProcessor::new(dyn_store, engine, &config);
    Harness {
        store,
        submitter: JobSubmitter::new(processor, &config),
        config,
    }
}

/// Encode a tiny PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([255, 255, 255]));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}
