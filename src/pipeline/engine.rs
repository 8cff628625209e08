//! OCR engine abstraction and the tesseract command-line backend.
//!
//! Recognition is split in two steps so that engine setup and teardown are
//! scoped to one image:
//!
//! 1. [`OcrEngine::acquire`] prepares an engine instance for a language model
//!    and returns a boxed [`OcrSession`].
//! 2. [`OcrSession::recognize`] turns one image into raw text plus the TSV
//!    word-annotation table.
//!
//! Dropping the session releases everything it holds. For
//! [`TesseractEngine`] that is a private scratch directory plus any child
//! process still running (spawned with `kill_on_drop`), so a task that
//! times out or is cancelled never leaves a tesseract process behind.

use crate::error::ImageError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

/// Raw engine output for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recognition {
    /// Plain recognised text.
    pub text: String,
    /// Tab-separated word-annotation table, header included.
    pub tsv: String,
}

/// Factory for per-image engine instances.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Prepare an engine for `language`. Failures are
    /// [`ImageError::EngineInit`].
    async fn acquire(&self, language: &str) -> Result<Box<dyn OcrSession>, ImageError>;
}

/// One acquired engine instance.
#[async_trait]
pub trait OcrSession: Send + Sync {
    /// Recognise the image at `image`. Failures are
    /// [`ImageError::Recognition`].
    async fn recognize(&self, image: &Path) -> Result<Recognition, ImageError>;
}

/// Drives the `tesseract` binary.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    bin: PathBuf,
}

impl TesseractEngine {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn acquire(&self, language: &str) -> Result<Box<dyn OcrSession>, ImageError> {
        let init_err = |detail: String| ImageError::EngineInit {
            language: language.to_string(),
            detail,
        };

        let output = Command::new(&self.bin)
            .arg("--list-langs")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| init_err(format!("cannot run '{}': {e}", self.bin.display())))?;

        if !output.status.success() {
            return Err(init_err(format!(
                "'{} --list-langs' exited with {}",
                self.bin.display(),
                output.status
            )));
        }

        // Older tesseract releases print the list on stderr.
        let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        let installed = installed_languages(&listing);
        if let Some(missing) = language.split('+').find(|l| !installed.contains(l)) {
            return Err(init_err(format!(
                "language model '{missing}' is not installed"
            )));
        }

        let work_dir =
            TempDir::new().map_err(|e| init_err(format!("cannot create work dir: {e}")))?;
        debug!(
            "Acquired tesseract session for '{}' in {}",
            language,
            work_dir.path().display()
        );

        Ok(Box::new(TesseractSession {
            bin: self.bin.clone(),
            language: language.to_string(),
            work_dir,
        }))
    }
}

/// A tesseract instance bound to one language and one scratch directory.
struct TesseractSession {
    bin: PathBuf,
    language: String,
    work_dir: TempDir,
}

#[async_trait]
impl OcrSession for TesseractSession {
    async fn recognize(&self, image: &Path) -> Result<Recognition, ImageError> {
        let fail = |detail: String| ImageError::Recognition {
            path: image.to_path_buf(),
            detail,
        };

        match tokio::fs::metadata(image).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(fail("not a regular file".into())),
            Err(e) => return Err(fail(e.to_string())),
        }

        let base = self.work_dir.path().join("out");
        let output = Command::new(&self.bin)
            .arg(image)
            .arg(&base)
            .args(["-l", &self.language, "txt", "tsv"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| fail(format!("cannot run tesseract: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = tokio::fs::read_to_string(base.with_extension("txt"))
            .await
            .map_err(|e| fail(format!("missing text output: {e}")))?;
        let tsv = tokio::fs::read_to_string(base.with_extension("tsv"))
            .await
            .map_err(|e| fail(format!("missing tsv output: {e}")))?;

        Ok(Recognition { text, tsv })
    }
}

/// Extract language codes from `tesseract --list-langs` output.
fn installed_languages(listing: &str) -> Vec<&str> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of available languages"))
        .collect()
}
