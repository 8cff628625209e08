//! Configuration for the OCR job service.
//!
//! Every tunable lives in [`ServiceConfig`], built via its
//! [`ServiceConfigBuilder`]. One struct is shared (cloned) by the submitter,
//! the processor, the sweeper and the HTTP layer, so all of them agree on
//! directories, limits and timeouts.

use crate::error::OcrJobError;
use crate::progress::JobProgress;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the OCR job service.
///
/// Built via [`ServiceConfig::builder()`] or using
/// [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use ocr_jobs::ServiceConfig;
/// use std::time::Duration;
///
/// let config = ServiceConfig::builder()
///     .upload_dir("/var/lib/ocr/uploads")
///     .concurrency(8)
///     .retention(Duration::from_secs(6 * 3600))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to. Default: `0.0.0.0:3000`.
    pub listen_addr: SocketAddr,

    /// Largest accepted multipart upload body in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// Upload storage area. Uploaded files land here and the retention
    /// sweeper scans it. Default: `./uploads`.
    pub upload_dir: PathBuf,

    /// Example corpus used by sample submissions. Default: `./samples`.
    pub sample_dir: PathBuf,

    /// Number of distinct files picked per sample submission. Default: 10.
    pub sample_count: usize,

    /// Tesseract language model identifier. Default: `eng`.
    pub language: String,

    /// Path or name of the tesseract binary. Default: `tesseract`.
    pub tesseract_bin: PathBuf,

    /// Maximum number of images recognised at once across all jobs. Default: 4.
    ///
    /// Each in-flight image holds a tesseract process, so this is effectively
    /// the number of engine instances alive at any moment. Further images
    /// queue until a slot frees.
    pub concurrency: usize,

    /// Deadline for recognising a single image. Default: 120 s.
    pub ocr_timeout: Duration,

    /// Reject the whole image when any annotation row is malformed, instead
    /// of keeping the valid words and reporting the defects. Default: false.
    pub strict_parsing: bool,

    /// Uploaded files older than this are deleted by the sweeper. Default: 12 h.
    pub retention: Duration,

    /// How often the sweeper runs. Default: 10 min.
    pub sweep_interval: Duration,

    /// Finished jobs older than this are evicted from the store.
    /// `None` keeps jobs for the life of the process. Default: 24 h.
    pub job_ttl: Option<Duration>,

    /// Optional observer for per-image events.
    pub progress_callback: Option<JobProgress>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_upload_bytes: 50 * 1024 * 1024,
            upload_dir: PathBuf::from("uploads"),
            sample_dir: PathBuf::from("samples"),
            sample_count: 10,
            language: "eng".to_string(),
            tesseract_bin: PathBuf::from("tesseract"),
            concurrency: 4,
            ocr_timeout: Duration::from_secs(120),
            strict_parsing: false,
            retention: Duration::from_secs(12 * 60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            job_ttl: Some(Duration::from_secs(24 * 60 * 60)),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("listen_addr", &self.listen_addr)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("upload_dir", &self.upload_dir)
            .field("sample_dir", &self.sample_dir)
            .field("sample_count", &self.sample_count)
            .field("language", &self.language)
            .field("tesseract_bin", &self.tesseract_bin)
            .field("concurrency", &self.concurrency)
            .field("ocr_timeout", &self.ocr_timeout)
            .field("strict_parsing", &self.strict_parsing)
            .field("retention", &self.retention)
            .field("sweep_interval", &self.sweep_interval)
            .field("job_ttl", &self.job_ttl)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn JobProgressCallback>"),
            )
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.config.listen_addr = addr;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes.max(1024);
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn sample_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.sample_dir = dir.into();
        self
    }

    pub fn sample_count(mut self, n: usize) -> Self {
        self.config.sample_count = n;
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn tesseract_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.config.tesseract_bin = bin.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn ocr_timeout(mut self, timeout: Duration) -> Self {
        self.config.ocr_timeout = timeout;
        self
    }

    pub fn strict_parsing(mut self, v: bool) -> Self {
        self.config.strict_parsing = v;
        self
    }

    pub fn retention(mut self, age: Duration) -> Self {
        self.config.retention = age;
        self
    }

    pub fn sweep_interval(mut self, every: Duration) -> Self {
        self.config.sweep_interval = every;
        self
    }

    /// `Duration::ZERO` disables eviction.
    pub fn job_ttl(mut self, ttl: Duration) -> Self {
        self.config.job_ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }

    pub fn progress_callback(mut self, cb: JobProgress) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, OcrJobError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(OcrJobError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.sample_count == 0 {
            return Err(OcrJobError::InvalidConfig(
                "Sample count must be ≥ 1".into(),
            ));
        }
        if c.language.trim().is_empty() {
            return Err(OcrJobError::InvalidConfig(
                "Language must not be empty".into(),
            ));
        }
        if c.sweep_interval.is_zero() {
            return Err(OcrJobError::InvalidConfig(
                "Sweep interval must be non-zero".into(),
            ));
        }
        if c.ocr_timeout.is_zero() {
            return Err(OcrJobError::InvalidConfig(
                "OCR timeout must be non-zero".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_constants() {
        let c = ServiceConfig::default();
        assert_eq!(c.listen_addr.port(), 3000);
        assert_eq!(c.sample_count, 10);
        assert_eq!(c.language, "eng");
        assert_eq!(c.retention, Duration::from_secs(43_200));
        assert_eq!(c.sweep_interval, Duration::from_secs(600));
    }

    #[test]
    fn concurrency_is_clamped_to_one() {
        let c = ServiceConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn zero_ttl_disables_eviction() {
        let c = ServiceConfig::builder()
            .job_ttl(Duration::ZERO)
            .build()
            .unwrap();
        assert!(c.job_ttl.is_none());
    }

    #[test]
    fn rejects_empty_language() {
        let err = ServiceConfig::builder().language("  ").build().unwrap_err();
        assert!(matches!(err, OcrJobError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_sample_count() {
        assert!(ServiceConfig::builder().sample_count(0).build().is_err());
    }

    #[test]
    fn rejects_zero_sweep_interval() {
        assert!(ServiceConfig::builder()
            .sweep_interval(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn debug_hides_callback() {
        let s = format!("{:?}", ServiceConfig::default());
        assert!(s.contains("ServiceConfig"));
        assert!(s.contains("progress_callback: None"));
    }
}
