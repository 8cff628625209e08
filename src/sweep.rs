//! Background retention sweep of the upload storage area.
//!
//! Every `sweep_interval` the sweeper lists the upload directory and deletes
//! regular files whose modification time is older than `retention`. One bad
//! file (stat or delete failure) is logged and counted; the rest of the sweep
//! carries on, and the schedule never stops because of it.
//!
//! When constructed with a store, each tick also evicts expired jobs via
//! [`JobStore::purge_expired`].

use crate::config::ServiceConfig;
use crate::error::StorageSweepError;
use crate::shutdown::Shutdown;
use crate::store::JobStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReadDirStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Regular files examined.
    pub scanned: usize,
    /// Files removed for being older than the retention threshold.
    pub deleted: usize,
    /// Files kept because they are still fresh.
    pub retained: usize,
    /// Files that could not be stat'ed or deleted.
    pub errors: usize,
    /// Jobs evicted from the store on this tick.
    pub jobs_evicted: usize,
}

/// Periodically deletes stale uploads.
#[derive(Clone)]
pub struct RetentionSweeper {
    dir: PathBuf,
    retention: Duration,
    interval: Duration,
    store: Option<Arc<dyn JobStore>>,
}

impl RetentionSweeper {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            dir: config.upload_dir.clone(),
            retention: config.retention,
            interval: config.sweep_interval,
            store: None,
        }
    }

    /// Also purge expired jobs from `store` on every tick.
    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run a single sweep now.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match tokio::fs::read_dir(&self.dir).await {
            Ok(read_dir) => {
                let mut entries = ReadDirStream::new(read_dir);
                while let Some(entry) = entries.next().await {
                    match entry {
                        Ok(entry) => self.sweep_entry(&entry.path(), &mut report).await,
                        Err(e) => {
                            warn!("Retention sweep: listing {} failed: {}", self.dir.display(), e);
                            report.errors += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Retention sweep skipped: cannot read {}: {}",
                    self.dir.display(),
                    e
                );
            }
        }

        if let Some(ref store) = self.store {
            report.jobs_evicted = store.purge_expired().await;
        }

        debug!(
            "Retention sweep of {}: {} scanned, {} deleted, {} errors",
            self.dir.display(),
            report.scanned,
            report.deleted,
            report.errors
        );
        report
    }

    async fn sweep_entry(&self, path: &Path, report: &mut SweepReport) {
        let modified = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if !meta.is_file() => return,
            Ok(meta) => meta.modified(),
            Err(e) => Err(e),
        };
        report.scanned += 1;

        let modified = match modified {
            Ok(t) => t,
            Err(source) => {
                let err = StorageSweepError::Stat {
                    path: path.to_path_buf(),
                    source,
                };
                warn!("Retention sweep: {}", err);
                report.errors += 1;
                return;
            }
        };

        // A timestamp in the future counts as fresh.
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age <= self.retention {
            report.retained += 1;
            return;
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!(
                    "Deleted stale upload {} (age {}s)",
                    path.display(),
                    age.as_secs()
                );
                report.deleted += 1;
            }
            Err(source) => {
                let err = StorageSweepError::Delete {
                    path: path.to_path_buf(),
                    source,
                };
                warn!("Retention sweep: {}", err);
                report.errors += 1;
            }
        }
    }

    /// Sweep every `sweep_interval` until `shutdown` is triggered.
    ///
    /// The first sweep happens one interval after spawning.
    pub fn spawn(self, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Retention sweeper watching {} every {}s (retention {}s)",
                self.dir.display(),
                self.interval.as_secs(),
                self.retention.as_secs()
            );
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.triggered() => break,
                    _ = ticker.tick() => {
                        let report = self.sweep_once().await;
                        if report.deleted > 0 || report.errors > 0 {
                            info!(
                                "Retention sweep: deleted {}, kept {}, {} errors",
                                report.deleted, report.retained, report.errors
                            );
                        }
                    }
                }
            }
            info!("Retention sweeper stopped");
        })
    }
}
