//! Automatic retention and cleanup of monitoring history.
//!
//! Probe results, status transitions, heartbeats and delivery records older
//! than the configured number of days are deleted. Monitor state and
//! configuration are never touched.
//!
//! Cleanup runs periodically as a background task.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::database::Database;

/// Retention policy for monitoring history
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Days to keep history rows
    pub days: u32,
    /// Time between cleanup runs
    pub cleanup_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { days: 90, cleanup_interval: Duration::from_secs(3600) }
    }
}

impl RetentionPolicy {
    fn retention_seconds(&self) -> i64 {
        i64::from(self.days) * 24 * 3600
    }

    /// Rows older than this are deleted.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::seconds(self.retention_seconds())
    }
}

/// Cleanup manager for expired history
pub struct RetentionCleanup {
    database: Arc<dyn Database>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    /// Create a new retention cleanup manager
    pub fn new(database: Arc<dyn Database>, policy: RetentionPolicy) -> Self {
        Self { database, policy }
    }

    /// Run one cleanup pass. Returns the number of rows deleted.
    pub async fn run_once(&self) -> Result<u64> {
        let cutoff = self.policy.cutoff(Utc::now());
        debug!(days = self.policy.days, %cutoff, "Starting retention cleanup");

        let deleted = self.database.cleanup_before(cutoff).await?;

        info!(deleted, "Retention cleanup completed");
        Ok(deleted)
    }

    /// Start background cleanup task; it stops when `shutdown` flips to true.
    pub fn start_periodic_cleanup(
        self,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.policy.cleanup_interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.changed() => break,
                }

                if let Err(e) = self.run_once().await {
                    warn!(error = %e, "Periodic retention cleanup failed");
                }
            }
            debug!("Retention cleanup stopped");
        })
    }
}
