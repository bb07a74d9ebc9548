//! Recovery of jobs abandoned by crashed or killed workers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use weave_ledger::{JobLedger, LedgerError, LedgerResult};

use crate::error::REASON_TIMED_OUT;
use crate::metrics;
use crate::retry::FailureTracker;

/// Fails `pending`/`processing` rows that have been active longer than `stale_after`.
pub struct StaleJobSweeper {
    ledger: Arc<dyn JobLedger>,
    stale_after: Duration,
}

impl StaleJobSweeper {
    pub fn new(ledger: Arc<dyn JobLedger>, stale_after: Duration) -> Self {
        Self { ledger, stale_after }
    }

    /// One pass. Returns how many rows were failed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> LedgerResult<usize> {
        let stale_after = chrono::Duration::from_std(self.stale_after)
            .map_err(|e| LedgerError::config(format!("stale threshold out of range: {}", e)))?;
        let cutoff = now - stale_after;
        let stale = self.ledger.list_stale(cutoff).await?;

        let mut recovered = 0;
        for job in stale {
            match self.ledger.fail(job.id, REASON_TIMED_OUT).await {
                Ok(_) => {
                    warn!(
                        job_id = %job.id,
                        group_id = %job.group_id,
                        status = %job.status,
                        active_since = %job.active_since(),
                        "Failed stale compilation job"
                    );
                    recovered += 1;
                }
                // Finished between the listing and the update
                Err(LedgerError::InvalidTransition { .. }) => {
                    debug!(job_id = %job.id, "Stale candidate already terminal");
                }
                Err(e) => return Err(e),
            }
        }

        if recovered > 0 {
            metrics::record_stale_recovered(recovered);
            info!(recovered, "Stale job sweep finished");
        }
        Ok(recovered)
    }

    /// Sweep every `interval` until `shutdown` flips to true.
    pub async fn run_periodic(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        let mut failures = FailureTracker::new(3);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.sweep(Utc::now()).await {
                        Ok(_) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                warn!("Stale job sweep failed: {}", e);
                            }
                        }
                    }
                }
            }
        }
        debug!("Stale job sweeper stopped");
    }
}
