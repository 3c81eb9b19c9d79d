//! Background jobs.
use std::sync::Arc;
use std::time::Duration;

use metastore::config::{DEFAULT_RECONCILE_INTERVAL, MetastoreConfig};
use metastore::srv::Service;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{Instrument, debug, debug_span, info, warn};

const DEBUG_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundConfig {
    /// Period of reconciliation passes. A pass outlasting the period delays
    /// the next one, passes never overlap.
    pub reconcile_interval: Duration,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        BackgroundConfig {
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }
}

impl From<&MetastoreConfig> for BackgroundConfig {
    fn from(conf: &MetastoreConfig) -> Self {
        BackgroundConfig {
            reconcile_interval: conf.reconcile_interval,
        }
    }
}

/// Run all background jobs on periodic intervals.
#[derive(Debug)]
pub struct BackgroundWorker {
    conf: BackgroundConfig,
    service: Arc<Service>,
}

impl BackgroundWorker {
    pub fn new(conf: BackgroundConfig, service: Arc<Service>) -> BackgroundWorker {
        BackgroundWorker { conf, service }
    }

    /// Begin the background worker.
    ///
    /// Note that this handles all errors internally. Errors should not stop the
    /// worker from continuing to process jobs.
    pub async fn begin(self) {
        debug!(interval = ?self.conf.reconcile_interval, "starting background worker");
        let mut reconcile_interval = interval_with_skipped_ticks(self.conf.reconcile_interval);

        let mut debug_interval = interval_with_skipped_ticks(DEBUG_DURATION);

        loop {
            tokio::select! {
                _ = reconcile_interval.tick() => Self::handle_reconcile_job(&self.service).await,
                _ = debug_interval.tick() => debug!("debug interval hit"),
            }
        }
    }

    async fn handle_reconcile_job(service: &Service) {
        let span = debug_span!("reconcile_builds_job");
        async move {
            let stats = service.reconcile_all().await;
            if stats.failed > 0 {
                warn!(failed = stats.failed, "some partitions failed to reconcile, retrying next pass");
            }
            if stats.actions() > 0 {
                info!(
                    created = stats.created,
                    updated = stats.updated,
                    dropped = stats.dropped,
                    "reconciliation pass complete"
                );
            }
        }
        .instrument(span)
        .await;
    }
}

/// Create an interval with skipped ticks.
///
/// By default, intervals will "burst" to catch up if ticks are skipped. A
/// reconciliation pass may outlast its interval, and bursting would only queue
/// up passes that find nothing to do.
fn interval_with_skipped_ticks(dur: Duration) -> Interval {
    let mut interval = tokio::time::interval(dur);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
