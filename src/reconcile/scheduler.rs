// Reconcile Scheduler - drives the engine on a fixed period
//
// - One cycle at a time, never overlapping
// - Sleeps the procedure period between cycles
// - Shutdown is honoured between cycles, never mid-cycle
// - Structural errors (source, store) stop the loop

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, info_span, Instrument};

use crate::error::AppResult;
use crate::reconcile::engine::{CycleReport, Reconciler};

/// Emits "no new orders" diagnostics at most once per idle period
#[derive(Debug, Clone)]
pub struct IdleTracker {
    period: ChronoDuration,
    last_activity: DateTime<Utc>,
}

impl IdleTracker {
    pub fn new(period: Duration, now: DateTime<Utc>) -> Self {
        Self {
            period: ChronoDuration::from_std(period).unwrap_or_else(|_| ChronoDuration::weeks(52)),
            last_activity: now,
        }
    }

    /// Returns the idle span to report, if one is due
    pub fn observe(&mut self, executed: usize, now: DateTime<Utc>) -> Option<ChronoDuration> {
        if executed > 0 {
            self.last_activity = now;
            return None;
        }

        let idle = now.signed_duration_since(self.last_activity);
        if idle > self.period {
            self.last_activity = now;
            Some(idle)
        } else {
            None
        }
    }
}

/// Periodic driver around a `Reconciler`
pub struct ReconcileScheduler {
    reconciler: Reconciler,
    period: Duration,
    idle: IdleTracker,
}

impl ReconcileScheduler {
    pub fn new(reconciler: Reconciler, period: Duration, idle_logging_period: Duration) -> Self {
        Self {
            reconciler,
            period,
            idle: IdleTracker::new(idle_logging_period, Utc::now()),
        }
    }

    /// Run cycles until `shutdown` resolves; returns the number of cycles run
    pub async fn run_until<F>(mut self, shutdown: F) -> AppResult<u64>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cycle: u64 = 0;

        loop {
            cycle += 1;

            let report = self
                .reconciler
                .run_cycle()
                .instrument(info_span!("cycle", n = cycle))
                .await;

            match report {
                Ok(report) => self.log_activity(&report),
                Err(e) => {
                    error!("❌ Reconciliation cycle {} failed: {}", cycle, e);
                    return Err(e);
                }
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Shutdown requested after {} cycles", cycle);
                    return Ok(cycle);
                }
                _ = tokio::time::sleep(self.period) => {}
            }
        }
    }

    fn log_activity(&mut self, report: &CycleReport) {
        if !report.executed.is_empty() {
            debug!("New orders executed: {:?}", report.executed);
        }

        if let Some(idle) = self.idle.observe(report.executed.len(), Utc::now()) {
            debug!("No new orders executed in the last {}s", idle.num_seconds());
        }
    }
}
