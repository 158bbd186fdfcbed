use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{AppResult, SettlementError, StoreError};
use crate::oracle::StatusOracle;
use crate::orders::models::{OrderId, OrderStatus};
use crate::settlement::Settler;
use crate::source::OrderSource;
use crate::store::ProcessedStore;

/// Engine tuning
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Upper bound on in-flight status queries and settlements
    pub max_concurrency: usize,
    /// Per status query; an expired query counts as `NotTerminal`
    pub query_timeout: Duration,
    /// Per settlement; an expired settlement counts as failed
    pub settle_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            query_timeout: Duration::from_secs(10),
            settle_timeout: Duration::from_secs(60),
        }
    }
}

/// What one reconciliation cycle saw and did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Orders listed by the source
    pub total: usize,
    /// Orders skipped because the store already had them
    pub processed_earlier: usize,
    /// Orders whose status was queried, in source order
    pub candidates: Vec<OrderId>,
    /// Candidates the oracle reported as executed
    pub executed: Vec<OrderId>,
    /// Executed orders settled and recorded this cycle
    pub settled: Vec<OrderId>,
    /// Executed orders whose settlement failed; retried next cycle
    pub failed: Vec<OrderId>,
}

enum SettleOutcome {
    Settled(OrderId),
    Failed(OrderId),
    /// Not attempted: the store had already failed this cycle
    Skipped(OrderId),
}

/// Reconciliation engine
///
/// INVARIANTS:
/// - An order is recorded only after its settlement succeeded
/// - A recorded order is never settled again
/// - Per-order oracle/settlement failures never abort the cycle
/// - Source and store failures abort the cycle
pub struct Reconciler {
    config: ReconcilerConfig,
    source: Arc<dyn OrderSource>,
    oracle: Arc<dyn StatusOracle>,
    settler: Arc<dyn Settler>,
    store: Arc<ProcessedStore>,
    last_listing_len: Option<usize>,
}

impl Reconciler {
    pub fn new(
        config: ReconcilerConfig,
        source: Arc<dyn OrderSource>,
        oracle: Arc<dyn StatusOracle>,
        settler: Arc<dyn Settler>,
        store: Arc<ProcessedStore>,
    ) -> Self {
        Self {
            config,
            source,
            oracle,
            settler,
            store,
            last_listing_len: None,
        }
    }

    /// One full pass: list → diff → query → settle → record
    pub async fn run_cycle(&mut self) -> AppResult<CycleReport> {
        // 1. Read all the orders from the ledger
        let all_ids = self.source.list_order_ids().await?;
        self.check_listing_growth(all_ids.len());

        // 2. Read all the orders processed from local storage
        let processed_ids = self.store.load_processed().await?;
        debug!("processed_orders_hashes: {:?}", processed_ids);
        debug!("all_orders_hashes: {:?}", all_ids);

        // 3. Remove processed
        let candidates = candidate_ids(&all_ids, &processed_ids);
        debug!("new_orders_hashes: {:?}", candidates);

        info!(
            "{} orders, {} processed earlier, {} new",
            all_ids.len(),
            all_ids.len() - candidates.len(),
            candidates.len()
        );

        // 4. Ask the oracle about every new order
        let statuses = self.query_statuses(&candidates).await;
        let executed: Vec<OrderId> = candidates
            .iter()
            .zip(statuses)
            .filter(|(_, status)| status.is_executed())
            .map(|(id, _)| id.clone())
            .collect();

        if !executed.is_empty() {
            info!("📊 {} new orders executed", executed.len());
            debug!("new_executed_orders_hashes: {:?}", executed);
        }

        // 5. Settle executed orders and record each success
        let (settled, failed) = self.settle_and_record(&executed).await?;

        if !executed.is_empty() {
            info!(
                "✓ {} orders settled, {} failed (retried next cycle)",
                settled.len(),
                failed.len()
            );
        }

        Ok(CycleReport {
            total: all_ids.len(),
            processed_earlier: all_ids.len() - candidates.len(),
            candidates,
            executed,
            settled,
            failed,
        })
    }

    async fn query_statuses(&self, candidates: &[OrderId]) -> Vec<OrderStatus> {
        let oracle = &self.oracle;
        let timeout = self.config.query_timeout;

        // `buffered` keeps results aligned with `candidates`
        stream::iter(candidates)
            .map(|id| async move {
                match tokio::time::timeout(timeout, oracle.query_status(id)).await {
                    Ok(status) => status,
                    Err(_) => {
                        warn!("Status query for order {} timed out after {:?}", id, timeout);
                        OrderStatus::NotTerminal
                    }
                }
            })
            .buffered(self.config.max_concurrency)
            .collect()
            .await
    }

    async fn settle_and_record(
        &self,
        executed: &[OrderId],
    ) -> Result<(Vec<OrderId>, Vec<OrderId>), StoreError> {
        let settler = &self.settler;
        let store = &self.store;
        let timeout = self.config.settle_timeout;
        let store_failed = &AtomicBool::new(false);

        // Settlements already in flight run to completion when a sibling's
        // record step fails; no new settlement starts after that.
        let outcomes: Vec<Result<SettleOutcome, StoreError>> = stream::iter(executed)
            .map(|id| async move {
                if store_failed.load(Ordering::SeqCst) {
                    return Ok(SettleOutcome::Skipped(id.clone()));
                }

                let result = match tokio::time::timeout(timeout, settler.settle(id)).await {
                    Ok(result) => result,
                    Err(_) => Err(SettlementError::Timeout {
                        order_id: id.clone(),
                        elapsed: timeout,
                    }),
                };

                match result {
                    Ok(()) => match store.record_processed(id).await {
                        Ok(newly_recorded) => {
                            if !newly_recorded {
                                debug!("Order {} was already recorded", id);
                            }
                            Ok(SettleOutcome::Settled(id.clone()))
                        }
                        Err(e) => {
                            store_failed.store(true, Ordering::SeqCst);
                            Err(e)
                        }
                    },
                    Err(e) => {
                        error!("❌ Settlement failed for order {} via {}: {}", id, settler.name(), e);
                        Ok(SettleOutcome::Failed(id.clone()))
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;

        let mut settled_set = HashSet::new();
        let mut failed_set = HashSet::new();
        let mut first_error = None;

        for outcome in outcomes {
            match outcome {
                Ok(SettleOutcome::Settled(id)) => {
                    settled_set.insert(id);
                }
                Ok(SettleOutcome::Failed(id)) => {
                    failed_set.insert(id);
                }
                Ok(SettleOutcome::Skipped(id)) => {
                    warn!("⚠️  Settlement of order {} skipped, dedup store unavailable", id);
                }
                Err(e) => {
                    error!("❌ Failed to record settled order: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        // Report in source order
        let settled = executed.iter().filter(|id| settled_set.contains(*id)).cloned().collect();
        let failed = executed.iter().filter(|id| failed_set.contains(*id)).cloned().collect();

        Ok((settled, failed))
    }

    /// The source is append-only; a shorter listing is logged and tolerated
    fn check_listing_growth(&mut self, len: usize) {
        if let Some(previous) = self.last_listing_len {
            if len < previous {
                warn!(
                    "⚠️  Order source shrank from {} to {} orders, expected append-only growth",
                    previous, len
                );
            }
        }
        self.last_listing_len = Some(len);
    }
}

/// `all − processed`, keeping the order of `all`
pub fn candidate_ids(all: &[OrderId], processed: &HashSet<OrderId>) -> Vec<OrderId> {
    all.iter().filter(|id| !processed.contains(*id)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::reconcile::fakes::{ids, FakeOracle, FakeSettler, FakeSource};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Swap the store file for a directory so every later read or write fails
    fn break_store(path: &Path) {
        std::fs::remove_file(path).unwrap();
        std::fs::create_dir(path).unwrap();
    }

    /// Succeeds, but takes the dedup store down on its first call
    struct StoreBreakingSettler {
        store_path: PathBuf,
        calls: Mutex<Vec<OrderId>>,
    }

    #[async_trait]
    impl Settler for StoreBreakingSettler {
        fn name(&self) -> &'static str {
            "store-breaking"
        }

        async fn settle(&self, id: &OrderId) -> Result<(), SettlementError> {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(id.clone());
                calls.len() == 1
            };
            if first {
                break_store(&self.store_path);
            }
            Ok(())
        }
    }

    struct Harness {
        _dir: TempDir,
        source: Arc<FakeSource>,
        oracle: Arc<FakeOracle>,
        settler: Arc<FakeSettler>,
        store: Arc<ProcessedStore>,
        reconciler: Reconciler,
    }

    async fn harness(listed: &[&str], config: ReconcilerConfig) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            ProcessedStore::open(dir.path().join("processed.json"))
                .await
                .unwrap(),
        );
        let source = Arc::new(FakeSource::new(listed));
        let oracle = Arc::new(FakeOracle::new());
        let settler = Arc::new(FakeSettler::new());

        let reconciler = Reconciler::new(
            config,
            source.clone(),
            oracle.clone(),
            settler.clone(),
            store.clone(),
        );

        Harness {
            _dir: dir,
            source,
            oracle,
            settler,
            store,
            reconciler,
        }
    }

    #[test]
    fn test_candidate_ids_set_difference() {
        let all = ids(&["a", "b", "c", "d"]);
        let processed: HashSet<OrderId> = ids(&["d", "b"]).into_iter().collect();

        assert_eq!(candidate_ids(&all, &processed), ids(&["a", "c"]));

        let shuffled = ids(&["c", "d", "a", "b"]);
        assert_eq!(candidate_ids(&shuffled, &processed), ids(&["c", "a"]));
    }

    #[tokio::test]
    async fn test_executed_order_settled_once_and_excluded_afterwards() {
        let mut h = harness(&["X"], ReconcilerConfig::default()).await;
        h.oracle.set_label("X", "end");

        let first = h.reconciler.run_cycle().await.unwrap();
        assert_eq!(first.executed, ids(&["X"]));
        assert_eq!(first.settled, ids(&["X"]));
        assert_eq!(h.settler.calls(), ids(&["X"]));
        assert!(h.store.load_processed().await.unwrap().contains(&OrderId::from("X")));

        let second = h.reconciler.run_cycle().await.unwrap();
        assert_eq!(second.total, 1);
        assert_eq!(second.processed_earlier, 1);
        assert!(second.candidates.is_empty());
        assert_eq!(h.settler.calls(), ids(&["X"]));
        assert_eq!(h.oracle.calls(), ids(&["X"]));
    }

    #[tokio::test]
    async fn test_cancelled_order_stays_candidate() {
        let mut h = harness(&["Y"], ReconcilerConfig::default()).await;
        h.oracle.set_label("Y", "cancelled");

        let first = h.reconciler.run_cycle().await.unwrap();
        assert!(first.executed.is_empty());
        assert!(h.settler.calls().is_empty());

        let second = h.reconciler.run_cycle().await.unwrap();
        assert_eq!(second.candidates, ids(&["Y"]));
        assert!(h.store.load_processed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_settlement_is_retried_next_cycle() {
        let mut h = harness(&["Z"], ReconcilerConfig::default()).await;
        h.oracle.set_label("Z", "end");
        h.settler.fail_for("Z");

        let first = h.reconciler.run_cycle().await.unwrap();
        assert_eq!(first.failed, ids(&["Z"]));
        assert!(first.settled.is_empty());
        assert!(h.store.load_processed().await.unwrap().is_empty());

        h.settler.recover("Z");
        let second = h.reconciler.run_cycle().await.unwrap();
        assert_eq!(second.settled, ids(&["Z"]));
        assert_eq!(h.settler.calls(), ids(&["Z", "Z"]));

        let third = h.reconciler.run_cycle().await.unwrap();
        assert!(third.candidates.is_empty());
        assert_eq!(h.settler.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_mixed_batch_only_settles_executed() {
        let mut h = harness(&["a", "b", "c", "d", "e"], ReconcilerConfig::default()).await;
        h.oracle.set_label("a", "end");
        h.oracle.set_label("b", "inentry");
        h.oracle.set_label("c", "END");
        h.oracle.set_label("d", "error");
        // "e" is unknown to the oracle

        let report = h.reconciler.run_cycle().await.unwrap();

        assert_eq!(report.candidates, ids(&["a", "b", "c", "d", "e"]));
        assert_eq!(report.executed, ids(&["a", "c"]));
        assert_eq!(report.settled, ids(&["a", "c"]));
        let mut calls = h.settler.calls();
        calls.sort();
        assert_eq!(calls, ids(&["a", "c"]));
    }

    #[tokio::test]
    async fn test_concurrent_settlements_are_all_recorded() {
        let names: Vec<String> = (0..40).map(|i| format!("order_{:02}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let config = ReconcilerConfig {
            max_concurrency: 8,
            ..ReconcilerConfig::default()
        };
        let mut h = harness(&refs, config).await;
        for name in &refs {
            h.oracle.set_label(name, "end");
        }
        h.settler.set_delay(Duration::from_millis(5));

        let report = h.reconciler.run_cycle().await.unwrap();

        assert_eq!(report.settled.len(), 40);
        let processed = h.store.load_processed().await.unwrap();
        assert_eq!(processed.len(), 40);
        for name in &refs {
            assert!(processed.contains(&OrderId::from(*name)));
        }
    }

    #[tokio::test]
    async fn test_status_queries_respect_concurrency_bound() {
        let names: Vec<String> = (0..20).map(|i| format!("q{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let config = ReconcilerConfig {
            max_concurrency: 3,
            ..ReconcilerConfig::default()
        };
        let mut h = harness(&refs, config).await;
        h.oracle.set_delay(Duration::from_millis(10));

        h.reconciler.run_cycle().await.unwrap();

        assert_eq!(h.oracle.calls().len(), 20);
        assert!(h.oracle.max_in_flight() <= 3);
        assert!(h.oracle.max_in_flight() >= 2);
    }

    #[tokio::test]
    async fn test_slow_status_query_times_out_as_not_terminal() {
        let config = ReconcilerConfig {
            query_timeout: Duration::from_millis(50),
            ..ReconcilerConfig::default()
        };
        let mut h = harness(&["slow"], config).await;
        h.oracle.set_label("slow", "end");
        h.oracle.set_delay(Duration::from_secs(30));

        let report = h.reconciler.run_cycle().await.unwrap();

        assert!(report.executed.is_empty());
        assert!(h.settler.calls().is_empty());
    }

    #[tokio::test]
    async fn test_slow_settlement_times_out_and_stays_unrecorded() {
        let config = ReconcilerConfig {
            settle_timeout: Duration::from_millis(50),
            ..ReconcilerConfig::default()
        };
        let mut h = harness(&["stuck"], config).await;
        h.oracle.set_label("stuck", "end");
        h.settler.set_delay(Duration::from_secs(30));

        let report = h.reconciler.run_cycle().await.unwrap();

        assert_eq!(report.failed, ids(&["stuck"]));
        assert!(h.store.load_processed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_source_failure_aborts_cycle() {
        let mut h = harness(&["a"], ReconcilerConfig::default()).await;
        h.oracle.set_label("a", "end");
        h.source.set_failing(true);

        let result = h.reconciler.run_cycle().await;

        assert!(matches!(result, Err(AppError::Source(_))));
        assert!(h.oracle.calls().is_empty());
        assert!(h.settler.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_store_aborts_cycle_before_queries() {
        let mut h = harness(&["a"], ReconcilerConfig::default()).await;
        h.oracle.set_label("a", "end");
        break_store(h.store.path());

        let result = h.reconciler.run_cycle().await;

        assert!(matches!(result, Err(AppError::Store(_))));
        assert!(h.oracle.calls().is_empty());
        assert!(h.settler.calls().is_empty());
    }

    #[tokio::test]
    async fn test_record_failure_stops_further_settlements() {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("processed.json");
        let store = Arc::new(ProcessedStore::open(&store_path).await.unwrap());
        let oracle = Arc::new(FakeOracle::new());
        for id in ["a", "b", "c", "d"] {
            oracle.set_label(id, "end");
        }
        let settler = Arc::new(StoreBreakingSettler {
            store_path: store_path.clone(),
            calls: Mutex::new(Vec::new()),
        });

        let mut reconciler = Reconciler::new(
            ReconcilerConfig {
                max_concurrency: 1,
                ..ReconcilerConfig::default()
            },
            Arc::new(FakeSource::new(&["a", "b", "c", "d"])),
            oracle,
            settler.clone(),
            store,
        );

        let result = reconciler.run_cycle().await;

        assert!(matches!(result, Err(AppError::Store(_))));
        assert_eq!(*settler.calls.lock().unwrap(), ids(&["a"]));
    }

    #[tokio::test]
    async fn test_newly_listed_orders_are_picked_up() {
        let mut h = harness(&["a"], ReconcilerConfig::default()).await;
        h.oracle.set_label("a", "end");
        h.oracle.set_label("b", "end");

        h.reconciler.run_cycle().await.unwrap();
        h.source.set_ids(&["a", "b"]);
        let report = h.reconciler.run_cycle().await.unwrap();

        assert_eq!(report.candidates, ids(&["b"]));
        assert_eq!(report.settled, ids(&["b"]));
        assert_eq!(h.settler.calls(), ids(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_shrinking_source_is_tolerated() {
        let mut h = harness(&["a", "b"], ReconcilerConfig::default()).await;

        h.reconciler.run_cycle().await.unwrap();
        h.source.set_ids(&["a"]);
        let report = h.reconciler.run_cycle().await.unwrap();

        assert_eq!(report.total, 1);
        assert_eq!(report.candidates, ids(&["a"]));
    }
}
