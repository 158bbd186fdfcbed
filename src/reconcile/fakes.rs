// In-memory collaborators for engine and scheduler tests
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{SettlementError, SourceError};
use crate::oracle::StatusOracle;
use crate::orders::models::{OrderId, OrderStatus, StrategyStatus};
use crate::settlement::Settler;
use crate::source::OrderSource;

pub fn ids(names: &[&str]) -> Vec<OrderId> {
    names.iter().map(|name| OrderId::from(*name)).collect()
}

pub struct FakeSource {
    ids: Mutex<Vec<OrderId>>,
    failing: AtomicBool,
}

impl FakeSource {
    pub fn new(names: &[&str]) -> Self {
        Self {
            ids: Mutex::new(ids(names)),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_ids(&self, names: &[&str]) {
        *self.ids.lock().unwrap() = ids(names);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn list_order_ids(&self) -> Result<Vec<OrderId>, SourceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Rpc("ledger unreachable".to_string()));
        }
        Ok(self.ids.lock().unwrap().clone())
    }
}

/// Answers from a label table; unknown orders are `NotTerminal`
pub struct FakeOracle {
    labels: Mutex<HashMap<OrderId, String>>,
    calls: Mutex<Vec<OrderId>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self {
            labels: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_label(&self, id: &str, label: &str) {
        self.labels
            .lock()
            .unwrap()
            .insert(OrderId::from(id), label.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<OrderId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusOracle for FakeOracle {
    async fn query_status(&self, id: &OrderId) -> OrderStatus {
        self.calls.lock().unwrap().push(id.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let label = self.labels.lock().unwrap().get(id).cloned();
        match label {
            Some(label) => StrategyStatus::from_label(&label).classify(),
            None => OrderStatus::NotTerminal,
        }
    }
}

pub struct FakeSettler {
    calls: Mutex<Vec<OrderId>>,
    failing: Mutex<HashSet<OrderId>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeSettler {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            delay: Mutex::new(None),
        }
    }

    pub fn fail_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(OrderId::from(id));
    }

    pub fn recover(&self, id: &str) {
        self.failing.lock().unwrap().remove(&OrderId::from(id));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<OrderId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Settler for FakeSettler {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn settle(&self, id: &OrderId) -> Result<(), SettlementError> {
        self.calls.lock().unwrap().push(id.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(id) {
            return Err(SettlementError::Rejected {
                order_id: id.clone(),
                message: "program rejected unlock".to_string(),
            });
        }
        Ok(())
    }
}
