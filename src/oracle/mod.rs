// Status oracle - answers whether an order has reached its terminal state
pub mod ccai;

use async_trait::async_trait;

use crate::orders::models::{OrderId, OrderStatus};

pub use ccai::CcaiOracle;

/// Oracle client contract
///
/// INVARIANTS:
/// - Never fails: any query problem classifies as `NotTerminal`
/// - Never reports `Executed` for a malformed or unknown answer
/// - Safe to call concurrently for distinct orders
#[async_trait]
pub trait StatusOracle: Send + Sync {
    async fn query_status(&self, id: &OrderId) -> OrderStatus;
}
