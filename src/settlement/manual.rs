use async_trait::async_trait;
use tracing::debug;

use super::{announce_unlock, Settler};
use crate::error::SettlementError;
use crate::orders::models::OrderId;

/// Leaves the unlock to the operator: only the notice is logged
#[derive(Debug, Default)]
pub struct ManualSettlement;

#[async_trait]
impl Settler for ManualSettlement {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn settle(&self, id: &OrderId) -> Result<(), SettlementError> {
        debug!("Manual unlock requested for {}", id);
        announce_unlock(id);
        Ok(())
    }
}
