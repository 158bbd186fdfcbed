// Settlement - releases the funds locked for an executed order
pub mod manual;
pub mod solana;

use async_trait::async_trait;
use tracing::info;

use crate::error::SettlementError;
use crate::orders::models::OrderId;

pub use manual::ManualSettlement;
pub use solana::SolanaSettlement;

/// Settlement trigger contract
///
/// INVARIANTS:
/// - One call performs the side effect at most once
/// - An `Err` means the order must not be recorded as processed
#[async_trait]
pub trait Settler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn settle(&self, id: &OrderId) -> Result<(), SettlementError>;
}

/// Operator-facing notice, emitted on every unlock attempt.
/// Some deployments confirm the unlock by hand from these lines.
pub(crate) fn announce_unlock(id: &OrderId) {
    info!("--- UNLOCK FUNDS ---");
    info!(">>> ORDER HASH: \"{}\" <<<", id);
    info!("---");
}
