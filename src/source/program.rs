use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{dedup_preserving_order, OrderSource};
use crate::error::SourceError;
use crate::orders::models::OrderId;

// Order account layout (bincode, little endian):
// [order_count: u64] then `order_count` records of
// [state: u32][order_hash: 32][paid_back: u64][dcfi_reserved: u64]
// followed by the account-level [dcfi_reserved: u64]
const COUNT_LEN: usize = 8;
const STATE_LEN: usize = 4;
const RECORD_LEN: usize = STATE_LEN + 32 + 8 + 8;

/// Waiting, Processing, Finished, Dispute
const ORDER_STATE_COUNT: u32 = 4;

/// Reads order hashes straight from the DeCeFi program accounts
pub struct ProgramOrderSource {
    client: Arc<RpcClient>,
    program_id: Pubkey,
}

impl ProgramOrderSource {
    pub fn new(client: Arc<RpcClient>, program_id: Pubkey) -> Self {
        Self { client, program_id }
    }
}

#[async_trait]
impl OrderSource for ProgramOrderSource {
    fn name(&self) -> &'static str {
        "program"
    }

    #[instrument(skip(self), fields(program_id = %self.program_id))]
    async fn list_order_ids(&self) -> Result<Vec<OrderId>, SourceError> {
        debug!("Querying Solana RPC for orders");

        let mut accounts = self
            .client
            .get_program_accounts(&self.program_id)
            .await
            .map_err(|e| SourceError::Rpc(format!("getProgramAccounts failed: {}", e)))?;

        // RPC nodes return accounts in no particular order
        accounts.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut ids = Vec::new();
        for (pubkey, account) in &accounts {
            match decode_order_hashes(&account.data) {
                Ok(hashes) => ids.extend(hashes.iter().map(OrderId::from_hash)),
                Err(message) => {
                    warn!("⚠️  Skipping undecodable order account {}: {}", pubkey, message);
                }
            }
        }

        debug!("{} program accounts, {} order hashes", accounts.len(), ids.len());
        Ok(dedup_preserving_order(ids))
    }
}

/// Extract the order hashes stored in one program account.
/// Bytes after the last record (account totals, allocation slack) are ignored.
pub fn decode_order_hashes(data: &[u8]) -> Result<Vec<[u8; 32]>, String> {
    let count_bytes: [u8; COUNT_LEN] = data
        .get(..COUNT_LEN)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| format!("account data too short: {} bytes", data.len()))?;

    let count = usize::try_from(u64::from_le_bytes(count_bytes))
        .map_err(|_| "order count does not fit in memory".to_string())?;
    let required = count
        .checked_mul(RECORD_LEN)
        .and_then(|n| n.checked_add(COUNT_LEN))
        .ok_or_else(|| format!("order count overflow: {}", count))?;

    if data.len() < required {
        return Err(format!(
            "{} orders need {} bytes, account holds {}",
            count,
            required,
            data.len()
        ));
    }

    data[COUNT_LEN..required]
        .chunks_exact(RECORD_LEN)
        .enumerate()
        .map(|(index, record)| {
            let state = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
            if state >= ORDER_STATE_COUNT {
                return Err(format!("order {} has unknown state tag {}", index, state));
            }

            let mut hash = [0u8; 32];
            hash.copy_from_slice(&record[STATE_LEN..STATE_LEN + 32]);
            Ok(hash)
        })
        .collect()
}
