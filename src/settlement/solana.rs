use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{announce_unlock, Settler};
use crate::error::SettlementError;
use crate::orders::models::OrderId;

/// Instruction envelope version understood by the program
const INSTRUCTION_VERSION: u8 = 0;

/// `Unlock` command: release the trader's coins for a finished order
const UNLOCK_COMMAND: u32 = 5;

/// Sends the program's `Unlock` instruction for executed orders
pub struct SolanaSettlement {
    client: Arc<RpcClient>,
    program_id: Pubkey,
    authority: Arc<Keypair>,
}

impl SolanaSettlement {
    pub fn new(client: Arc<RpcClient>, program_id: Pubkey, authority: Arc<Keypair>) -> Self {
        Self {
            client,
            program_id,
            authority,
        }
    }

    async fn send_unlock(&self, id: &OrderId, hash: &[u8; 32]) -> Result<String, SettlementError> {
        let instruction = build_unlock_instruction(&self.program_id, &self.authority.pubkey(), hash);

        let recent_blockhash = self.client.get_latest_blockhash().await.map_err(|e| {
            SettlementError::TransactionFailed {
                order_id: id.clone(),
                message: format!("Failed to get blockhash: {}", e),
            }
        })?;

        let message = Message::new(&[instruction], Some(&self.authority.pubkey()));
        let transaction = Transaction::new(&[&*self.authority], message, recent_blockhash);

        let signature = self
            .client
            .send_and_confirm_transaction(&transaction)
            .await
            .map_err(|e| SettlementError::TransactionFailed {
                order_id: id.clone(),
                message: format!("Send failed: {}", e),
            })?;

        Ok(signature.to_string())
    }
}

#[async_trait]
impl Settler for SolanaSettlement {
    fn name(&self) -> &'static str {
        "onchain"
    }

    #[instrument(skip(self), fields(order_id = %id, program_id = %self.program_id))]
    async fn settle(&self, id: &OrderId) -> Result<(), SettlementError> {
        info!("Notifying DeCeFi contract on order {} executed", id);
        announce_unlock(id);

        let hash = parse_order_hash(id)?;

        let signature = self.send_unlock(id, &hash).await?;
        info!("✓ Unlock confirmed for order {} (tx: {})", id, signature);
        Ok(())
    }
}

/// Order ids from the program source are the hex form of the 32-byte hash
pub fn parse_order_hash(id: &OrderId) -> Result<[u8; 32], SettlementError> {
    let bytes = hex::decode(id.as_str()).map_err(|e| SettlementError::InvalidOrderHash {
        order_id: id.clone(),
        message: e.to_string(),
    })?;

    bytes
        .as_slice()
        .try_into()
        .map_err(|_| SettlementError::InvalidOrderHash {
            order_id: id.clone(),
            message: format!("expected 32 bytes, got {}", bytes.len()),
        })
}

/// Wire format: [version: u8][command: u32 LE][order_hash: 32]
pub fn unlock_instruction_data(hash: &[u8; 32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + 4 + 32);
    data.push(INSTRUCTION_VERSION);
    data.extend_from_slice(&UNLOCK_COMMAND.to_le_bytes());
    data.extend_from_slice(hash);
    data
}

pub fn build_unlock_instruction(program_id: &Pubkey, authority: &Pubkey, hash: &[u8; 32]) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![AccountMeta::new(*authority, true)],
        data: unlock_instruction_data(hash),
    }
}
