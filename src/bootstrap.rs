use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::{path::Path, str::FromStr, sync::Arc};
use tracing::{info, warn};

use crate::{
    config::{Config, OrderSourceKind, SettlementMode},
    error::{AppError, AppResult, SourceError},
    oracle::{CcaiOracle, StatusOracle},
    reconcile::{ReconcileScheduler, Reconciler, ReconcilerConfig},
    settlement::{ManualSettlement, Settler, SolanaSettlement},
    source::{FileOrderSource, OrderSource, ProgramOrderSource},
    store::ProcessedStore,
};

/// Wire every component from the configuration
pub async fn initialize_drone(config: &Config) -> AppResult<ReconcileScheduler> {
    info!("Initializing drone components ...");

    let program_id = config.program_id().map(parse_program_id).transpose()?;
    let rpc_client = Arc::new(RpcClient::new(config.solana_rpc_endpoint.clone()));

    // Authority key is optional unless unlocks are sent on-chain
    let authority = match load_keypair(Path::new(&config.keypair_path)).await {
        Ok(keypair) => {
            info!("🔑 Drone authority: {}", keypair.pubkey());
            Some(Arc::new(keypair))
        }
        Err(e) if config.settlement_mode == SettlementMode::Onchain => return Err(e),
        Err(e) => {
            warn!("⚠️  No drone keypair loaded ({}), on-chain unlock disabled", e);
            None
        }
    };

    let source: Arc<dyn OrderSource> = match (config.order_source, program_id) {
        (OrderSourceKind::File, _) => {
            info!("✅ Reading orders from file {}", config.orders_file);
            Arc::new(FileOrderSource::new(&config.orders_file))
        }
        (OrderSourceKind::Program, Some(program_id)) => {
            info!(
                "✅ Reading orders from program {} via {}",
                program_id, config.solana_rpc_endpoint
            );
            Arc::new(ProgramOrderSource::new(rpc_client.clone(), program_id))
        }
        (OrderSourceKind::Program, None) => {
            return Err(AppError::Config("DECEFI_PROGRAM_ID must be set".to_string()));
        }
    };
    info!("✅ Order source: {}", source.name());

    let oracle: Arc<dyn StatusOracle> = Arc::new(
        CcaiOracle::new(&config.ccai_api_endpoint, config.query_timeout())
            .map_err(|e| AppError::Config(format!("Failed to build oracle client: {}", e)))?,
    );
    info!("✅ Status oracle: {}", config.ccai_api_endpoint);

    let settler: Arc<dyn Settler> = match (config.settlement_mode, program_id, authority) {
        (SettlementMode::Manual, _, _) => Arc::new(ManualSettlement),
        (SettlementMode::Onchain, Some(program_id), Some(authority)) => {
            Arc::new(SolanaSettlement::new(rpc_client.clone(), program_id, authority))
        }
        (SettlementMode::Onchain, None, _) => {
            return Err(AppError::Config("DECEFI_PROGRAM_ID must be set".to_string()));
        }
        (SettlementMode::Onchain, _, None) => {
            return Err(AppError::Keypair("Drone keypair required for on-chain unlock".to_string()));
        }
    };
    info!("✅ Settlement mode: {}", settler.name());

    let store = Arc::new(ProcessedStore::open(&config.store_path).await?);
    info!("✅ Processed orders store: {}", store.path().display());

    let reconciler = Reconciler::new(
        ReconcilerConfig {
            max_concurrency: config.max_concurrency,
            query_timeout: config.query_timeout(),
            settle_timeout: config.settle_timeout(),
        },
        source,
        oracle,
        settler,
        store,
    );

    Ok(ReconcileScheduler::new(
        reconciler,
        config.procedure_period(),
        config.idle_logging_period(),
    ))
}

fn parse_program_id(raw: &str) -> AppResult<Pubkey> {
    Pubkey::from_str(raw)
        .map_err(|e| SourceError::InvalidProgramId(format!("{}: {}", raw, e)).into())
}

/// Keypair file holds a JSON array of 64 secret key bytes
pub async fn load_keypair(path: &Path) -> AppResult<Keypair> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::Keypair(format!("Failed to read {}: {}", path.display(), e)))?;

    let bytes: Vec<u8> = serde_json::from_str(&raw)
        .map_err(|e| AppError::Keypair(format!("Malformed keypair file {}: {}", path.display(), e)))?;

    Keypair::try_from(bytes.as_slice())
        .map_err(|e| AppError::Keypair(format!("Invalid keypair in {}: {}", path.display(), e)))
}
