use config::{ConfigError, Environment};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Where the list of order hashes comes from
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSourceKind {
    /// DeCeFi program accounts over Solana RPC
    Program,
    /// Plain text file, one hash per line
    File,
}

/// How executed orders get their funds released
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMode {
    /// Log the unlock notice for the operator
    Manual,
    /// Send the program's Unlock instruction
    Onchain,
}

/// Process configuration, read once at startup
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub procedure_period_ms: u64,
    pub idle_logging_period_secs: u64,
    pub store_path: String,
    pub ccai_api_endpoint: String,
    pub solana_rpc_endpoint: String,
    #[serde(default)]
    pub decefi_program_id: Option<String>,
    pub keypair_path: String,
    pub order_source: OrderSourceKind,
    pub orders_file: String,
    pub settlement_mode: SettlementMode,
    pub max_concurrency: usize,
    pub query_timeout_ms: u64,
    pub settle_timeout_ms: u64,
}

impl Config {
    /// Defaults overridden by environment variables (CCAI_API_ENDPOINT, ...)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Environment::default())
    }

    fn load(env: Environment) -> Result<Self, ConfigError> {
        config::Config::builder()
            .set_default("procedure_period_ms", 1000)?
            .set_default("idle_logging_period_secs", 10)?
            .set_default("store_path", "orders_processed.json")?
            .set_default("solana_rpc_endpoint", "https://api.devnet.solana.com")?
            .set_default("keypair_path", "./id-decefi-drone.json")?
            .set_default("order_source", "program")?
            .set_default("orders_file", "./orders_hashes.txt")?
            .set_default("settlement_mode", "manual")?
            .set_default("max_concurrency", 16)?
            .set_default("query_timeout_ms", 10_000)?
            .set_default("settle_timeout_ms", 60_000)?
            .add_source(env)
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.procedure_period_ms == 0 {
            return Err(AppError::Config("PROCEDURE_PERIOD_MS must be positive".to_string()));
        }
        if self.idle_logging_period_secs == 0 {
            return Err(AppError::Config(
                "IDLE_LOGGING_PERIOD_SECS must be positive".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(AppError::Config("MAX_CONCURRENCY must be positive".to_string()));
        }
        if self.query_timeout_ms == 0 || self.settle_timeout_ms == 0 {
            return Err(AppError::Config("Timeouts must be positive".to_string()));
        }
        if self.ccai_api_endpoint.trim().is_empty() {
            return Err(AppError::Config("CCAI_API_ENDPOINT must be set".to_string()));
        }

        let needs_program = self.order_source == OrderSourceKind::Program
            || self.settlement_mode == SettlementMode::Onchain;
        if needs_program && self.program_id().is_none() {
            return Err(AppError::Config(
                "DECEFI_PROGRAM_ID must be set for the program order source or onchain settlement"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn program_id(&self) -> Option<&str> {
        self.decefi_program_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn procedure_period(&self) -> Duration {
        Duration::from_millis(self.procedure_period_ms)
    }

    pub fn idle_logging_period(&self) -> Duration {
        Duration::from_secs(self.idle_logging_period_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
}
