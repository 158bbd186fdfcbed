use std::time::Duration;

use thiserror::Error;

use crate::orders::models::OrderId;

/// Top-level error type for the drone
///
/// Only structural failures end up here. Per-order oracle and settlement
/// failures are recovered inside the reconciliation cycle.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Order source error: {0}")]
    Source(#[from] SourceError),

    #[error("Dedup store error: {0}")]
    Store(#[from] StoreError),

    #[error("Keypair error: {0}")]
    Keypair(String),
}

/// Order source errors (SourceUnavailable)
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read orders file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Invalid program id: {0}")]
    InvalidProgramId(String),
}

/// Status oracle errors
///
/// Never escape the oracle client: every variant degrades to
/// `OrderStatus::NotTerminal`.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Oracle returned errors: {0}")]
    GraphQl(String),

    #[error("Missing field in oracle response: {0}")]
    MissingField(&'static str),

    #[error("Unexpected oracle payload: {0}")]
    UnexpectedPayload(String),
}

/// Settlement errors, isolated per order
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Invalid order hash {order_id}: {message}")]
    InvalidOrderHash { order_id: OrderId, message: String },

    #[error("Settlement transaction failed for {order_id}: {message}")]
    TransactionFailed { order_id: OrderId, message: String },

    #[error("Settlement for {order_id} timed out after {elapsed:?}")]
    Timeout { order_id: OrderId, elapsed: Duration },

    #[error("Settlement rejected for {order_id}: {message}")]
    Rejected { order_id: OrderId, message: String },
}

/// Durable store errors (PersistenceFailure)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt store file {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
