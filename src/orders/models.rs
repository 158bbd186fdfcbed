use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque order identifier (the order hash as published on the ledger)
///
/// Nothing is assumed about its structure beyond equality and hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Build an identifier from raw text, trimming surrounding whitespace.
    /// Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Identifier for a 32-byte on-chain order hash (lowercase hex)
    pub fn from_hash(hash: &[u8; 32]) -> Self {
        Self(hex::encode(hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Two-valued lifecycle classification used by the reconciliation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    /// Pending, failed, cancelled, unknown or not answerable right now
    NotTerminal,
    /// Terminal state, eligible for settlement
    Executed,
}

impl OrderStatus {
    pub fn is_executed(&self) -> bool {
        matches!(self, OrderStatus::Executed)
    }
}

/// Raw strategy status labels reported by the CCAI terminal API
///
/// The API answers `cancelled` when no status is set for the hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyStatus {
    WaitForEntry,
    TrailingEntry,
    InEntry,
    TakeProfit,
    StopLoss,
    End,
    Cancelled,
    Error,
    Unknown(String),
}

impl StrategyStatus {
    /// Parse a label. Case and surrounding whitespace are ignored; anything
    /// outside the known vocabulary becomes `Unknown`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "waitforentry" => StrategyStatus::WaitForEntry,
            "trailingentry" => StrategyStatus::TrailingEntry,
            "inentry" => StrategyStatus::InEntry,
            "takeprofit" => StrategyStatus::TakeProfit,
            "stoploss" => StrategyStatus::StopLoss,
            "end" => StrategyStatus::End,
            "cancelled" => StrategyStatus::Cancelled,
            "error" => StrategyStatus::Error,
            _ => StrategyStatus::Unknown(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StrategyStatus::WaitForEntry => "waitforentry",
            StrategyStatus::TrailingEntry => "trailingentry",
            StrategyStatus::InEntry => "inentry",
            StrategyStatus::TakeProfit => "takeprofit",
            StrategyStatus::StopLoss => "stoploss",
            StrategyStatus::End => "end",
            StrategyStatus::Cancelled => "cancelled",
            StrategyStatus::Error => "error",
            StrategyStatus::Unknown(label) => label.as_str(),
        }
    }

    /// Total mapping onto the engine's lifecycle. Only `end` is terminal.
    pub fn classify(&self) -> OrderStatus {
        match self {
            StrategyStatus::End => OrderStatus::Executed,
            _ => OrderStatus::NotTerminal,
        }
    }
}

impl fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
