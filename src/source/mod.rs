// Order source - lists every order hash known to the ledger
pub mod file;
pub mod program;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::SourceError;
use crate::orders::models::OrderId;

pub use file::FileOrderSource;
pub use program::ProgramOrderSource;

/// Read-only view of the append-only order ledger
#[async_trait]
pub trait OrderSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Full current list of order identifiers, in ledger order.
    /// Duplicates are collapsed to their first occurrence.
    async fn list_order_ids(&self) -> Result<Vec<OrderId>, SourceError>;
}

/// Drop repeated identifiers, keeping the first occurrence
pub(crate) fn dedup_preserving_order(ids: Vec<OrderId>) -> Vec<OrderId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
