use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use super::{dedup_preserving_order, OrderSource};
use crate::error::SourceError;
use crate::orders::models::OrderId;

/// Order hashes kept in a plain text file, one per line.
/// Used for dry runs against the oracle without the on-chain program.
pub struct FileOrderSource {
    path: PathBuf,
}

impl FileOrderSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl OrderSource for FileOrderSource {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn list_order_ids(&self) -> Result<Vec<OrderId>, SourceError> {
        debug!("Reading order hashes from {}", self.path.display());

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::File {
                path: self.path.display().to_string(),
                source,
            })?;

        let ids = contents.lines().filter_map(OrderId::parse).collect();
        Ok(dedup_preserving_order(ids))
    }
}
