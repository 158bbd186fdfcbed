// Durable dedup store - orders already settled by this drone
//
// The whole set lives in one JSON document with a single entry. Every
// read-modify-write happens under the store mutex and lands on disk through
// a temp file + fsync + rename before the call returns.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::orders::models::OrderId;

/// On-disk layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct ProcessedFile {
    processed_orders_hashes: Vec<OrderId>,
}

/// Crash-safe record of processed orders
pub struct ProcessedStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ProcessedStore {
    /// Open the store at `path`, creating an empty one on first use
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self {
            path: path.into(),
            lock: Mutex::new(()),
        };

        {
            let _guard = store.lock.lock().await;

            let exists = tokio::fs::try_exists(&store.path)
                .await
                .map_err(|e| store.io_error(e))?;

            if exists {
                let file = store.read_file().await?;
                info!(
                    "✓ Dedup store opened at {} ({} orders processed)",
                    store.path.display(),
                    file.processed_orders_hashes.len()
                );
            } else {
                info!(
                    "No data on orders processed, new storage will be created at {}",
                    store.path.display()
                );
                if let Some(parent) = store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| store.io_error(e))?;
                }
                store.write_file(&ProcessedFile::default()).await?;
            }
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of every order recorded so far
    pub async fn load_processed(&self) -> Result<HashSet<OrderId>, StoreError> {
        let _guard = self.lock.lock().await;
        let file = self.read_file().await?;
        Ok(file.processed_orders_hashes.into_iter().collect())
    }

    /// Durably add `id`. Returns `false` when it was already recorded.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn record_processed(&self, id: &OrderId) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;

        let mut file = self.read_file().await?;
        if file.processed_orders_hashes.contains(id) {
            debug!("Order already recorded");
            return Ok(false);
        }

        file.processed_orders_hashes.push(id.clone());
        self.write_file(&file).await?;

        debug!(
            "Order recorded ({} processed in total)",
            file.processed_orders_hashes.len()
        );
        Ok(true)
    }

    // Callers must hold `lock`.
    async fn read_file(&self) -> Result<ProcessedFile, StoreError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    // Callers must hold `lock`.
    async fn write_file(&self, file: &ProcessedFile) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(file)?;
        let temp_path = self.temp_path();

        let mut temp = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| self.io_error(e))?;
        temp.write_all(&bytes).await.map_err(|e| self.io_error(e))?;
        temp.sync_all().await.map_err(|e| self.io_error(e))?;
        drop(temp);

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        self.sync_parent_dir().await
    }

    // The rename is only durable once the directory entry is flushed.
    #[cfg(unix)]
    async fn sync_parent_dir(&self) -> Result<(), StoreError> {
        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => Path::new("."),
        };

        tokio::fs::File::open(parent)
            .await
            .map_err(|e| self.io_error(e))?
            .sync_all()
            .await
            .map_err(|e| self.io_error(e))
    }

    #[cfg(not(unix))]
    async fn sync_parent_dir(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}
