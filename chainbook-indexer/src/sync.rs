//! Block-sequential sync loop.
//!
//! One writer task connects blocks in order, one per atomic write batch.
//! Single-block reorgs are handled by disconnecting the stored tip and
//! retrying; deeper reorgs resolve iteratively the same way.

use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{info, warn};

use chainbook_core::traits::{ChainClient, ChainError};
use chainbook_storage::db::IndexStore;

/// Transient node failures are retried after this pause; the same pause is
/// used while waiting at the chain tip.
const RETRY_DELAY: Duration = Duration::from_secs(1);

fn is_transient(err: &ChainError) -> bool {
    matches!(
        err,
        ChainError::EmptyResponse
            | ChainError::InvalidResponse(_)
            | ChainError::Http(_)
            | ChainError::Status { .. }
    )
}

pub struct SyncWorker {
    chain: Arc<dyn ChainClient>,
    store: Arc<IndexStore>,
}

impl SyncWorker {
    pub fn new(chain: Arc<dyn ChainClient>, store: Arc<IndexStore>) -> Self {
        SyncWorker { chain, store }
    }

    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = shutdown.changed() => false,
            _ = tokio::time::sleep(RETRY_DELAY) => true,
        }
    }

    /// Run until `stop_block` (when given) or until shutdown flips.
    pub async fn run(
        &self,
        start_block: Option<u32>,
        stop_block: Option<u32>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut height = match start_block {
            Some(height) => height,
            None => match self.store.best_block()? {
                Some((best, _)) => best + 1,
                None => 0,
            },
        };
        info!(height, "sync starting");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let block = match self.chain.get_block("", height).await {
                Ok(block) => block,
                Err(ChainError::BlockNotFound) => {
                    // at the tip; wait for the chain to advance
                    if !self.pause(&mut shutdown).await {
                        break;
                    }
                    continue;
                }
                Err(err) if is_transient(&err) => {
                    warn!(height, %err, "transient node failure");
                    if !self.pause(&mut shutdown).await {
                        break;
                    }
                    continue;
                }
                Err(err) => {
                    warn!(height, %err, "block ingestion failed, halting");
                    return Err(err.into());
                }
            };

            // reorg check against the stored parent
            if height > 0 {
                if let Some(parent) = self.store.get_block_meta(height - 1)? {
                    if parent.hash != block.header.prev {
                        warn!(
                            height,
                            stored = %parent.hash,
                            parent = %block.header.prev,
                            "reorg detected, disconnecting stored tip"
                        );
                        self.store
                            .disconnect_block_range_tron_type(height - 1, height - 1)?;
                        height -= 1;
                        continue;
                    }
                }
            }

            let tx_count = block.txs.len();
            self.store.connect_block_tron_type(&block)?;
            info!(height, txs = tx_count, "block connected");

            if let Some(stop) = stop_block {
                if height >= stop {
                    info!(height, "stop block reached");
                    break;
                }
            }
            height += 1;
        }

        Ok(())
    }
}
