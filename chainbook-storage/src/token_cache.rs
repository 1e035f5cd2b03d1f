//! Read-through cache of TRC10 token descriptors.
//!
//! Lookups hit the persistent store first and fall back to the chain; the
//! result is written back so the next lookup stays local. When disabled the
//! cache degrades into a pure chain passthrough.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

use chainbook_core::{
    models::{token::Trc10Token, AddressDescriptor},
    traits::ChainClient,
};

use crate::{db::IndexStore, StorageError};

pub struct TronTokenCache {
    store: Arc<IndexStore>,
    chain: Arc<dyn ChainClient>,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TronTokenCache {
    pub fn new(store: Arc<IndexStore>, chain: Arc<dyn ChainClient>, enabled: bool) -> Self {
        if !enabled {
            info!("tron token cache disabled");
        }
        TronTokenCache {
            store,
            chain,
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// `(hits, misses)` efficiency counters.
    pub fn efficiency(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    /// Token descriptor lookup, store first, chain second. Write-back
    /// failures are logged, never propagated.
    pub async fn get_token(
        &self,
        descriptor: &AddressDescriptor,
    ) -> Result<Trc10Token, StorageError> {
        if self.enabled {
            if let Some(token) = self.store.get_tron_token(descriptor)? {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(token = %token.contract, "token cache hit");
                return Ok(token);
            }
        }

        let token = self
            .chain
            .trc10_token_info(descriptor)
            .await?;
        self.misses.fetch_add(1, Ordering::Relaxed);

        if self.enabled {
            if let Err(err) = self.store.put_tron_token(&token) {
                warn!(token = %token.contract, %err, "token cache write back failed");
            }
        }
        Ok(token)
    }
}
