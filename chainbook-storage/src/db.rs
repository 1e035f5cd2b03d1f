//! RocksDB handle, column family layout and the small typed records that do
//! not belong to the per-address index: block metadata, packed transactions
//! and persisted token descriptors.

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::{
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::info;

use chainbook_core::{
    models::{blockchain::Tx, token::Trc10Token, AddressDescriptor},
    traits::ChainParser,
};

use crate::{
    records::{pack_string, pack_uint, pack_varuint, unpack_string, unpack_uint, unpack_varuint},
    StorageError,
};

pub const CF_ADDRESS_CONTRACTS: &str = "addressContracts";
pub const CF_ADDRESSES: &str = "addresses";
pub const CF_BLOCK_TXS: &str = "blockTxs";
pub const CF_TRANSACTIONS: &str = "transactions";
pub const CF_HEIGHT: &str = "height";
pub const CF_FIAT_RATES: &str = "fiatRates";
pub const CF_TOKENS: &str = "tokens";

pub const COLUMN_FAMILIES: &[&str] = &[
    CF_ADDRESS_CONTRACTS,
    CF_ADDRESSES,
    CF_BLOCK_TXS,
    CF_TRANSACTIONS,
    CF_HEIGHT,
    CF_FIAT_RATES,
    CF_TOKENS,
];

/// Metadata stored per block in the `height` column family.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockMeta {
    pub hash: String,
    pub time: i64,
    pub tx_count: u32,
}

/// In-memory bookkeeping of recent block times; trimmed on disconnect.
#[derive(Debug, Default)]
pub(crate) struct InternalState {
    block_times: Vec<i64>,
}

/// Handle to the embedded store. Column family handles are resolved once at
/// open; write batches are single-owner and applied atomically.
pub struct IndexStore {
    db: DB,
    parser: Arc<dyn ChainParser>,
    internal: Mutex<InternalState>,
}

impl IndexStore {
    pub fn open(path: &Path, parser: Arc<dyn ChainParser>) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;
        info!(path = %path.display(), "index store opened");

        Ok(IndexStore { db, parser, internal: Mutex::new(InternalState::default()) })
    }

    pub(crate) fn parser(&self) -> &dyn ChainParser {
        self.parser.as_ref()
    }

    pub(crate) fn cf(&self, name: &str) -> &ColumnFamily {
        self.db
            .cf_handle(name)
            .expect("column family handle")
    }

    pub(crate) fn get_cf(&self, name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get_cf(self.cf(name), key)?)
    }

    pub(crate) fn iterator_cf(
        &self,
        name: &str,
        mode: rocksdb::IteratorMode,
    ) -> rocksdb::DBIteratorWithThreadMode<'_, DB> {
        self.db.iterator_cf(self.cf(name), mode)
    }

    /// Apply a write batch atomically.
    pub fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        Ok(self.db.write(batch)?)
    }

    // -- height records ------------------------------------------------------

    pub(crate) fn store_block_meta(&self, wb: &mut WriteBatch, height: u32, meta: &BlockMeta) {
        let mut buf = Vec::with_capacity(meta.hash.len() + 16);
        pack_string(&meta.hash, &mut buf);
        pack_varuint(meta.time as u64, &mut buf);
        pack_varuint(meta.tx_count as u64, &mut buf);
        wb.put_cf(self.cf(CF_HEIGHT), pack_uint(height), buf);
    }

    pub fn get_block_meta(&self, height: u32) -> Result<Option<BlockMeta>, StorageError> {
        let Some(buf) = self.get_cf(CF_HEIGHT, &pack_uint(height))? else {
            return Ok(None);
        };
        let (hash, mut offset) = unpack_string(&buf)?;
        let (time, l) = unpack_varuint(&buf[offset..])?;
        offset += l;
        let (tx_count, _) = unpack_varuint(&buf[offset..])?;
        Ok(Some(BlockMeta { hash, time: time as i64, tx_count: tx_count as u32 }))
    }

    /// Highest indexed block, read from the tail of the `height` column.
    pub fn best_block(&self) -> Result<Option<(u32, BlockMeta)>, StorageError> {
        let mut it = self.iterator_cf(CF_HEIGHT, rocksdb::IteratorMode::End);
        match it.next() {
            Some(entry) => {
                let (key, _) = entry?;
                let height = unpack_uint(&key)?;
                let meta = self
                    .get_block_meta(height)?
                    .unwrap_or_default();
                Ok(Some((height, meta)))
            }
            None => Ok(None),
        }
    }

    // -- packed transactions -------------------------------------------------

    pub(crate) fn store_transaction(
        &self,
        wb: &mut WriteBatch,
        tx: &Tx,
    ) -> Result<(), StorageError> {
        let btxid = self.parser.pack_txid(&tx.txid)?;
        let packed = self.parser.pack_tx(tx)?;
        wb.put_cf(self.cf(CF_TRANSACTIONS), btxid, packed);
        Ok(())
    }

    pub fn get_transaction(&self, txid: &str) -> Result<Option<(Tx, u32)>, StorageError> {
        let btxid = self.parser.pack_txid(txid)?;
        let Some(buf) = self.get_cf(CF_TRANSACTIONS, &btxid)? else {
            return Ok(None);
        };
        Ok(Some(self.parser.unpack_tx(&buf)?))
    }

    // -- persisted token descriptors -----------------------------------------

    pub fn put_tron_token(&self, token: &Trc10Token) -> Result<(), StorageError> {
        let mut buf = Vec::with_capacity(64);
        pack_string(&token.contract, &mut buf);
        pack_string(&token.name, &mut buf);
        pack_string(&token.symbol, &mut buf);
        pack_varuint(u64::from(token.decimals), &mut buf);

        let mut wb = WriteBatch::default();
        wb.put_cf(self.cf(CF_TOKENS), token.contract.as_bytes(), buf);
        self.write(wb)
    }

    pub fn get_tron_token(
        &self,
        descriptor: &AddressDescriptor,
    ) -> Result<Option<Trc10Token>, StorageError> {
        let Some(buf) = self.get_cf(CF_TOKENS, descriptor.as_ref())? else {
            return Ok(None);
        };
        let (contract, mut offset) = unpack_string(&buf)?;
        let (name, l) = unpack_string(&buf[offset..])?;
        offset += l;
        let (symbol, l) = unpack_string(&buf[offset..])?;
        offset += l;
        let (decimals, _) = unpack_varuint(&buf[offset..])?;
        Ok(Some(Trc10Token { contract, name, symbol, decimals: decimals as u32 }))
    }

    // -- internal state ------------------------------------------------------

    pub(crate) fn append_block_time(&self, time: i64) {
        self.internal
            .lock()
            .expect("internal state lock")
            .block_times
            .push(time);
    }

    pub(crate) fn remove_last_block_times(&self, count: usize) {
        let mut state = self.internal.lock().expect("internal state lock");
        let len = state.block_times.len();
        state
            .block_times
            .truncate(len.saturating_sub(count));
    }

    pub fn block_times_count(&self) -> usize {
        self.internal
            .lock()
            .expect("internal state lock")
            .block_times
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainbook_chain::tron::parser::TronParser;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, IndexStore) {
        let dir = TempDir::new().unwrap();
        let parser = Arc::new(TronParser::new(100, false));
        let store = IndexStore::open(dir.path(), parser).unwrap();
        (dir, store)
    }

    #[test]
    fn test_block_meta_round_trip() {
        let (_dir, store) = open_store();
        let meta = BlockMeta { hash: "00aa".to_string(), time: 1661090460, tx_count: 3 };

        let mut wb = WriteBatch::default();
        store.store_block_meta(&mut wb, 100, &meta);
        store.write(wb).unwrap();

        assert_eq!(store.get_block_meta(100).unwrap(), Some(meta.clone()));
        assert_eq!(store.get_block_meta(101).unwrap(), None);
        assert_eq!(store.best_block().unwrap(), Some((100, meta)));
    }

    #[test]
    fn test_best_block_empty_store() {
        let (_dir, store) = open_store();
        assert!(store.best_block().unwrap().is_none());
    }

    #[test]
    fn test_token_round_trip() {
        let (_dir, store) = open_store();
        let token = Trc10Token {
            contract: "1000001".to_string(),
            name: "TestToken".to_string(),
            symbol: "TT".to_string(),
            decimals: 6,
        };
        store.put_tron_token(&token).unwrap();

        let desc = AddressDescriptor::from("1000001".as_bytes().to_vec());
        assert_eq!(store.get_tron_token(&desc).unwrap(), Some(token));

        let missing = AddressDescriptor::from("1000002".as_bytes().to_vec());
        assert_eq!(store.get_tron_token(&missing).unwrap(), None);
    }

    #[test]
    fn test_block_times_trimming() {
        let (_dir, store) = open_store();
        store.append_block_time(1);
        store.append_block_time(2);
        store.append_block_time(3);
        store.remove_last_block_times(2);
        assert_eq!(store.block_times_count(), 1);
        store.remove_last_block_times(5);
        assert_eq!(store.block_times_count(), 0);
    }
}
