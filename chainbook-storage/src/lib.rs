pub mod db;
pub mod fiat;
pub mod records;
pub mod token_cache;
pub mod tron_index;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

use thiserror::Error;

use chainbook_core::traits::ChainError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    Rocksdb(#[from] rocksdb::Error),
    #[error("Inconsistent data in blockTxs")]
    InconsistentBlockTxs,
    #[error("Cannot disconnect blocks with height {0} and lower. It is necessary to rebuild index.")]
    RebuildRequired(u32),
    #[error("Error storing ticker: empty rates")]
    EmptyRates,
    #[error("Date {0:?} does not match any of formats YYYYMMDDhhmmss, YYYYMMDDhhmm, YYYYMMDDhh, YYYYMMDD")]
    InvalidDate(String),
    #[error("Failed to decode stored data: {0}")]
    DecodeError(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
}
