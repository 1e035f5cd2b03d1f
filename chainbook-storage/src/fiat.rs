//! Time-indexed fiat currency rate history.
//!
//! Tickers are keyed by their `YYYYMMDDhhmmss` UTC timestamp, so the
//! lexicographic order of the keys equals chronological order and nearest
//! lookups are plain iterator scans.

use chrono::NaiveDateTime;
use rocksdb::WriteBatch;
use std::collections::HashMap;
use tracing::error;

use crate::{
    db::{IndexStore, CF_FIAT_RATES},
    records::{pack_float64, pack_string, pack_varuint, unpack_float64, unpack_string, unpack_varuint},
    StorageError,
};

/// Format of the fiat rates keys.
pub const FIAT_RATES_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Rates of the base currency against fiat currencies and tokens at one
/// point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrencyRatesTicker {
    pub timestamp: NaiveDateTime,
    /// Quote currency -> rate.
    pub rates: HashMap<String, f64>,
    /// Token contract -> rate against the base currency.
    pub token_rates: HashMap<String, f64>,
}

fn pack_timestamp(timestamp: &NaiveDateTime) -> Vec<u8> {
    timestamp
        .format(FIAT_RATES_TIME_FORMAT)
        .to_string()
        .into_bytes()
}

pub fn pack_currency_rates_ticker(ticker: &CurrencyRatesTicker) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    pack_varuint(ticker.rates.len() as u64, &mut buf);
    for (currency, rate) in &ticker.rates {
        pack_string(currency, &mut buf);
        pack_float64(*rate, &mut buf);
    }
    pack_varuint(ticker.token_rates.len() as u64, &mut buf);
    for (token, rate) in &ticker.token_rates {
        pack_string(token, &mut buf);
        pack_float64(*rate, &mut buf);
    }
    buf
}

pub fn unpack_currency_rates_ticker(buf: &[u8]) -> Result<CurrencyRatesTicker, StorageError> {
    let mut ticker = CurrencyRatesTicker::default();

    let (count, mut offset) = unpack_varuint(buf)?;
    for _ in 0..count {
        let (currency, end) = unpack_string(&buf[offset..])?;
        offset += end;
        let (rate, l) = unpack_float64(&buf[offset..])?;
        offset += l;
        ticker.rates.insert(currency, rate);
    }

    let (count, l) = unpack_varuint(&buf[offset..])?;
    offset += l;
    for _ in 0..count {
        let (token, end) = unpack_string(&buf[offset..])?;
        offset += end;
        let (rate, l) = unpack_float64(&buf[offset..])?;
        offset += l;
        ticker.token_rates.insert(token, rate);
    }

    Ok(ticker)
}

/// Parse a date string in any of the accepted prefixes of
/// `YYYYMMDDhhmmss`; missing components are zero.
pub fn convert_date(date: &str) -> Result<NaiveDateTime, StorageError> {
    if !matches!(date.len(), 8 | 10 | 12 | 14) || !date.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StorageError::InvalidDate(date.to_string()));
    }
    let mut padded = date.to_string();
    padded.push_str(&"0".repeat(14 - date.len()));

    NaiveDateTime::parse_from_str(&padded, FIAT_RATES_TIME_FORMAT)
        .map_err(|_| StorageError::InvalidDate(date.to_string()))
}

fn ticker_from_entry(
    key: &[u8],
    value: &[u8],
    token: &str,
) -> Result<Option<CurrencyRatesTicker>, StorageError> {
    let key = std::str::from_utf8(key).map_err(|e| StorageError::DecodeError(e.to_string()))?;
    let timestamp = NaiveDateTime::parse_from_str(key, FIAT_RATES_TIME_FORMAT)
        .map_err(|_| StorageError::InvalidDate(key.to_string()))?;

    let mut ticker = unpack_currency_rates_ticker(value)?;
    if !token.is_empty() && !ticker.token_rates.contains_key(token) {
        return Ok(None);
    }
    ticker.timestamp = timestamp;
    Ok(Some(ticker))
}

impl IndexStore {
    /// Queue a ticker into the batch; tickers without rates are refused.
    pub fn fiat_rates_store_ticker(
        &self,
        wb: &mut WriteBatch,
        ticker: &CurrencyRatesTicker,
    ) -> Result<(), StorageError> {
        if ticker.rates.is_empty() {
            return Err(StorageError::EmptyRates);
        }
        wb.put_cf(
            self.cf(CF_FIAT_RATES),
            pack_timestamp(&ticker.timestamp),
            pack_currency_rates_ticker(ticker),
        );
        Ok(())
    }

    /// The ticker with the smallest timestamp at or after `time`; when
    /// `token` is set, only tickers quoting that token qualify.
    pub fn fiat_rates_find_ticker(
        &self,
        time: &NaiveDateTime,
        token: &str,
    ) -> Result<Option<CurrencyRatesTicker>, StorageError> {
        let start = pack_timestamp(time);
        let it = self.iterator_cf(
            CF_FIAT_RATES,
            rocksdb::IteratorMode::From(&start, rocksdb::Direction::Forward),
        );
        for entry in it {
            let (key, value) = entry?;
            match ticker_from_entry(&key, &value, token) {
                Ok(Some(ticker)) => return Ok(Some(ticker)),
                Ok(None) => continue,
                Err(err) => {
                    error!(%err, "fiat rates find ticker");
                    return Err(err);
                }
            }
        }
        Ok(None)
    }

    /// The most recent stored ticker, scanning backwards from the end.
    pub fn fiat_rates_find_last_ticker(
        &self,
        token: &str,
    ) -> Result<Option<CurrencyRatesTicker>, StorageError> {
        let it = self.iterator_cf(CF_FIAT_RATES, rocksdb::IteratorMode::End);
        for entry in it {
            let (key, value) = entry?;
            match ticker_from_entry(&key, &value, token) {
                Ok(Some(ticker)) => return Ok(Some(ticker)),
                Ok(None) => continue,
                Err(err) => {
                    error!(%err, "fiat rates find last ticker");
                    return Err(err);
                }
            }
        }
        Ok(None)
    }
}
