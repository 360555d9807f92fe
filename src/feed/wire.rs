//! Wire Protocol for the Quote Feed
//!
//! Each datagram carries 1..50 fixed-size 32-byte records, one quote each.
//!
//! Layout:
//! ```text
//! Offset  Size  Field
//! 0       8     timestamp (us since UNIX epoch, big-endian u64)
//! 8       3     base currency (ASCII)
//! 11      3     quote currency (ASCII)
//! 14      8     rate (f64, little-endian)
//! 22      10    padding
//! Total: 32 bytes
//! ```

use chrono::{DateTime, Utc};

use crate::cartographer::{Currency, QuoteEvent};
use crate::error::WireError;

/// Total record size in bytes
pub const RECORD_SIZE: usize = 32;

/// Most records the publisher packs into one datagram
pub const MAX_RECORDS_PER_DATAGRAM: usize = 50;

const TS_RANGE: std::ops::Range<usize> = 0..8;
const BASE_RANGE: std::ops::Range<usize> = 8..11;
const QUOTE_RANGE: std::ops::Range<usize> = 11..14;
const RATE_RANGE: std::ops::Range<usize> = 14..22;

/// Decode one 32-byte record
pub fn decode_record(bytes: &[u8]) -> Result<QuoteEvent, WireError> {
    if bytes.len() < RECORD_SIZE {
        return Err(WireError::ShortRecord(bytes.len()));
    }

    let micros = u64::from_be_bytes(array(&bytes[TS_RANGE]));
    let observed_at = i64::try_from(micros)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_micros)
        .ok_or(WireError::InvalidTimestamp(micros))?;

    let base = currency(&bytes[BASE_RANGE])?;
    let quote = currency(&bytes[QUOTE_RANGE])?;
    let rate = f64::from_le_bytes(array(&bytes[RATE_RANGE]));

    Ok(QuoteEvent::new(base, quote, rate, observed_at))
}

/// Decode every record of a datagram, in order. A trailing partial record
/// shows up as a `ShortRecord` error at the end.
pub fn decode_datagram(data: &[u8]) -> impl Iterator<Item = Result<QuoteEvent, WireError>> + '_ {
    data.chunks(RECORD_SIZE).map(decode_record)
}

/// Encode one record (test fixtures, captures)
pub fn encode_record(event: &QuoteEvent) -> [u8; RECORD_SIZE] {
    let mut out = [0u8; RECORD_SIZE];
    // Pre-epoch timestamps are not representable on the wire
    let micros = event.observed_at.timestamp_micros().max(0) as u64;
    out[TS_RANGE].copy_from_slice(&micros.to_be_bytes());
    out[BASE_RANGE].copy_from_slice(event.base.as_bytes());
    out[QUOTE_RANGE].copy_from_slice(event.quote.as_bytes());
    out[RATE_RANGE].copy_from_slice(&event.rate.to_le_bytes());
    out
}

fn currency(bytes: &[u8]) -> Result<Currency, WireError> {
    Currency::from_bytes(array(bytes))
        .map_err(|_| WireError::InvalidCurrency(hex::encode(bytes)))
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
