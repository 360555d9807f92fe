//! Currencies and quote events
//!
//! A `QuoteEvent` is the one thing the feed hands to the core: a single
//! published rate between two currencies at a point in time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::QuoteError;

/// A 3-character currency code, e.g. `USD`. Vertex of the rate graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Currency([u8; 3]);

impl Currency {
    /// Default anchor of every shortest-path run
    pub const USD: Currency = Currency(*b"USD");

    /// Build a currency from raw bytes (as found on the wire)
    pub fn from_bytes(bytes: [u8; 3]) -> Result<Self, QuoteError> {
        if bytes.iter().all(|b| b.is_ascii_graphic()) {
            Ok(Self(bytes))
        } else {
            Err(QuoteError::InvalidCurrency(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        }
    }

    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII bytes are ever stored
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl FromStr for Currency {
    type Err = QuoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 3] = s
            .as_bytes()
            .try_into()
            .map_err(|_| QuoteError::InvalidCurrency(s.to_string()))?;
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.as_str())
    }
}

impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One decoded market data update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteEvent {
    pub base: Currency,
    pub quote: Currency,
    /// Units of `quote` received for one unit of `base`
    pub rate: f64,
    pub observed_at: DateTime<Utc>,
}

impl QuoteEvent {
    pub fn new(base: Currency, quote: Currency, rate: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            base,
            quote,
            rate,
            observed_at,
        }
    }

    /// Reject quotes that can never be applied to the graph
    pub fn validate(&self) -> Result<(), QuoteError> {
        validate_rate(self.base, self.quote, self.rate)
    }
}

pub(crate) fn validate_rate(base: Currency, quote: Currency, rate: f64) -> Result<(), QuoteError> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(QuoteError::InvalidRate { base, quote, rate });
    }
    if base == quote {
        return Err(QuoteError::SameCurrency(base));
    }
    Ok(())
}
