//! Pair and ticker models.
//!
//! The ledger identifies every asset by a 32-byte ticker: the ASCII symbol
//! left-aligned and padded with null bytes. [`Ticker`] owns that encoding so
//! the rest of the crate only ever handles symbols as strings.

use std::fmt;
use std::hash::{Hash, Hasher};

use alloy_primitives::{Address, B256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

/// Maximum number of bytes a symbol may occupy on the wire.
const TICKER_WIDTH: usize = 32;

/// Decimals assumed when the ledger does not report them.
const DEFAULT_DECIMALS: u8 = 18;

/// Fixed-width, null-padded ticker as stored by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(B256);

impl Ticker {
    /// Encodes a symbol into its fixed-width form.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::InvalidTicker`] if the symbol is empty, not
    /// ASCII, or longer than 32 bytes.
    pub fn from_symbol(symbol: &str) -> crate::Result<Self> {
        if symbol.is_empty() || !symbol.is_ascii() || symbol.len() > TICKER_WIDTH {
            return Err(MirrorError::InvalidTicker(symbol.to_string()));
        }

        let mut bytes = [0u8; TICKER_WIDTH];
        bytes[..symbol.len()].copy_from_slice(symbol.as_bytes());
        Ok(Self(B256::from(bytes)))
    }

    /// Decodes the symbol, dropping the null padding.
    pub fn symbol(&self) -> String {
        let bytes = self.0.as_slice();
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    /// Returns the raw 32-byte value.
    pub fn as_b256(&self) -> &B256 {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol())
    }
}

/// A tradeable asset quoted against the base asset.
///
/// Pairs are fetched once at startup and never mutated. Two pairs are
/// equal when their tickers are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PairRecord", into = "PairRecord")]
pub struct Pair {
    ticker: Ticker,
    symbol: String,
    token_address: Address,
    decimals: u8,
}

/// Wire shape of a pair as returned by `list_pairs`.
#[derive(Serialize, Deserialize)]
struct PairRecord {
    ticker: Ticker,
    token_address: Address,
    #[serde(default = "default_decimals")]
    decimals: u8,
}

fn default_decimals() -> u8 {
    DEFAULT_DECIMALS
}

impl TryFrom<PairRecord> for Pair {
    type Error = MirrorError;

    fn try_from(record: PairRecord) -> Result<Self, Self::Error> {
        let symbol = record.ticker.symbol();
        if symbol.is_empty() {
            return Err(MirrorError::InvalidTicker(record.ticker.as_b256().to_string()));
        }
        Ok(Self {
            ticker: record.ticker,
            symbol,
            token_address: record.token_address,
            decimals: record.decimals,
        })
    }
}

impl From<Pair> for PairRecord {
    fn from(pair: Pair) -> Self {
        Self {
            ticker: pair.ticker,
            token_address: pair.token_address,
            decimals: pair.decimals,
        }
    }
}

impl Pair {
    /// Creates a pair from its symbol and token contract address.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::InvalidTicker`] if the symbol cannot be encoded.
    pub fn new(symbol: &str, token_address: Address, decimals: u8) -> crate::Result<Self> {
        Ok(Self {
            ticker: Ticker::from_symbol(symbol)?,
            symbol: symbol.to_string(),
            token_address,
            decimals,
        })
    }

    pub fn ticker(&self) -> Ticker {
        self.ticker
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn token_address(&self) -> Address {
        self.token_address
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Converts a native integer amount into display units.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Units`] if the amount does not fit a
    /// [`Decimal`] at this pair's precision.
    pub fn format_units(&self, amount: U256) -> crate::Result<Decimal> {
        let raw = u128::try_from(amount)
            .ok()
            .and_then(|v| i128::try_from(v).ok())
            .ok_or_else(|| MirrorError::Units(format!("{amount} is out of range")))?;

        Decimal::try_from_i128_with_scale(raw, u32::from(self.decimals))
            .map(|d| d.normalize())
            .map_err(|e| MirrorError::Units(format!("{amount}: {e}")))
    }

    /// Converts a display amount into native integer units.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Units`] if the amount is not positive or has
    /// more fractional digits than the pair supports.
    pub fn parse_units(&self, value: Decimal) -> crate::Result<U256> {
        if value.is_sign_negative() || value.is_zero() {
            return Err(MirrorError::Units(format!("{value} is not positive")));
        }

        let scale = u32::from(self.decimals);
        if value.normalize().scale() > scale {
            return Err(MirrorError::Units(format!(
                "{value} has more than {scale} decimal places"
            )));
        }

        let mut scaled = value;
        scaled.rescale(scale);
        if scaled.scale() != scale {
            return Err(MirrorError::Units(format!("{value} is out of range")));
        }

        let mantissa = u128::try_from(scaled.mantissa())
            .map_err(|_| MirrorError::Units(format!("{value} is out of range")))?;
        Ok(U256::from(mantissa))
    }
}

impl PartialEq for Pair {
    fn eq(&self, other: &Self) -> bool {
        self.ticker == other.ticker
    }
}

impl Eq for Pair {}

impl Hash for Pair {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ticker.hash(state);
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}
