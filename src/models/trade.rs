//! Trade event models.

use std::fmt;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use super::pair::Ticker;

/// Ledger-assigned trade identifier, unique within one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeId(String);

impl TradeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TradeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TradeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single executed trade, as pushed on the `trade` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: TradeId,
    /// Resting order that was matched.
    #[serde(default)]
    pub order_id: u64,
    pub ticker: Ticker,
    /// Owner of the resting order.
    pub maker: Address,
    /// Account whose order crossed the book.
    pub taker: Address,
    pub amount: U256,
    pub price: U256,
    /// Unix timestamp of the block that executed the trade.
    #[serde(default)]
    pub date: u64,
    /// Block that executed the trade; used as the resubscription checkpoint.
    pub block_number: u64,
}
