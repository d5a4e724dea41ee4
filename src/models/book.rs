//! Order book models.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use super::order::Side;

/// A resting order on the ledger's book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub id: u64,
    pub trader: Address,
    pub side: Side,
    pub amount: U256,
    /// Portion of `amount` already matched.
    #[serde(default)]
    pub filled: U256,
    pub price: U256,
    /// Unix timestamp of order creation.
    #[serde(default)]
    pub date: u64,
}

impl Order {
    /// Amount still open for matching.
    pub fn remaining(&self) -> U256 {
        self.amount.saturating_sub(self.filled)
    }
}

/// Open orders for one pair, split by side.
///
/// Always replaced wholesale; the ledger offers no incremental updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    pub buy: Vec<Order>,
    pub sell: Vec<Order>,
}

impl OrderBook {
    /// Returns the orders placed by `trader`, preserving side and order.
    pub fn orders_by(&self, trader: &Address) -> OrderBook {
        let own = |orders: &[Order]| {
            orders
                .iter()
                .filter(|o| o.trader == *trader)
                .cloned()
                .collect()
        };
        OrderBook {
            buy: own(&self.buy),
            sell: own(&self.sell),
        }
    }

    pub fn len(&self) -> usize {
        self.buy.len() + self.sell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }
}
