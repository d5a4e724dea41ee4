//! Order submission models.
//!
//! Orders are RPC-style one-shot requests. The acknowledgement does not
//! carry the resulting book, so callers re-read the book after success.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use super::pair::Ticker;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// How the order should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// Crosses the book immediately at the best available prices.
    Market,
    /// Rests on the book at `price`.
    Limit,
}

impl OrderKind {
    /// Returns the ledger method that creates this kind of order.
    pub fn method(&self) -> &'static str {
        match self {
            OrderKind::Market => "create_market_order",
            OrderKind::Limit => "create_limit_order",
        }
    }
}

/// Validated order parameters ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderParams {
    #[serde(skip)]
    pub kind: OrderKind,
    pub ticker: Ticker,
    pub side: Side,
    pub amount: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<U256>,
}

/// Builder for constructing order parameters with validation.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    kind: OrderKind,
    side: Side,
    ticker: Ticker,
    amount: U256,
    price: Option<U256>,
}

impl OrderRequest {
    /// Creates a new builder for a market order.
    #[must_use]
    pub fn market(side: Side, ticker: Ticker, amount: U256) -> Self {
        Self::new(OrderKind::Market, side, ticker, amount, None)
    }

    /// Creates a new builder for a limit order.
    #[must_use]
    pub fn limit(side: Side, ticker: Ticker, amount: U256, price: U256) -> Self {
        Self::new(OrderKind::Limit, side, ticker, amount, Some(price))
    }

    #[must_use]
    pub fn new(
        kind: OrderKind,
        side: Side,
        ticker: Ticker,
        amount: U256,
        price: Option<U256>,
    ) -> Self {
        Self {
            kind,
            side,
            ticker,
            amount,
            price,
        }
    }

    /// Validates and builds the order parameters.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderError`] if the amount is zero, a limit order has
    /// no positive price, or a market order carries a price.
    pub fn build(self) -> Result<OrderParams, OrderError> {
        if self.amount.is_zero() {
            return Err(OrderError::NonPositiveAmount);
        }

        match (self.kind, self.price) {
            (OrderKind::Limit, None) => return Err(OrderError::MissingLimitPrice),
            (OrderKind::Limit, Some(price)) if price.is_zero() => {
                return Err(OrderError::NonPositivePrice);
            }
            (OrderKind::Market, Some(_)) => return Err(OrderError::UnexpectedPrice),
            _ => {}
        }

        Ok(OrderParams {
            kind: self.kind,
            ticker: self.ticker,
            side: self.side,
            amount: self.amount,
            price: self.price,
        })
    }
}

/// Validation errors for order parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Amount must be greater than zero.
    NonPositiveAmount,
    /// Limit orders need a price.
    MissingLimitPrice,
    /// Limit price must be greater than zero.
    NonPositivePrice,
    /// Market orders take the book's prices.
    UnexpectedPrice,
}

impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveAmount => write!(f, "amount must be positive"),
            Self::MissingLimitPrice => write!(f, "price required for limit orders"),
            Self::NonPositivePrice => write!(f, "limit price must be positive"),
            Self::UnexpectedPrice => write!(f, "market orders do not take a price"),
        }
    }
}

impl std::error::Error for OrderError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn tkn() -> Ticker {
        Ticker::from_symbol("TKN1").unwrap()
    }

    #[test]
    fn serialize_market_order_omits_price() {
        let params = OrderRequest::market(Side::Buy, tkn(), U256::from(5u64))
            .build()
            .unwrap();

        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["side"], "buy");
        assert!(value.get("price").is_none());
        assert!(value.get("kind").is_none());
        assert_eq!(params.kind.method(), "create_market_order");
    }

    #[test]
    fn serialize_limit_order() {
        let params = OrderRequest::limit(Side::Sell, tkn(), U256::from(5u64), U256::from(12u64))
            .build()
            .unwrap();

        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["side"], "sell");
        assert!(value.get("price").is_some());
        assert_eq!(params.kind.method(), "create_limit_order");
    }

    #[test]
    fn validate_limit_requires_price() {
        let result =
            OrderRequest::new(OrderKind::Limit, Side::Buy, tkn(), U256::from(1u64), None).build();
        assert_eq!(result, Err(OrderError::MissingLimitPrice));
    }

    #[test]
    fn validate_limit_rejects_zero_price() {
        let result = OrderRequest::limit(Side::Buy, tkn(), U256::from(1u64), U256::ZERO).build();
        assert_eq!(result, Err(OrderError::NonPositivePrice));
    }

    #[test]
    fn validate_market_rejects_price() {
        let result = OrderRequest::new(
            OrderKind::Market,
            Side::Sell,
            tkn(),
            U256::from(1u64),
            Some(U256::from(3u64)),
        )
        .build();
        assert_eq!(result, Err(OrderError::UnexpectedPrice));
    }

    #[test]
    fn validate_amount_positive() {
        let result = OrderRequest::market(Side::Buy, tkn(), U256::ZERO).build();
        assert_eq!(result, Err(OrderError::NonPositiveAmount));
    }
}
