//! Shared models for the ledger gateway protocol.
//!
//! Contains the request/response envelopes exchanged with the gateway,
//! the parameter shapes of each method, and the push frame carrying
//! trade events.

pub mod balance;
pub mod book;
pub mod order;
pub mod pair;
pub mod trade;

use std::fmt;

use alloy_primitives::{Address, B256, U256};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

pub use balance::Balances;
pub use book::{Order, OrderBook};
pub use order::{OrderError, OrderKind, OrderParams, OrderRequest, Side};
pub use pair::{Pair, Ticker};
pub use trade::{TradeId, TradeRecord};

/// Push channels offered by the gateway.
pub enum Channel {
    /// Executed trades (wire name: `"trade"`).
    Trades,
}

impl Channel {
    /// Returns the wire-format channel name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Trades => "trade",
        }
    }
}

/// Gateway-assigned identifier of a push subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request sent to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct Request<P> {
    method: String,
    params: P,
    req_id: u64,
}

impl<P: Serialize> Request<P> {
    #[must_use]
    pub fn new(method: &str, params: P, req_id: u64) -> Self {
        Self {
            method: method.to_string(),
            params,
            req_id,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn req_id(&self) -> u64 {
        self.req_id
    }
}

/// Gateway answer to a [`Request`], correlated by `req_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub method: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub req_id: u64,
}

impl Response {
    /// Converts the response into its typed result.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Rejected`] if the gateway reported failure, or
    /// [`MirrorError::Json`] if the result does not match `T`.
    pub fn into_result<T: DeserializeOwned>(self) -> crate::Result<T> {
        if !self.success {
            return Err(MirrorError::Rejected {
                method: self.method,
                reason: self.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        // Acks may omit the result entirely.
        let value = match self.result {
            None | Some(serde_json::Value::Null) => {
                serde_json::Value::Object(serde_json::Map::new())
            }
            Some(value) => value,
        };
        Ok(serde_json::from_value(value)?)
    }
}

/// Acknowledgement of a state-changing request.
///
/// The ledger settles asynchronously, so the ack carries no final state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub tx_hash: Option<B256>,
}

/// Parameters of `get_balances`.
#[derive(Debug, Clone, Serialize)]
pub struct BalancesParams {
    pub account: Address,
    pub ticker: Ticker,
}

/// Parameters of `get_orders`; each side is read separately.
#[derive(Debug, Clone, Serialize)]
pub struct OrdersParams {
    pub ticker: Ticker,
    pub side: Side,
}

/// Parameters of `approve`, `deposit`, and `withdraw`.
#[derive(Debug, Clone, Serialize)]
pub struct TransferParams {
    pub account: Address,
    pub ticker: Ticker,
    pub amount: U256,
}

/// Parameters of `create_market_order` and `create_limit_order`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOrderParams {
    pub account: Address,
    #[serde(flatten)]
    pub order: OrderParams,
}

/// Parameters of `subscribe`.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeParams {
    pub channel: String,
    pub ticker: Ticker,
    /// Block from which matching events are replayed.
    pub from_block: u64,
}

impl SubscribeParams {
    #[must_use]
    pub fn new(channel: &Channel, ticker: Ticker, from_block: u64) -> Self {
        Self {
            channel: channel.as_str().to_string(),
            ticker,
            from_block,
        }
    }
}

/// Result of a successful `subscribe`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeResult {
    pub subscription: SubscriptionId,
}

/// Parameters of `unsubscribe`.
#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeParams {
    pub subscription: SubscriptionId,
}

/// A push frame delivering trades for one subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct TradePush {
    pub channel: String,
    pub subscription: SubscriptionId,
    pub data: Vec<TradeRecord>,
}
