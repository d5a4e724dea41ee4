//! Contract of the remote ledger gateway consumed by the synchronization core.
//!
//! The gateway exposes request/response reads and writes plus a push
//! subscription for trade events. [`WsGateway`](crate::websocket::WsGateway)
//! is the production implementation; tests substitute an in-memory one.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;
use crate::models::{Ack, Balances, OrderBook, OrderParams, Pair, SubscriptionId, TradeRecord};

/// A live trade subscription.
///
/// Trades arrive on `events` in delivery order. The receiver yields `None`
/// once the gateway drops the subscription, after which the caller decides
/// whether to resubscribe.
#[derive(Debug)]
pub struct TradeFeed {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<TradeRecord>,
}

/// Remote ledger operations.
#[async_trait]
pub trait LedgerGateway: Send + Sync + 'static {
    /// Lists every pair known to the ledger; the first one is the base asset.
    async fn list_pairs(&self) -> Result<Vec<Pair>>;

    /// Reads the ledger and wallet balances of `account` for `pair`.
    async fn get_balances(&self, account: Address, pair: &Pair) -> Result<Balances>;

    /// Reads both sides of the open order book for `pair`.
    async fn get_order_book(&self, pair: &Pair) -> Result<OrderBook>;

    /// Submits a market or limit order on behalf of `account`.
    async fn submit_order(&self, account: Address, order: &OrderParams) -> Result<Ack>;

    /// Moves `amount` of `pair` from the wallet into the ledger.
    async fn deposit(&self, account: Address, pair: &Pair, amount: U256) -> Result<Ack>;

    /// Moves `amount` of `pair` from the ledger back to the wallet.
    async fn withdraw(&self, account: Address, pair: &Pair, amount: U256) -> Result<Ack>;

    /// Opens a trade subscription for `pair`, replaying from `from_block`.
    async fn subscribe_trades(&self, pair: &Pair, from_block: u64) -> Result<TradeFeed>;

    /// Cancels a trade subscription.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
}
