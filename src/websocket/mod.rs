//! Async WebSocket client for the ledger gateway.
//!
//! This module is organized by domain:
//! - [`subscription`] - Trade feed subscribe/unsubscribe operations
//! - [`trading`] - Deposit, withdrawal, and order RPC operations
//! - [`handler`] - Incoming message processing
//!
//! [`WsGateway`] multiplexes every request over one connection. Responses
//! are matched to their callers by `req_id`; trade pushes are routed to
//! the feed registered for their subscription id. A dropped connection
//! fails all in-flight requests, ends all feeds, and is re-established on
//! the next request.

mod handler;
mod subscription;
mod trading;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use futures_util::SinkExt;
use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use tungstenite::Message;

use crate::Result;
use crate::config::GatewayConfig;
use crate::error::MirrorError;
use crate::gateway::{LedgerGateway, TradeFeed};
use crate::models::{
    Ack, Balances, BalancesParams, Order, OrderBook, OrderParams, OrdersParams, Pair, Request, Response,
    Side, SubscriptionId, TradeRecord, UnsubscribeParams,
};

/// Write half of a gateway WebSocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a gateway WebSocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`MirrorError`] if the connection or TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws_stream, _) = connect_async(url).await?;
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// The writer of the current connection, tagged with its generation.
struct Connection {
    id: u64,
    writer: WsWriter,
}

/// A request awaiting its response.
struct PendingRequest {
    connection: u64,
    reply: oneshot::Sender<Response>,
    /// Feed to register if this is a successful `subscribe`.
    feed: Option<mpsc::UnboundedSender<TradeRecord>>,
}

/// A registered trade feed.
struct FeedRoute {
    connection: u64,
    sender: mpsc::UnboundedSender<TradeRecord>,
}

/// Routing tables shared between callers and the reader task.
#[derive(Default)]
struct Routes {
    pending: Mutex<HashMap<u64, PendingRequest>>,
    feeds: Mutex<HashMap<SubscriptionId, FeedRoute>>,
    /// Subscriptions confirmed with nobody left to own them, by connection.
    abandoned: Mutex<Vec<(u64, SubscriptionId)>>,
}

impl Routes {
    /// Drops every request and feed bound to a closed connection.
    ///
    /// Dropping the reply senders fails the waiting requests with
    /// [`MirrorError::Disconnected`]; dropping feed senders ends the feeds.
    fn close_connection(&self, connection: u64) {
        self.pending
            .lock()
            .retain(|_, pending| pending.connection != connection);
        self.feeds
            .lock()
            .retain(|_, route| route.connection != connection);
        self.abandoned
            .lock()
            .retain(|(owner, _)| *owner != connection);
    }

    /// Queues `subscription` for cancellation on the next request.
    fn abandon(&self, connection: u64, subscription: SubscriptionId) {
        self.abandoned.lock().push((connection, subscription));
    }
}

/// [`LedgerGateway`] implementation over a JSON WebSocket connection.
pub struct WsGateway {
    url: String,
    request_timeout: Duration,
    connection: Arc<tokio::sync::Mutex<Option<Connection>>>,
    routes: Arc<Routes>,
    next_req_id: AtomicU64,
    next_connection_id: AtomicU64,
}

impl WsGateway {
    /// Connects to the gateway described by `config`.
    ///
    /// The first connection is made eagerly so an unreachable gateway is
    /// reported at startup rather than on the first request.
    ///
    /// # Errors
    ///
    /// Returns a [`MirrorError`] if the connection cannot be established.
    pub async fn connect(config: &GatewayConfig) -> Result<Self> {
        let gateway = Self {
            url: config.url.clone(),
            request_timeout: config.request_timeout,
            connection: Arc::new(tokio::sync::Mutex::new(None)),
            routes: Arc::new(Routes::default()),
            next_req_id: AtomicU64::new(1),
            next_connection_id: AtomicU64::new(1),
        };

        {
            let mut guard = gateway.connection.lock().await;
            *guard = Some(gateway.open_connection().await?);
        }

        Ok(gateway)
    }

    /// Opens a new socket and spawns its reader task.
    async fn open_connection(&self) -> Result<Connection> {
        info!(url = %self.url, "Connecting to ledger gateway");
        let (writer, reader) = connect(&self.url).await?;
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(handler::read_messages(
            reader,
            id,
            self.routes.clone(),
            self.connection.clone(),
        ));

        Ok(Connection { id, writer })
    }

    /// Sends a request and waits for its typed result.
    pub(crate) async fn request<P, T>(&self, method: &str, params: P) -> Result<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        self.call(method, params, None).await?.into_result()
    }

    /// Sends a request and waits for the raw response.
    ///
    /// When `feed` is given it is registered by the reader as soon as a
    /// successful response arrives, before any push for the new
    /// subscription can be dispatched.
    async fn call<P: Serialize>(
        &self,
        method: &str,
        params: P,
        feed: Option<mpsc::UnboundedSender<TradeRecord>>,
    ) -> Result<Response> {
        let req_id = self.next_req_id.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(method, params, req_id);
        let json = serde_json::to_string(&request)?;
        let (reply, response) = oneshot::channel();

        {
            let mut guard = self.connection.lock().await;
            if guard.is_none() {
                *guard = Some(self.open_connection().await?);
            }
            let Some(connection) = guard.as_mut() else {
                return Err(MirrorError::Disconnected);
            };
            self.cancel_abandoned(connection).await;

            self.routes.pending.lock().insert(
                req_id,
                PendingRequest {
                    connection: connection.id,
                    reply,
                    feed,
                },
            );

            if let Err(e) = connection.writer.send(Message::Text(json.into())).await {
                self.routes.pending.lock().remove(&req_id);
                warn!(method, req_id, "Send failed, dropping connection: {e}");
                *guard = None;
                return Err(e.into());
            }
        }
        debug!(method, req_id, "Sent request");

        let mut response = response;
        match tokio::time::timeout(self.request_timeout, &mut response).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(MirrorError::Disconnected),
            Err(_) => {
                self.routes.pending.lock().remove(&req_id);
                // The reader hands replies over under the pending lock, so
                // anything it delivered is in the channel by now.
                if let Ok(response) = response.try_recv() {
                    debug!(method, req_id, "Reply landed at the deadline");
                    return Ok(response);
                }
                Err(MirrorError::Timeout {
                    method: method.to_string(),
                })
            }
        }
    }

    /// Sends `unsubscribe` for every abandoned subscription on `connection`.
    ///
    /// Replies are not awaited; the reader logs them as unknown requests.
    async fn cancel_abandoned(&self, connection: &mut Connection) {
        let abandoned: Vec<SubscriptionId> = {
            let mut queue = self.routes.abandoned.lock();
            let (current, rest): (Vec<_>, Vec<_>) = queue
                .drain(..)
                .partition(|(owner, _)| *owner == connection.id);
            *queue = rest;
            current.into_iter().map(|(_, subscription)| subscription).collect()
        };

        for subscription in abandoned {
            let req_id = self.next_req_id.fetch_add(1, Ordering::Relaxed);
            let request = Request::new("unsubscribe", UnsubscribeParams { subscription }, req_id);
            let sent = match serde_json::to_string(&request) {
                Ok(json) => connection.writer.send(Message::Text(json.into())).await,
                Err(e) => {
                    warn!(%subscription, "Failed to encode unsubscribe: {e}");
                    continue;
                }
            };
            match sent {
                Ok(()) => info!(%subscription, "Cancelled abandoned subscription"),
                Err(e) => warn!(%subscription, "Failed to cancel abandoned subscription: {e}"),
            }
        }
    }

    async fn get_orders(&self, pair: &Pair, side: Side) -> Result<Vec<Order>> {
        let params = OrdersParams {
            ticker: pair.ticker(),
            side,
        };
        self.request("get_orders", params).await
    }
}

#[async_trait]
impl LedgerGateway for WsGateway {
    async fn list_pairs(&self) -> Result<Vec<Pair>> {
        let pairs: Vec<Pair> = self.request("list_pairs", serde_json::json!({})).await?;
        info!(count = pairs.len(), "Fetched pair list");
        Ok(pairs)
    }

    async fn get_balances(&self, account: Address, pair: &Pair) -> Result<Balances> {
        let params = BalancesParams {
            account,
            ticker: pair.ticker(),
        };
        self.request("get_balances", params).await
    }

    async fn get_order_book(&self, pair: &Pair) -> Result<OrderBook> {
        let (buy, sell) = tokio::try_join!(
            self.get_orders(pair, Side::Buy),
            self.get_orders(pair, Side::Sell)
        )?;
        Ok(OrderBook { buy, sell })
    }

    async fn submit_order(&self, account: Address, order: &OrderParams) -> Result<Ack> {
        trading::submit_order(self, account, order).await
    }

    async fn deposit(&self, account: Address, pair: &Pair, amount: U256) -> Result<Ack> {
        trading::deposit(self, account, pair, amount).await
    }

    async fn withdraw(&self, account: Address, pair: &Pair, amount: U256) -> Result<Ack> {
        trading::withdraw(self, account, pair, amount).await
    }

    async fn subscribe_trades(&self, pair: &Pair, from_block: u64) -> Result<TradeFeed> {
        subscription::subscribe_trades(self, pair, from_block).await
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        subscription::unsubscribe(self, id).await
    }
}
