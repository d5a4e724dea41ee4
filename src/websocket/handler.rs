//! Incoming WebSocket message processing.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, info, warn};
use tungstenite::Message;

use super::{Connection, FeedRoute, Routes, WsReader};
use crate::models::{Channel, Response, SubscribeResult, SubscriptionId, TradePush};

/// Reads and dispatches incoming messages until the connection closes.
///
/// On exit the connection is cleared (if it is still the current one) and
/// every request and feed bound to it is dropped.
pub(super) async fn read_messages(
    mut read: WsReader,
    connection_id: u64,
    routes: Arc<Routes>,
    connection: Arc<tokio::sync::Mutex<Option<Connection>>>,
) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                Ok(value) => dispatch_message(&routes, connection_id, value),
                Err(e) => warn!("Discarding malformed message: {e}"),
            },
            Ok(Message::Close(frame)) => {
                info!(?frame, "Gateway closed the connection");
                break;
            }
            Ok(_) => {} // Binary/Ping/Pong frames
            Err(e) => {
                warn!("WebSocket error: {e}");
                break;
            }
        }
    }

    {
        let mut guard = connection.lock().await;
        if guard.as_ref().is_some_and(|c| c.id == connection_id) {
            *guard = None;
        }
    }
    routes.close_connection(connection_id);
    warn!(connection_id, "Gateway connection ended");
}

/// Routes a parsed JSON message to the waiting request or trade feed.
fn dispatch_message(routes: &Routes, connection_id: u64, value: serde_json::Value) {
    let has_req_id = value.get("req_id").is_some();
    let channel = value
        .get("channel")
        .and_then(|c| c.as_str())
        .map(String::from);

    // Responses first (req_id-based routing)
    if has_req_id {
        match serde_json::from_value::<Response>(value) {
            Ok(response) => handle_response(routes, connection_id, response),
            Err(e) => warn!("Discarding unreadable response: {e}"),
        }
        return;
    }

    if channel.as_deref() == Some(Channel::Trades.as_str()) {
        match serde_json::from_value::<TradePush>(value) {
            Ok(push) => handle_trade_push(routes, push),
            Err(e) => warn!("Discarding unreadable trade push: {e}"),
        }
        return;
    }

    debug!(?channel, "Ignoring unrouted message");
}

/// Completes the request waiting on this response.
///
/// The pending entry stays locked until the reply is handed over, so a
/// caller that timed out and then removed its entry either finds the reply
/// in its channel or is sure it was never delivered. A subscription whose
/// caller is gone is queued for cancellation.
fn handle_response(routes: &Routes, connection_id: u64, response: Response) {
    let mut pending = routes.pending.lock();
    let Some(request) = pending.remove(&response.req_id) else {
        drop(pending);
        if let Some(subscription) = subscription_of(&response) {
            warn!(%subscription, req_id = response.req_id, "Subscription confirmed after its request expired");
            routes.abandon(connection_id, subscription);
        } else {
            debug!(req_id = response.req_id, "Response for unknown or expired request");
        }
        return;
    };

    // Register the feed before replying so no push can outrun it.
    let registered = match request.feed {
        Some(sender) => subscription_of(&response).inspect(|subscription| {
            routes.feeds.lock().insert(
                *subscription,
                FeedRoute {
                    connection: request.connection,
                    sender,
                },
            );
        }),
        None => None,
    };

    if request.reply.send(response).is_err()
        && let Some(subscription) = registered
    {
        drop(pending);
        warn!(%subscription, "Subscriber went away before confirmation");
        routes.feeds.lock().remove(&subscription);
        routes.abandon(connection_id, subscription);
    }
}

/// The subscription id a successful `subscribe` response confirms.
fn subscription_of(response: &Response) -> Option<SubscriptionId> {
    if !response.success || response.method != "subscribe" {
        return None;
    }
    let result = response.result.clone()?;
    serde_json::from_value::<SubscribeResult>(result)
        .ok()
        .map(|result| result.subscription)
}

/// Forwards pushed trades to their feed, dropping the route if the feed
/// receiver is gone.
fn handle_trade_push(routes: &Routes, push: TradePush) {
    let mut feeds = routes.feeds.lock();
    let Some(route) = feeds.get(&push.subscription) else {
        debug!(subscription = %push.subscription, "Trade push for unknown subscription");
        return;
    };

    let count = push.data.len();
    let delivered = push
        .data
        .into_iter()
        .all(|trade| route.sender.send(trade).is_ok());
    if delivered {
        debug!(subscription = %push.subscription, count, "Dispatched trades");
    } else {
        feeds.remove(&push.subscription);
    }
}
