//! Trade feed subscription and unsubscription operations.

use tokio::sync::mpsc;
use tracing::info;

use super::WsGateway;
use crate::Result;
use crate::gateway::TradeFeed;
use crate::models::{
    Channel, Pair, SubscribeParams, SubscribeResult, SubscriptionId, UnsubscribeParams,
};

/// Subscribes to trades for `pair`, replaying from `from_block`.
///
/// # Errors
///
/// Returns a [`MirrorError`](crate::MirrorError) if the request fails or
/// the gateway rejects the subscription.
pub(super) async fn subscribe_trades(
    gateway: &WsGateway,
    pair: &Pair,
    from_block: u64,
) -> Result<TradeFeed> {
    let (sender, events) = mpsc::unbounded_channel();
    let params = SubscribeParams::new(&Channel::Trades, pair.ticker(), from_block);
    let result: SubscribeResult = gateway
        .call("subscribe", params, Some(sender))
        .await?
        .into_result()?;

    info!(
        channel = Channel::Trades.as_str(),
        pair = %pair,
        from_block,
        subscription = %result.subscription,
        "Subscribed to channel"
    );

    Ok(TradeFeed {
        id: result.subscription,
        events,
    })
}

/// Cancels a trade subscription and stops routing its pushes.
///
/// # Errors
///
/// Returns a [`MirrorError`](crate::MirrorError) if the request fails.
pub(super) async fn unsubscribe(gateway: &WsGateway, subscription: SubscriptionId) -> Result<()> {
    // Stop routing first so nothing is delivered while the request is in flight.
    gateway.routes.feeds.lock().remove(&subscription);

    let params = UnsubscribeParams { subscription };
    let _: serde_json::Value = gateway.request("unsubscribe", params).await?;
    info!(
        channel = Channel::Trades.as_str(),
        %subscription,
        "Unsubscribed from channel"
    );

    Ok(())
}
