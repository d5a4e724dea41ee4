//! Deposit, withdrawal, and order RPC operations.
//!
//! Each call returns once the ledger acknowledges the transaction; the
//! acknowledgement carries no balances or book, so callers re-read them.

use alloy_primitives::{Address, U256};
use tracing::info;

use super::WsGateway;
use crate::Result;
use crate::models::{Ack, OrderParams, Pair, SubmitOrderParams, TransferParams};

/// Approves the exchange to pull `amount`, then deposits it.
///
/// # Errors
///
/// Returns a [`MirrorError`](crate::MirrorError) if either step fails. A
/// failed approval skips the deposit.
pub(super) async fn deposit(
    gateway: &WsGateway,
    account: Address,
    pair: &Pair,
    amount: U256,
) -> Result<Ack> {
    let params = TransferParams {
        account,
        ticker: pair.ticker(),
        amount,
    };

    let _: Ack = gateway.request("approve", params.clone()).await?;
    let ack: Ack = gateway.request("deposit", params).await?;
    info!(method = "deposit", pair = %pair, %amount, tx = ?ack.tx_hash, "Deposit acknowledged");

    Ok(ack)
}

/// Withdraws `amount` from the ledger back to the wallet.
///
/// # Errors
///
/// Returns a [`MirrorError`](crate::MirrorError) if the request fails.
pub(super) async fn withdraw(
    gateway: &WsGateway,
    account: Address,
    pair: &Pair,
    amount: U256,
) -> Result<Ack> {
    let params = TransferParams {
        account,
        ticker: pair.ticker(),
        amount,
    };

    let ack: Ack = gateway.request("withdraw", params).await?;
    info!(method = "withdraw", pair = %pair, %amount, tx = ?ack.tx_hash, "Withdrawal acknowledged");

    Ok(ack)
}

/// Submits a market or limit order.
///
/// # Errors
///
/// Returns a [`MirrorError`](crate::MirrorError) if the request fails.
pub(super) async fn submit_order(
    gateway: &WsGateway,
    account: Address,
    order: &OrderParams,
) -> Result<Ack> {
    let method = order.kind.method();
    let params = SubmitOrderParams {
        account,
        order: order.clone(),
    };

    let ack: Ack = gateway.request(method, params).await?;
    info!(
        method,
        ticker = %order.ticker,
        side = order.side.as_str(),
        amount = %order.amount,
        tx = ?ack.tx_hash,
        "Order acknowledged"
    );

    Ok(ack)
}
