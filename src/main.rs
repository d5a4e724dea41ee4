use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::U256;
use dexmirror::config::fetch_config;
use dexmirror::models::{OrderKind, Pair, Side};
use dexmirror::websocket::WsGateway;
use dexmirror::{MirrorError, SyncCore};
use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
commands:
  pairs                          list tradeable pairs
  select <SYMBOL>                switch the selected pair
  balances                       show ledger and wallet balances
  book                           show the order book
  trades                         show the trade history
  deposit <amount>               move tokens from wallet to ledger
  withdraw <amount>              move tokens from ledger to wallet
  buy|sell market <amount>       place a market order
  buy|sell limit <amount> <price> place a limit order
  quit";

#[tokio::main]
async fn main() -> Result<(), MirrorError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app_config = fetch_config()?;

    println!("Loading pairs from {} ...", app_config.gateway.url);
    let gateway = Arc::new(WsGateway::connect(&app_config.gateway).await?);
    let (core, bootstrap) =
        SyncCore::initialize(gateway, app_config.account, &app_config.sync).await?;
    println!(
        "Ready: {} pairs, trading {} as {}",
        bootstrap.pairs.len(),
        bootstrap.selected,
        core.account()
    );
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.first() == Some(&"quit") {
            break;
        }
        if let Err(e) = run_command(&core, &words).await {
            warn!("{e}");
            println!("error: {e}");
        }
    }

    core.shutdown().await;
    Ok(())
}

async fn run_command(core: &SyncCore<WsGateway>, words: &[&str]) -> Result<(), MirrorError> {
    match words {
        [] => {}
        ["pairs"] => {
            let snapshot = core.snapshot();
            for pair in &snapshot.tradeable {
                let marker = if *pair == snapshot.selected { "*" } else { " " };
                println!("{marker} {pair} ({} decimals)", pair.decimals());
            }
        }
        ["select", symbol] => {
            let pair = core
                .snapshot()
                .find_pair(symbol)
                .cloned()
                .ok_or_else(|| MirrorError::UnknownPair((*symbol).to_string()))?;
            core.select_pair(&pair).await?;
            println!("selected {pair}");
        }
        ["balances"] => print_balances(core)?,
        ["book"] => print_book(core)?,
        ["trades"] => print_trades(core)?,
        ["deposit", amount] => {
            let amount = native_amount(&core.selected_pair(), amount)?;
            core.deposit(amount).await?;
            print_balances(core)?;
        }
        ["withdraw", amount] => {
            let amount = native_amount(&core.selected_pair(), amount)?;
            core.withdraw(amount).await?;
            print_balances(core)?;
        }
        [side, "market", amount] => {
            let side = parse_side(side)?;
            let amount = native_amount(&core.selected_pair(), amount)?;
            core.create_order(amount, side, OrderKind::Market, None).await?;
            print_book(core)?;
        }
        [side, "limit", amount, price] => {
            let side = parse_side(side)?;
            let pair = core.selected_pair();
            let amount = native_amount(&pair, amount)?;
            let price = native_amount(&pair, price)?;
            core.create_order(amount, side, OrderKind::Limit, Some(price))
                .await?;
            print_book(core)?;
        }
        _ => println!("{HELP}"),
    }
    Ok(())
}

fn parse_side(word: &str) -> Result<Side, MirrorError> {
    match word {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(MirrorError::Units(format!("unknown side: {other}"))),
    }
}

/// Converts a display-unit amount to native units of `pair`.
fn native_amount(pair: &Pair, raw: &str) -> Result<U256, MirrorError> {
    let value = Decimal::from_str(raw).map_err(|e| MirrorError::Units(format!("{raw}: {e}")))?;
    pair.parse_units(value)
}

fn print_balances(core: &SyncCore<WsGateway>) -> Result<(), MirrorError> {
    let snapshot = core.snapshot();
    let pair = &snapshot.selected;
    match snapshot.balances {
        Some(balances) => println!(
            "{pair}: ledger {} | wallet {}",
            pair.format_units(balances.on_ledger)?,
            pair.format_units(balances.on_wallet)?
        ),
        None => println!("{pair}: balances loading"),
    }
    Ok(())
}

fn print_book(core: &SyncCore<WsGateway>) -> Result<(), MirrorError> {
    let snapshot = core.snapshot();
    let pair = &snapshot.selected;
    let Some(book) = &snapshot.order_book else {
        println!("{pair}: order book loading");
        return Ok(());
    };

    let account = core.account();
    for (label, orders) in [("sell", &book.sell), ("buy", &book.buy)] {
        println!("{label} orders:");
        for order in orders {
            let mine = if order.trader == account { " (mine)" } else { "" };
            println!(
                "  #{} {} @ {}{mine}",
                order.id,
                pair.format_units(order.remaining())?,
                pair.format_units(order.price)?
            );
        }
    }
    Ok(())
}

fn print_trades(core: &SyncCore<WsGateway>) -> Result<(), MirrorError> {
    let snapshot = core.snapshot();
    let pair = &snapshot.selected;
    if let Some(status) = snapshot.feed_status {
        println!("{pair} trades ({status:?}):");
    }
    for trade in &snapshot.trades {
        println!(
            "  {} block {}: {} @ {}",
            trade.trade_id,
            trade.block_number,
            pair.format_units(trade.amount)?,
            pair.format_units(trade.price)?
        );
    }
    Ok(())
}
