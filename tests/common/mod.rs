//! Shared test utilities: an in-memory ledger gateway and pair fixtures.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, U256, address};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use dexmirror::config::{FeedSettings, SyncSettings};
use dexmirror::models::{
    Ack, Balances, Order, OrderBook, OrderParams, Pair, Side, SubscriptionId, Ticker, TradeId,
    TradeRecord,
};
use dexmirror::{LedgerGateway, MirrorError, MirrorSnapshot, Result, SyncCore, TradeFeed};

/// Account the tests trade as.
pub const ACCOUNT: Address = address!("90f8bf6a479f320ead074411a4b0e7944ea8c9c1");

/// Another trader with resting orders in the fixture books.
pub const OTHER: Address = address!("ffcf8fdee72ac11b5c542428b35eef5769c409f0");

pub fn pair(symbol: &str) -> Pair {
    Pair::new(symbol, Address::ZERO, 18).expect("Failed to build pair")
}

/// `[BASE, TKN1, TKN2]`, the base asset listed first.
pub fn default_pairs() -> Vec<Pair> {
    vec![pair("BASE"), pair("TKN1"), pair("TKN2")]
}

/// Recovery settings short enough for tests.
pub fn fast_settings() -> SyncSettings {
    SyncSettings {
        trade_history_limit: 1000,
        feed: FeedSettings {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
            max_attempts: 3,
        },
    }
}

pub fn trade(id: &str, pair: &Pair, block_number: u64) -> TradeRecord {
    TradeRecord {
        trade_id: TradeId::from(id),
        order_id: 1,
        ticker: pair.ticker(),
        maker: OTHER,
        taker: ACCOUNT,
        amount: U256::from(10u64),
        price: U256::from(2u64),
        date: 1_700_000_000 + block_number,
        block_number,
    }
}

pub fn trade_ids(snapshot: &MirrorSnapshot) -> Vec<String> {
    snapshot
        .trades
        .iter()
        .map(|t| t.trade_id.to_string())
        .collect()
}

/// Holds a call back until released.
#[derive(Clone)]
pub struct Gate {
    open: Arc<watch::Sender<bool>>,
    reached: Arc<watch::Sender<bool>>,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: Arc::new(watch::channel(false).0),
            reached: Arc::new(watch::channel(false).0),
        }
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }

    /// Waits until a call is parked on the gate.
    pub async fn reached(&self) {
        let mut reached = self.reached.subscribe();
        let _ = reached.wait_for(|reached| *reached).await;
    }

    async fn wait(&self) {
        self.reached.send_replace(true);
        let mut open = self.open.subscribe();
        let _ = open.wait_for(|open| *open).await;
    }
}

/// In-memory ledger. Deposits and withdrawals move funds between wallet and
/// ledger balances, orders rest on the book, and trade feeds are driven by
/// the test through [`MockGateway::push_trades`].
pub struct MockGateway {
    pairs: Vec<Pair>,
    balances: Mutex<HashMap<Ticker, Balances>>,
    books: Mutex<HashMap<Ticker, OrderBook>>,
    feeds: Mutex<HashMap<SubscriptionId, (Ticker, mpsc::UnboundedSender<TradeRecord>)>>,
    subscribe_calls: Mutex<Vec<(Ticker, u64)>>,
    balance_gates: Mutex<HashMap<Ticker, Gate>>,
    submitted: Mutex<Vec<OrderParams>>,
    next_id: AtomicU64,
    reject_writes: AtomicBool,
    failing_subscribes: AtomicU32,
}

impl MockGateway {
    /// Gateway listing `pairs`, each funded with 500 on the ledger and 1000
    /// in the wallet, and a book holding one resting order per side.
    pub fn new(pairs: Vec<Pair>) -> Self {
        let mut balances = HashMap::new();
        let mut books = HashMap::new();
        for (index, pair) in pairs.iter().enumerate() {
            balances.insert(
                pair.ticker(),
                Balances::new(U256::from(500u64), U256::from(1000u64)),
            );
            let price = U256::from(index as u64 + 1);
            books.insert(
                pair.ticker(),
                OrderBook {
                    buy: vec![resting_order(1, Side::Buy, price)],
                    sell: vec![resting_order(2, Side::Sell, price + U256::from(1u64))],
                },
            );
        }

        Self {
            pairs,
            balances: Mutex::new(balances),
            books: Mutex::new(books),
            feeds: Mutex::new(HashMap::new()),
            subscribe_calls: Mutex::new(Vec::new()),
            balance_gates: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(100),
            reject_writes: AtomicBool::new(false),
            failing_subscribes: AtomicU32::new(0),
        }
    }

    /// Holds the next `get_balances` for `pair` until the returned gate is
    /// released. The held call answers with the balances at the time it was
    /// made.
    pub fn gate_balances(&self, pair: &Pair) -> Gate {
        let gate = Gate::new();
        self.balance_gates.lock().insert(pair.ticker(), gate.clone());
        gate
    }

    /// Makes every deposit, withdrawal and order fail.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Makes the next `count` subscribe calls fail.
    pub fn fail_subscribes(&self, count: u32) {
        self.failing_subscribes.store(count, Ordering::SeqCst);
    }

    pub fn set_balances(&self, pair: &Pair, balances: Balances) {
        self.balances.lock().insert(pair.ticker(), balances);
    }

    pub fn balances_of(&self, pair: &Pair) -> Balances {
        self.balances
            .lock()
            .get(&pair.ticker())
            .copied()
            .unwrap_or_default()
    }

    pub fn book_of(&self, pair: &Pair) -> OrderBook {
        self.books
            .lock()
            .get(&pair.ticker())
            .cloned()
            .unwrap_or_default()
    }

    /// Delivers `trades` on every open feed for `pair`; returns the number
    /// of feeds reached.
    pub fn push_trades(&self, pair: &Pair, trades: &[TradeRecord]) -> usize {
        let feeds = self.feeds.lock();
        let mut reached = 0;
        for (ticker, sender) in feeds.values() {
            if *ticker == pair.ticker() {
                for trade in trades {
                    let _ = sender.send(trade.clone());
                }
                reached += 1;
            }
        }
        reached
    }

    /// Ends every open feed for `pair` as a dropped connection would.
    pub fn drop_feeds(&self, pair: &Pair) {
        self.feeds
            .lock()
            .retain(|_, (ticker, _)| *ticker != pair.ticker());
    }

    /// Tickers of the subscriptions currently open.
    pub fn open_subscriptions(&self) -> Vec<Ticker> {
        self.feeds.lock().values().map(|(ticker, _)| *ticker).collect()
    }

    /// Every subscribe call made, with its `from_block`.
    pub fn subscribe_calls(&self) -> Vec<(Ticker, u64)> {
        self.subscribe_calls.lock().clone()
    }

    pub fn submitted(&self) -> Vec<OrderParams> {
        self.submitted.lock().clone()
    }

    fn check_writes(&self, method: &str) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(MirrorError::Rejected {
                method: method.to_string(),
                reason: "transaction reverted".to_string(),
            });
        }
        Ok(())
    }

    fn ack(&self) -> Ack {
        Ack::default()
    }
}

fn resting_order(id: u64, side: Side, price: U256) -> Order {
    Order {
        id,
        trader: OTHER,
        side,
        amount: U256::from(50u64),
        filled: U256::ZERO,
        price,
        date: 0,
    }
}

#[async_trait]
impl LedgerGateway for MockGateway {
    async fn list_pairs(&self) -> Result<Vec<Pair>> {
        Ok(self.pairs.clone())
    }

    async fn get_balances(&self, _account: Address, pair: &Pair) -> Result<Balances> {
        let balances = self.balances_of(pair);
        let gate = self.balance_gates.lock().remove(&pair.ticker());
        if let Some(gate) = gate {
            gate.wait().await;
        }
        Ok(balances)
    }

    async fn get_order_book(&self, pair: &Pair) -> Result<OrderBook> {
        Ok(self.book_of(pair))
    }

    async fn submit_order(&self, account: Address, order: &OrderParams) -> Result<Ack> {
        self.check_writes(order.kind.method())?;

        let resting = Order {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            trader: account,
            side: order.side,
            amount: order.amount,
            filled: U256::ZERO,
            price: order.price.unwrap_or_default(),
            date: 0,
        };
        let mut books = self.books.lock();
        let book = books.entry(order.ticker).or_default();
        match order.side {
            Side::Buy => book.buy.push(resting),
            Side::Sell => book.sell.push(resting),
        }
        self.submitted.lock().push(order.clone());
        Ok(self.ack())
    }

    async fn deposit(&self, _account: Address, pair: &Pair, amount: U256) -> Result<Ack> {
        self.check_writes("deposit")?;

        let mut balances = self.balances.lock();
        let entry = balances.entry(pair.ticker()).or_default();
        entry.on_wallet = entry
            .on_wallet
            .checked_sub(amount)
            .ok_or_else(|| MirrorError::Rejected {
                method: "deposit".to_string(),
                reason: "insufficient wallet balance".to_string(),
            })?;
        entry.on_ledger += amount;
        Ok(self.ack())
    }

    async fn withdraw(&self, _account: Address, pair: &Pair, amount: U256) -> Result<Ack> {
        self.check_writes("withdraw")?;

        let mut balances = self.balances.lock();
        let entry = balances.entry(pair.ticker()).or_default();
        entry.on_ledger = entry
            .on_ledger
            .checked_sub(amount)
            .ok_or_else(|| MirrorError::Rejected {
                method: "withdraw".to_string(),
                reason: "insufficient ledger balance".to_string(),
            })?;
        entry.on_wallet += amount;
        Ok(self.ack())
    }

    async fn subscribe_trades(&self, pair: &Pair, from_block: u64) -> Result<TradeFeed> {
        self.subscribe_calls.lock().push((pair.ticker(), from_block));

        let failing = self.failing_subscribes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_subscribes.store(failing - 1, Ordering::SeqCst);
            return Err(MirrorError::Disconnected);
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, events) = mpsc::unbounded_channel();
        self.feeds.lock().insert(id, (pair.ticker(), sender));
        Ok(TradeFeed { id, events })
    }

    async fn unsubscribe(&self, subscription: SubscriptionId) -> Result<()> {
        self.feeds.lock().remove(&subscription);
        Ok(())
    }
}

/// Initializes a core over a fresh mock with the default pairs.
pub async fn start() -> (Arc<MockGateway>, SyncCore<MockGateway>) {
    start_with(default_pairs(), fast_settings()).await
}

pub async fn start_with(
    pairs: Vec<Pair>,
    settings: SyncSettings,
) -> (Arc<MockGateway>, SyncCore<MockGateway>) {
    let gateway = Arc::new(MockGateway::new(pairs));
    let (core, _) = SyncCore::initialize(gateway.clone(), ACCOUNT, &settings)
        .await
        .expect("Failed to initialize sync core");
    (gateway, core)
}

/// Waits until `done` holds for a snapshot, failing after two seconds.
pub async fn wait_for<F>(core: &SyncCore<MockGateway>, mut done: F) -> MirrorSnapshot
where
    F: FnMut(&MirrorSnapshot) -> bool,
{
    let mut changes = core.changes();
    let wait = async {
        loop {
            let snapshot = core.snapshot();
            if done(&snapshot) {
                return snapshot;
            }
            changes.changed().await.expect("Sync core dropped");
        }
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .expect("Timed out waiting for mirrored state")
}
