//! The mirrored view of the ledger for one account.

use super::subscription::{FeedStatus, TradeLogRef};
use crate::models::{Balances, OrderBook, Pair, TradeRecord};

/// Canonical client-side state, written only by the synchronization core.
///
/// Every selection bumps `generation`; work issued under an older
/// generation is discarded.
#[derive(Debug)]
pub struct MirrorState {
    pairs: Vec<Pair>,
    selected: Pair,
    generation: u64,
    balances: Option<Balances>,
    order_book: Option<OrderBook>,
    trades: Option<TradeLogRef>,
}

impl MirrorState {
    /// Creates the state with `selected` active and nothing read yet.
    #[must_use]
    pub fn new(pairs: Vec<Pair>, selected: Pair) -> Self {
        Self {
            pairs,
            selected,
            generation: 0,
            balances: None,
            order_book: None,
            trades: None,
        }
    }

    pub fn selected(&self) -> &Pair {
        &self.selected
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Every pair except the base asset, which is listed first.
    pub fn tradeable(&self) -> &[Pair] {
        self.pairs.get(1..).unwrap_or_default()
    }

    pub fn is_tradeable(&self, pair: &Pair) -> bool {
        self.tradeable().contains(pair)
    }

    /// Switches the selection and clears everything scoped to the old pair.
    ///
    /// Returns the new generation.
    pub fn select(&mut self, pair: Pair) -> u64 {
        self.selected = pair;
        self.generation += 1;
        self.balances = None;
        self.order_book = None;
        self.trades = None;
        self.generation
    }

    /// Attaches the trade log of a freshly opened subscription.
    ///
    /// Returns `false` if the selection changed since `generation`.
    pub fn install_trades(&mut self, generation: u64, log: TradeLogRef) -> bool {
        if generation != self.generation {
            return false;
        }
        self.trades = Some(log);
        true
    }

    /// Publishes balances and order book read together under `generation`.
    ///
    /// Returns `false`, leaving the state untouched, if the selection
    /// changed since the read was issued. Re-selecting the same pair counts
    /// as a change.
    pub fn publish_refresh(&mut self, generation: u64, balances: Balances, book: OrderBook) -> bool {
        if generation != self.generation {
            return false;
        }
        self.balances = Some(balances);
        self.order_book = Some(book);
        true
    }

    pub fn publish_balances(&mut self, generation: u64, balances: Balances) -> bool {
        if generation != self.generation {
            return false;
        }
        self.balances = Some(balances);
        true
    }

    pub fn publish_order_book(&mut self, generation: u64, book: OrderBook) -> bool {
        if generation != self.generation {
            return false;
        }
        self.order_book = Some(book);
        true
    }

    /// Whether the selected pair has balances, a book and a live or
    /// recovering trade feed.
    pub fn is_complete(&self) -> bool {
        let feed_usable = self
            .trades
            .as_ref()
            .is_some_and(|log| log.lock().status() != FeedStatus::Failed);
        self.balances.is_some() && self.order_book.is_some() && feed_usable
    }

    pub fn order_book(&self) -> Option<&OrderBook> {
        self.order_book.as_ref()
    }

    /// Takes a consistent copy of the state.
    pub fn snapshot(&self, revision: u64) -> MirrorSnapshot {
        let (trades, feed_status) = match &self.trades {
            Some(log) => {
                let log = log.lock();
                (log.history(), Some(log.status()))
            }
            None => (Vec::new(), None),
        };

        MirrorSnapshot {
            revision,
            pairs: self.pairs.clone(),
            tradeable: self.tradeable().to_vec(),
            selected: self.selected.clone(),
            balances: self.balances,
            order_book: self.order_book.clone(),
            trades,
            feed_status,
        }
    }
}

/// Point-in-time copy of the mirrored state for rendering.
#[derive(Debug, Clone)]
pub struct MirrorSnapshot {
    /// Change counter at the time of the snapshot.
    pub revision: u64,
    pub pairs: Vec<Pair>,
    pub tradeable: Vec<Pair>,
    pub selected: Pair,
    /// `None` until the first refresh for `selected` is published.
    pub balances: Option<Balances>,
    pub order_book: Option<OrderBook>,
    /// Trades for `selected`, oldest first.
    pub trades: Vec<TradeRecord>,
    /// `None` while the subscription for `selected` is being opened.
    pub feed_status: Option<FeedStatus>,
}

impl MirrorSnapshot {
    /// Looks up a tradeable pair by symbol, ignoring ASCII case.
    pub fn find_pair(&self, symbol: &str) -> Option<&Pair> {
        self.tradeable
            .iter()
            .find(|p| p.symbol().eq_ignore_ascii_case(symbol))
    }
}
