//! Per-pair trade subscriptions.
//!
//! A [`SubscriptionHandle`] owns everything scoped to one subscription: the
//! background task pumping its feed, the deduplicator, and the trade
//! history. Closing the handle stops the task before it returns, and the
//! history and seen-set are dropped with it, so a late delivery can never
//! reach the log of a newer subscription.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dedup::TradeDeduplicator;
use crate::Result;
use crate::config::{FeedSettings, SyncSettings};
use crate::gateway::{LedgerGateway, TradeFeed};
use crate::models::{Pair, SubscriptionId, TradeRecord};

/// Health of a subscription's feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// Trades are flowing.
    Live,
    /// The feed dropped; resubscribing from the last checkpoint.
    Resubscribing,
    /// Resubscription attempts were exhausted.
    Failed,
}

/// Trade history and dedup state of one subscription.
#[derive(Debug)]
pub struct TradeLog {
    dedup: TradeDeduplicator,
    history: VecDeque<TradeRecord>,
    limit: usize,
    checkpoint: u64,
    status: FeedStatus,
}

/// Shared reference to a subscription's log.
pub type TradeLogRef = Arc<Mutex<TradeLog>>;

impl TradeLog {
    /// Creates an empty log keeping at most `limit` trades.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            dedup: TradeDeduplicator::new(),
            history: VecDeque::with_capacity(limit.min(1024)),
            limit: limit.max(1),
            checkpoint: 0,
            status: FeedStatus::Live,
        }
    }

    /// Appends `trade` unless its id was already admitted.
    ///
    /// Returns whether the trade was appended. The oldest trade is evicted
    /// once the history is full; its id stays in the seen-set.
    pub fn record(&mut self, trade: TradeRecord) -> bool {
        if !self.dedup.admit(&trade.trade_id) {
            return false;
        }

        self.checkpoint = self.checkpoint.max(trade.block_number);
        if self.history.len() >= self.limit {
            self.history.pop_front();
        }
        self.history.push_back(trade);
        true
    }

    /// Trades in delivery order, oldest first.
    pub fn history(&self) -> Vec<TradeRecord> {
        self.history.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Block from which a resubscription resumes.
    pub fn checkpoint(&self) -> u64 {
        self.checkpoint
    }

    pub fn status(&self) -> FeedStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: FeedStatus) {
        self.status = status;
    }
}

/// An open trade subscription for one pair.
pub struct SubscriptionHandle {
    pair: Pair,
    log: TradeLogRef,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Option<SubscriptionId>>,
}

impl SubscriptionHandle {
    /// The log owned by this subscription.
    pub fn log(&self) -> TradeLogRef {
        self.log.clone()
    }
}

/// Opens and closes trade subscriptions against the gateway.
///
/// Callers keep at most one handle open: every [`open`](Self::open) must
/// follow the [`close`](Self::close) of the previous handle.
pub struct PairSubscriptionManager<G> {
    gateway: Arc<G>,
    feed: FeedSettings,
    history_limit: usize,
    changes: Arc<watch::Sender<u64>>,
}

impl<G: LedgerGateway> PairSubscriptionManager<G> {
    /// Creates a manager that bumps `changes` whenever a trade is admitted.
    #[must_use]
    pub fn new(gateway: Arc<G>, settings: &SyncSettings, changes: Arc<watch::Sender<u64>>) -> Self {
        Self {
            gateway,
            feed: settings.feed.clone(),
            history_limit: settings.trade_history_limit,
            changes,
        }
    }

    /// Subscribes to trades for `pair` with a full backfill from block 0.
    ///
    /// # Errors
    ///
    /// Returns a [`MirrorError`](crate::MirrorError) if the gateway refuses
    /// the subscription.
    pub async fn open(&self, pair: &Pair) -> Result<SubscriptionHandle> {
        let feed = self.gateway.subscribe_trades(pair, 0).await?;
        info!(pair = %pair, subscription = %feed.id, "Opened trade subscription");

        let log = Arc::new(Mutex::new(TradeLog::new(self.history_limit)));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let pump = FeedPump {
            gateway: self.gateway.clone(),
            pair: pair.clone(),
            log: log.clone(),
            changes: self.changes.clone(),
            settings: self.feed.clone(),
        };
        let task = tokio::spawn(pump.run(feed, shutdown_rx));

        Ok(SubscriptionHandle {
            pair: pair.clone(),
            log,
            shutdown,
            task,
        })
    }

    /// Like [`open`](Self::open), but retries a refused subscription with
    /// the feed backoff while `current` holds.
    ///
    /// Returns `Ok(None)` once `current` stops holding, so a caller whose
    /// selection moved on gives up quietly.
    ///
    /// # Errors
    ///
    /// Returns the last gateway error once the retries are exhausted.
    pub async fn open_retrying<F>(&self, pair: &Pair, current: F) -> Result<Option<SubscriptionHandle>>
    where
        F: Fn() -> bool,
    {
        let mut backoff = self.feed.initial_backoff;
        let mut retries = 0;

        loop {
            match self.open(pair).await {
                Ok(handle) => return Ok(Some(handle)),
                Err(_) if !current() => return Ok(None),
                Err(e) if retries >= self.feed.max_attempts => {
                    error!(pair = %pair, retries, "Giving up on trade subscription: {e}");
                    return Err(e);
                }
                Err(e) => {
                    retries += 1;
                    warn!(pair = %pair, retries, "Subscription refused, retrying: {e}");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.feed.max_backoff);
                    if !current() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Cancels the subscription behind `handle`.
    ///
    /// Once this returns no further trade reaches the handle's log. A
    /// failed unsubscribe request is logged, never surfaced.
    pub async fn close(&self, handle: SubscriptionHandle) {
        let SubscriptionHandle {
            pair, shutdown, task, ..
        } = handle;

        let _ = shutdown.send(());
        let active = match task.await {
            Ok(active) => active,
            Err(e) => {
                warn!(pair = %pair, "Trade pump ended abnormally: {e}");
                None
            }
        };

        if let Some(subscription) = active
            && let Err(e) = self.gateway.unsubscribe(subscription).await
        {
            warn!(pair = %pair, %subscription, "Failed to unsubscribe: {e}");
        }
        info!(pair = %pair, "Closed trade subscription");
    }
}

/// Background task moving trades from a feed into its log.
struct FeedPump<G> {
    gateway: Arc<G>,
    pair: Pair,
    log: TradeLogRef,
    changes: Arc<watch::Sender<u64>>,
    settings: FeedSettings,
}

impl<G: LedgerGateway> FeedPump<G> {
    /// Pumps trades until shutdown, resubscribing when the feed drops.
    ///
    /// Returns the subscription still open on the gateway, if any.
    async fn run(
        self,
        mut feed: TradeFeed,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Option<SubscriptionId> {
        loop {
            tokio::select! {
                _ = &mut shutdown => return Some(feed.id),
                event = feed.events.recv() => match event {
                    Some(trade) => self.deliver(trade),
                    None => {
                        warn!(pair = %self.pair, subscription = %feed.id, "Trade feed dropped");
                        feed = self.resubscribe(&mut shutdown).await?;
                    }
                }
            }
        }
    }

    fn deliver(&self, trade: TradeRecord) {
        if trade.ticker != self.pair.ticker() {
            debug!(pair = %self.pair, ticker = %trade.ticker, "Ignoring trade for another pair");
            return;
        }

        let trade_id = trade.trade_id.clone();
        let admitted = self.log.lock().record(trade);
        if admitted {
            debug!(pair = %self.pair, %trade_id, "Admitted trade");
            self.changes.send_modify(|revision| *revision = revision.wrapping_add(1));
        } else {
            debug!(pair = %self.pair, %trade_id, "Discarded duplicate trade");
        }
    }

    /// Resubscribes from the log's checkpoint with exponential backoff.
    ///
    /// Returns `None` on shutdown. When attempts run out the status becomes
    /// [`FeedStatus::Failed`] and the task parks until shutdown.
    async fn resubscribe(&self, shutdown: &mut oneshot::Receiver<()>) -> Option<TradeFeed> {
        self.set_status(FeedStatus::Resubscribing);
        let mut backoff = self.settings.initial_backoff;

        for attempt in 1..=self.settings.max_attempts {
            tokio::select! {
                _ = &mut *shutdown => return None,
                () = tokio::time::sleep(backoff) => {}
            }

            let from_block = self.log.lock().checkpoint();
            match self.gateway.subscribe_trades(&self.pair, from_block).await {
                Ok(feed) => {
                    info!(
                        pair = %self.pair,
                        subscription = %feed.id,
                        from_block,
                        attempt,
                        "Resubscribed trade feed"
                    );
                    self.set_status(FeedStatus::Live);
                    return Some(feed);
                }
                Err(e) => {
                    warn!(pair = %self.pair, attempt, "Resubscription failed: {e}");
                    backoff = (backoff * 2).min(self.settings.max_backoff);
                }
            }
        }

        error!(
            pair = %self.pair,
            attempts = self.settings.max_attempts,
            "Giving up on trade feed"
        );
        self.set_status(FeedStatus::Failed);
        let _ = shutdown.await;
        None
    }

    fn set_status(&self, status: FeedStatus) {
        self.log.lock().set_status(status);
        self.changes
            .send_modify(|revision| *revision = revision.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TradeId, Ticker};
    use alloy_primitives::{Address, U256};

    fn trade(id: &str, block: u64) -> TradeRecord {
        TradeRecord {
            trade_id: TradeId::from(id),
            order_id: 1,
            ticker: Ticker::from_symbol("TKN1").unwrap(),
            maker: Address::ZERO,
            taker: Address::ZERO,
            amount: U256::from(1u64),
            price: U256::from(1u64),
            date: 0,
            block_number: block,
        }
    }

    #[test]
    fn log_drops_duplicates() {
        let mut log = TradeLog::new(10);
        assert!(log.record(trade("t1", 5)));
        assert!(!log.record(trade("t1", 5)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn log_keeps_delivery_order_and_checkpoint() {
        let mut log = TradeLog::new(10);
        log.record(trade("t2", 9));
        log.record(trade("t1", 4));

        let ids: Vec<String> = log
            .history()
            .iter()
            .map(|t| t.trade_id.to_string())
            .collect();
        assert_eq!(ids, ["t2", "t1"]);
        assert_eq!(log.checkpoint(), 9);
    }

    #[test]
    fn log_evicts_oldest_but_remembers_ids() {
        let mut log = TradeLog::new(2);
        log.record(trade("t1", 1));
        log.record(trade("t2", 2));
        log.record(trade("t3", 3));

        let ids: Vec<String> = log
            .history()
            .iter()
            .map(|t| t.trade_id.to_string())
            .collect();
        assert_eq!(ids, ["t2", "t3"]);
        assert!(!log.record(trade("t1", 1)));
    }

    #[test]
    fn new_log_is_live_and_empty() {
        let log = TradeLog::new(5);
        assert!(log.is_empty());
        assert_eq!(log.status(), FeedStatus::Live);
        assert_eq!(log.checkpoint(), 0);
    }
}
