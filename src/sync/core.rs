//! The synchronization core.
//!
//! [`SyncCore`] owns the mirrored state and the single open trade
//! subscription, and defines how reads, writes and pushes interleave:
//!
//! - A pair switch bumps the state generation, clears everything scoped to
//!   the old pair, then refreshes and resubscribes concurrently.
//! - A refresh publishes balances and order book together, and only if no
//!   selection happened since it was issued. Stale results are dropped.
//! - Subscription changes are serialized through one slot, so the previous
//!   handle is always closed before the next one opens.
//! - Writes publish nothing themselves; on success the affected state is
//!   re-read under the same stale-response guard.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::state::{MirrorSnapshot, MirrorState};
use super::subscription::{PairSubscriptionManager, SubscriptionHandle};
use crate::config::SyncSettings;
use crate::error::{MirrorError, Result};
use crate::gateway::LedgerGateway;
use crate::models::{Balances, OrderBook, OrderKind, OrderRequest, Pair, Side};

/// What [`SyncCore::initialize`] loaded for the default pair.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub pairs: Vec<Pair>,
    pub selected: Pair,
    pub balances: Balances,
    pub order_book: OrderBook,
}

/// Client-side mirror of the ledger for one account.
pub struct SyncCore<G> {
    gateway: Arc<G>,
    account: Address,
    state: Mutex<MirrorState>,
    subscription: tokio::sync::Mutex<Option<SubscriptionHandle>>,
    subscriptions: PairSubscriptionManager<G>,
    changes: Arc<watch::Sender<u64>>,
}

impl<G: LedgerGateway> SyncCore<G> {
    /// Loads the pair list, selects the first tradeable pair, reads its
    /// balances and order book, and opens its trade subscription.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::NoTradeablePairs`] if the ledger lists no pair
    /// besides the base asset, or the gateway error of any failed read.
    pub async fn initialize(
        gateway: Arc<G>,
        account: Address,
        settings: &SyncSettings,
    ) -> Result<(Self, Bootstrap)> {
        let pairs = gateway.list_pairs().await?;
        let selected = pairs.get(1).cloned().ok_or(MirrorError::NoTradeablePairs)?;
        info!(pairs = pairs.len(), pair = %selected, "Loaded pair list");

        let (balances, order_book) = tokio::try_join!(
            gateway.get_balances(account, &selected),
            gateway.get_order_book(&selected),
        )?;

        let (changes, _) = watch::channel(0);
        let changes = Arc::new(changes);
        let subscriptions = PairSubscriptionManager::new(gateway.clone(), settings, changes.clone());
        let handle = subscriptions.open(&selected).await?;

        let mut state = MirrorState::new(pairs.clone(), selected.clone());
        let generation = state.generation();
        state.publish_refresh(generation, balances, order_book.clone());
        state.install_trades(generation, handle.log());

        let core = Self {
            gateway,
            account,
            state: Mutex::new(state),
            subscription: tokio::sync::Mutex::new(Some(handle)),
            subscriptions,
            changes,
        };
        core.bump();

        Ok((
            core,
            Bootstrap {
                pairs,
                selected,
                balances,
                order_book,
            },
        ))
    }

    /// Switches the selected pair.
    ///
    /// Selecting the pair that is already selected does nothing while its
    /// balances, book and trade feed are all in place; if any of them is
    /// missing or the feed has failed, the selection is rebuilt. Otherwise
    /// the old pair's trades, balances and book are discarded at once, and
    /// this returns after the new pair is refreshed and subscribed. If a
    /// later call supersedes this one, its results are dropped silently.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::UnknownPair`] if `pair` is not tradeable, or the
    /// gateway error of a failed read or subscription for the still selected
    /// pair.
    pub async fn select_pair(&self, pair: &Pair) -> Result<()> {
        let generation = {
            let mut state = self.state.lock();
            if !state.is_tradeable(pair) {
                return Err(MirrorError::UnknownPair(pair.symbol().to_string()));
            }
            if state.selected() == pair {
                if state.is_complete() {
                    debug!(pair = %pair, "Pair already selected");
                    return Ok(());
                }
                info!(pair = %pair, "Rebuilding incomplete selection");
            }
            state.select(pair.clone())
        };
        info!(pair = %pair, generation, "Selected pair");
        self.bump();

        let (subscribed, refreshed) =
            tokio::join!(self.resubscribe(pair, generation), self.refresh(pair, generation));
        subscribed?;
        refreshed
    }

    /// Deposits `amount` (native units) of the selected pair, then re-reads
    /// its balances.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::InvalidAmount`] for a zero amount, or the
    /// gateway error. Nothing is published when the deposit fails.
    pub async fn deposit(&self, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Err(MirrorError::InvalidAmount);
        }
        let (pair, generation) = self.selection();
        self.gateway.deposit(self.account, &pair, amount).await?;
        self.refresh_balances(&pair, generation).await
    }

    /// Withdraws `amount` (native units) of the selected pair, then re-reads
    /// its balances.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::InvalidAmount`] for a zero amount, or the
    /// gateway error. Nothing is published when the withdrawal fails.
    pub async fn withdraw(&self, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Err(MirrorError::InvalidAmount);
        }
        let (pair, generation) = self.selection();
        self.gateway.withdraw(self.account, &pair, amount).await?;
        self.refresh_balances(&pair, generation).await
    }

    /// Places an order on the selected pair, then re-reads its order book.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::InvalidOrder`] if the order does not validate
    /// (a limit order needs a price, a market order must not carry one), or
    /// the gateway error.
    pub async fn create_order(
        &self,
        amount: U256,
        side: Side,
        kind: OrderKind,
        price: Option<U256>,
    ) -> Result<()> {
        let (pair, generation) = self.selection();
        let order = OrderRequest::new(kind, side, pair.ticker(), amount, price).build()?;
        self.gateway.submit_order(self.account, &order).await?;
        self.refresh_order_book(&pair, generation).await
    }

    /// Consistent copy of the mirrored state.
    pub fn snapshot(&self) -> MirrorSnapshot {
        let revision = *self.changes.borrow();
        self.state.lock().snapshot(revision)
    }

    /// Receiver notified whenever the mirrored state changes.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn selected_pair(&self) -> Pair {
        self.state.lock().selected().clone()
    }

    /// The account's own open orders in the current book.
    pub fn my_orders(&self) -> Option<OrderBook> {
        self.state
            .lock()
            .order_book()
            .map(|book| book.orders_by(&self.account))
    }

    /// Closes the open trade subscription.
    pub async fn shutdown(&self) {
        let handle = self.subscription.lock().await.take();
        if let Some(handle) = handle {
            self.subscriptions.close(handle).await;
        }
    }

    /// Replaces the open subscription with one for `pair`, unless a later
    /// selection got there first.
    async fn resubscribe(&self, pair: &Pair, generation: u64) -> Result<()> {
        let mut slot = self.subscription.lock().await;
        if self.is_superseded(generation) {
            debug!(pair = %pair, generation, "Skipping superseded subscription");
            return Ok(());
        }

        if let Some(previous) = slot.take() {
            self.subscriptions.close(previous).await;
        }

        let opened = self
            .subscriptions
            .open_retrying(pair, || !self.is_superseded(generation))
            .await;
        let handle = match opened {
            Ok(Some(handle)) => handle,
            Ok(None) => return Ok(()),
            Err(_) if self.is_superseded(generation) => return Ok(()),
            Err(e) => return Err(e),
        };

        let installed = self.state.lock().install_trades(generation, handle.log());
        if installed {
            self.bump();
            *slot = Some(handle);
        } else {
            debug!(pair = %pair, generation, "Selection moved on, closing subscription");
            self.subscriptions.close(handle).await;
        }
        Ok(())
    }

    /// Reads balances and order book for `pair` and publishes them together,
    /// unless the selection moved past `generation` meanwhile.
    async fn refresh(&self, pair: &Pair, generation: u64) -> Result<()> {
        let read = tokio::try_join!(
            self.gateway.get_balances(self.account, pair),
            self.gateway.get_order_book(pair),
        );
        let (balances, book) = match read {
            Ok(read) => read,
            Err(e) if self.is_superseded(generation) => {
                debug!(pair = %pair, "Dropping failed refresh for superseded pair: {e}");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let published = self
            .state
            .lock()
            .publish_refresh(generation, balances, book);
        if published {
            info!(pair = %pair, "Published balances and order book");
            self.bump();
        } else {
            warn!(pair = %pair, "Discarding stale refresh");
        }
        Ok(())
    }

    async fn refresh_balances(&self, pair: &Pair, generation: u64) -> Result<()> {
        let balances = match self.gateway.get_balances(self.account, pair).await {
            Ok(balances) => balances,
            Err(_) if self.is_superseded(generation) => return Ok(()),
            Err(e) => return Err(e),
        };

        if self.state.lock().publish_balances(generation, balances) {
            info!(pair = %pair, on_ledger = %balances.on_ledger, on_wallet = %balances.on_wallet, "Published balances");
            self.bump();
        } else {
            warn!(pair = %pair, "Discarding stale balances");
        }
        Ok(())
    }

    async fn refresh_order_book(&self, pair: &Pair, generation: u64) -> Result<()> {
        let book = match self.gateway.get_order_book(pair).await {
            Ok(book) => book,
            Err(_) if self.is_superseded(generation) => return Ok(()),
            Err(e) => return Err(e),
        };

        let orders = book.len();
        if self.state.lock().publish_order_book(generation, book) {
            info!(pair = %pair, orders, "Published order book");
            self.bump();
        } else {
            warn!(pair = %pair, "Discarding stale order book");
        }
        Ok(())
    }

    /// The selected pair with the generation it was selected under.
    fn selection(&self) -> (Pair, u64) {
        let state = self.state.lock();
        (state.selected().clone(), state.generation())
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.state.lock().generation() != generation
    }

    fn bump(&self) {
        self.changes
            .send_modify(|revision| *revision = revision.wrapping_add(1));
    }
}
