//! Client-side mirror of an on-chain order book and trade ledger.
//!
//! Tracks the selected trading pair, keeps its balances and order book in
//! step with the ledger across concurrent updates, and maintains a
//! deduplicated trade history fed by a push subscription that is torn down
//! and re-established on every pair switch. Deposits, withdrawals and
//! orders are forwarded to the ledger gateway and followed by a re-read of
//! the state they affect.

pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod sync;
pub mod websocket;

pub use error::{MirrorError, Result};
pub use gateway::{LedgerGateway, TradeFeed};
pub use sync::{Bootstrap, FeedStatus, MirrorSnapshot, SyncCore};
