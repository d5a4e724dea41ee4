//! Client-side synchronization of the mirrored ledger state.

pub mod core;
pub mod dedup;
pub mod state;
pub mod subscription;

pub use self::core::{Bootstrap, SyncCore};
pub use dedup::TradeDeduplicator;
pub use state::{MirrorSnapshot, MirrorState};
pub use subscription::{FeedStatus, PairSubscriptionManager, SubscriptionHandle, TradeLog};
