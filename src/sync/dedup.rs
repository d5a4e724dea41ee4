//! Trade event deduplication.
//!
//! The push transport may deliver the same trade more than once (backfill
//! overlapping live delivery, or a resubscription replaying from its
//! checkpoint). A deduplicator lives exactly as long as one subscription.

use std::collections::HashSet;

use crate::models::TradeId;

/// Seen-set of trade identifiers for one subscription.
#[derive(Debug, Default)]
pub struct TradeDeduplicator {
    seen: HashSet<TradeId>,
}

impl TradeDeduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id` and returns `true` the first time it is seen; returns
    /// `false` on every later occurrence.
    pub fn admit(&mut self, id: &TradeId) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.clone())
    }

    /// Number of distinct trades seen so far.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
