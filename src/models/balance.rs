//! Balance models.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Balances of one account for one pair, in native integer units.
///
/// Both sides are always read and published together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// Amount deposited into the exchange contract.
    pub on_ledger: U256,
    /// Amount held by the account's own wallet.
    pub on_wallet: U256,
}

impl Balances {
    #[must_use]
    pub fn new(on_ledger: U256, on_wallet: U256) -> Self {
        Self {
            on_ledger,
            on_wallet,
        }
    }
}
