use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{Address, PublicKey};

/// A frozen tranche of the account's balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub amount: i64,
    /// Epoch seconds when the stake was created.
    pub start_time: u32,
    pub active: bool,
}

/// Full in-memory account state.
///
/// Invariant: `actual_balance >= 0` after every applied mutation. The
/// spendable balance available to new outgoing transfers is
/// `actual_balance - total_staked_amount`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub public_key: PublicKey,
    pub actual_balance: i64,
    pub total_staked_amount: i64,
    #[serde(default)]
    pub second_public_key: Option<PublicKey>,
    /// Delegates this account currently votes for.
    #[serde(default)]
    pub votes: BTreeSet<Address>,
    /// Stake tranches in creation order.
    #[serde(default)]
    pub stakes: Vec<Stake>,
    #[serde(default)]
    pub is_delegate: bool,
    #[serde(default)]
    pub username: Option<String>,
}

impl Account {
    /// Fresh account with zero balance and no registrations.
    pub fn new(address: Address, public_key: PublicKey) -> Self {
        Self {
            address,
            public_key,
            actual_balance: 0,
            total_staked_amount: 0,
            second_public_key: None,
            votes: BTreeSet::new(),
            stakes: Vec::new(),
            is_delegate: false,
            username: None,
        }
    }

    /// Balance available to new outgoing transfers.
    pub fn spendable(&self) -> i64 {
        self.actual_balance - self.total_staked_amount
    }
}
