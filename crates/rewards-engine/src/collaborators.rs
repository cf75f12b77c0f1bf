//! External collaborator contracts
//!
//! Everything the engine does not own is reached through one of these
//! traits: the reward token it mints and transfers, the external reward
//! tokens it pays out, the data providers that report pool balances, and the
//! governance-lock token that backs boosting and gauge votes.

use rewards_core::{Address, Amount, CollaboratorError, Timestamp};
use serde::{Deserialize, Serialize};

/// A user's position in a data source as reported by its provider
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAndSupply {
    pub balance: Amount,
    pub total_supply: Amount,
}

/// Token the engine can pay out
#[cfg_attr(test, mockall::automock)]
pub trait RewardToken: Send + Sync {
    fn transfer(&self, to: &Address, amount: Amount) -> Result<(), CollaboratorError>;
}

/// Protocol reward token, minted by the engine each day
#[cfg_attr(test, mockall::automock)]
pub trait MintableToken: Send + Sync {
    fn mint(&self, amount: Amount) -> Result<(), CollaboratorError>;

    fn transfer(&self, to: &Address, amount: Amount) -> Result<(), CollaboratorError>;
}

/// Source contract reporting a user's balance and the pool's total supply
#[cfg_attr(test, mockall::automock)]
pub trait DataProvider: Send + Sync {
    fn balance_and_supply(
        &self,
        source: &str,
        user: &Address,
    ) -> Result<BalanceAndSupply, CollaboratorError>;
}

/// Vote-escrowed governance token
#[cfg_attr(test, mockall::automock)]
pub trait GovernanceLock: Send + Sync {
    /// Boosted (locked) balance of `user`
    fn balance_of(&self, user: &Address) -> Result<Amount, CollaboratorError>;

    /// Total boosted supply
    fn total_supply(&self) -> Result<Amount, CollaboratorError>;

    /// Decay rate of the user's lock, in voting power per microsecond
    fn last_user_slope(&self, user: &Address) -> Result<Amount, CollaboratorError>;

    /// Lock expiry timestamp (microseconds)
    fn locked_end(&self, user: &Address) -> Result<Timestamp, CollaboratorError>;
}
