//! In-memory collaborators
//!
//! Token, data provider and governance lock backed by `parking_lot` locks,
//! for simulations and integration tests.

use crate::collaborators::{BalanceAndSupply, DataProvider, GovernanceLock, MintableToken, RewardToken};
use parking_lot::{Mutex, RwLock};
use rewards_core::{Address, Amount, CollaboratorError, Timestamp, U256, WEEK};
use std::collections::HashMap;

/// Longest governance lock, four years of weeks
pub const MAX_LOCK_TIME: Timestamp = 4 * 52 * WEEK;

#[derive(Debug, Default)]
struct Ledger {
    balances: HashMap<Address, Amount>,
    minted: Amount,
}

/// Token whose engine-held balance grows by minting
#[derive(Debug)]
pub struct MemoryToken {
    symbol: String,
    treasury: Address,
    ledger: Mutex<Ledger>,
}

impl MemoryToken {
    /// `treasury` is the engine's own account, which receives mints
    pub fn new(symbol: &str, treasury: Address) -> Self {
        Self {
            symbol: symbol.to_string(),
            treasury,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.ledger
            .lock()
            .balances
            .get(account)
            .copied()
            .unwrap_or_default()
    }

    pub fn total_minted(&self) -> Amount {
        self.ledger.lock().minted
    }

    /// Credit the treasury without minting (external reward funding)
    pub fn deposit(&self, amount: Amount) {
        let mut ledger = self.ledger.lock();
        let entry = ledger.balances.entry(self.treasury).or_default();
        *entry = entry.saturating_add(amount);
    }

    fn move_out(&self, to: &Address, amount: Amount) -> Result<(), CollaboratorError> {
        let mut ledger = self.ledger.lock();
        let available = ledger.balances.get(&self.treasury).copied().unwrap_or_default();
        if available < amount {
            return Err(CollaboratorError::call_failed(
                &self.symbol,
                format!("insufficient balance: {} < {}", available, amount),
            ));
        }
        ledger.balances.insert(self.treasury, available - amount);
        let entry = ledger.balances.entry(*to).or_default();
        *entry = entry.saturating_add(amount);
        Ok(())
    }
}

impl MintableToken for MemoryToken {
    fn mint(&self, amount: Amount) -> Result<(), CollaboratorError> {
        let mut ledger = self.ledger.lock();
        ledger.minted = ledger.minted.saturating_add(amount);
        let entry = ledger.balances.entry(self.treasury).or_default();
        *entry = entry.saturating_add(amount);
        Ok(())
    }

    fn transfer(&self, to: &Address, amount: Amount) -> Result<(), CollaboratorError> {
        self.move_out(to, amount)
    }
}

impl RewardToken for MemoryToken {
    fn transfer(&self, to: &Address, amount: Amount) -> Result<(), CollaboratorError> {
        self.move_out(to, amount)
    }
}

/// Token that rejects every call
#[derive(Debug, Default)]
pub struct FailingToken;

impl MintableToken for FailingToken {
    fn mint(&self, _amount: Amount) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::call_failed("failing-token", "mint rejected"))
    }

    fn transfer(&self, _to: &Address, _amount: Amount) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::call_failed("failing-token", "transfer rejected"))
    }
}

impl RewardToken for FailingToken {
    fn transfer(&self, _to: &Address, _amount: Amount) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::call_failed("failing-token", "transfer rejected"))
    }
}

/// Pool balances keyed by source and user
#[derive(Debug, Default)]
pub struct MemoryProvider {
    balances: RwLock<HashMap<(String, Address), Amount>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `user`'s balance; the source's supply follows.
    pub fn set_balance(&self, source: &str, user: &Address, balance: Amount) {
        self.balances
            .write()
            .insert((source.to_string(), *user), balance);
    }

    pub fn total_supply(&self, source: &str) -> Amount {
        self.balances
            .read()
            .iter()
            .filter(|((name, _), _)| name == source)
            .fold(U256::zero(), |acc, (_, balance)| acc.saturating_add(*balance))
    }
}

impl DataProvider for MemoryProvider {
    fn balance_and_supply(
        &self,
        source: &str,
        user: &Address,
    ) -> Result<BalanceAndSupply, CollaboratorError> {
        let balance = self
            .balances
            .read()
            .get(&(source.to_string(), *user))
            .copied()
            .unwrap_or_default();
        Ok(BalanceAndSupply {
            balance,
            total_supply: self.total_supply(source),
        })
    }
}

/// One user's governance lock
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LockPosition {
    pub balance: Amount,
    pub slope: Amount,
    pub end: Timestamp,
}

/// Vote-escrow positions set directly by the caller
#[derive(Debug, Default)]
pub struct MemoryLock {
    positions: RwLock<HashMap<Address, LockPosition>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `amount` until `end`; voting power decays linearly to zero.
    pub fn lock(&self, user: &Address, amount: Amount, end: Timestamp, now: Timestamp) {
        let slope = amount / U256::from(MAX_LOCK_TIME);
        let position = LockPosition {
            balance: slope * U256::from(end.saturating_sub(now)),
            slope,
            end,
        };
        self.set_position(user, position);
    }

    pub fn set_position(&self, user: &Address, position: LockPosition) {
        self.positions.write().insert(*user, position);
    }

    pub fn position(&self, user: &Address) -> LockPosition {
        self.positions.read().get(user).copied().unwrap_or_default()
    }
}

impl GovernanceLock for MemoryLock {
    fn balance_of(&self, user: &Address) -> Result<Amount, CollaboratorError> {
        Ok(self.position(user).balance)
    }

    fn total_supply(&self) -> Result<Amount, CollaboratorError> {
        Ok(self
            .positions
            .read()
            .values()
            .fold(U256::zero(), |acc, p| acc.saturating_add(p.balance)))
    }

    fn last_user_slope(&self, user: &Address) -> Result<Amount, CollaboratorError> {
        Ok(self.position(user).slope)
    }

    fn locked_end(&self, user: &Address) -> Result<Timestamp, CollaboratorError> {
        Ok(self.position(user).end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewards_core::tokens;

    #[test]
    fn test_token_mint_and_transfer() {
        let engine = Address::from_label("engine");
        let alice = Address::from_label("alice");
        let token = MemoryToken::new("RWD", engine);

        token.mint(tokens(10)).unwrap();
        MintableToken::transfer(&token, &alice, tokens(4)).unwrap();
        assert_eq!(token.balance_of(&alice), tokens(4));
        assert_eq!(token.balance_of(&engine), tokens(6));
        assert_eq!(token.total_minted(), tokens(10));

        assert!(RewardToken::transfer(&token, &alice, tokens(7)).is_err());
    }

    #[test]
    fn test_provider_supply_follows_balances() {
        let provider = MemoryProvider::new();
        let alice = Address::from_label("alice");
        provider.set_balance("Loans", &alice, tokens(3));
        provider.set_balance("Loans", &Address::from_label("bob"), tokens(5));
        provider.set_balance("Pool", &alice, tokens(100));

        let result = provider.balance_and_supply("Loans", &alice).unwrap();
        assert_eq!(result.balance, tokens(3));
        assert_eq!(result.total_supply, tokens(8));
    }

    #[test]
    fn test_lock_positions() {
        let lock = MemoryLock::new();
        let alice = Address::from_label("alice");
        lock.lock(&alice, tokens(1_000), MAX_LOCK_TIME, 0);
        let position = lock.position(&alice);
        assert!(position.balance <= tokens(1_000));
        assert!(position.balance > tokens(999));
        assert_eq!(lock.locked_end(&alice).unwrap(), MAX_LOCK_TIME);
        assert_eq!(lock.total_supply().unwrap(), position.balance);
    }

    #[test]
    fn test_failing_token() {
        assert!(FailingToken.mint(tokens(1)).is_err());
    }
}
