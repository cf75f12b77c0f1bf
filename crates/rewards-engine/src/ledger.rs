//! Claimable reward balances

use rewards_core::{Address, Amount, TokenId, U256};
use indexmap::IndexMap;
use std::collections::HashMap;

/// `user → token → pending amount`
#[derive(Clone, Debug, Default)]
pub struct RewardsLedger {
    holdings: HashMap<Address, IndexMap<TokenId, Amount>>,
}

impl RewardsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&mut self, user: &Address, token: &TokenId, amount: Amount) {
        if amount.is_zero() {
            return;
        }
        let entry = self
            .holdings
            .entry(*user)
            .or_default()
            .entry(token.clone())
            .or_default();
        *entry = entry.saturating_add(amount);
    }

    pub fn pending(&self, user: &Address, token: &TokenId) -> Amount {
        self.holdings
            .get(user)
            .and_then(|tokens| tokens.get(token))
            .copied()
            .unwrap_or_default()
    }

    /// Every non-zero holding of `user`
    pub fn holdings(&self, user: &Address) -> Vec<(TokenId, Amount)> {
        self.holdings
            .get(user)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter(|(_, amount)| !amount.is_zero())
                    .map(|(token, amount)| (token.clone(), *amount))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Read and zero the entry
    pub fn take(&mut self, user: &Address, token: &TokenId) -> Amount {
        self.holdings
            .get_mut(user)
            .and_then(|tokens| tokens.get_mut(token))
            .map(std::mem::take)
            .unwrap_or_else(U256::zero)
    }
}
