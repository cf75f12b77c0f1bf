//! # Data Source Accounts
//!
//! Each data source (liquidity pool, loan market, staking pool) keeps a
//! reward-weight accumulator: the cumulative reward per unit of working
//! balance, scaled by 1e18. It advances lazily, one day-interval at a time:
//!
//! ```text
//! acc += emission(day) × Δt × 1e18 / (µsPerDay × workingSupply)
//! ```
//!
//! A user's accrual is `(acc − snapshot) × workingBalance / 1e18`, where the
//! snapshot is the accumulator value at the user's previous update.
//! External reward tokens keep their own accumulators against the raw total
//! supply and raw balances.

use crate::boost::{next_working_supply, BoostEngine, BoostInputs};
use rewards_core::{
    day_of, day_start, mul_div, Address, Amount, CatchUp, Day, Result, RewardsError, Timestamp,
    TokenId, EXA, MICROSECONDS_IN_A_DAY, U256,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-day emission figures a data source accrues against
pub trait EmissionFeed {
    /// Day-zero anchor (microseconds)
    fn time_offset(&self) -> Timestamp;

    /// Protocol-token emission assigned to `source` on `day`
    fn emission(&self, source: &str, day: Day) -> Result<Amount>;

    /// External-token emission assigned to `source` on `day`
    fn external_emission(&self, source: &str, token: &TokenId, day: Day) -> Amount;
}

/// Accumulator values after a (possibly partial) catch-up
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WeightProgress {
    pub total_weight: Amount,
    pub external_weights: IndexMap<TokenId, Amount>,
    pub last_update: Timestamp,
    pub progress: CatchUp,
}

/// Rewards accrued to one user by one update
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserAccrual {
    pub reward: Amount,
    pub external: Vec<(TokenId, Amount)>,
    pub progress: CatchUp,
}

/// A user's balances in one source
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoostData {
    pub balance: Amount,
    pub working_balance: Amount,
    pub total_supply: Amount,
    pub working_supply: Amount,
}

/// Read-only view of a source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub name: String,
    pub contract: Address,
    pub type_id: u32,
    pub votable: bool,
    pub active: bool,
    pub total_supply: Amount,
    pub working_supply: Amount,
    pub last_update_us: Timestamp,
    pub total_weight: Amount,
    pub reward_tokens: Vec<TokenId>,
}

#[derive(Clone, Debug)]
pub struct DataSource {
    name: String,
    contract: Address,
    type_id: u32,
    votable: bool,
    active: bool,
    total_supply: Amount,
    working_supply: Amount,
    last_update_us: Timestamp,
    total_weight: Amount,
    external_weights: IndexMap<TokenId, Amount>,
    user_weight: HashMap<Address, Amount>,
    user_external_weight: HashMap<(Address, TokenId), Amount>,
    balance: HashMap<Address, Amount>,
    working_balance: HashMap<Address, Amount>,
}

impl DataSource {
    pub fn new(name: &str, contract: Address, type_id: u32) -> Self {
        Self {
            name: name.to_string(),
            contract,
            type_id,
            votable: false,
            active: true,
            total_supply: U256::zero(),
            working_supply: U256::zero(),
            last_update_us: 0,
            total_weight: U256::zero(),
            external_weights: IndexMap::new(),
            user_weight: HashMap::new(),
            user_external_weight: HashMap::new(),
            balance: HashMap::new(),
            working_balance: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contract(&self) -> &Address {
        &self.contract
    }

    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    pub fn is_votable(&self) -> bool {
        self.votable
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn total_weight(&self) -> Amount {
        self.total_weight
    }

    pub fn external_weight(&self, token: &TokenId) -> Amount {
        self.external_weights.get(token).copied().unwrap_or_default()
    }

    pub fn last_update(&self) -> Timestamp {
        self.last_update_us
    }

    pub fn working_supply(&self) -> Amount {
        self.working_supply
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn balance_of(&self, user: &Address) -> Amount {
        self.balance.get(user).copied().unwrap_or_default()
    }

    pub fn working_balance_of(&self, user: &Address) -> Amount {
        self.working_balance.get(user).copied().unwrap_or_default()
    }

    /// Whether `user` has ever held a balance here
    pub fn has_participant(&self, user: &Address) -> bool {
        self.balance.contains_key(user)
    }

    pub fn reward_tokens(&self) -> impl Iterator<Item = &TokenId> {
        self.external_weights.keys()
    }

    pub fn add_reward_token(&mut self, token: TokenId) {
        self.external_weights.entry(token).or_default();
    }

    pub fn boost_data(&self, user: &Address) -> BoostData {
        BoostData {
            balance: self.balance_of(user),
            working_balance: self.working_balance_of(user),
            total_supply: self.total_supply,
            working_supply: self.working_supply,
        }
    }

    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            name: self.name.clone(),
            contract: self.contract,
            type_id: self.type_id,
            votable: self.votable,
            active: self.active,
            total_supply: self.total_supply,
            working_supply: self.working_supply,
            last_update_us: self.last_update_us,
            total_weight: self.total_weight,
            reward_tokens: self.external_weights.keys().cloned().collect(),
        }
    }

    // === Accumulator catch-up ===

    /// Run the accumulator forward to `now` without mutating the source.
    ///
    /// Walks day intervals from the last update, at most `limit` per call.
    /// An untouched source (last update zero) is only stamped with `now`.
    pub fn update_total_weight(
        &self,
        now: Timestamp,
        feed: &dyn EmissionFeed,
        limit: u32,
    ) -> Result<WeightProgress> {
        let mut weights = WeightProgress {
            total_weight: self.total_weight,
            external_weights: self.external_weights.clone(),
            last_update: self.last_update_us,
            progress: CatchUp::complete(0),
        };
        if weights.last_update == 0 {
            weights.last_update = now;
            return Ok(weights);
        }

        let offset = feed.time_offset();
        let mut steps = 0;
        while weights.last_update < now {
            if steps >= limit {
                weights.progress = CatchUp::partial(steps);
                return Ok(weights);
            }
            let day = day_of(weights.last_update, offset);
            let interval_end = day_start(day + 1, offset).min(now);
            let elapsed = interval_end - weights.last_update;

            let emission = feed.emission(&self.name, day)?;
            weights.total_weight += accumulator_delta(emission, elapsed, self.working_supply)?;

            for (token, weight) in weights.external_weights.iter_mut() {
                let external = feed.external_emission(&self.name, token, day);
                *weight += accumulator_delta(external, elapsed, self.total_supply)?;
            }

            weights.last_update = interval_end;
            steps += 1;
        }
        weights.progress = CatchUp::complete(steps);
        Ok(weights)
    }

    fn apply_weights(&mut self, weights: &WeightProgress) {
        self.total_weight = weights.total_weight;
        self.external_weights = weights.external_weights.clone();
        self.last_update_us = weights.last_update;
    }

    /// Batch precompute of the accumulators; progress persists when capped.
    pub fn sync(&mut self, now: Timestamp, feed: &dyn EmissionFeed, limit: u32) -> Result<CatchUp> {
        let weights = self.update_total_weight(now, feed, limit)?;
        self.apply_weights(&weights);
        if !weights.progress.complete {
            tracing::info!(
                source = %self.name,
                last_update = weights.last_update,
                "data source catch-up paused at iteration cap"
            );
        }
        Ok(weights.progress)
    }

    fn user_accrual(&self, user: &Address, weights: &WeightProgress) -> Result<UserAccrual> {
        let mut accrual = UserAccrual {
            progress: weights.progress,
            ..Default::default()
        };

        let working = self.working_balance_of(user);
        if !working.is_zero() {
            let snapshot = self.user_weight.get(user).copied().unwrap_or_default();
            let delta = weights.total_weight.saturating_sub(snapshot);
            accrual.reward = mul_div(delta, working, EXA)?;
        }

        let balance = self.balance_of(user);
        if !balance.is_zero() {
            for (token, weight) in &weights.external_weights {
                let snapshot = self
                    .user_external_weight
                    .get(&(*user, token.clone()))
                    .copied()
                    .unwrap_or_default();
                let amount = mul_div(weight.saturating_sub(snapshot), balance, EXA)?;
                if !amount.is_zero() {
                    accrual.external.push((token.clone(), amount));
                }
            }
        }
        Ok(accrual)
    }

    /// What `user` would accrue if updated at `now`. Mutates nothing.
    pub fn preview_user_data(
        &self,
        now: Timestamp,
        user: &Address,
        feed: &dyn EmissionFeed,
        limit: u32,
    ) -> Result<UserAccrual> {
        let weights = self.update_total_weight(now, feed, limit)?;
        self.user_accrual(user, &weights)
    }

    /// Catch up, accrue `user` with their previous working balance and move
    /// their snapshots to the current accumulators.
    pub fn update_single_user_data(
        &mut self,
        now: Timestamp,
        user: &Address,
        feed: &dyn EmissionFeed,
        limit: u32,
    ) -> Result<UserAccrual> {
        let weights = self.update_total_weight(now, feed, limit)?;
        let accrual = self.user_accrual(user, &weights)?;
        self.apply_weights(&weights);
        self.user_weight.insert(*user, weights.total_weight);
        for (token, weight) in &weights.external_weights {
            self.user_external_weight
                .insert((*user, token.clone()), *weight);
        }
        Ok(accrual)
    }

    /// Record fresh balance and supply and recompute the working balance.
    pub fn update_working_balance_and_supply(
        &mut self,
        user: &Address,
        inputs: &BoostInputs,
        boost: &BoostEngine,
    ) -> Result<BoostData> {
        let working = boost.working_balance(inputs)?;
        let previous = self.working_balance_of(user);
        self.working_supply = next_working_supply(self.working_supply, previous, working);
        self.total_supply = inputs.supply;
        self.balance.insert(*user, inputs.balance);
        self.working_balance.insert(*user, working);
        Ok(self.boost_data(user))
    }
}

fn accumulator_delta(emission: Amount, elapsed: Timestamp, supply: Amount) -> Result<Amount> {
    if supply.is_zero() || emission.is_zero() {
        return Ok(U256::zero());
    }
    let scaled = emission
        .checked_mul(U256::from(elapsed))
        .ok_or(RewardsError::ArithmeticOverflow)?;
    let denominator = supply
        .checked_mul(U256::from(MICROSECONDS_IN_A_DAY))
        .ok_or(RewardsError::ArithmeticOverflow)?;
    mul_div(scaled, EXA, denominator)
}

/// Data sources by name, in registration order
#[derive(Clone, Debug, Default)]
pub struct DataSourceRegistry {
    sources: IndexMap<String, DataSource>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, name: &str, contract: Address, type_id: u32) -> Result<&mut DataSource> {
        if self.sources.contains_key(name) {
            return Err(RewardsError::DataSourceExists(name.to_string()));
        }
        if name.is_empty() {
            return Err(RewardsError::InvalidInput("data source name is empty".into()));
        }
        let source = self
            .sources
            .entry(name.to_string())
            .or_insert_with(|| DataSource::new(name, contract, type_id));
        Ok(source)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&DataSource> {
        self.sources
            .get(name)
            .ok_or_else(|| RewardsError::DataSourceNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut DataSource> {
        self.sources
            .get_mut(name)
            .ok_or_else(|| RewardsError::DataSourceNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataSource> {
        self.sources.values()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sources `user` has a recorded balance in
    pub fn sources_of(&self, user: &Address) -> Vec<String> {
        self.sources
            .values()
            .filter(|source| source.has_participant(user))
            .map(|source| source.name.clone())
            .collect()
    }

    /// Registered -> votable, one way.
    pub fn set_votable(&mut self, name: &str) -> Result<()> {
        let source = self.get_mut(name)?;
        if !source.active {
            return Err(RewardsError::DataSourceDisabled(name.to_string()));
        }
        source.votable = true;
        Ok(())
    }

    pub fn disable(&mut self, name: &str) -> Result<()> {
        self.get_mut(name)?.active = false;
        Ok(())
    }
}
