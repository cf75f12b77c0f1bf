//! Working-balance boost
//!
//! A participant's working balance is their raw balance plus a boost
//! proportional to their share of the locked governance token, capped at
//! `balance / boostWeight`:
//!
//! ```text
//! max     = balance × 1e18 / w
//! boost   = supply × boostedBalance × (1e18 − w) / boostedSupply / w
//! working = min(balance + boost, max)
//! ```
//!
//! With `w = 100%` boosting is disabled and `working = balance`.

use crate::constants::{DEFAULT_BOOST_WEIGHT_BPS, MIN_BOOST_WEIGHT_BPS};
use rewards_core::{bps_to_exa, mul_div, Amount, Bps, Result, RewardsError, BPS_DENOMINATOR, EXA, U256};
use primitive_types::U512;
use serde::{Deserialize, Serialize};

/// Inputs to one working-balance computation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoostInputs {
    pub balance: Amount,
    pub supply: Amount,
    pub boosted_balance: Amount,
    pub boosted_supply: Amount,
}

/// Boost weight holder and formula
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoostEngine {
    weight_bps: Bps,
    /// `weight_bps` as an 18-decimal fraction
    weight: Amount,
}

impl Default for BoostEngine {
    fn default() -> Self {
        Self {
            weight_bps: DEFAULT_BOOST_WEIGHT_BPS,
            weight: bps_to_exa(DEFAULT_BOOST_WEIGHT_BPS),
        }
    }
}

impl BoostEngine {
    pub fn new(weight_bps: Bps) -> Result<Self> {
        let mut engine = Self::default();
        engine.set_weight(weight_bps)?;
        Ok(engine)
    }

    /// Set the boost weight; must lie in (1%, 100%].
    pub fn set_weight(&mut self, weight_bps: Bps) -> Result<()> {
        if weight_bps <= MIN_BOOST_WEIGHT_BPS || weight_bps > BPS_DENOMINATOR {
            return Err(RewardsError::InvalidBoostWeight {
                weight: format!("{} bps", weight_bps),
            });
        }
        self.weight_bps = weight_bps;
        self.weight = bps_to_exa(weight_bps);
        Ok(())
    }

    pub fn weight_bps(&self) -> Bps {
        self.weight_bps
    }

    pub fn weight(&self) -> Amount {
        self.weight
    }

    /// Upper bound of the working balance for `balance`
    pub fn max_working_balance(&self, balance: Amount) -> Result<Amount> {
        mul_div(balance, EXA, self.weight)
    }

    pub fn working_balance(&self, inputs: &BoostInputs) -> Result<Amount> {
        let max = self.max_working_balance(inputs.balance)?;
        let boost = self.boost(inputs)?;
        Ok(inputs.balance.saturating_add(boost).min(max))
    }

    fn boost(&self, inputs: &BoostInputs) -> Result<Amount> {
        if inputs.boosted_balance.is_zero() || inputs.boosted_supply.is_zero() {
            return Ok(U256::zero());
        }
        let numerator = inputs
            .supply
            .full_mul(inputs.boosted_balance)
            .checked_mul(U512::from(EXA - self.weight))
            .ok_or(RewardsError::ArithmeticOverflow)?;
        let boost = numerator / U512::from(inputs.boosted_supply) / U512::from(self.weight);
        U256::try_from(boost).map_err(|_| RewardsError::ArithmeticOverflow)
    }
}

/// Working supply after replacing `old_working` with `new_working`
pub fn next_working_supply(working_supply: Amount, old_working: Amount, new_working: Amount) -> Amount {
    working_supply.saturating_sub(old_working).saturating_add(new_working)
}
