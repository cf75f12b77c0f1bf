//! # Distribution Allocator
//!
//! Splits each day's emission into the distribution waterfall:
//!
//! 1. **Base recipients** (reserve, DAO fund, ...) are paid by transfer.
//! 2. **Fixed sources** get a recorded per-day share.
//! 3. Whatever is left is the day's **votable pool**, split across gauges.
//!
//! Each payment is `bps × remaining / remaining_bps`, with both counters
//! reduced after the payment, so recipient order changes rounding. Order is
//! insertion order.

use crate::collaborators::MintableToken;
use crate::emission::EmissionSchedule;
use crate::events::{EventLog, RewardsEvent};
use rewards_core::{
    mul_div, Address, Amount, Bps, CatchUp, Day, Result, RewardsError, BPS_DENOMINATOR, U256,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Report name of the votable remainder
pub const VOTABLE_REPORT_NAME: &str = "Voting";

/// Recipient of a base percentage, paid immediately
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRecipient {
    pub name: String,
    pub address: Address,
    pub bps: Bps,
}

/// Result of one day's waterfall
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DayAllocation {
    pub day: Day,
    pub total: Amount,
    pub base: Vec<(String, Amount)>,
    pub fixed: Vec<(String, Amount)>,
    pub votable: Amount,
}

/// Day cursor plus the percentage tables and per-day allocation records
#[derive(Clone, Debug, Default)]
pub struct DistributionAllocator {
    schedule: EmissionSchedule,
    platform_day: Day,
    base: IndexMap<String, BaseRecipient>,
    fixed: IndexMap<String, Bps>,
    fixed_dist: HashMap<(String, Day), Amount>,
    votable_dist: BTreeMap<Day, Amount>,
    daily_total: BTreeMap<Day, Amount>,
}

impl DistributionAllocator {
    pub fn new(schedule: EmissionSchedule, start_day: Day) -> Self {
        Self {
            schedule,
            platform_day: start_day,
            ..Default::default()
        }
    }

    pub fn schedule(&self) -> &EmissionSchedule {
        &self.schedule
    }

    /// Next day to distribute
    pub fn platform_day(&self) -> Day {
        self.platform_day
    }

    pub fn base_recipients(&self) -> impl Iterator<Item = &BaseRecipient> {
        self.base.values()
    }

    pub fn fixed_percentages(&self) -> impl Iterator<Item = (&str, Bps)> {
        self.fixed.iter().map(|(name, bps)| (name.as_str(), *bps))
    }

    /// Sum of base and fixed percentages
    pub fn allocated_bps(&self) -> u64 {
        let base: u64 = self.base.values().map(|r| r.bps as u64).sum();
        let fixed: u64 = self.fixed.values().map(|bps| *bps as u64).sum();
        base + fixed
    }

    /// Insert or replace a base recipient.
    pub fn set_base_percentage(&mut self, name: &str, address: Address, bps: Bps) -> Result<()> {
        let current = self.base.get(name).map(|r| r.bps as u64).unwrap_or(0);
        let total = self.allocated_bps() - current + bps as u64;
        if total > BPS_DENOMINATOR as u64 {
            return Err(RewardsError::PercentageOverflow { total });
        }
        self.base.insert(
            name.to_string(),
            BaseRecipient {
                name: name.to_string(),
                address,
                bps,
            },
        );
        Ok(())
    }

    /// Insert or replace a fixed share for a data source.
    pub fn set_fixed_percentage(&mut self, source: &str, bps: Bps) -> Result<()> {
        let current = self.fixed.get(source).map(|b| *b as u64).unwrap_or(0);
        let total = self.allocated_bps() - current + bps as u64;
        if total > BPS_DENOMINATOR as u64 {
            return Err(RewardsError::PercentageOverflow { total });
        }
        self.fixed.insert(source.to_string(), bps);
        Ok(())
    }

    /// Distribute every day up to and including `current_day`, at most
    /// `limit` days per call.
    ///
    /// Mint or transfer failures abort with an error; the caller discards the
    /// state of the whole call.
    pub fn distribute(
        &mut self,
        current_day: Day,
        token: &dyn MintableToken,
        limit: u32,
        events: &mut EventLog,
    ) -> Result<CatchUp> {
        let mut steps = 0;
        while self.platform_day <= current_day {
            if steps >= limit {
                tracing::info!(
                    platform_day = self.platform_day,
                    current_day,
                    "distribution catch-up paused at iteration cap"
                );
                return Ok(CatchUp::partial(steps));
            }
            let allocation = self.allocate_day(self.platform_day, token, events)?;
            tracing::debug!(
                day = allocation.day,
                total = %allocation.total,
                votable = %allocation.votable,
                "distributed day"
            );
            self.platform_day += 1;
            steps += 1;
        }
        Ok(CatchUp::complete(steps))
    }

    fn allocate_day(
        &mut self,
        day: Day,
        token: &dyn MintableToken,
        events: &mut EventLog,
    ) -> Result<DayAllocation> {
        let total = self.schedule.daily_distribution(day);
        token.mint(total)?;

        let mut remaining = total;
        let mut shares = BPS_DENOMINATOR;
        let mut allocation = DayAllocation {
            day,
            total,
            ..Default::default()
        };

        for recipient in self.base.values() {
            let amount = waterfall_share(recipient.bps, remaining, shares)?;
            token.transfer(&recipient.address, amount)?;
            remaining -= amount;
            shares -= recipient.bps;
            events.emit(RewardsEvent::Report {
                day,
                name: recipient.name.clone(),
                dist: total,
                value: amount,
            });
            allocation.base.push((recipient.name.clone(), amount));
        }

        for (source, bps) in &self.fixed {
            let amount = waterfall_share(*bps, remaining, shares)?;
            remaining -= amount;
            shares -= *bps;
            self.fixed_dist.insert((source.clone(), day), amount);
            events.emit(RewardsEvent::Report {
                day,
                name: source.clone(),
                dist: total,
                value: amount,
            });
            allocation.fixed.push((source.clone(), amount));
        }

        self.votable_dist.insert(day, remaining);
        self.daily_total.insert(day, total);
        events.emit(RewardsEvent::Report {
            day,
            name: VOTABLE_REPORT_NAME.to_string(),
            dist: total,
            value: remaining,
        });
        allocation.votable = remaining;
        Ok(allocation)
    }

    /// Fixed share recorded for `source` on `day`
    pub fn fixed_distribution(&self, source: &str, day: Day) -> Amount {
        self.fixed_dist
            .get(&(source.to_string(), day))
            .copied()
            .unwrap_or_default()
    }

    /// Votable pool of `day`, zero if the day was not distributed yet
    pub fn votable_distribution(&self, day: Day) -> Amount {
        self.votable_dist.get(&day).copied().unwrap_or_default()
    }

    /// Amount minted on `day`, if distributed
    pub fn distributed_on(&self, day: Day) -> Option<Amount> {
        self.daily_total.get(&day).copied()
    }
}

fn waterfall_share(bps: Bps, remaining: Amount, shares: Bps) -> Result<Amount> {
    if shares == 0 {
        return Ok(U256::zero());
    }
    mul_div(U256::from(bps), remaining, U256::from(shares))
}
