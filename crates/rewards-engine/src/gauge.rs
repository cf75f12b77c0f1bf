//! # Gauge Controller
//!
//! Vote-escrowed weighting of the votable pool across data sources.
//!
//! Every weight is a linearly decaying `Point { bias, slope }` bucketed by
//! gauge week. Three families of series are kept:
//!
//! - one per gauge (data source)
//! - one sum per gauge type
//! - a global total, `Σ typeWeight × typeSum`
//!
//! plus a piecewise-constant weight per type. Series are advanced lazily one
//! week at a time, at most `catch_up_limit` weeks per call; a capped call
//! moves the series' time marker to the last computed week and the next call
//! resumes from there.
//!
//! The relative weight of a gauge at `t` (floored to a week) is
//! `1e18 × typeWeight × gaugeBias / total`.

use crate::constants::{CATCH_UP_LIMIT, MAX_VOTE_WEIGHT};
use crate::events::{EventLog, RewardsEvent};
use rewards_core::{
    mul_div, next_week, week_floor, Address, Amount, Bps, CatchUp, Result, RewardsError,
    Timestamp, EXA, U256, WEEK,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Linearly decaying weight
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub bias: Amount,
    /// Bias lost per microsecond
    pub slope: Amount,
}

impl Point {
    /// Advance one week; `slope_change` is the slope expiring at the new week.
    ///
    /// Bias never goes negative: when a week of decay would exceed it, both
    /// bias and slope are cleared.
    fn advance(self, slope_change: Amount) -> Point {
        let decay = self.slope.saturating_mul(U256::from(WEEK));
        if self.bias > decay {
            Point {
                bias: self.bias - decay,
                slope: self.slope.saturating_sub(slope_change),
            }
        } else {
            Point::default()
        }
    }
}

/// One user's vote on one gauge
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotedSlope {
    pub slope: Amount,
    /// Share of the user's voting power, in bps
    pub power: Bps,
    /// Lock expiry, floored to a week
    pub end: Timestamp,
}

/// Week-bucketed point series with scheduled slope changes
#[derive(Clone, Debug, Default)]
struct Series {
    points: BTreeMap<Timestamp, Point>,
    changes: BTreeMap<Timestamp, Amount>,
    /// Last computed week, zero while the series is empty
    last: Timestamp,
}

impl Series {
    fn change_at(&self, t: Timestamp) -> Amount {
        self.changes.get(&t).copied().unwrap_or_default()
    }

    fn stored(&self, t: Timestamp) -> Point {
        self.points.get(&t).copied().unwrap_or_default()
    }

    fn point_mut(&mut self, t: Timestamp) -> &mut Point {
        self.points.entry(t).or_default()
    }

    /// Fill weekly points up to the first week after `now`.
    fn checkpoint(&mut self, now: Timestamp, limit: u32) -> (Point, CatchUp) {
        let mut t = self.last;
        if t == 0 {
            return (Point::default(), CatchUp::complete(0));
        }
        let mut pt = self.stored(t);
        let mut steps = 0;
        while t <= now {
            if steps >= limit {
                self.last = t;
                return (pt, CatchUp::partial(steps));
            }
            t += WEEK;
            pt = pt.advance(self.change_at(t));
            self.points.insert(t, pt);
            steps += 1;
        }
        self.last = t;
        (pt, CatchUp::complete(steps))
    }

    /// Point at week `t` without persisting anything.
    ///
    /// Weeks up to the time marker come from storage; later weeks are
    /// extrapolated from the last stored point. The flag is false when the
    /// extrapolation hit `limit`.
    fn point_at(&self, t: Timestamp, limit: u32) -> (Point, bool) {
        if self.last == 0 || t <= self.last {
            return (self.stored(t), true);
        }
        let mut cursor = self.last;
        let mut pt = self.stored(cursor);
        let mut steps = 0;
        while cursor < t {
            if steps >= limit {
                return (pt, false);
            }
            cursor += WEEK;
            pt = pt.advance(self.change_at(cursor));
            steps += 1;
        }
        (pt, true)
    }
}

#[derive(Clone, Debug)]
struct GaugeType {
    name: String,
    /// Weight effective from each key onwards
    weights: BTreeMap<Timestamp, Amount>,
    sum: Series,
}

impl GaugeType {
    fn weight_at(&self, t: Timestamp) -> Amount {
        self.weights
            .range(..=t)
            .next_back()
            .map(|(_, w)| *w)
            .unwrap_or_default()
    }

    fn current_weight(&self) -> Amount {
        self.weights.values().next_back().copied().unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
struct Gauge {
    type_id: u32,
    weight: Series,
}

/// Gauge weights, type weights and user votes
#[derive(Clone, Debug)]
pub struct GaugeController {
    types: Vec<GaugeType>,
    gauges: IndexMap<String, Gauge>,
    total: BTreeMap<Timestamp, Amount>,
    time_total: Timestamp,
    votes: HashMap<(Address, String), VotedSlope>,
    last_vote: HashMap<(Address, String), Timestamp>,
    power_used: HashMap<Address, Bps>,
    catch_up_limit: u32,
}

impl GaugeController {
    pub fn new(now: Timestamp) -> Self {
        Self {
            types: Vec::new(),
            gauges: IndexMap::new(),
            total: BTreeMap::new(),
            time_total: week_floor(now),
            votes: HashMap::new(),
            last_vote: HashMap::new(),
            power_used: HashMap::new(),
            catch_up_limit: CATCH_UP_LIMIT,
        }
    }

    pub fn with_catch_up_limit(mut self, limit: u32) -> Self {
        self.catch_up_limit = limit;
        self
    }

    pub fn type_count(&self) -> u32 {
        self.types.len() as u32
    }

    pub fn type_name(&self, type_id: u32) -> Option<&str> {
        self.types.get(type_id as usize).map(|t| t.name.as_str())
    }

    pub fn is_gauge(&self, source: &str) -> bool {
        self.gauges.contains_key(source)
    }

    pub fn gauge_type(&self, source: &str) -> Option<u32> {
        self.gauges.get(source).map(|g| g.type_id)
    }

    pub fn gauges(&self) -> impl Iterator<Item = &str> {
        self.gauges.keys().map(String::as_str)
    }

    fn gauge_type_mut(&mut self, type_id: u32) -> Result<&mut GaugeType> {
        self.types
            .get_mut(type_id as usize)
            .ok_or(RewardsError::GaugeTypeNotFound(type_id))
    }

    // === Catch-up ===

    /// Advance the global total (and every type sum) to the week after `now`.
    ///
    /// The week after `now` is recomputed from the type sums, so changes
    /// scheduled there are folded in.
    fn checkpoint_total(&mut self, now: Timestamp) -> Result<(Amount, CatchUp)> {
        let limit = self.catch_up_limit;
        let mut progress = CatchUp::complete(0);
        // Sums stop at their own cap; the total may not run past the
        // earliest of them.
        let mut horizon = Timestamp::MAX;
        for gauge_type in &mut self.types {
            let (_, sum_progress) = gauge_type.sum.checkpoint(now, limit);
            progress = progress.merge(sum_progress);
            if gauge_type.sum.last != 0 {
                horizon = horizon.min(gauge_type.sum.last);
            }
        }

        // Diverges from the upstream gauge controller, whose sum and total
        // loops break on the inverted condition and stop after one week.
        // Here both continue while `t <= now` like every other series, and
        // the total never runs past the sums' horizon.
        let mut t = self.time_total;
        if t > now {
            t -= WEEK;
        }
        let mut pt = self.total.get(&t).copied().unwrap_or_default();
        let mut steps = 0;
        while t <= now {
            if steps >= limit || t + WEEK > horizon {
                self.time_total = t;
                return Ok((pt, progress.merge(CatchUp::partial(steps))));
            }
            t += WEEK;
            pt = self.total_from_sums(t)?;
            self.total.insert(t, pt);
            steps += 1;
        }
        self.time_total = t;
        Ok((pt, progress.merge(CatchUp::complete(steps))))
    }

    fn total_from_sums(&self, t: Timestamp) -> Result<Amount> {
        let limit = self.catch_up_limit;
        self.types.iter().try_fold(U256::zero(), |acc, gauge_type| {
            let (sum, _) = gauge_type.sum.point_at(t, limit);
            let weighted = gauge_type
                .weight_at(t)
                .checked_mul(sum.bias)
                .ok_or(RewardsError::ArithmeticOverflow)?;
            acc.checked_add(weighted)
                .ok_or(RewardsError::ArithmeticOverflow)
        })
    }

    fn checkpoint_weight(&mut self, source: &str, now: Timestamp) -> Result<(Point, CatchUp)> {
        let limit = self.catch_up_limit;
        let gauge = self
            .gauges
            .get_mut(source)
            .ok_or_else(|| RewardsError::GaugeNotVotable(source.to_string()))?;
        Ok(gauge.weight.checkpoint(now, limit))
    }

    fn checkpoint_sum(&mut self, type_id: u32, now: Timestamp) -> Result<(Point, CatchUp)> {
        let limit = self.catch_up_limit;
        Ok(self.gauge_type_mut(type_id)?.sum.checkpoint(now, limit))
    }

    /// Batch precompute of every type sum and the total
    pub fn checkpoint(&mut self, now: Timestamp) -> Result<CatchUp> {
        let (_, progress) = self.checkpoint_total(now)?;
        Ok(progress)
    }

    /// Batch precompute of one gauge plus the total
    pub fn checkpoint_gauge(&mut self, source: &str, now: Timestamp) -> Result<CatchUp> {
        let (_, weight) = self.checkpoint_weight(source, now)?;
        let (_, total) = self.checkpoint_total(now)?;
        Ok(weight.merge(total))
    }

    fn require_complete(progress: CatchUp, what: &str) -> Result<()> {
        if progress.complete {
            Ok(())
        } else {
            Err(RewardsError::CatchUpRequired {
                what: what.to_string(),
            })
        }
    }

    // === Administration ===

    /// Register a gauge type and return its id.
    pub fn add_type(
        &mut self,
        name: &str,
        weight: Amount,
        now: Timestamp,
        events: &mut EventLog,
    ) -> Result<u32> {
        let type_id = self.types.len() as u32;
        self.types.push(GaugeType {
            name: name.to_string(),
            weights: BTreeMap::new(),
            sum: Series::default(),
        });
        if !weight.is_zero() {
            self.change_type_weight(type_id, weight, now, events)?;
        }
        events.emit(RewardsEvent::AddType {
            name: name.to_string(),
            type_id,
        });
        tracing::info!(name, type_id, "gauge type added");
        Ok(type_id)
    }

    pub fn change_type_weight(
        &mut self,
        type_id: u32,
        weight: Amount,
        now: Timestamp,
        events: &mut EventLog,
    ) -> Result<()> {
        if type_id as usize >= self.types.len() {
            return Err(RewardsError::GaugeTypeNotFound(type_id));
        }
        let (total, total_progress) = self.checkpoint_total(now)?;
        Self::require_complete(total_progress, "gauge total")?;
        let next_time = next_week(now);
        let limit = self.catch_up_limit;

        let gauge_type = self.gauge_type_mut(type_id)?;
        let old_weight = gauge_type.weight_at(next_time);
        let (old_sum, _) = gauge_type.sum.point_at(next_time, limit);
        gauge_type.weights.insert(next_time, weight);

        let added = old_sum
            .bias
            .checked_mul(weight)
            .ok_or(RewardsError::ArithmeticOverflow)?;
        let removed = old_sum.bias.saturating_mul(old_weight);
        let total = total.saturating_add(added).saturating_sub(removed);
        self.total.insert(next_time, total);
        self.time_total = next_time;

        events.emit(RewardsEvent::NewTypeWeight {
            type_id,
            time: now,
            weight,
            total_weight: total,
        });
        Ok(())
    }

    /// Attach a gauge to `source`, optionally with an initial fixed weight.
    pub fn add_gauge(
        &mut self,
        source: &str,
        type_id: u32,
        weight: Amount,
        now: Timestamp,
        events: &mut EventLog,
    ) -> Result<()> {
        if self.gauges.contains_key(source) {
            return Err(RewardsError::GaugeAlreadyAdded(source.to_string()));
        }
        if type_id as usize >= self.types.len() {
            return Err(RewardsError::GaugeTypeNotFound(type_id));
        }
        let next_time = next_week(now);
        let mut series = Series::default();

        if !weight.is_zero() {
            let (old_total, total_progress) = self.checkpoint_total(now)?;
            let (old_sum, sum_progress) = self.checkpoint_sum(type_id, now)?;
            Self::require_complete(total_progress.merge(sum_progress), "gauge total")?;

            let gauge_type = self.gauge_type_mut(type_id)?;
            let type_weight = gauge_type.weight_at(next_time);
            gauge_type.sum.point_mut(next_time).bias = old_sum.bias.saturating_add(weight);
            gauge_type.sum.last = next_time;

            let added = type_weight
                .checked_mul(weight)
                .ok_or(RewardsError::ArithmeticOverflow)?;
            self.total.insert(next_time, old_total.saturating_add(added));
            self.time_total = next_time;
            series.point_mut(next_time).bias = weight;
        }

        let gauge_type = self.gauge_type_mut(type_id)?;
        if gauge_type.sum.last == 0 {
            gauge_type.sum.last = next_time;
        }
        series.last = next_time;
        self.gauges.insert(
            source.to_string(),
            Gauge {
                type_id,
                weight: series,
            },
        );

        events.emit(RewardsEvent::NewGauge {
            gauge: source.to_string(),
            type_id,
            weight,
        });
        tracing::info!(source, type_id, weight = %weight, "gauge added");
        Ok(())
    }

    /// Overwrite a gauge's bias from the next week on.
    pub fn change_gauge_weight(
        &mut self,
        source: &str,
        weight: Amount,
        now: Timestamp,
        events: &mut EventLog,
    ) -> Result<()> {
        let type_id = self
            .gauge_type(source)
            .ok_or_else(|| RewardsError::GaugeNotVotable(source.to_string()))?;
        let (old_weight, weight_progress) = self.checkpoint_weight(source, now)?;
        let (old_sum, sum_progress) = self.checkpoint_sum(type_id, now)?;
        let (total, total_progress) = self.checkpoint_total(now)?;
        Self::require_complete(
            weight_progress.merge(sum_progress).merge(total_progress),
            "gauge weights",
        )?;
        let next_time = next_week(now);

        if let Some(gauge) = self.gauges.get_mut(source) {
            gauge.weight.point_mut(next_time).bias = weight;
            gauge.weight.last = next_time;
        }

        let gauge_type = self.gauge_type_mut(type_id)?;
        let type_weight = gauge_type.weight_at(next_time);
        let new_sum = old_sum
            .bias
            .saturating_add(weight)
            .saturating_sub(old_weight.bias);
        gauge_type.sum.point_mut(next_time).bias = new_sum;
        gauge_type.sum.last = next_time;

        let added = new_sum
            .checked_mul(type_weight)
            .ok_or(RewardsError::ArithmeticOverflow)?;
        let removed = old_sum.bias.saturating_mul(type_weight);
        let total = total.saturating_add(added).saturating_sub(removed);
        self.total.insert(next_time, total);
        self.time_total = next_time;

        events.emit(RewardsEvent::NewGaugeWeight {
            gauge: source.to_string(),
            time: now,
            weight,
            total_weight: total,
        });
        Ok(())
    }

    // === Voting ===

    /// Allocate `weight` bps of `user`'s voting power to `source`.
    ///
    /// `slope` and `lock_end` come from the user's governance lock. All
    /// constraints are checked before anything is written.
    #[allow(clippy::too_many_arguments)]
    pub fn vote_for_gauge_weights(
        &mut self,
        user: &Address,
        source: &str,
        weight: Bps,
        slope: Amount,
        lock_end: Timestamp,
        now: Timestamp,
        cooldown: Timestamp,
        events: &mut EventLog,
    ) -> Result<()> {
        let next_time = next_week(now);
        let lock_end = week_floor(lock_end);
        if lock_end <= next_time {
            return Err(RewardsError::LockExpiresTooSoon {
                lock_end,
                next_time,
            });
        }
        if weight > MAX_VOTE_WEIGHT {
            return Err(RewardsError::InvalidVoteWeight { weight });
        }
        let key = (*user, source.to_string());
        if let Some(last) = self.last_vote.get(&key) {
            let next_allowed = last.saturating_add(cooldown);
            if now < next_allowed {
                return Err(RewardsError::VoteTooSoon { next_allowed });
            }
        }
        let type_id = self
            .gauge_type(source)
            .ok_or_else(|| RewardsError::GaugeNotVotable(source.to_string()))?;

        let old_slope = self.votes.get(&key).copied().unwrap_or_default();
        let old_dt = old_slope.end.saturating_sub(next_time);
        let old_bias = old_slope.slope.saturating_mul(U256::from(old_dt));
        let new_slope = VotedSlope {
            slope: mul_div(slope, U256::from(weight), U256::from(MAX_VOTE_WEIGHT))?,
            power: weight,
            end: lock_end,
        };
        let new_bias = new_slope
            .slope
            .checked_mul(U256::from(lock_end - next_time))
            .ok_or(RewardsError::ArithmeticOverflow)?;

        let power_used = self.power_used.get(user).copied().unwrap_or(0) as i64
            + new_slope.power as i64
            - old_slope.power as i64;
        if !(0..=MAX_VOTE_WEIGHT as i64).contains(&power_used) {
            return Err(RewardsError::VotingPowerExceeded { used: power_used });
        }

        let (old_weight, weight_progress) = self.checkpoint_weight(source, now)?;
        let (old_sum, sum_progress) = self.checkpoint_sum(type_id, now)?;
        Self::require_complete(weight_progress.merge(sum_progress), "gauge weights")?;

        let still_active = old_slope.end > next_time;
        let unexpired = old_slope.end > now;
        let apply = |series: &mut Series, old_point_bias: Amount| {
            let pt = series.point_mut(next_time);
            pt.bias = old_point_bias.saturating_add(new_bias).max(old_bias) - old_bias;
            pt.slope = if still_active {
                pt.slope.saturating_add(new_slope.slope).max(old_slope.slope) - old_slope.slope
            } else {
                pt.slope.saturating_add(new_slope.slope)
            };
            if unexpired {
                let change = series.changes.entry(old_slope.end).or_default();
                *change = change.saturating_sub(old_slope.slope);
            }
            let change = series.changes.entry(new_slope.end).or_default();
            *change = change.saturating_add(new_slope.slope);
        };

        if let Some(gauge) = self.gauges.get_mut(source) {
            apply(&mut gauge.weight, old_weight.bias);
        }
        apply(&mut self.gauge_type_mut(type_id)?.sum, old_sum.bias);

        let (_, total_progress) = self.checkpoint_total(now)?;
        Self::require_complete(total_progress, "gauge total")?;

        self.power_used.insert(*user, power_used as Bps);
        self.votes.insert(key.clone(), new_slope);
        self.last_vote.insert(key, now);

        events.emit(RewardsEvent::VoteForGauge {
            time: now,
            user: *user,
            gauge: source.to_string(),
            weight,
        });
        tracing::debug!(%user, source, weight, "gauge vote recorded");
        Ok(())
    }

    // === Queries ===

    /// Share of the votable pool for `source` at `time`, 1e18 = 100%.
    ///
    /// Read-only: unfinalised weeks are extrapolated, nothing is stored.
    pub fn relative_weight(&self, source: &str, time: Timestamp) -> Result<Amount> {
        let t = week_floor(time);
        let Some(gauge) = self.gauges.get(source) else {
            return Ok(U256::zero());
        };
        let total = if t <= self.time_total {
            self.total.get(&t).copied().unwrap_or_default()
        } else {
            self.total_from_sums(t)?
        };
        if total.is_zero() {
            return Ok(U256::zero());
        }
        let type_weight = self
            .types
            .get(gauge.type_id as usize)
            .map(|gauge_type| gauge_type.weight_at(t))
            .unwrap_or_default();
        let (point, _) = gauge.weight.point_at(t, self.catch_up_limit);
        let weighted = type_weight
            .checked_mul(point.bias)
            .ok_or(RewardsError::ArithmeticOverflow)?;
        mul_div(EXA, weighted, total)
    }

    /// Like [`relative_weight`](Self::relative_weight) after checkpointing
    /// the gauge and the total to `now`.
    pub fn relative_weight_write(
        &mut self,
        source: &str,
        time: Timestamp,
        now: Timestamp,
    ) -> Result<Amount> {
        if self.is_gauge(source) {
            self.checkpoint_weight(source, now)?;
        }
        self.checkpoint_total(now)?;
        self.relative_weight(source, time)
    }

    pub fn user_vote(&self, user: &Address, source: &str) -> Option<VotedSlope> {
        self.votes.get(&(*user, source.to_string())).copied()
    }

    pub fn user_power(&self, user: &Address) -> Bps {
        self.power_used.get(user).copied().unwrap_or(0)
    }

    pub fn last_user_vote(&self, user: &Address, source: &str) -> Option<Timestamp> {
        self.last_vote.get(&(*user, source.to_string())).copied()
    }

    /// Latest computed bias of `source`
    pub fn gauge_weight(&self, source: &str) -> Amount {
        self.gauges
            .get(source)
            .map(|g| g.weight.stored(g.weight.last).bias)
            .unwrap_or_default()
    }

    /// Bias of `source` at `time` (floored to a week)
    pub fn gauge_weight_at(&self, source: &str, time: Timestamp) -> Amount {
        self.gauges
            .get(source)
            .map(|g| g.weight.point_at(week_floor(time), self.catch_up_limit).0.bias)
            .unwrap_or_default()
    }

    pub fn type_weight(&self, type_id: u32) -> Amount {
        self.types
            .get(type_id as usize)
            .map(GaugeType::current_weight)
            .unwrap_or_default()
    }

    /// Latest computed type sum
    pub fn type_sum(&self, type_id: u32) -> Amount {
        self.types
            .get(type_id as usize)
            .map(|t| t.sum.stored(t.sum.last).bias)
            .unwrap_or_default()
    }

    /// Latest computed total weight
    pub fn total_weight(&self) -> Amount {
        self.total.get(&self.time_total).copied().unwrap_or_default()
    }

    pub fn time_total(&self) -> Timestamp {
        self.time_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::VOTE_COOLDOWN;
    use rewards_core::{tokens, MICROSECONDS_IN_A_DAY as DAY};

    const START: Timestamp = 100 * WEEK + 3 * DAY;

    fn user(label: &str) -> Address {
        Address::from_label(label)
    }

    fn controller_with_gauges(names: &[&str]) -> (GaugeController, EventLog) {
        let mut events = EventLog::new();
        let mut gauges = GaugeController::new(START);
        gauges.add_type("Liquidity", EXA, START, &mut events).unwrap();
        for name in names {
            gauges.add_gauge(name, 0, U256::zero(), START, &mut events).unwrap();
        }
        (gauges, events)
    }

    #[test]
    fn test_point_decay_clamps_at_zero() {
        let pt = Point {
            bias: U256::from(10 * WEEK),
            slope: U256::from(3u64),
        };
        let next = pt.advance(U256::zero());
        assert_eq!(next.bias, U256::from(7 * WEEK));
        assert_eq!(next.slope, U256::from(3u64));

        let exhausted = Point {
            bias: U256::from(WEEK),
            slope: U256::from(1u64),
        }
        .advance(U256::one());
        assert_eq!(exhausted, Point::default());
    }

    #[test]
    fn test_single_fixed_gauge_takes_everything() {
        let mut events = EventLog::new();
        let mut gauges = GaugeController::new(START);
        gauges.add_type("Liquidity", EXA, START, &mut events).unwrap();
        gauges
            .add_gauge("sICX/ICX", 0, tokens(1), START, &mut events)
            .unwrap();

        let next = next_week(START);
        assert_eq!(gauges.relative_weight("sICX/ICX", next).unwrap(), EXA);
        // the current week has no weight yet
        assert_eq!(gauges.relative_weight("sICX/ICX", START).unwrap(), U256::zero());
        assert!(matches!(
            events.events().last(),
            Some(RewardsEvent::NewGauge { .. })
        ));
    }

    #[test]
    fn test_duplicate_gauge_and_unknown_type() {
        let (mut gauges, mut events) = controller_with_gauges(&["A"]);
        assert_eq!(
            gauges.add_gauge("A", 0, U256::zero(), START, &mut events),
            Err(RewardsError::GaugeAlreadyAdded("A".into()))
        );
        assert_eq!(
            gauges.add_gauge("B", 7, U256::zero(), START, &mut events),
            Err(RewardsError::GaugeTypeNotFound(7))
        );
    }

    #[test]
    fn test_split_vote_and_cooldown() {
        let (mut gauges, mut events) = controller_with_gauges(&["A", "B"]);
        let alice = user("alice");
        let slope = U256::from(1_000_000u64);
        let lock_end = START + 8 * WEEK;

        gauges
            .vote_for_gauge_weights(&alice, "A", 5_000, slope, lock_end, START, VOTE_COOLDOWN, &mut events)
            .unwrap();
        gauges
            .vote_for_gauge_weights(&alice, "B", 5_000, slope, lock_end, START, VOTE_COOLDOWN, &mut events)
            .unwrap();
        assert_eq!(gauges.user_power(&alice), 10_000);

        let next = next_week(START);
        assert_eq!(gauges.relative_weight("A", next).unwrap(), EXA / 2);
        assert_eq!(gauges.relative_weight("B", next).unwrap(), EXA / 2);

        let err = gauges
            .vote_for_gauge_weights(&alice, "A", 2_000, slope, lock_end, START + DAY, VOTE_COOLDOWN, &mut events)
            .unwrap_err();
        assert_eq!(
            err,
            RewardsError::VoteTooSoon {
                next_allowed: START + VOTE_COOLDOWN
            }
        );
    }

    #[test]
    fn test_power_cannot_exceed_full_weight() {
        let (mut gauges, mut events) = controller_with_gauges(&["A", "B"]);
        let bob = user("bob");
        let slope = U256::from(10u64);
        let lock_end = START + 8 * WEEK;

        gauges
            .vote_for_gauge_weights(&bob, "A", 7_000, slope, lock_end, START, VOTE_COOLDOWN, &mut events)
            .unwrap();
        let before = events.len();
        let err = gauges
            .vote_for_gauge_weights(&bob, "B", 3_001, slope, lock_end, START, VOTE_COOLDOWN, &mut events)
            .unwrap_err();
        assert_eq!(err, RewardsError::VotingPowerExceeded { used: 10_001 });
        assert_eq!(events.len(), before);
        assert_eq!(gauges.user_vote(&bob, "B"), None);

        assert_eq!(
            gauges.vote_for_gauge_weights(&bob, "B", 10_001, slope, lock_end, START, VOTE_COOLDOWN, &mut events),
            Err(RewardsError::InvalidVoteWeight { weight: 10_001 })
        );
    }

    #[test]
    fn test_lock_must_outlive_next_week() {
        let (mut gauges, mut events) = controller_with_gauges(&["A"]);
        let err = gauges
            .vote_for_gauge_weights(
                &user("carol"),
                "A",
                1_000,
                U256::one(),
                START + 3 * DAY,
                START,
                VOTE_COOLDOWN,
                &mut events,
            )
            .unwrap_err();
        assert!(matches!(err, RewardsError::LockExpiresTooSoon { .. }));
    }

    #[test]
    fn test_vote_on_unknown_gauge() {
        let (mut gauges, mut events) = controller_with_gauges(&[]);
        let err = gauges
            .vote_for_gauge_weights(&user("dave"), "X", 1_000, U256::one(), START + 8 * WEEK, START, VOTE_COOLDOWN, &mut events)
            .unwrap_err();
        assert_eq!(err, RewardsError::GaugeNotVotable("X".into()));
    }

    #[test]
    fn test_revote_to_zero_releases_weight() {
        let (mut gauges, mut events) = controller_with_gauges(&["A"]);
        let erin = user("erin");
        let slope = U256::from(1_000u64);
        let lock_end = START + 20 * WEEK;

        gauges
            .vote_for_gauge_weights(&erin, "A", 10_000, slope, lock_end, START, VOTE_COOLDOWN, &mut events)
            .unwrap();
        assert!(gauges.gauge_weight("A") > U256::zero());

        let later = START + VOTE_COOLDOWN + DAY;
        gauges
            .vote_for_gauge_weights(&erin, "A", 0, slope, lock_end, later, VOTE_COOLDOWN, &mut events)
            .unwrap();
        assert_eq!(gauges.user_power(&erin), 0);
        assert_eq!(gauges.gauge_weight_at("A", next_week(later)), U256::zero());
        assert_eq!(gauges.relative_weight("A", next_week(later)).unwrap(), U256::zero());
    }

    #[test]
    fn test_weight_expires_with_lock() {
        let (mut gauges, mut events) = controller_with_gauges(&["A"]);
        let lock_end = START + 8 * WEEK;
        gauges
            .vote_for_gauge_weights(&user("frank"), "A", 10_000, U256::from(5u64), lock_end, START, VOTE_COOLDOWN, &mut events)
            .unwrap();

        let expiry = week_floor(lock_end);
        assert!(gauges.gauge_weight_at("A", expiry - WEEK) > U256::zero());
        assert_eq!(gauges.gauge_weight_at("A", expiry), U256::zero());

        let after = expiry + 2 * WEEK;
        gauges.checkpoint_gauge("A", after).unwrap();
        assert_eq!(gauges.relative_weight("A", after).unwrap(), U256::zero());
        assert_eq!(gauges.total_weight(), U256::zero());
    }

    #[test]
    fn test_type_weights_scale_relative_weight() {
        let mut events = EventLog::new();
        let mut gauges = GaugeController::new(START);
        gauges.add_type("Liquidity", EXA, START, &mut events).unwrap();
        gauges.add_type("Lending", EXA * 3, START, &mut events).unwrap();
        gauges.add_gauge("pool", 0, tokens(10), START, &mut events).unwrap();
        gauges.add_gauge("loans", 1, tokens(10), START, &mut events).unwrap();

        let next = next_week(START);
        assert_eq!(gauges.relative_weight("pool", next).unwrap(), EXA / 4);
        assert_eq!(gauges.relative_weight("loans", next).unwrap(), EXA * 3 / 4);

        gauges.change_type_weight(1, EXA, START, &mut events).unwrap();
        assert_eq!(gauges.relative_weight("loans", next).unwrap(), EXA / 2);
        assert_eq!(gauges.type_weight(1), EXA);
    }

    #[test]
    fn test_change_gauge_weight_updates_total() {
        let (mut gauges, mut events) = controller_with_gauges(&["A", "B"]);
        gauges.change_gauge_weight("A", tokens(3), START, &mut events).unwrap();
        gauges.change_gauge_weight("B", tokens(1), START, &mut events).unwrap();

        let next = next_week(START);
        assert_eq!(gauges.relative_weight("A", next).unwrap(), EXA * 3 / 4);
        assert_eq!(gauges.total_weight(), tokens(4) * EXA);
        match events.events().last() {
            Some(RewardsEvent::NewGaugeWeight { gauge, total_weight, .. }) => {
                assert_eq!(gauge, "B");
                assert_eq!(*total_weight, tokens(4) * EXA);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_checkpoint_resumes_after_cap() {
        let (gauges, mut events) = controller_with_gauges(&["A"]);
        let mut gauges = gauges.with_catch_up_limit(3);
        gauges.change_gauge_weight("A", tokens(1), START, &mut events).unwrap();

        let far = START + 10 * WEEK;
        let first = gauges.checkpoint_gauge("A", far).unwrap();
        assert!(!first.complete);
        let marker = gauges.time_total();
        assert!(marker > next_week(START));

        let mut rounds = 1;
        while !gauges.checkpoint_gauge("A", far).unwrap().complete {
            rounds += 1;
            assert!(rounds < 10);
        }
        assert_eq!(gauges.time_total(), next_week(far));
        assert_eq!(gauges.relative_weight("A", far).unwrap(), EXA);
    }

    #[test]
    fn test_read_only_matches_write() {
        let (mut gauges, mut events) = controller_with_gauges(&["A", "B"]);
        let slope = U256::from(7_777u64);
        gauges
            .vote_for_gauge_weights(&user("gina"), "A", 6_000, slope, START + 30 * WEEK, START, VOTE_COOLDOWN, &mut events)
            .unwrap();
        gauges
            .vote_for_gauge_weights(&user("gina"), "B", 4_000, slope, START + 12 * WEEK, START, VOTE_COOLDOWN, &mut events)
            .unwrap();

        let query = START + 9 * WEEK;
        let read = gauges.relative_weight("A", query).unwrap();
        let snapshot = gauges.clone();
        let write = gauges.relative_weight_write("A", query, query).unwrap();
        assert_eq!(read, write);
        assert_eq!(snapshot.time_total(), next_week(START));
    }
}
