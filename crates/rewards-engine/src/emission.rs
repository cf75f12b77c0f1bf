//! # Emission Schedule
//!
//! Daily reward-token emission as a pure function of the epoch day.
//!
//! ```text
//! day  0-60 : 100,000 tokens/day (flat)
//! day 61-66 : 100,000 × 995^(day−60) / 1000^(day−60)
//! day 67+   : 100,000 × 0.995^5 × 0.995^(day−65)   (18-decimal fixed point)
//! floor     : 1,250 tokens/day
//! ```
//!
//! The long-run regime is reached around day 934, after which every day
//! emits the floor.

use crate::constants::*;
use rewards_core::{exa_mul, exa_pow, tokens, Amount, Day, Result, EXA, U256};
use serde::{Deserialize, Serialize};

/// Emission schedule parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionSchedule {
    /// Flat daily emission before decay starts
    pub base_emission: Amount,
    /// Daily emission floor
    pub minimum_emission: Amount,
}

impl Default for EmissionSchedule {
    fn default() -> Self {
        Self {
            base_emission: tokens(BASE_DAILY_TOKENS),
            minimum_emission: tokens(MIN_DAILY_TOKENS),
        }
    }
}

impl EmissionSchedule {
    pub fn new(base_emission: Amount, minimum_emission: Amount) -> Self {
        Self {
            base_emission,
            minimum_emission,
        }
    }

    /// Emission for `day`.
    ///
    /// Always at least `minimum_emission`. Recomputed on every call.
    pub fn daily_distribution(&self, day: Day) -> Amount {
        let amount = if day <= FLAT_EMISSION_LAST_DAY {
            self.base_emission
        } else if day <= INITIAL_DECAY_LAST_DAY {
            self.initial_decay(day - FLAT_EMISSION_LAST_DAY)
        } else {
            // exa math on values ≤ 1e18 cannot overflow 256 bits
            self.compounded_decay(day).unwrap_or_default()
        };
        amount.max(self.minimum_emission)
    }

    /// `base × 995^steps / 1000^steps`, exact integer math
    fn initial_decay(&self, steps: u64) -> Amount {
        let decay = U256::from(DECAY_NUMERATOR).pow(U256::from(steps));
        let scale = U256::from(DECAY_DENOMINATOR).pow(U256::from(steps));
        self.base_emission * decay / scale
    }

    fn compounded_decay(&self, day: Day) -> Result<Amount> {
        let rate = EXA * DECAY_NUMERATOR / DECAY_DENOMINATOR;
        let offset = exa_pow(rate, DECAY_OFFSET_STEPS)?;
        let remaining = day - FLAT_EMISSION_LAST_DAY - DECAY_OFFSET_STEPS;
        let factor = exa_mul(offset, exa_pow(rate, remaining)?)?;
        exa_mul(self.base_emission, factor)
    }

    /// Sum of daily emissions over `from..=to`
    pub fn total_emitted(&self, from: Day, to: Day) -> Amount {
        (from..=to).fold(U256::zero(), |acc, day| acc + self.daily_distribution(day))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_flat_regime() {
        let schedule = EmissionSchedule::default();
        assert_eq!(schedule.daily_distribution(0), tokens(100_000));
        assert_eq!(schedule.daily_distribution(60), tokens(100_000));
    }

    #[test]
    fn test_initial_decay() {
        let schedule = EmissionSchedule::default();
        assert_eq!(schedule.daily_distribution(61), tokens(99_500));
        // 100,000 × 0.995² = 99,002.5
        assert_eq!(
            schedule.daily_distribution(62),
            tokens(99_002) + EXA / 2
        );
    }

    #[test]
    fn test_decay_continues_past_day_66() {
        let schedule = EmissionSchedule::default();
        let day_66 = schedule.daily_distribution(66);
        let day_67 = schedule.daily_distribution(67);
        assert!(day_67 < day_66);

        // one more 0.995 step, within fixed-point truncation
        let expected = day_66 * 995u64 / 1000u64;
        let diff = if expected > day_67 { expected - day_67 } else { day_67 - expected };
        assert!(diff < U256::from(10_000_000u64), "diff {}", diff);
    }

    #[test]
    fn test_floor_reached() {
        let schedule = EmissionSchedule::default();
        assert_eq!(schedule.daily_distribution(2_000), tokens(1_250));
        assert_eq!(schedule.daily_distribution(u64::MAX), tokens(1_250));
        assert!(schedule.daily_distribution(900) > tokens(1_250));
    }

    #[test]
    fn test_recomputation_is_bit_identical() {
        let schedule = EmissionSchedule::default();
        for day in [0, 61, 66, 67, 100, 500, 933, 934] {
            assert_eq!(schedule.daily_distribution(day), schedule.daily_distribution(day));
        }
    }

    #[test]
    fn test_total_emitted() {
        let schedule = EmissionSchedule::default();
        assert_eq!(schedule.total_emitted(0, 9), tokens(1_000_000));
        assert_eq!(
            schedule.total_emitted(60, 61),
            tokens(100_000) + tokens(99_500)
        );
    }

    proptest! {
        #[test]
        fn prop_never_below_floor(day in 0u64..5_000) {
            let schedule = EmissionSchedule::default();
            prop_assert!(schedule.daily_distribution(day) >= schedule.minimum_emission);
        }

        #[test]
        fn prop_non_increasing(day in 0u64..3_000) {
            let schedule = EmissionSchedule::default();
            prop_assert!(schedule.daily_distribution(day + 1) <= schedule.daily_distribution(day));
        }
    }
}
