//! # Rewards Engine - Emission, Gauges & Boosted Accrual
//!
//! Mints the protocol reward token on a fixed decay schedule, splits each
//! day's emission between fixed recipients and a votable pool, weights the
//! votable pool across data sources with a vote-escrowed gauge controller,
//! and accrues every participant's time-weighted, boosted share lazily.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────────┐   ┌───────────────────────┐   ┌──────────────────┐
//! │ EmissionSchedule │──►│ DistributionAllocator │──►│ votable pool/day │
//! └──────────────────┘   │  base → fixed → rest  │   └────────┬─────────┘
//!                        └───────────────────────┘            │ × relative weight
//!                                                    ┌────────▼─────────┐
//!   ┌──────────────┐    working balances             │ GaugeController  │
//!   │ BoostEngine  │───────────────┐                 └────────┬─────────┘
//!   └──────────────┘               ▼                          │
//!                        ┌───────────────────┐    per-day     │
//!                        │ DataSource ledger │◄───────────────┘
//!                        │ weight accumulator│
//!                        └─────────┬─────────┘
//!                                  ▼
//!                        ┌───────────────────┐
//!                        │  RewardsLedger    │──► claim / transfer
//!                        └───────────────────┘
//! ```
//!
//! ## Emission Schedule
//!
//! | Days | Daily Emission |
//! |------|----------------|
//! | 0-60 | 100,000 tokens |
//! | 61-66 | 100,000 × 0.995^(day-60) |
//! | 67+ | compounded 0.995 decay |
//! | floor | 1,250 tokens |

pub mod allocator;
pub mod boost;
pub mod collaborators;
pub mod config;
pub mod data_source;
pub mod emission;
pub mod engine;
pub mod events;
pub mod gauge;
pub mod ledger;
pub mod memory;
pub mod metrics;

// Re-exports
pub use allocator::{BaseRecipient, DistributionAllocator};
pub use boost::{BoostEngine, BoostInputs};
pub use collaborators::{BalanceAndSupply, DataProvider, GovernanceLock, MintableToken, RewardToken};
pub use config::RewardsConfig;
pub use data_source::{BoostData, DataSource, DataSourceRegistry, EmissionFeed, SourceSnapshot};
pub use emission::EmissionSchedule;
pub use engine::{ClaimReceipt, RewardsEngine};
pub use events::{EventLog, RewardsEvent};
pub use gauge::{GaugeController, Point, VotedSlope};
pub use ledger::RewardsLedger;
pub use metrics::EngineMetrics;

/// Protocol constants
pub mod constants {
    use rewards_core::{Bps, Timestamp, MICROSECONDS_IN_A_DAY};

    /// Whole-token base emission per day
    pub const BASE_DAILY_TOKENS: u64 = 100_000;

    /// Whole-token emission floor per day
    pub const MIN_DAILY_TOKENS: u64 = 1_250;

    /// Last day of flat emission
    pub const FLAT_EMISSION_LAST_DAY: u64 = 60;

    /// Last day of the initial decay regime
    pub const INITIAL_DECAY_LAST_DAY: u64 = 66;

    /// Daily decay as numerator / denominator (0.995)
    pub const DECAY_NUMERATOR: u64 = 995;
    pub const DECAY_DENOMINATOR: u64 = 1_000;

    /// Decay steps pre-compounded before the long-run exponent loop
    pub const DECAY_OFFSET_STEPS: u64 = 5;

    /// Maximum steps of any catch-up loop per call
    pub const CATCH_UP_LIMIT: u32 = 500;

    /// Minimum gap between two votes on the same gauge
    pub const VOTE_COOLDOWN: Timestamp = 10 * MICROSECONDS_IN_A_DAY;

    /// Full voting power in basis points
    pub const MAX_VOTE_WEIGHT: Bps = 10_000;

    /// Default boost weight (40%)
    pub const DEFAULT_BOOST_WEIGHT_BPS: Bps = 4_000;

    /// Lower (exclusive) bound of the boost weight (1%)
    pub const MIN_BOOST_WEIGHT_BPS: Bps = 100;

    /// Ledger key of the protocol reward token
    pub const DEFAULT_REWARD_TOKEN: &str = "RWD";
}

pub use constants::*;

#[cfg(test)]
mod tests {
    use super::*;
    use rewards_core::WEEK;

    #[test]
    fn test_emission_regime_bounds() {
        assert!(FLAT_EMISSION_LAST_DAY < INITIAL_DECAY_LAST_DAY);
        assert_eq!(INITIAL_DECAY_LAST_DAY - FLAT_EMISSION_LAST_DAY, DECAY_OFFSET_STEPS + 1);
    }

    #[test]
    fn test_cooldown_longer_than_week() {
        assert!(VOTE_COOLDOWN > WEEK);
    }
}
