//! Engine configuration types

use crate::constants::*;
use rewards_core::{tokens, Address, Bps, Day, Result, RewardsError, Timestamp, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Complete engine configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Engine parameters
    #[serde(default)]
    pub engine: EngineSettings,

    /// Base recipients and fixed source shares
    #[serde(default)]
    pub distribution: DistributionSettings,

    /// Gauge types, registered in order (index = type id)
    #[serde(default = "default_gauge_types")]
    pub gauge_types: Vec<GaugeTypeConfig>,

    /// Data sources registered at startup
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            distribution: DistributionSettings::default(),
            gauge_types: default_gauge_types(),
            sources: Vec::new(),
        }
    }
}

/// Core engine parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Owner label or 64-character hex address
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Governance-lock contract allowed to send lock updates
    #[serde(default = "default_lock_contract")]
    pub lock_contract: String,

    /// Day-zero anchor in microseconds
    #[serde(default)]
    pub time_offset_us: Timestamp,

    /// First day to distribute; defaults to the day of construction
    #[serde(default)]
    pub start_day: Option<Day>,

    /// Maximum catch-up steps per call
    #[serde(default = "default_catch_up_limit")]
    pub catch_up_limit: u32,

    /// Days between two votes on the same gauge
    #[serde(default = "default_vote_cooldown_days")]
    pub vote_cooldown_days: u64,

    /// Boost weight, (100, 10000] bps
    #[serde(default = "default_boost_weight")]
    pub boost_weight_bps: Bps,

    /// Ledger symbol of the protocol reward token
    #[serde(default = "default_reward_token")]
    pub reward_token: String,

    /// Whole tokens emitted per day before decay
    #[serde(default = "default_base_daily_tokens")]
    pub base_daily_tokens: u64,

    /// Whole-token daily floor
    #[serde(default = "default_min_daily_tokens")]
    pub min_daily_tokens: u64,
}

fn default_owner() -> String {
    "governance".to_string()
}

fn default_lock_contract() -> String {
    "governance-lock".to_string()
}

fn default_catch_up_limit() -> u32 {
    CATCH_UP_LIMIT
}

fn default_vote_cooldown_days() -> u64 {
    10
}

fn default_boost_weight() -> Bps {
    DEFAULT_BOOST_WEIGHT_BPS
}

fn default_reward_token() -> String {
    DEFAULT_REWARD_TOKEN.to_string()
}

fn default_base_daily_tokens() -> u64 {
    BASE_DAILY_TOKENS
}

fn default_min_daily_tokens() -> u64 {
    MIN_DAILY_TOKENS
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            lock_contract: default_lock_contract(),
            time_offset_us: 0,
            start_day: None,
            catch_up_limit: default_catch_up_limit(),
            vote_cooldown_days: default_vote_cooldown_days(),
            boost_weight_bps: default_boost_weight(),
            reward_token: default_reward_token(),
            base_daily_tokens: default_base_daily_tokens(),
            min_daily_tokens: default_min_daily_tokens(),
        }
    }
}

/// Distribution percentages
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSettings {
    #[serde(default)]
    pub base: Vec<BaseRecipientConfig>,

    #[serde(default)]
    pub fixed: Vec<FixedShareConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRecipientConfig {
    pub name: String,
    /// Label or hex address
    pub address: String,
    pub bps: Bps,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedShareConfig {
    pub source: String,
    pub bps: Bps,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeTypeConfig {
    pub name: String,
    /// Type weight, 10000 = 1.0
    #[serde(default = "default_type_weight")]
    pub weight_bps: Bps,
}

fn default_type_weight() -> Bps {
    BPS_DENOMINATOR
}

fn default_gauge_types() -> Vec<GaugeTypeConfig> {
    vec![GaugeTypeConfig {
        name: "Liquidity".to_string(),
        weight_bps: default_type_weight(),
    }]
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Contract label or hex address allowed to report balances
    pub contract: String,
    #[serde(default)]
    pub type_id: u32,
    /// Attach a gauge on startup
    #[serde(default = "default_true")]
    pub votable: bool,
    /// Initial fixed gauge weight, whole tokens
    #[serde(default)]
    pub gauge_weight: u64,
}

fn default_true() -> bool {
    true
}

/// Hex address when `value` parses as one, else the label-derived address
pub fn parse_address(value: &str) -> Address {
    value
        .parse::<Address>()
        .unwrap_or_else(|_| Address::from_label(value))
}

impl RewardsConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).map_err(|e| RewardsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RewardsError::Config(e.to_string()))
    }

    pub fn owner_address(&self) -> Address {
        parse_address(&self.engine.owner)
    }

    pub fn lock_address(&self) -> Address {
        parse_address(&self.engine.lock_contract)
    }

    pub fn vote_cooldown(&self) -> Timestamp {
        self.engine.vote_cooldown_days * rewards_core::MICROSECONDS_IN_A_DAY
    }

    pub fn base_emission(&self) -> rewards_core::Amount {
        tokens(self.engine.base_daily_tokens)
    }

    pub fn minimum_emission(&self) -> rewards_core::Amount {
        tokens(self.engine.min_daily_tokens)
    }

    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if engine.boost_weight_bps <= MIN_BOOST_WEIGHT_BPS || engine.boost_weight_bps > BPS_DENOMINATOR {
            return Err(RewardsError::Config(format!(
                "boost_weight_bps must be in ({}, {}], got {}",
                MIN_BOOST_WEIGHT_BPS, BPS_DENOMINATOR, engine.boost_weight_bps
            )));
        }
        if engine.catch_up_limit == 0 {
            return Err(RewardsError::Config("catch_up_limit must be positive".into()));
        }
        if engine.min_daily_tokens > engine.base_daily_tokens {
            return Err(RewardsError::Config(
                "min_daily_tokens exceeds base_daily_tokens".into(),
            ));
        }
        if engine.reward_token.is_empty() {
            return Err(RewardsError::Config("reward_token is empty".into()));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(RewardsError::Config(format!("duplicate source {}", source.name)));
            }
            if source.type_id as usize >= self.gauge_types.len() {
                return Err(RewardsError::Config(format!(
                    "source {} references unknown gauge type {}",
                    source.name, source.type_id
                )));
            }
        }
        for fixed in &self.distribution.fixed {
            if !names.contains(fixed.source.as_str()) {
                return Err(RewardsError::Config(format!(
                    "fixed share for unknown source {}",
                    fixed.source
                )));
            }
        }

        let total: u64 = self
            .distribution
            .base
            .iter()
            .map(|r| r.bps as u64)
            .chain(self.distribution.fixed.iter().map(|f| f.bps as u64))
            .sum();
        if total > BPS_DENOMINATOR as u64 {
            return Err(RewardsError::PercentageOverflow { total });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RewardsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.catch_up_limit, 500);
        assert_eq!(config.vote_cooldown(), VOTE_COOLDOWN);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = RewardsConfig::from_toml_str("").unwrap();
        assert_eq!(config.engine.boost_weight_bps, 4_000);
        assert_eq!(config.gauge_types.len(), 1);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_parse_scenario() {
        let config = RewardsConfig::from_toml_str(
            r#"
            [engine]
            owner = "dao"
            boost_weight_bps = 2500

            [[distribution.base]]
            name = "Reserve"
            address = "reserve-fund"
            bps = 1000

            [[distribution.fixed]]
            source = "Loans"
            bps = 2000

            [[sources]]
            name = "Loans"
            contract = "loans"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.boost_weight_bps, 2_500);
        assert_eq!(config.owner_address(), Address::from_label("dao"));
        assert!(config.sources[0].votable);
        assert_eq!(config.distribution.base[0].bps, 1_000);
    }

    #[test]
    fn test_rejects_overallocation() {
        let mut config = RewardsConfig::default();
        config.sources.push(SourceConfig {
            name: "Loans".into(),
            contract: "loans".into(),
            type_id: 0,
            votable: true,
            gauge_weight: 0,
        });
        config.distribution.fixed.push(FixedShareConfig {
            source: "Loans".into(),
            bps: 6_000,
        });
        config.distribution.base.push(BaseRecipientConfig {
            name: "DAO".into(),
            address: "dao".into(),
            bps: 4_001,
        });
        assert_eq!(
            config.validate(),
            Err(RewardsError::PercentageOverflow { total: 10_001 })
        );
    }

    #[test]
    fn test_rejects_bad_references() {
        let mut config = RewardsConfig::default();
        config.distribution.fixed.push(FixedShareConfig {
            source: "Missing".into(),
            bps: 1,
        });
        assert!(matches!(config.validate(), Err(RewardsError::Config(_))));

        let mut config = RewardsConfig::default();
        config.engine.boost_weight_bps = 100;
        assert!(matches!(config.validate(), Err(RewardsError::Config(_))));
    }

    #[test]
    fn test_parse_address_accepts_hex_and_labels() {
        let hex = Address::from_label("x").to_hex();
        assert_eq!(parse_address(&hex), Address::from_label("x"));
        assert_eq!(parse_address(&format!("0x{}", hex)), Address::from_label("x"));
        assert_eq!(parse_address("x"), Address::from_label("x"));
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let config = RewardsConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(RewardsConfig::from_toml_str(&text).unwrap(), config);
    }
}
