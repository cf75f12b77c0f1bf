//! Error types for reward engine operations

use crate::types::{Address, Bps, Timestamp};
use thiserror::Error;

/// Result type alias for reward engine operations
pub type Result<T> = std::result::Result<T, RewardsError>;

/// Failure reported by an external collaborator contract
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The call reverted or the collaborator rejected it
    #[error("call to {target} failed: {reason}")]
    CallFailed { target: String, reason: String },

    /// The collaborator does not know the requested entity
    #[error("{target} has no record of {entity}")]
    NotFound { target: String, entity: String },
}

impl CollaboratorError {
    pub fn call_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CallFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur in reward engine operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewardsError {
    // === Invariant violations ===
    /// Base plus fixed percentages would exceed 100%
    #[error("Distribution percentages exceed 100%: {total} bps")]
    PercentageOverflow { total: u64 },

    /// Vote weight outside [0, 10000]
    #[error("Vote weight {weight} outside [0, 10000]")]
    InvalidVoteWeight { weight: Bps },

    /// Cumulative voting power over 100%
    #[error("Used too much power: {used} bps")]
    VotingPowerExceeded { used: i64 },

    /// Voting on the same gauge inside the cooldown window
    #[error("Cannot vote so often, next vote allowed at {next_allowed}")]
    VoteTooSoon { next_allowed: Timestamp },

    /// Governance lock ends before the next gauge week
    #[error("Token lock expires too soon: ends {lock_end}, next week {next_time}")]
    LockExpiresTooSoon {
        lock_end: Timestamp,
        next_time: Timestamp,
    },

    /// Boost weight outside (1%, 100%]
    #[error("Boost weight out of bounds: {weight}")]
    InvalidBoostWeight { weight: String },

    /// Data source name already registered
    #[error("Data source already exists: {0}")]
    DataSourceExists(String),

    /// Data source name not registered
    #[error("Data source not found: {0}")]
    DataSourceNotFound(String),

    /// Data source has no gauge
    #[error("Data source is not votable: {0}")]
    GaugeNotVotable(String),

    /// Data source was disabled by governance
    #[error("Data source is disabled: {0}")]
    DataSourceDisabled(String),

    /// Gauge type id not registered
    #[error("Gauge type not found: {0}")]
    GaugeTypeNotFound(u32),

    /// Gauge already added for the data source
    #[error("Gauge already added: {0}")]
    GaugeAlreadyAdded(String),

    /// Reward token not registered with the engine
    #[error("Unknown reward token: {0}")]
    UnknownToken(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // === Authorization ===
    /// Caller lacks the role required for the action
    #[error("Unauthorized: {caller} may not {action}")]
    Unauthorized { caller: Address, action: String },

    // === Collaborators ===
    /// Fund-moving or balance-reporting collaborator failed
    #[error("Collaborator failure: {0}")]
    Collaborator(#[from] CollaboratorError),

    // === Resource bounds ===
    /// A bounded catch-up did not finish; run the batch entry point first
    #[error("Catch-up required before this operation: {what}")]
    CatchUpRequired { what: String },

    // === Arithmetic ===
    /// Value does not fit 256 bits
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RewardsError {
    /// Stable numeric code for indexers and API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::PercentageOverflow { .. } => 2001,
            Self::InvalidVoteWeight { .. } | Self::VotingPowerExceeded { .. } => 2002,
            Self::VoteTooSoon { .. } => 2003,
            Self::LockExpiresTooSoon { .. } => 2004,
            Self::InvalidBoostWeight { .. } => 2005,
            Self::DataSourceExists(_) | Self::DataSourceNotFound(_) => 2006,
            Self::GaugeNotVotable(_)
            | Self::DataSourceDisabled(_)
            | Self::GaugeTypeNotFound(_)
            | Self::GaugeAlreadyAdded(_) => 2007,
            Self::Unauthorized { .. } => 3001,
            Self::Collaborator(_) => 4001,
            Self::CatchUpRequired { .. } => 5001,
            _ => 9999,
        }
    }

    /// Errors the caller can clear by re-issuing the call later
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::VoteTooSoon { .. } | Self::CatchUpRequired { .. } | Self::Collaborator(_)
        )
    }

    pub fn unauthorized(caller: Address, action: impl Into<String>) -> Self {
        Self::Unauthorized {
            caller,
            action: action.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = RewardsError::PercentageOverflow { total: 10_001 };
        assert_eq!(err.code(), 2001);

        let err = RewardsError::unauthorized(Address::ZERO, "set boost weight");
        assert_eq!(err.code(), 3001);
    }

    #[test]
    fn test_error_display() {
        let err = RewardsError::DataSourceNotFound("sICX/bnUSD".to_string());
        assert!(format!("{}", err).contains("Data source not found"));

        let err: RewardsError = CollaboratorError::call_failed("token", "insufficient balance").into();
        assert!(format!("{}", err).contains("insufficient balance"));
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(RewardsError::CatchUpRequired {
            what: "distribution".into()
        }
        .is_recoverable());
        assert!(!RewardsError::InvalidVoteWeight { weight: 10_001 }.is_recoverable());
    }
}
