//! # Rewards Core
//!
//! Shared building blocks for the reward emission engine:
//! - `Address` / `TokenId` - participant and token identifiers
//! - `Timestamp`, `Day`, week helpers - microsecond block time
//! - `Amount` and 18-decimal fixed-point math on 256-bit integers
//! - `Clock` - injected block-time source
//! - `RewardsError` - the error taxonomy shared by every component

pub mod clock;
pub mod error;
pub mod math;
pub mod types;

pub use clock::*;
pub use error::*;
pub use math::*;
pub use types::*;

pub use primitive_types::U256;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::error::{CollaboratorError, Result, RewardsError};
    pub use crate::math::{mul_div, tokens, Amount, EXA};
    pub use crate::types::*;
    pub use primitive_types::U256;
}
