//! Core type definitions for the reward engine
//!
//! Identifiers, time units and the bounded catch-up result shared by every
//! component of the emission pipeline.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Microsecond timestamp (block time)
pub type Timestamp = u64;

/// Epoch day index
pub type Day = u64;

/// Basis points (10_000 = 100%)
pub type Bps = u32;

/// Microseconds in one day
pub const MICROSECONDS_IN_A_DAY: Timestamp = 86_400 * 1_000_000;

/// Microseconds in one gauge week
pub const WEEK: Timestamp = 7 * MICROSECONDS_IN_A_DAY;

/// 100% in basis points
pub const BPS_DENOMINATOR: Bps = 10_000;

/// Address - canonical participant identifier
///
/// Users, data-source contracts, distribution recipients and collaborator
/// contracts all share this one 32-byte identifier type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address {
    id: [u8; 32],
}

impl Address {
    pub fn new(id: [u8; 32]) -> Self {
        Self { id }
    }

    /// Deterministic address for a human-readable label (BLAKE3 of the label)
    pub fn from_label(label: &str) -> Self {
        let hash = blake3::hash(label.as_bytes());
        Self {
            id: *hash.as_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.id
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// Parse from a 64 character hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&bytes);
        Ok(Self { id })
    }

    pub const ZERO: Self = Self { id: [0u8; 32] };
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s.trim_start_matches("0x"))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}

/// Token symbol used as a key in ledgers and reward-token lists
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self.0)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TokenId {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}

/// Day index for a timestamp relative to the day-zero anchor.
///
/// Timestamps before the anchor map to day 0.
pub fn day_of(timestamp: Timestamp, offset: Timestamp) -> Day {
    timestamp.saturating_sub(offset) / MICROSECONDS_IN_A_DAY
}

/// First microsecond of `day`
pub fn day_start(day: Day, offset: Timestamp) -> Timestamp {
    offset + day * MICROSECONDS_IN_A_DAY
}

/// Floor a timestamp to its gauge week boundary
pub fn week_floor(timestamp: Timestamp) -> Timestamp {
    timestamp / WEEK * WEEK
}

/// First week boundary strictly after `timestamp`
pub fn next_week(timestamp: Timestamp) -> Timestamp {
    (timestamp + WEEK) / WEEK * WEEK
}

/// Outcome of a bounded catch-up loop
///
/// Catch-up loops advance at most a fixed number of steps per call. When
/// `complete` is false the caller re-invokes the entry point to continue;
/// the steps already taken are kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchUp {
    /// Steps advanced by this call
    pub steps: u32,
    /// Whether the cursor reached its target
    pub complete: bool,
}

impl CatchUp {
    pub fn complete(steps: u32) -> Self {
        Self {
            steps,
            complete: true,
        }
    }

    pub fn partial(steps: u32) -> Self {
        Self {
            steps,
            complete: false,
        }
    }

    /// Combine two loops run in the same call
    pub fn merge(self, other: CatchUp) -> CatchUp {
        CatchUp {
            steps: self.steps + other.steps,
            complete: self.complete && other.complete,
        }
    }
}
