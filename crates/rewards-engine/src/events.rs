//! Events emitted for external indexers
//!
//! Raised events are buffered per transaction and only become visible when
//! the call commits.

use rewards_core::{Address, Amount, Bps, Day, Timestamp, TokenId};
use serde::{Deserialize, Serialize};

/// Indexer-facing event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum RewardsEvent {
    /// Protocol-token rewards paid to `address`
    RewardsClaimed { address: Address, amount: Amount },

    /// External reward token paid to `address`
    ExternalRewardsClaimed {
        address: Address,
        token: TokenId,
        amount: Amount,
    },

    /// Reward credited to `user` from `source`
    RewardsAccrued {
        user: Address,
        source: String,
        amount: Amount,
    },

    /// One line of a day's distribution waterfall
    Report {
        day: Day,
        name: String,
        dist: Amount,
        value: Amount,
    },

    VoteForGauge {
        time: Timestamp,
        user: Address,
        gauge: String,
        weight: Bps,
    },

    NewGauge {
        gauge: String,
        type_id: u32,
        weight: Amount,
    },

    NewGaugeWeight {
        gauge: String,
        time: Timestamp,
        weight: Amount,
        total_weight: Amount,
    },

    AddType { name: String, type_id: u32 },

    NewTypeWeight {
        type_id: u32,
        time: Timestamp,
        weight: Amount,
        total_weight: Amount,
    },

    DataSourceCreated {
        name: String,
        contract: Address,
        type_id: u32,
    },

    /// Transfer that failed after the call committed; the amount is back in the ledger
    PaymentFailed {
        address: Address,
        token: TokenId,
        amount: Amount,
    },
}

/// Ordered event buffer
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<RewardsEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: RewardsEvent) {
        tracing::debug!(?event, "event");
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<RewardsEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[RewardsEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewards_core::tokens;

    #[test]
    fn test_drain_empties_log() {
        let mut log = EventLog::new();
        log.emit(RewardsEvent::AddType {
            name: "Liquidity".into(),
            type_id: 0,
        });
        assert_eq!(log.len(), 1);
        let drained = log.drain();
        assert_eq!(drained.len(), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = RewardsEvent::RewardsClaimed {
            address: Address::from_label("alice"),
            amount: tokens(1),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "RewardsClaimed");
    }
}
