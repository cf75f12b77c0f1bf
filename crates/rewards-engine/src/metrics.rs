//! Prometheus metrics for the engine

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Engine counters, updated after each committed call
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Registry,
    days_distributed: IntCounter,
    claims: IntCounter,
    votes: IntCounter,
    platform_day: IntGauge,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let days_distributed = IntCounter::new(
            "rewards_days_distributed_total",
            "Emission days minted and allocated",
        )?;
        let claims = IntCounter::new("rewards_claims_total", "Non-empty reward claims paid")?;
        let votes = IntCounter::new("rewards_votes_total", "Gauge votes recorded")?;
        let platform_day = IntGauge::new("rewards_platform_day", "Next day to distribute")?;

        registry.register(Box::new(days_distributed.clone()))?;
        registry.register(Box::new(claims.clone()))?;
        registry.register(Box::new(votes.clone()))?;
        registry.register(Box::new(platform_day.clone()))?;

        Ok(Self {
            registry,
            days_distributed,
            claims,
            votes,
            platform_day,
        })
    }

    pub fn record_days(&self, days: u32) {
        self.days_distributed.inc_by(days as u64);
    }

    pub fn record_claim(&self) {
        self.claims.inc();
    }

    pub fn record_vote(&self) {
        self.votes.inc();
    }

    pub fn set_platform_day(&self, day: u64) {
        self.platform_day.set(day.min(i64::MAX as u64) as i64);
    }

    pub fn days_distributed(&self) -> u64 {
        self.days_distributed.get()
    }

    pub fn claims(&self) -> u64 {
        self.claims.get()
    }

    pub fn votes(&self) -> u64 {
        self.votes.get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every registered metric
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics")
            .field("days_distributed", &self.days_distributed())
            .field("claims", &self.claims())
            .field("votes", &self.votes())
            .finish()
    }
}
