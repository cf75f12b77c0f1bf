//! Day-by-day simulation of a TOML scenario against in-memory collaborators

use anyhow::{anyhow, Context};
use rewards_core::{
    day_start, tokens, Address, Amount, Bps, CatchUp, Day, ManualClock, Result as RewardsResult,
    WEEK, EXA,
};
use rewards_engine::config::parse_address;
use rewards_engine::memory::{MemoryLock, MemoryProvider, MemoryToken};
use rewards_engine::{RewardsConfig, RewardsEngine};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Engine configuration plus the actions to replay
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(flatten)]
    pub rewards: RewardsConfig,

    #[serde(default)]
    pub simulation: SimulationSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Days to run after the setup actions
    #[serde(default = "default_days")]
    pub days: u64,

    /// Day the clock starts on
    #[serde(default)]
    pub start_day: Day,

    #[serde(default)]
    pub locks: Vec<LockAction>,

    #[serde(default)]
    pub deposits: Vec<DepositAction>,

    #[serde(default)]
    pub votes: Vec<VoteAction>,
}

fn default_days() -> u64 {
    30
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            days: default_days(),
            start_day: 0,
            locks: Vec::new(),
            deposits: Vec::new(),
            votes: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockAction {
    pub user: String,
    /// Whole tokens
    pub amount: u64,
    pub weeks: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DepositAction {
    pub user: String,
    pub source: String,
    /// Whole tokens
    pub amount: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoteAction {
    pub user: String,
    pub source: String,
    pub bps: Bps,
}

/// Simulation outcome, amounts in decimal tokens
#[derive(Clone, Debug, Serialize)]
pub struct SimulationReport {
    pub first_day: Day,
    pub platform_day: Day,
    pub minted: String,
    pub recipients: Vec<BalanceLine>,
    pub sources: Vec<SourceLine>,
    pub claims: Vec<BalanceLine>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BalanceLine {
    pub name: String,
    pub amount: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SourceLine {
    pub name: String,
    pub total_supply: String,
    pub working_supply: String,
    pub distributed: String,
}

/// `123.000000000000000000` style rendering of an 18-decimal amount
pub fn format_tokens(amount: Amount) -> String {
    format!("{}.{:018}", amount / EXA, (amount % EXA).low_u64())
}

/// Load a scenario file; `REWARDS_`-prefixed variables override it
/// (`REWARDS_ENGINE__BOOST_WEIGHT_BPS=2500`).
pub fn load(path: &Path) -> anyhow::Result<Scenario> {
    let name = path
        .to_str()
        .ok_or_else(|| anyhow!("non-UTF-8 scenario path {:?}", path))?;
    let settings = config::Config::builder()
        .add_source(config::File::new(name, config::FileFormat::Toml))
        .add_source(
            config::Environment::with_prefix("REWARDS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("reading scenario {:?}", path))?;
    let scenario: Scenario = settings.try_deserialize()?;
    scenario.rewards.validate()?;
    Ok(scenario)
}

/// Re-run a batch entry point until it reports completion
fn drain(mut step: impl FnMut() -> RewardsResult<CatchUp>) -> RewardsResult<u32> {
    let mut steps = 0;
    loop {
        let progress = step()?;
        steps += progress.steps;
        if progress.complete {
            return Ok(steps);
        }
    }
}

/// Engine after a run, alongside its report
pub struct Simulation {
    pub engine: RewardsEngine,
    pub report: SimulationReport,
}

pub fn run(scenario: &Scenario) -> anyhow::Result<Simulation> {
    let config = &scenario.rewards;
    let plan = &scenario.simulation;

    let clock = Arc::new(ManualClock::new(day_start(
        plan.start_day,
        config.engine.time_offset_us,
    )));
    let token = Arc::new(MemoryToken::new(
        &config.engine.reward_token,
        Address::from_label("rewards-engine"),
    ));
    let lock = Arc::new(MemoryLock::new());
    let provider = Arc::new(MemoryProvider::new());

    let mut engine = RewardsEngine::new(config, clock.clone(), token.clone(), lock.clone())?;
    engine.bootstrap_sources(config, provider.clone())?;
    let first_day = engine.platform_day();

    let now = engine.now();
    for action in &plan.locks {
        let user = Address::from_label(&action.user);
        lock.lock(&user, tokens(action.amount), now + action.weeks * WEEK, now);
    }

    let mut participants: Vec<String> = Vec::new();
    for action in &plan.deposits {
        let source = config
            .sources
            .iter()
            .find(|s| s.name == action.source)
            .ok_or_else(|| anyhow!("deposit into unknown source {}", action.source))?;
        let user = Address::from_label(&action.user);
        provider.set_balance(&source.name, &user, tokens(action.amount));
        engine.update_balance_and_supply(
            &parse_address(&source.contract),
            &source.name,
            &user,
            tokens(action.amount),
            provider.total_supply(&source.name),
        )?;
        if !participants.contains(&action.user) {
            participants.push(action.user.clone());
        }
    }

    for action in &plan.votes {
        engine
            .vote(&Address::from_label(&action.user), &action.source, action.bps)
            .with_context(|| format!("vote by {} on {}", action.user, action.source))?;
    }

    for _ in 0..plan.days {
        clock.advance_days(1);
        let days = drain(|| engine.distribute())?;
        tracing::debug!(days, platform_day = engine.platform_day(), "distributed");
    }
    drain(|| engine.checkpoint_gauges())?;
    for name in engine.source_names() {
        drain(|| engine.sync_data_source(&name))?;
    }

    let mut claims = Vec::new();
    for label in &participants {
        let receipt = engine.claim_all(&Address::from_label(label))?;
        claims.push(BalanceLine {
            name: label.clone(),
            amount: format_tokens(receipt.reward),
        });
    }

    let platform_day = engine.platform_day();
    let mut sources = Vec::new();
    for name in engine.source_names() {
        let snapshot = engine.source(&name)?;
        let mut distributed = Amount::zero();
        for day in first_day..platform_day {
            distributed = distributed + engine.total_distribution(&name, day)?;
        }
        sources.push(SourceLine {
            name,
            total_supply: format_tokens(snapshot.total_supply),
            working_supply: format_tokens(snapshot.working_supply),
            distributed: format_tokens(distributed),
        });
    }

    let recipients = engine
        .allocator()
        .base_recipients()
        .map(|r| BalanceLine {
            name: r.name.clone(),
            amount: format_tokens(token.balance_of(&r.address)),
        })
        .collect();

    let report = SimulationReport {
        first_day,
        platform_day,
        minted: format_tokens(token.total_minted()),
        recipients,
        sources,
        claims,
    };
    Ok(Simulation { engine, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCENARIO: &str = r#"
        [engine]
        owner = "dao"

        [[distribution.base]]
        name = "Reserve"
        address = "reserve"
        bps = 2000

        [[distribution.fixed]]
        source = "Loans"
        bps = 3000

        [[sources]]
        name = "Loans"
        contract = "loans"

        [[sources]]
        name = "Pool"
        contract = "pool"

        [simulation]
        days = 14
        start_day = 700

        [[simulation.locks]]
        user = "voter"
        amount = 1000
        weeks = 20

        [[simulation.deposits]]
        user = "alice"
        source = "Loans"
        amount = 100

        [[simulation.deposits]]
        user = "bob"
        source = "Pool"
        amount = 50

        [[simulation.votes]]
        user = "voter"
        source = "Pool"
        bps = 10000
    "#;

    fn scenario_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_format_tokens() {
        assert_eq!(format_tokens(tokens(12)), "12.000000000000000000");
        assert_eq!(format_tokens(EXA / 4), "0.250000000000000000");
    }

    #[test]
    fn test_load_and_run() {
        let file = scenario_file(SCENARIO);
        let scenario = load(file.path()).unwrap();
        assert_eq!(scenario.simulation.days, 14);
        assert_eq!(scenario.rewards.sources.len(), 2);

        let simulation = run(&scenario).unwrap();
        let report = &simulation.report;
        assert_eq!(report.first_day, 700);
        assert_eq!(report.platform_day, 715);

        let schedule = simulation.engine.allocator().schedule();
        assert_eq!(report.minted, format_tokens(schedule.total_emitted(700, 714)));
        assert_eq!(report.claims.len(), 2);
        assert!(report.claims.iter().all(|c| c.amount != format_tokens(Amount::zero())));
        assert_eq!(report.recipients[0].name, "Reserve");
    }

    #[test]
    fn test_unknown_source_in_deposit_fails() {
        let mut scenario = Scenario::default();
        scenario.simulation.deposits.push(DepositAction {
            user: "alice".into(),
            source: "Missing".into(),
            amount: 1,
        });
        assert!(run(&scenario).is_err());
    }

    #[test]
    fn test_invalid_scenario_rejected() {
        let file = scenario_file("[engine]\nboost_weight_bps = 50\n");
        assert!(load(file.path()).is_err());
    }
}
