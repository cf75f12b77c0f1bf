//! Rewards CLI
//!
//! Inspect the emission schedule, dump the default configuration and run
//! scenarios against an in-memory engine.

mod scenario;

use clap::{Parser, Subcommand};
use rewards_core::Day;
use rewards_engine::{EmissionSchedule, RewardsConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rewards")]
#[command(version)]
#[command(about = "Reward emission, gauge voting and boosted accrual engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print daily emissions over a range of days
    Schedule {
        /// First day
        #[arg(long, default_value = "0")]
        from: Day,

        /// Last day, inclusive
        #[arg(long, default_value = "70")]
        to: Day,

        /// Configuration whose emission parameters to use
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default configuration as TOML
    Config,

    /// Run a scenario day by day and print the outcome
    Simulate {
        /// Scenario file (engine configuration plus a [simulation] table)
        #[arg(short, long, default_value = "scenario.toml")]
        scenario: PathBuf,

        /// Also print metrics in Prometheus text format
        #[arg(long)]
        metrics: bool,
    },
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Schedule { from, to, config } => {
            anyhow::ensure!(from <= to, "--from {} is after --to {}", from, to);
            let config = match config {
                Some(path) => scenario::load(&path)?.rewards,
                None => RewardsConfig::default(),
            };
            let schedule = EmissionSchedule::new(config.base_emission(), config.minimum_emission());

            println!("{:>8}  {:>32}", "day", "emission");
            for day in from..=to {
                println!(
                    "{:>8}  {:>32}",
                    day,
                    scenario::format_tokens(schedule.daily_distribution(day))
                );
            }
            println!(
                "{:>8}  {:>32}",
                "total",
                scenario::format_tokens(schedule.total_emitted(from, to))
            );
        }

        Commands::Config => {
            print!("{}", RewardsConfig::default().to_toml_string()?);
        }

        Commands::Simulate { scenario: path, metrics } => {
            let scenario = scenario::load(&path)?;
            tracing::info!(
                scenario = ?path,
                days = scenario.simulation.days,
                sources = scenario.rewards.sources.len(),
                "running simulation"
            );

            let simulation = scenario::run(&scenario)?;
            println!("{}", serde_json::to_string_pretty(&simulation.report)?);
            if metrics {
                print!("{}", simulation.engine.metrics().encode()?);
            }
        }
    }

    Ok(())
}
