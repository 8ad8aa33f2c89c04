//! CLI entry point for the equibasket rebalancer.
//!
//! Runs the configured fund against an in-memory constant-product market
//! seeded from the `[simulation]` section.

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use chrono::DateTime;
use clap::{Parser, Subcommand};

use equibasket_rebalancer::config::Config;
use equibasket_rebalancer::error::Error;
use equibasket_rebalancer::fund::RebalancePreview;
use equibasket_rebalancer::simulation::Simulation;
use equibasket_rebalancer::valuation::PortfolioSnapshot;
use equibasket_venue::Ledger;

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Equal-weight basket rebalancer over a simulated swap venue")]
#[command(version)]
struct Cli {
    /// Path to fund.toml
    #[arg(long, global = true, default_value = "fund.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Value the fund and show the planned trades without executing
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Execute rebalances on the simulated market
    Run {
        /// Number of consecutive rebalances
        #[arg(long, default_value_t = 1)]
        rounds: u32,
    },

    /// Load and validate the config only
    Validate,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<Error>() {
            Some(Error::RiskFailed(msg)) => {
                eprintln!("\nAborted: {msg}");
                process::exit(2);
            }
            _ => {
                eprintln!("Error: {e:#}");
                process::exit(1);
            }
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Command::Validate => {
            println!(
                "{}: fund {} holds {} quote assets against {}",
                cli.config.display(),
                config.fund.account,
                config.fund.quote_assets.len(),
                config.fund.base_asset,
            );
            Ok(())
        }
        Command::Plan { json } => {
            let sim = Simulation::from_config(&config)?;
            let preview = sim.fund.preview()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&preview)?);
            } else {
                display_clock(&sim);
                display_snapshot(&sim, &preview.snapshot);
                display_plan(&sim, &preview);
                print!("\n{}", preview.risk);
            }
            Ok(())
        }
        Command::Run { rounds } => {
            let sim = Simulation::from_config(&config)?;
            display_clock(&sim);
            for round in 1..=rounds {
                println!("\n=== Round {round}/{rounds} ===");
                let outcome = sim.fund.rebalance()?;
                print!("{}", outcome.execution);
                display_snapshot(&sim, &outcome.after);
                print!("\n{}", outcome.reconciliation);
            }
            Ok(())
        }
    }
}

// === Display helpers ===

fn display_clock(sim: &Simulation) {
    let now = sim.ledger.timestamp();
    match i64::try_from(now).ok().and_then(|t| DateTime::from_timestamp(t, 0)) {
        Some(at) => println!("Ledger time: {}", at.to_rfc3339()),
        None => println!("Ledger time: {now}"),
    }
}

fn display_snapshot(sim: &Simulation, snapshot: &PortfolioSnapshot) {
    let base = &snapshot.base.asset;
    println!("\nPORTFOLIO ({}):", sim.fund.account());
    for holding in std::iter::once(&snapshot.base).chain(&snapshot.quotes) {
        println!(
            "  {:8} {:>32}  = {:>20} {}",
            holding.asset,
            sim.format(&holding.asset, holding.amount),
            sim.format(base, holding.value),
            base,
        );
    }
    println!(
        "  {:8} {:>32}  = {:>20} {}",
        "TOTAL",
        "",
        sim.format(base, snapshot.total_value),
        base
    );
}

fn display_plan(sim: &Simulation, preview: &RebalancePreview) {
    let base = sim.fund.base_asset();
    println!(
        "\nPLANNED TRADES (tolerance {} {}):",
        sim.format(base, preview.tolerance),
        base
    );
    if preview.plan.is_empty() {
        println!("  none; portfolio within tolerance of target");
    }
    for (i, delta) in preview.plan.trades().enumerate() {
        println!(
            "  {:>3}  {:4} {:8} {:>20} {}",
            i + 1,
            delta.side,
            delta.asset,
            sim.format(base, delta.value),
            base,
        );
    }
    for delta in &preview.plan.dust {
        println!(
            "       dust {:8} {:>+20}",
            delta.asset,
            delta.signed_value()
        );
    }
}
