use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use mission_sim::activities::HandlerRegistry;
use mission_sim::engine::{OutcomeStatus, SimResults};
use mission_sim::orbits::Tle;
use mission_sim::{Fidelity, SimulationEngine, load_scenario};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Spacecraft mission operations simulator")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate a scenario file and print the run summary
    Run {
        /// Scenario file (YAML, TOML, or JSON)
        scenario: PathBuf,

        /// Directory for run_manifest.json, summary.json, events.json and the tables
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Override the scenario fidelity
        #[arg(long, value_enum)]
        fidelity: Option<FidelityArg>,

        /// Override the scenario random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Memoize propagation results
        #[arg(long, default_value_t = false)]
        cache: bool,

        /// Print the summary as JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Load and validate a scenario without running it
    Check {
        /// Scenario file (YAML, TOML, or JSON)
        scenario: PathBuf,
    },
    /// Print a synthetic near-circular TLE
    Tle {
        #[arg(long)]
        altitude_km: f64,

        #[arg(long)]
        inclination_deg: f64,

        /// Element epoch (RFC 3339), defaults to now
        #[arg(long)]
        epoch: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 99_999)]
        catalog_number: u32,
    },
}

#[derive(Copy, Clone, ValueEnum, Debug)]
enum FidelityArg {
    Low,
    Medium,
    High,
}

impl From<FidelityArg> for Fidelity {
    fn from(arg: FidelityArg) -> Self {
        match arg {
            FidelityArg::Low => Fidelity::Low,
            FidelityArg::Medium => Fidelity::Medium,
            FidelityArg::High => Fidelity::High,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run {
            scenario,
            output_dir,
            fidelity,
            seed,
            cache,
            json,
        } => {
            let mut loaded = load_scenario(&scenario)
                .with_context(|| format!("loading scenario {}", scenario.display()))?;
            if let Some(dir) = output_dir {
                loaded.config.output_dir = Some(dir);
            }
            if let Some(fidelity) = fidelity {
                loaded.fidelity = fidelity.into();
            }
            if let Some(seed) = seed {
                loaded.config.random_seed = seed;
            }
            loaded.config.enable_cache |= cache;
            tracing::info!(
                scenario = %scenario.display(),
                fidelity = %loaded.fidelity,
                seed = loaded.config.random_seed,
                "starting run"
            );

            let initial = loaded.initial_state()?;
            let results = SimulationEngine::new()
                .simulate(&loaded.plan, &initial, loaded.fidelity, &loaded.config)
                .context("simulation rejected the scenario")?;
            if json {
                println!("{}", results.summary_json()?);
            } else {
                print_summary(&results);
            }
        }
        Command::Check { scenario } => {
            let loaded = load_scenario(&scenario)
                .with_context(|| format!("loading scenario {}", scenario.display()))?;
            loaded.initial_state()?;
            let registry = HandlerRegistry::with_default_handlers();
            let unknown: Vec<_> = loaded
                .plan
                .activities
                .iter()
                .filter(|a| !registry.contains(&a.activity_type))
                .map(|a| format!("{} ({})", a.activity_id, a.activity_type))
                .collect();
            println!(
                "Scenario OK: plan {} with {} activities, fidelity {}",
                loaded.plan.plan_id,
                loaded.plan.activities.len(),
                loaded.fidelity
            );
            if !unknown.is_empty() {
                println!("Unknown activity types: {}", unknown.join(", "));
            }
        }
        Command::Tle {
            altitude_km,
            inclination_deg,
            epoch,
            catalog_number,
        } => {
            anyhow::ensure!(altitude_km > 0.0, "altitude must be positive");
            let tle = Tle::synthetic(
                altitude_km,
                inclination_deg,
                epoch.unwrap_or_else(Utc::now),
                catalog_number,
            );
            println!("{}", tle.line1);
            println!("{}", tle.line2);
        }
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(results: &SimResults) {
    let manifest = &results.manifest;
    let summary = &results.summary;
    let state = &summary.state_changes;

    println!("=== Simulation Summary ===");
    println!("Run            : {}", manifest.run_id);
    println!(
        "Plan           : {} ({}, {:.2} h, {})",
        manifest.plan_id, manifest.spacecraft_id, manifest.duration_hours, manifest.fidelity
    );
    println!(
        "Activities     : {}/{} successful",
        summary.activities.successful, summary.activities.total
    );
    println!(
        "Events         : {} info, {} warnings, {} violations, {} errors",
        summary.events.info,
        summary.events.warnings,
        summary.events.violations,
        summary.events.errors
    );
    println!(
        "Resources      : propellant used = {:.3} kg, SOC {:.3} -> {:.3}, storage = {:.3} GB",
        state.propellant_used_kg, state.initial_soc, state.final_soc, state.final_storage_gb
    );
    if let Some(orbit) = &summary.orbit {
        println!(
            "Orbit          : {:.2} km -> {:.2} km ({:+.2} km)",
            orbit.initial_altitude_km, orbit.final_altitude_km, orbit.altitude_change_km
        );
    }
    for outcome in &results.outcomes {
        let status = match outcome.status {
            OutcomeStatus::Completed => "completed",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Invalid => "invalid",
            OutcomeStatus::Unknown => "unknown type",
            OutcomeStatus::Error => "error",
        };
        println!(
            "  {:<24} {:<20} {}",
            outcome.activity_id, outcome.activity_type, status
        );
    }
    for path in &results.output_files {
        println!("Wrote {}", path.display());
    }
    if let Some(err) = &summary.export_error {
        eprintln!("Warning: outputs not written: {err}");
    }
}
