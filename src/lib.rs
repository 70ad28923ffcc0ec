//! Spacecraft mission-operations simulator.
//!
//! This crate is a thin façade over the workspace crates so front-ends (the `msim`
//! CLI, notebooks, validation harnesses) depend on a single library. The engine
//! lives in [`engine`]; the models it drives are re-exported alongside it.

pub use msim_activities as activities;
pub use msim_config as config;
pub use msim_core as core;
pub use msim_engine as engine;
pub use msim_export as export;
pub use msim_orbits as orbits;
pub use msim_power as power;
pub use msim_propulsion as propulsion;

pub use msim_activities::{Activity, Event, EventKind, PlanInput, SpacecraftState};
pub use msim_config::{Fidelity, SimConfig, SpacecraftConfig};
pub use msim_engine::{EngineError, Scenario, SimResults, SimulationEngine, load_scenario};

/// Library version, recorded in run manifests and printed by the CLI.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Load a scenario file and run it with a default engine.
pub fn run_scenario<P: AsRef<std::path::Path>>(path: P) -> Result<SimResults, EngineError> {
    let scenario = load_scenario(path)?;
    let initial = scenario.initial_state()?;
    SimulationEngine::new().simulate(
        &scenario.plan,
        &initial,
        scenario.fidelity,
        &scenario.config,
    )
}
