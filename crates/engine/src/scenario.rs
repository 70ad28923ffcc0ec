//! Scenario files: a plan, its initial conditions, fidelity, and run configuration in
//! one YAML/TOML/JSON document.

use std::path::Path;

use chrono::{DateTime, Utc};
use msim_activities::{PlanInput, SpacecraftState};
use msim_config::{Fidelity, SimConfig, load_document};
use msim_orbits::{KeplerPropagator, OrbitalElements, Propagator, Tle};
use serde::Deserialize;

use crate::EngineError;

/// Where the spacecraft starts.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrbitSpec {
    Circular {
        altitude_km: f64,
        inclination_deg: f64,
        #[serde(default)]
        raan_deg: f64,
    },
    Tle {
        line1: String,
        line2: String,
    },
    StateVector {
        position_km: [f64; 3],
        velocity_km_s: [f64; 3],
    },
}

fn full_battery() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitialConditions {
    pub orbit: OrbitSpec,
    /// Defaults to the plan start.
    #[serde(default)]
    pub epoch: Option<DateTime<Utc>>,
    #[serde(default = "full_battery")]
    pub battery_soc: f64,
    /// Defaults to the configured initial load.
    #[serde(default)]
    pub propellant_kg: Option<f64>,
    #[serde(default)]
    pub storage_used_gb: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_fidelity")]
    pub fidelity: Fidelity,
    pub config: SimConfig,
    pub initial: InitialConditions,
    pub plan: PlanInput,
}

fn default_fidelity() -> Fidelity {
    Fidelity::Medium
}

impl Scenario {
    /// Resolve the initial conditions into a full spacecraft state.
    pub fn initial_state(&self) -> Result<SpacecraftState, EngineError> {
        let initial = &self.initial;
        let epoch = initial.epoch.unwrap_or(self.plan.start_time);
        let point = match &initial.orbit {
            OrbitSpec::Circular {
                altitude_km,
                inclination_deg,
                raan_deg,
            } => {
                let mut elements = OrbitalElements::circular(*altitude_km, *inclination_deg, epoch);
                elements.raan_rad = raan_deg.to_radians();
                KeplerPropagator::new(elements, self.fidelity.into()).state_at(epoch)
            }
            OrbitSpec::Tle { line1, line2 } => {
                let tle = Tle::parse(line1, line2).map_err(msim_orbits::OrbitError::from)?;
                KeplerPropagator::from_tle(&tle, self.fidelity).state_at(epoch)
            }
            OrbitSpec::StateVector {
                position_km,
                velocity_km_s,
            } => msim_orbits::EphemerisPoint {
                time: epoch,
                position_km: *position_km,
                velocity_km_s: *velocity_km_s,
            },
        };

        let spacecraft = &self.config.spacecraft;
        let mut state = SpacecraftState::at_point(&point, spacecraft, initial.battery_soc);
        if let Some(propellant) = initial.propellant_kg {
            state.propellant_kg = propellant;
            state.rederive_mass(spacecraft.dry_mass_kg);
        }
        state.storage_used_gb = initial.storage_used_gb;
        Ok(state)
    }
}

/// Load a scenario, picking the format from the file extension.
pub fn load_scenario<P: AsRef<Path>>(path: P) -> Result<Scenario, EngineError> {
    let scenario: Scenario = load_document(path)?;
    scenario.config.validate()?;
    Ok(scenario)
}
