//! Simulation engine: validates a mission plan, propagates the ephemeris, walks the
//! activity timeline through the handler registry, and folds every result into the
//! spacecraft state.

pub mod cache;
mod engine;
pub mod results;
pub mod scenario;

pub use cache::{CacheKey, EphemerisCache};
pub use engine::SimulationEngine;
pub use results::{
    ActivityCounts, ActivityOutcome, EventCounts, OrbitChange, OutcomeStatus, RunManifest,
    SimResults, StateChanges, Summary,
};
pub use scenario::{InitialConditions, OrbitSpec, Scenario, load_scenario};

use chrono::{DateTime, Utc};
use msim_config::ConfigError;
use msim_orbits::OrbitError;

/// Malformed top-level input, detected before any activity runs.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("plan horizon is empty: end {end} is not after start {start}")]
    InvalidHorizon {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("activities `{first}` and `{second}` overlap")]
    OverlappingActivities { first: String, second: String },
    #[error("activity id `{0}` appears more than once")]
    DuplicateActivityId(String),
    #[error("invalid initial state `{field}`: {reason}")]
    InvalidInitialState { field: &'static str, reason: String },
    #[error("ephemeris propagation failed: {0}")]
    Orbit(#[from] OrbitError),
}
