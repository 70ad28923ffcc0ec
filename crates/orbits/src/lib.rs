//! Orbit propagation interface: TLE handling, Keplerian propagation, ephemeris slicing,
//! and ground-station geometry.

pub mod elements;
pub mod ephemeris;
pub mod epoch;
pub mod ground;
pub mod propagator;
pub mod tle;

pub use elements::OrbitalElements;
pub use ephemeris::{Ephemeris, EphemerisPoint};
pub use ground::{AccessWindow, GroundSite};
pub use propagator::{KeplerPropagator, PerturbationModel, Propagator};
pub use tle::{Tle, TleError};

use thiserror::Error;

/// Errors surfaced while building or running a propagator.
#[derive(Debug, Error)]
pub enum OrbitError {
    #[error("state vector does not describe a bound orbit (specific energy {energy_km2_s2:.3} km²/s²)")]
    Unbound { energy_km2_s2: f64 },
    #[error("state vector is degenerate: {0}")]
    Degenerate(&'static str),
    #[error("propagation step must be positive, got {0} s")]
    InvalidStep(f64),
    #[error("propagation span ends before it starts")]
    InvalidSpan,
    #[error("TLE rejected: {0}")]
    Tle(#[from] TleError),
}
