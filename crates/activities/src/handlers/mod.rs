//! Built-in activity handlers and the stepping helpers they share.

mod collision_avoidance;
mod downlink;
mod eo_collect;
mod idle;
mod maneuver;
mod momentum_desat;
mod orbit_lower;
mod safe_mode;
mod station_keeping;

pub use collision_avoidance::{BurnDirection, CollisionAvoidanceHandler, CollisionAvoidanceParams};
pub use downlink::{DownlinkHandler, DownlinkParams};
pub use eo_collect::{EoCollectHandler, EoCollectParams};
pub use idle::IdleHandler;
pub use momentum_desat::{DesatMethod, MomentumDesatHandler, MomentumDesatParams};
pub use orbit_lower::{OrbitLowerHandler, OrbitLowerParams};
pub use safe_mode::{SafeModeHandler, SafeModeParams};
pub use station_keeping::{StationKeepingHandler, StationKeepingParams};

use chrono::{DateTime, Utc};
use msim_orbits::{EphemerisPoint, epoch};
use msim_power::SocStep;

use crate::ActivityHandler;
use crate::HandlerError;
use crate::types::{ProfileSample, SpacecraftState};

pub(crate) fn defaults() -> Vec<Box<dyn ActivityHandler>> {
    vec![
        Box::new(IdleHandler),
        Box::new(OrbitLowerHandler),
        Box::new(StationKeepingHandler),
        Box::new(CollisionAvoidanceHandler),
        Box::new(EoCollectHandler),
        Box::new(DownlinkHandler),
        Box::new(SafeModeHandler),
        Box::new(MomentumDesatHandler),
    ]
}

/// Interval between two consecutive ephemeris points.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Step<'a> {
    pub start: &'a EphemerisPoint,
    pub end: &'a EphemerisPoint,
    pub dt_s: f64,
}

pub(crate) fn steps(points: &[EphemerisPoint]) -> impl Iterator<Item = Step<'_>> {
    points
        .windows(2)
        .map(|pair| Step {
            start: &pair[0],
            end: &pair[1],
            dt_s: epoch::seconds_between(pair[0].time, pair[1].time),
        })
        .filter(|step| step.dt_s > 0.0)
}

pub(crate) fn require_points(points: &[EphemerisPoint]) -> Result<(), HandlerError> {
    if points.is_empty() {
        Err(HandlerError::EmptyEphemeris)
    } else {
        Ok(())
    }
}

/// Consumable levels as a handler folds over its window.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Budget {
    pub battery_soc: f64,
    pub propellant_kg: f64,
    pub storage_used_gb: f64,
    pub mass_kg: f64,
}

impl Budget {
    pub fn from_state(state: &SpacecraftState) -> Self {
        Self {
            battery_soc: state.battery_soc,
            propellant_kg: state.propellant_kg,
            storage_used_gb: state.storage_used_gb,
            mass_kg: state.mass_kg,
        }
    }

    pub fn sample(&self, time: DateTime<Utc>, step: &SocStep) -> ProfileSample {
        ProfileSample {
            time,
            battery_soc: self.battery_soc,
            storage_used_gb: self.storage_used_gb,
            propellant_kg: self.propellant_kg,
            generation_w: step.generation_w,
            consumption_w: step.consumption_w,
            in_eclipse: step.in_eclipse,
        }
    }
}
