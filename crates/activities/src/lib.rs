//! Activity handler protocol and the built-in mission activities.
//!
//! A handler turns one scheduled [`Activity`] plus a snapshot of the spacecraft
//! state and the matching ephemeris slice into an [`ActivityResult`]: events,
//! a partial state update, profile samples, and handler-specific artifacts.
//! Handlers never mutate engine state; the engine merges and clamps what they
//! return.

pub mod event;
pub mod handlers;
pub mod params;
pub mod registry;
pub mod types;

pub use event::{Event, EventKind};
pub use handlers::{
    CollisionAvoidanceHandler, DownlinkHandler, EoCollectHandler, IdleHandler,
    MomentumDesatHandler, OrbitLowerHandler, SafeModeHandler, StationKeepingHandler,
};
pub use params::{ActivityParams, ParamError};
pub use registry::{HandlerRegistry, RegistryBuilder, RegistryError};
pub use types::{
    Activity, ActivityResult, PlanInput, ProfileSample, SpacecraftState, StateUpdate,
};

use msim_config::{SimConfig, SpacecraftConfig};
use msim_orbits::EphemerisPoint;
use thiserror::Error;

/// Failure inside a handler. The engine records it as an ERROR event and keeps the
/// pre-activity state.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Params(#[from] ParamError),
    #[error("orbit update failed: {0}")]
    Orbit(#[from] msim_orbits::OrbitError),
    #[error("activity window contains no ephemeris points")]
    EmptyEphemeris,
}

/// Behaviour shared by every activity type.
pub trait ActivityHandler: Send + Sync {
    /// Dispatch key, e.g. `"orbit_lower"`.
    fn activity_type(&self) -> &'static str;

    /// Parameter and feasibility checks. An ERROR event makes the activity
    /// non-executable; WARNINGs are advisory.
    fn validate(&self, activity: &Activity) -> Vec<Event>;

    /// Nominal bus load while the activity runs (W).
    fn power_consumption_w(&self, activity: &Activity, spacecraft: &SpacecraftConfig) -> f64;

    fn process(
        &self,
        activity: &Activity,
        state: &SpacecraftState,
        ephemeris: &[EphemerisPoint],
        config: &SimConfig,
    ) -> Result<ActivityResult, HandlerError>;
}
