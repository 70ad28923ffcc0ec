//! Plan, state, and result records exchanged between the engine and handlers.

use chrono::{DateTime, Utc};
use msim_config::SpacecraftConfig;
use msim_core::constants::EARTH_RADIUS_KM;
use msim_core::vector::{self, Vector3};
use msim_orbits::{EphemerisPoint, epoch};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::Event;

/// Mutable spacecraft record threaded through the engine.
///
/// Handlers only ever see a snapshot and describe changes through [`StateUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpacecraftState {
    pub epoch: DateTime<Utc>,
    pub position_km: Vector3,
    pub velocity_km_s: Vector3,
    pub mass_kg: f64,
    pub propellant_kg: f64,
    pub battery_soc: f64,
    pub storage_used_gb: f64,
}

impl SpacecraftState {
    /// Fresh state at `point` with full tanks and the given battery level.
    pub fn at_point(point: &EphemerisPoint, spacecraft: &SpacecraftConfig, battery_soc: f64) -> Self {
        Self {
            epoch: point.time,
            position_km: point.position_km,
            velocity_km_s: point.velocity_km_s,
            mass_kg: spacecraft.initial_mass_kg(),
            propellant_kg: spacecraft.initial_propellant_kg,
            battery_soc,
            storage_used_gb: 0.0,
        }
    }

    pub fn radius_km(&self) -> f64 {
        vector::norm(&self.position_km)
    }

    pub fn altitude_km(&self) -> f64 {
        self.radius_km() - EARTH_RADIUS_KM
    }

    pub fn as_point(&self) -> EphemerisPoint {
        EphemerisPoint {
            time: self.epoch,
            position_km: self.position_km,
            velocity_km_s: self.velocity_km_s,
        }
    }

    /// Recompute total mass from the dry mass and remaining propellant.
    pub fn rederive_mass(&mut self, dry_mass_kg: f64) {
        self.mass_kg = dry_mass_kg + self.propellant_kg;
    }

    /// Replace every field the update carries.
    pub fn apply(&mut self, update: &StateUpdate) {
        if let Some(position) = update.position_km {
            self.position_km = position;
        }
        if let Some(velocity) = update.velocity_km_s {
            self.velocity_km_s = velocity;
        }
        if let Some(soc) = update.battery_soc {
            self.battery_soc = soc;
        }
        if let Some(propellant) = update.propellant_kg {
            self.propellant_kg = propellant;
        }
        if let Some(storage) = update.storage_used_gb {
            self.storage_used_gb = storage;
        }
    }
}

/// Field-level partial update returned by a handler. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_km: Option<Vector3>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity_km_s: Option<Vector3>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_soc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub propellant_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_used_gb: Option<f64>,
}

impl StateUpdate {
    pub fn is_empty(&self) -> bool {
        *self == StateUpdate::default()
    }

    /// True when the handler moved the spacecraft onto a new orbit.
    pub fn changes_orbit(&self) -> bool {
        self.position_km.is_some() || self.velocity_km_s.is_some()
    }
}

/// One row of the state time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfileSample {
    pub time: DateTime<Utc>,
    pub battery_soc: f64,
    pub storage_used_gb: f64,
    pub propellant_kg: f64,
    pub generation_w: f64,
    pub consumption_w: f64,
    pub in_eclipse: bool,
}

/// A scheduled operation. `parameters` is only interpreted by the matching handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub activity_id: String,
    pub activity_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Activity {
    pub fn new(
        activity_id: impl Into<String>,
        activity_type: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            activity_id: activity_id.into(),
            activity_type: activity_type.into(),
            start_time,
            end_time,
            parameters: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_owned(), value.into());
        self
    }

    pub fn duration_s(&self) -> f64 {
        epoch::seconds_between(self.start_time, self.end_time)
    }

    pub fn overlaps(&self, other: &Activity) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

/// The activity timeline for one spacecraft over a planning horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanInput {
    pub plan_id: String,
    pub spacecraft_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

/// What a handler reports back for one activity.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityResult {
    pub success: bool,
    pub events: Vec<Event>,
    pub state_updates: StateUpdate,
    pub profile: Vec<ProfileSample>,
    pub artifacts: Map<String, Value>,
}

impl ActivityResult {
    pub fn new(success: bool) -> Self {
        Self {
            success,
            events: Vec::new(),
            state_updates: StateUpdate::default(),
            profile: Vec::new(),
            artifacts: Map::new(),
        }
    }

    pub fn artifact(&mut self, key: &str, value: impl Into<Value>) {
        self.artifacts.insert(key.to_owned(), value.into());
    }
}
