use msim_config::{SimConfig, SpacecraftConfig};
use msim_core::constants::EARTH_RADIUS_KM;
use msim_orbits::EphemerisPoint;
use msim_propulsion::{ElectricThruster, continuous_burn};
use serde::{Deserialize, Serialize};

use super::maneuver::{burn_artifacts, burn_update, execute_burn, radius_after_along_track};
use super::require_points;
use crate::event::{self, Event, category};
use crate::params::{self, ActivityParams, ParamError};
use crate::types::{Activity, ActivityResult, SpacecraftState};
use crate::{ActivityHandler, HandlerError};

/// Burn direction in the local orbital frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurnDirection {
    Prograde,
    Retrograde,
    Radial,
    Normal,
}

impl BurnDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            BurnDirection::Prograde => "prograde",
            BurnDirection::Retrograde => "retrograde",
            BurnDirection::Radial => "radial",
            BurnDirection::Normal => "normal",
        }
    }
}

/// Urgent, uninterrupted burn to open the miss distance of a conjunction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollisionAvoidanceHandler;

#[derive(Debug, Clone, Deserialize)]
pub struct CollisionAvoidanceParams {
    pub delta_v_m_s: f64,
    pub direction: BurnDirection,
    #[serde(default)]
    pub conjunction_id: Option<String>,
    #[serde(default)]
    pub miss_distance_km: Option<f64>,
}

impl ActivityParams for CollisionAvoidanceParams {
    fn check(&self) -> Result<(), ParamError> {
        params::positive("delta_v_m_s", self.delta_v_m_s)?;
        params::optional("miss_distance_km", self.miss_distance_km, params::non_negative)
    }
}

impl ActivityHandler for CollisionAvoidanceHandler {
    fn activity_type(&self) -> &'static str {
        "collision_avoidance"
    }

    fn validate(&self, activity: &Activity) -> Vec<Event> {
        params::validation_events::<CollisionAvoidanceParams>(activity)
    }

    fn power_consumption_w(&self, _activity: &Activity, spacecraft: &SpacecraftConfig) -> f64 {
        spacecraft.base_power_w + spacecraft.propulsion.power_w
    }

    fn process(
        &self,
        activity: &Activity,
        state: &SpacecraftState,
        ephemeris: &[EphemerisPoint],
        config: &SimConfig,
    ) -> Result<ActivityResult, HandlerError> {
        require_points(ephemeris)?;
        let params = CollisionAvoidanceParams::parse(activity)?;
        let spacecraft = &config.spacecraft;
        let thruster = ElectricThruster::from(&spacecraft.propulsion);
        let plan = continuous_burn(&thruster, params.delta_v_m_s, state.mass_kg, activity.start_time);

        let mut result = ActivityResult::new(false);
        let burn_s = plan.total_burn_s();
        if burn_s > activity.duration_s() {
            result.events.push(
                event::warning(activity.start_time, category::MANEUVER, "Burn is longer than the activity window")
                    .with("burn_duration_s", burn_s)
                    .with("window_s", activity.duration_s()),
            );
        }

        let outcome = execute_burn(state, ephemeris, spacecraft, &thruster, &plan);
        result.success = outcome.met(params.delta_v_m_s);
        result.events.extend(outcome.events.iter().cloned());

        let start_radius = state.radius_km();
        let final_radius = match params.direction {
            BurnDirection::Prograde => {
                Some(radius_after_along_track(start_radius, outcome.achieved_delta_v_m_s, false))
            }
            BurnDirection::Retrograde => {
                Some(radius_after_along_track(start_radius, outcome.achieved_delta_v_m_s, true))
            }
            BurnDirection::Radial | BurnDirection::Normal => None,
        };
        let final_altitude = final_radius.unwrap_or(start_radius) - EARTH_RADIUS_KM;

        let mut summary = if result.success {
            event::info(activity.end_time, category::MANEUVER, "Collision avoidance burn complete")
        } else {
            event::warning(activity.end_time, category::MANEUVER, "Collision avoidance burn incomplete")
        };
        summary = summary
            .with("direction", params.direction.as_str())
            .with("achieved_delta_v_m_s", outcome.achieved_delta_v_m_s);
        if let Some(id) = &params.conjunction_id {
            summary = summary.with("conjunction_id", id.as_str());
        }
        result.events.push(summary);

        let end_point = ephemeris.last().ok_or(HandlerError::EmptyEphemeris)?;
        result.state_updates = burn_update(&outcome, end_point, final_radius);
        for (key, value) in burn_artifacts(&outcome, &plan) {
            result.artifact(key, value);
        }
        result.artifact("direction", params.direction.as_str());
        result.artifact("burn_duration_s", burn_s);
        result.artifact("final_altitude_km", final_altitude);
        if let Some(id) = params.conjunction_id {
            result.artifact("conjunction_id", id);
        }
        if let Some(miss) = params.miss_distance_km {
            result.artifact("miss_distance_km", miss);
        }
        result.profile = outcome.profile;
        Ok(result)
    }
}
