use msim_config::{SimConfig, SpacecraftConfig};
use msim_core::constants::EARTH_RADIUS_KM;
use msim_orbits::EphemerisPoint;
use msim_propulsion::{
    DutyCycle, ElectricThruster, circular_transfer_delta_v_m_s, plan_delta_v,
};
use serde::Deserialize;

use super::maneuver::{
    burn_artifacts, burn_update, circular_period_s, execute_burn, radius_after_along_track,
};
use super::require_points;
use crate::event::{self, Event, category};
use crate::params::{self, ActivityParams, ParamError};
use crate::types::{Activity, ActivityResult, SpacecraftState};
use crate::{ActivityHandler, HandlerError};

fn default_tolerance_km() -> f64 {
    2.0
}

/// Restore the reference altitude when the orbit has drifted out of its band.
#[derive(Debug, Clone, Copy, Default)]
pub struct StationKeepingHandler;

#[derive(Debug, Clone, Deserialize)]
pub struct StationKeepingParams {
    pub target_altitude_km: f64,
    #[serde(default = "default_tolerance_km")]
    pub tolerance_km: f64,
    #[serde(default)]
    pub max_delta_v_m_s: Option<f64>,
}

impl ActivityParams for StationKeepingParams {
    fn check(&self) -> Result<(), ParamError> {
        params::positive("target_altitude_km", self.target_altitude_km)?;
        params::non_negative("tolerance_km", self.tolerance_km)?;
        params::optional("max_delta_v_m_s", self.max_delta_v_m_s, params::non_negative)
    }
}

impl ActivityHandler for StationKeepingHandler {
    fn activity_type(&self) -> &'static str {
        "station_keeping"
    }

    fn validate(&self, activity: &Activity) -> Vec<Event> {
        let mut events = params::validation_events::<StationKeepingParams>(activity);
        if let Ok(params) = StationKeepingParams::parse(activity) {
            let period = circular_period_s(EARTH_RADIUS_KM + params.target_altitude_km);
            if activity.duration_s() < period {
                events.push(
                    event::warning(activity.start_time, category::VALIDATION, "Window is shorter than one orbit")
                        .with("window_s", activity.duration_s())
                        .with("orbit_period_s", period),
                );
            }
        }
        events
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
        let params = StationKeepingParams::parse(activity)?;
        let spacecraft = &config.spacecraft;
        let thruster = ElectricThruster::from(&spacecraft.propulsion);
        let start_radius = state.radius_km();
        let target_radius = EARTH_RADIUS_KM + params.target_altitude_km;
        let deviation_km = state.altitude_km() - params.target_altitude_km;
        let in_band = deviation_km.abs() <= params.tolerance_km;

        let mut requested = if in_band {
            0.0
        } else {
            circular_transfer_delta_v_m_s(start_radius, target_radius)
        };
        let mut capped = false;
        if let Some(limit) = params.max_delta_v_m_s.filter(|limit| requested > *limit) {
            requested = limit;
            capped = true;
        }

        let plan = plan_delta_v(
            &thruster,
            &DutyCycle::from(&spacecraft.propulsion),
            requested,
            state.mass_kg,
            activity.start_time,
            circular_period_s(start_radius),
        );
        let outcome = execute_burn(state, ephemeris, spacecraft, &thruster, &plan);
        let lowering = target_radius < start_radius;
        let final_radius =
            radius_after_along_track(start_radius, outcome.achieved_delta_v_m_s, lowering);
        let success = outcome.met(requested);

        let mut result = ActivityResult::new(success);
        if in_band {
            result.events.push(
                event::info(activity.start_time, category::MANEUVER, "Altitude within tolerance; no burn required")
                    .with("deviation_km", deviation_km),
            );
        }
        if capped {
            result.events.push(
                event::warning(activity.start_time, category::MANEUVER, "Correction limited by max_delta_v_m_s")
                    .with("requested_delta_v_m_s", circular_transfer_delta_v_m_s(start_radius, target_radius))
                    .with("max_delta_v_m_s", requested),
            );
        }
        result.events.extend(outcome.events.iter().cloned());
        if !in_band {
            let summary = if success {
                event::info(activity.end_time, category::MANEUVER, "Station-keeping correction complete")
            } else {
                event::warning(activity.end_time, category::MANEUVER, "Station-keeping correction incomplete")
            };
            result.events.push(summary.with("final_altitude_km", final_radius - EARTH_RADIUS_KM));
        }

        let end_point = ephemeris.last().ok_or(HandlerError::EmptyEphemeris)?;
        result.state_updates = burn_update(&outcome, end_point, (!in_band).then_some(final_radius));
        for (key, value) in burn_artifacts(&outcome, &plan) {
            result.artifact(key, value);
        }
        result.artifact("deviation_km", deviation_km);
        result.artifact("tolerance_km", params.tolerance_km);
        result.artifact("final_altitude_km", final_radius - EARTH_RADIUS_KM);
        result.profile = outcome.profile;
        Ok(result)
    }
}
