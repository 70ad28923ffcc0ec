use msim_config::{SimConfig, SpacecraftConfig};
use msim_core::constants::EARTH_RADIUS_KM;
use msim_orbits::EphemerisPoint;
use msim_propulsion::{DutyCycle, ElectricThruster, plan_altitude_change};
use serde::Deserialize;

use super::maneuver::{
    burn_artifacts, burn_update, circular_period_s, execute_burn, radius_after_along_track,
};
use super::require_points;
use crate::event::{self, Event, category};
use crate::params::{self, ActivityParams, ParamError};
use crate::types::{Activity, ActivityResult, SpacecraftState};
use crate::{ActivityHandler, HandlerError};

/// Duty-cycled electric-propulsion descent to a lower circular orbit.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrbitLowerHandler;

#[derive(Debug, Clone, Deserialize)]
pub struct OrbitLowerParams {
    pub target_altitude_km: f64,
    #[serde(default)]
    pub thrust_n: Option<f64>,
    #[serde(default)]
    pub isp_s: Option<f64>,
    #[serde(default)]
    pub power_w: Option<f64>,
}

impl ActivityParams for OrbitLowerParams {
    fn check(&self) -> Result<(), ParamError> {
        params::positive("target_altitude_km", self.target_altitude_km)?;
        params::optional("thrust_n", self.thrust_n, params::positive)?;
        params::optional("isp_s", self.isp_s, params::positive)?;
        params::optional("power_w", self.power_w, params::non_negative)
    }
}

impl OrbitLowerParams {
    /// The configured thruster with per-activity overrides applied.
    pub fn thruster(&self, spacecraft: &SpacecraftConfig) -> ElectricThruster {
        let nominal = ElectricThruster::from(&spacecraft.propulsion);
        ElectricThruster {
            thrust_n: self.thrust_n.unwrap_or(nominal.thrust_n),
            isp_s: self.isp_s.unwrap_or(nominal.isp_s),
            power_w: self.power_w.unwrap_or(nominal.power_w),
        }
    }
}

impl ActivityHandler for OrbitLowerHandler {
    fn activity_type(&self) -> &'static str {
        "orbit_lower"
    }

    fn validate(&self, activity: &Activity) -> Vec<Event> {
        params::validation_events::<OrbitLowerParams>(activity)
    }

    fn power_consumption_w(&self, activity: &Activity, spacecraft: &SpacecraftConfig) -> f64 {
        let thruster_w = OrbitLowerParams::parse(activity)
            .map(|p| p.thruster(spacecraft).power_w)
            .unwrap_or(spacecraft.propulsion.power_w);
        spacecraft.base_power_w + thruster_w
    }

    fn process(
        &self,
        activity: &Activity,
        state: &SpacecraftState,
        ephemeris: &[EphemerisPoint],
        config: &SimConfig,
    ) -> Result<ActivityResult, HandlerError> {
        require_points(ephemeris)?;
        let params = OrbitLowerParams::parse(activity)?;
        let spacecraft = &config.spacecraft;
        let thruster = params.thruster(spacecraft);
        let start_radius = state.radius_km();
        let target_radius = EARTH_RADIUS_KM + params.target_altitude_km;
        let lowering = target_radius <= start_radius;

        let mut events = Vec::new();
        if !lowering {
            events.push(
                event::warning(activity.start_time, category::MANEUVER, "Target altitude is above the current orbit; raising instead")
                    .with("current_altitude_km", state.altitude_km())
                    .with("target_altitude_km", params.target_altitude_km),
            );
        }

        let plan = plan_altitude_change(
            &thruster,
            &DutyCycle::from(&spacecraft.propulsion),
            start_radius,
            target_radius,
            state.mass_kg,
            activity.start_time,
            circular_period_s(start_radius),
        );
        let outcome = execute_burn(state, ephemeris, spacecraft, &thruster, &plan);
        let final_radius =
            radius_after_along_track(start_radius, outcome.achieved_delta_v_m_s, lowering);
        let success = outcome.met(plan.required_delta_v_m_s());

        let mut result = ActivityResult::new(success);
        result.events = events;
        result.events.extend(outcome.events.iter().cloned());
        let summary = if success {
            event::info(activity.end_time, category::MANEUVER, "Orbit change complete")
        } else {
            event::warning(activity.end_time, category::MANEUVER, "Orbit change incomplete")
        };
        result.events.push(
            summary
                .with("achieved_delta_v_m_s", outcome.achieved_delta_v_m_s)
                .with("final_altitude_km", final_radius - EARTH_RADIUS_KM),
        );

        let end_point = ephemeris.last().ok_or(HandlerError::EmptyEphemeris)?;
        result.state_updates = burn_update(&outcome, end_point, Some(final_radius));
        for (key, value) in burn_artifacts(&outcome, &plan) {
            result.artifact(key, value);
        }
        result.artifact("initial_altitude_km", state.altitude_km());
        result.artifact("target_altitude_km", params.target_altitude_km);
        result.artifact("final_altitude_km", final_radius - EARTH_RADIUS_KM);
        result.profile = outcome.profile;
        Ok(result)
    }
}
