use msim_config::{SimConfig, SpacecraftConfig};
use msim_core::constants::G0;
use msim_orbits::EphemerisPoint;
use msim_power::PowerModel;
use serde::{Deserialize, Serialize};

use super::{Budget, require_points, steps};
use crate::event::{self, Event, category};
use crate::params::{self, ActivityParams, ParamError};
use crate::types::{Activity, ActivityResult, SpacecraftState, StateUpdate};
use crate::{ActivityHandler, HandlerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesatMethod {
    #[default]
    Thrusters,
    Magnetorquers,
}

/// Reaction-wheel momentum unloading.
#[derive(Debug, Clone, Copy, Default)]
pub struct MomentumDesatHandler;

#[derive(Debug, Clone, Deserialize)]
pub struct MomentumDesatParams {
    pub momentum_nms: f64,
    #[serde(default)]
    pub method: DesatMethod,
}

impl ActivityParams for MomentumDesatParams {
    fn check(&self) -> Result<(), ParamError> {
        params::positive("momentum_nms", self.momentum_nms)
    }
}

impl ActivityHandler for MomentumDesatHandler {
    fn activity_type(&self) -> &'static str {
        "momentum_desat"
    }

    fn validate(&self, activity: &Activity) -> Vec<Event> {
        params::validation_events::<MomentumDesatParams>(activity)
    }

    fn power_consumption_w(&self, activity: &Activity, spacecraft: &SpacecraftConfig) -> f64 {
        let method = MomentumDesatParams::parse(activity)
            .map(|p| p.method)
            .unwrap_or_default();
        spacecraft.base_power_w
            + match method {
                DesatMethod::Thrusters => spacecraft.adcs.desat_power_w,
                DesatMethod::Magnetorquers => spacecraft.adcs.magnetorquer_power_w,
            }
    }

    fn process(
        &self,
        activity: &Activity,
        state: &SpacecraftState,
        ephemeris: &[EphemerisPoint],
        config: &SimConfig,
    ) -> Result<ActivityResult, HandlerError> {
        require_points(ephemeris)?;
        let params = MomentumDesatParams::parse(activity)?;
        let spacecraft = &config.spacecraft;
        let adcs = &spacecraft.adcs;
        let window_s = activity.duration_s();

        // Seconds of active unloading and the propellant it costs.
        let (active_s, propellant_kg) = match params.method {
            DesatMethod::Thrusters => {
                let impulse_ns = params.momentum_nms / adcs.moment_arm_m;
                (window_s, impulse_ns / (spacecraft.propulsion.rcs_isp_s * G0))
            }
            DesatMethod::Magnetorquers if adcs.magnetorquer_torque_nm > 0.0 => {
                (params.momentum_nms / adcs.magnetorquer_torque_nm, 0.0)
            }
            DesatMethod::Magnetorquers => (f64::INFINITY, 0.0),
        };

        let mut result = ActivityResult::new(true);
        let mut budget = Budget::from_state(state);
        let mut fire = true;

        if propellant_kg > budget.propellant_kg {
            fire = false;
            result.success = false;
            result.events.push(
                event::warning(activity.start_time, category::PROPELLANT, "Insufficient propellant for desaturation")
                    .with("required_kg", propellant_kg)
                    .with("available_kg", budget.propellant_kg),
            );
        }
        if params.method == DesatMethod::Magnetorquers && active_s > window_s {
            result.success = false;
            result.events.push(
                event::warning(activity.start_time, category::ADCS, "Window too short for magnetorquer unloading")
                    .with("required_s", active_s)
                    .with("window_s", window_s),
            );
        }

        let device_w = self.power_consumption_w(activity, spacecraft) - spacecraft.base_power_w;
        let power = PowerModel::new(spacecraft);
        let mut elapsed_s = 0.0;
        for step in steps(ephemeris) {
            let active = (active_s.min(window_s) - elapsed_s).clamp(0.0, step.dt_s);
            let load_w = spacecraft.base_power_w + device_w * active / step.dt_s;
            let soc_step = power.step(budget.battery_soc, step.start, load_w, step.dt_s);
            budget.battery_soc = soc_step.soc;
            elapsed_s += step.dt_s;
            result.profile.push(budget.sample(step.end.time, &soc_step));
        }

        let used_kg = if fire { propellant_kg } else { 0.0 };
        budget.propellant_kg -= used_kg;
        if result.success {
            result.events.push(
                event::info(activity.end_time, category::ADCS, "Momentum unloaded")
                    .with("momentum_nms", params.momentum_nms)
                    .with("propellant_kg", used_kg),
            );
        }

        result.state_updates = StateUpdate {
            battery_soc: Some(budget.battery_soc),
            propellant_kg: Some(budget.propellant_kg),
            ..StateUpdate::default()
        };
        for sample in &mut result.profile {
            sample.propellant_kg = budget.propellant_kg;
        }
        result.artifact(
            "method",
            match params.method {
                DesatMethod::Thrusters => "thrusters",
                DesatMethod::Magnetorquers => "magnetorquers",
            },
        );
        result.artifact("momentum_nms", params.momentum_nms);
        result.artifact("propellant_used_kg", used_kg);
        if active_s.is_finite() {
            result.artifact("required_time_s", active_s);
        }
        Ok(result)
    }
}
