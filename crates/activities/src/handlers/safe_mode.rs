use msim_config::{PanelPointing, SimConfig, SpacecraftConfig};
use msim_orbits::EphemerisPoint;
use msim_power::PowerModel;
use serde::Deserialize;

use super::{Budget, require_points, steps};
use crate::event::{self, Event, category};
use crate::params::{self, ActivityParams, ParamError};
use crate::types::{Activity, ActivityResult, SpacecraftState};
use crate::{ActivityHandler, HandlerError};

/// Share of the nominal bus load kept alive in safe mode.
const SAFE_MODE_LOAD_FRACTION: f64 = 0.5;

fn default_exit_soc() -> f64 {
    0.5
}

/// Sun-pointed, reduced-load recovery until the battery recharges.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeModeHandler;

#[derive(Debug, Clone, Deserialize)]
pub struct SafeModeParams {
    #[serde(default = "default_exit_soc")]
    pub min_soc_exit: f64,
    #[serde(default)]
    pub safe_mode_power_w: Option<f64>,
}

impl ActivityParams for SafeModeParams {
    fn check(&self) -> Result<(), ParamError> {
        params::within("min_soc_exit", self.min_soc_exit, 0.0, 1.0)?;
        params::optional("safe_mode_power_w", self.safe_mode_power_w, params::non_negative)
    }
}

impl SafeModeParams {
    pub fn load_w(&self, spacecraft: &SpacecraftConfig) -> f64 {
        self.safe_mode_power_w
            .unwrap_or(spacecraft.base_power_w * SAFE_MODE_LOAD_FRACTION)
    }
}

impl ActivityHandler for SafeModeHandler {
    fn activity_type(&self) -> &'static str {
        "safe_mode"
    }

    fn validate(&self, activity: &Activity) -> Vec<Event> {
        params::validation_events::<SafeModeParams>(activity)
    }

    fn power_consumption_w(&self, activity: &Activity, spacecraft: &SpacecraftConfig) -> f64 {
        SafeModeParams::parse(activity)
            .map(|p| p.load_w(spacecraft))
            .unwrap_or(spacecraft.base_power_w * SAFE_MODE_LOAD_FRACTION)
    }

    fn process(
        &self,
        activity: &Activity,
        state: &SpacecraftState,
        ephemeris: &[EphemerisPoint],
        config: &SimConfig,
    ) -> Result<ActivityResult, HandlerError> {
        require_points(ephemeris)?;
        let params = SafeModeParams::parse(activity)?;
        let mut sun_pointed = config.spacecraft.clone();
        sun_pointed.power.panel_pointing = PanelPointing::SunTracking;
        let power = PowerModel::new(&sun_pointed);
        let load_w = params.load_w(&config.spacecraft);

        let mut result = ActivityResult::new(false);
        let mut budget = Budget::from_state(state);
        let mut reached_at = (budget.battery_soc >= params.min_soc_exit).then_some(activity.start_time);

        for step in steps(ephemeris) {
            let soc_step = power.step(budget.battery_soc, step.start, load_w, step.dt_s);
            budget.battery_soc = soc_step.soc;
            result.profile.push(budget.sample(step.end.time, &soc_step));
            if reached_at.is_none() && budget.battery_soc >= params.min_soc_exit {
                reached_at = Some(step.end.time);
                result.events.push(
                    event::info(step.end.time, category::MODE, "exit threshold reached")
                        .with("battery_soc", budget.battery_soc)
                        .with("min_soc_exit", params.min_soc_exit),
                );
            }
        }

        result.success = budget.battery_soc >= params.min_soc_exit;
        if !result.success {
            result.events.push(
                event::warning(activity.end_time, category::MODE, "exit threshold not reached")
                    .with("battery_soc", budget.battery_soc)
                    .with("min_soc_exit", params.min_soc_exit),
            );
        }

        result.state_updates.battery_soc = Some(budget.battery_soc);
        result.artifact("initial_soc", state.battery_soc);
        result.artifact("final_soc", budget.battery_soc);
        result.artifact("min_soc_exit", params.min_soc_exit);
        result.artifact("safe_mode_power_w", load_w);
        if let Some(at) = reached_at {
            result.artifact("threshold_reached_at", at.to_rfc3339());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventKind;
    use crate::handlers::fixtures;

    #[test]
    fn recharges_past_exit_threshold() {
        let points = fixtures::ephemeris(500.0, 97.0, 4.0 * 3_600.0);
        let state = fixtures::state(&points, 0.2);
        let activity = fixtures::activity("safe_mode", 4.0 * 3_600.0);
        let result = SafeModeHandler
            .process(&activity, &state, &points, &fixtures::config())
            .unwrap();
        assert!(result.success);
        assert!(result.state_updates.battery_soc.unwrap() >= 0.5);
        let reached: Vec<_> = result
            .events
            .iter()
            .filter(|e| e.message == "exit threshold reached")
            .collect();
        assert_eq!(reached.len(), 1);
    }

    #[test]
    fn no_generation_means_no_exit() {
        let points = fixtures::ephemeris(500.0, 97.0, 2.0 * 3_600.0);
        let state = fixtures::state(&points, 0.2);
        let mut config = fixtures::config();
        config.spacecraft.solar_panel_area_m2 = 0.0;
        let activity = fixtures::activity("safe_mode", 2.0 * 3_600.0);
        let result = SafeModeHandler.process(&activity, &state, &points, &config).unwrap();
        assert!(!result.success);
        let last = result.events.last().unwrap();
        assert_eq!(last.kind, EventKind::Warning);
        assert_eq!(last.message, "exit threshold not reached");
        assert!(result.state_updates.battery_soc.unwrap() <= 0.2);
    }
}
