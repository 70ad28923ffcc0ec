use msim_config::{SimConfig, SpacecraftConfig};
use msim_orbits::EphemerisPoint;
use msim_power::PowerModel;

use super::{Budget, require_points, steps};
use crate::event::{self, Event, category};
use crate::types::{Activity, ActivityResult, SpacecraftState};
use crate::{ActivityHandler, HandlerError};

/// Base-load cruise between scheduled activities.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleHandler;

impl ActivityHandler for IdleHandler {
    fn activity_type(&self) -> &'static str {
        "idle"
    }

    fn validate(&self, _activity: &Activity) -> Vec<Event> {
        Vec::new()
    }

    fn power_consumption_w(&self, _activity: &Activity, spacecraft: &SpacecraftConfig) -> f64 {
        spacecraft.base_power_w
    }

    fn process(
        &self,
        activity: &Activity,
        state: &SpacecraftState,
        ephemeris: &[EphemerisPoint],
        config: &SimConfig,
    ) -> Result<ActivityResult, HandlerError> {
        require_points(ephemeris)?;
        let spacecraft = &config.spacecraft;
        let power = PowerModel::new(spacecraft);
        let load_w = self.power_consumption_w(activity, spacecraft);

        let mut result = ActivityResult::new(true);
        let mut budget = Budget::from_state(state);
        let mut eclipse_s = 0.0;
        let mut min_soc = budget.battery_soc;
        let mut shortfall_steps = 0usize;

        for step in steps(ephemeris) {
            let soc_step = power.step(budget.battery_soc, step.start, load_w, step.dt_s);
            if soc_step.in_eclipse {
                eclipse_s += step.dt_s;
            }
            if soc_step.is_shortfall() {
                if shortfall_steps == 0 {
                    result.events.push(
                        event::warning(step.start.time, category::POWER, "Base load exceeds available power")
                            .with("battery_soc", budget.battery_soc),
                    );
                }
                shortfall_steps += 1;
            }
            budget.battery_soc = soc_step.soc;
            min_soc = min_soc.min(budget.battery_soc);
            result.profile.push(budget.sample(step.end.time, &soc_step));
        }

        let duration_s = activity.duration_s();
        result.state_updates.battery_soc = Some(budget.battery_soc);
        result.artifact("duration_s", duration_s);
        result.artifact("eclipse_s", eclipse_s);
        result.artifact("sunlit_s", (duration_s - eclipse_s).max(0.0));
        result.artifact("min_soc", min_soc);
        result.artifact("power_shortfall_steps", shortfall_steps);
        Ok(result)
    }
}
