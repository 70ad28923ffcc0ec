use msim_config::{SimConfig, SpacecraftConfig};
use msim_core::units::mb_to_gb;
use msim_orbits::{EphemerisPoint, GroundSite, ground};
use msim_power::PowerModel;
use serde::Deserialize;

use super::{Budget, require_points, steps};
use crate::event::{self, Event, category};
use crate::params::{self, ActivityParams, ParamError};
use crate::types::{Activity, ActivityResult, SpacecraftState};
use crate::{ActivityHandler, HandlerError};

fn default_max_off_nadir_deg() -> f64 {
    30.0
}

fn default_min_elevation_deg() -> f64 {
    10.0
}

/// Electro-optical imaging of a ground target.
#[derive(Debug, Clone, Copy, Default)]
pub struct EoCollectHandler;

#[derive(Debug, Clone, Deserialize)]
pub struct EoCollectParams {
    pub target_lat_deg: f64,
    pub target_lon_deg: f64,
    #[serde(default)]
    pub target_alt_km: f64,
    #[serde(default = "default_max_off_nadir_deg")]
    pub max_off_nadir_deg: f64,
    #[serde(default = "default_min_elevation_deg")]
    pub min_elevation_deg: f64,
    #[serde(default)]
    pub target_id: Option<String>,
}

impl ActivityParams for EoCollectParams {
    fn check(&self) -> Result<(), ParamError> {
        params::within("target_lat_deg", self.target_lat_deg, -90.0, 90.0)?;
        params::within("target_lon_deg", self.target_lon_deg, -180.0, 360.0)?;
        params::within("max_off_nadir_deg", self.max_off_nadir_deg, 0.0, 90.0)?;
        params::within("min_elevation_deg", self.min_elevation_deg, -90.0, 90.0)
    }
}

impl EoCollectParams {
    pub fn site(&self) -> GroundSite {
        GroundSite::new(
            self.target_id.clone().unwrap_or_else(|| "target".to_owned()),
            self.target_lat_deg,
            self.target_lon_deg,
            self.target_alt_km,
        )
    }
}

impl ActivityHandler for EoCollectHandler {
    fn activity_type(&self) -> &'static str {
        "eo_collect"
    }

    fn validate(&self, activity: &Activity) -> Vec<Event> {
        params::validation_events::<EoCollectParams>(activity)
    }

    fn power_consumption_w(&self, _activity: &Activity, spacecraft: &SpacecraftConfig) -> f64 {
        spacecraft.base_power_w + spacecraft.payload.imager_power_w
    }

    fn process(
        &self,
        activity: &Activity,
        state: &SpacecraftState,
        ephemeris: &[EphemerisPoint],
        config: &SimConfig,
    ) -> Result<ActivityResult, HandlerError> {
        require_points(ephemeris)?;
        let params = EoCollectParams::parse(activity)?;
        let spacecraft = &config.spacecraft;
        let payload = &spacecraft.payload;
        let site = params.site();
        let power = PowerModel::new(spacecraft);
        let capacity_gb = spacecraft.storage_capacity_gb;

        let visible = |point: &EphemerisPoint| {
            site.look_angles(point).elevation_deg >= params.min_elevation_deg
                && site.off_nadir_deg(point) <= params.max_off_nadir_deg
        };
        let windows = ground::windows_where(ephemeris, &site, |point, _| visible(point));
        let frame_gb = mb_to_gb(payload.frame_size_mb);

        let mut result = ActivityResult::new(false);
        let mut budget = Budget::from_state(state);
        let mut frames: u64 = 0;
        let mut discarded: u64 = 0;
        // Frames earned by imaging time but not yet released as whole frames.
        let mut pending_frames = 0.0;
        let mut collected_gb = 0.0;
        let mut gsd_samples: Vec<f64> = Vec::new();
        let mut shortfall_steps = 0usize;
        let mut rejected_steps = 0usize;

        if windows.is_empty() {
            result.events.push(
                event::warning(activity.start_time, category::ACCESS, "No access windows to target")
                    .with("target", site.id.as_str()),
            );
        }

        for step in steps(ephemeris) {
            let imaging = visible(step.start);
            let load_w = spacecraft.base_power_w + if imaging { payload.imager_power_w } else { 0.0 };
            let mut soc_step = power.step(budget.battery_soc, step.start, load_w, step.dt_s);
            if imaging && soc_step.is_shortfall() {
                if shortfall_steps == 0 {
                    result.events.push(
                        event::warning(step.start.time, category::POWER, "Insufficient power for imaging")
                            .with("battery_soc", budget.battery_soc),
                    );
                }
                shortfall_steps += 1;
                soc_step = power.step(budget.battery_soc, step.start, spacecraft.base_power_w, step.dt_s);
            } else if imaging {
                pending_frames += payload.frames_per_minute * step.dt_s / 60.0;
                let released = pending_frames.floor();
                pending_frames -= released;
                let released = released as u64;
                let room = ((capacity_gb - budget.storage_used_gb) / frame_gb + 1e-6)
                    .floor()
                    .max(0.0) as u64;
                let accepted = released.min(room);
                if accepted < released {
                    if rejected_steps == 0 {
                        result.events.push(
                            event::violation(step.start.time, category::STORAGE, "storage_used_gb", "Storage capacity exceeded; frames discarded")
                                .with("raw_value", budget.storage_used_gb + released as f64 * frame_gb)
                                .with("clamped_value", (budget.storage_used_gb + accepted as f64 * frame_gb).min(capacity_gb))
                                .with("capacity_gb", capacity_gb),
                        );
                    }
                    rejected_steps += 1;
                    discarded += released - accepted;
                }
                if accepted > 0 {
                    let step_gb = accepted as f64 * frame_gb;
                    frames += accepted;
                    collected_gb += step_gb;
                    budget.storage_used_gb = (budget.storage_used_gb + step_gb).min(capacity_gb);
                    let range_km = site.look_angles(step.start).range_km;
                    gsd_samples.push(payload.ifov_urad * 1e-6 * range_km * 1_000.0);
                }
            }
            budget.battery_soc = soc_step.soc;
            result.profile.push(budget.sample(step.end.time, &soc_step));
        }

        if rejected_steps > 1 {
            result.events.push(
                event::warning(activity.end_time, category::STORAGE, format!("{} further collection steps rejected: storage full", rejected_steps - 1))
                    .with("rejected_steps", rejected_steps)
                    .with("frames_discarded", discarded),
            );
        }
        result.success = frames > 0;
        if result.success {
            result.events.push(
                event::info(activity.end_time, category::PAYLOAD, "Collection complete")
                    .with("frames_collected", frames)
                    .with("data_collected_gb", collected_gb),
            );
        }

        result.state_updates.battery_soc = Some(budget.battery_soc);
        result.state_updates.storage_used_gb = Some(budget.storage_used_gb);
        result.artifact("target_id", site.id.as_str());
        result.artifact("frames_collected", frames);
        result.artifact("data_collected_gb", collected_gb);
        result.artifact(
            "access_windows",
            serde_json::to_value(&windows).unwrap_or_default(),
        );
        if let Some(best) = gsd_samples.iter().copied().reduce(f64::min) {
            result.artifact("best_gsd_m", best);
            result.artifact("mean_gsd_m", gsd_samples.iter().sum::<f64>() / gsd_samples.len() as f64);
        }
        result.artifact("power_shortfall_steps", shortfall_steps);
        result.artifact("storage_rejected_steps", rejected_steps);
        result.artifact("frames_discarded", discarded);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventKind;
    use crate::handlers::fixtures;
    use msim_orbits::ground::gmst_rad;

    /// Sub-satellite latitude/longitude at the first ephemeris point.
    fn ground_track(point: &EphemerisPoint) -> (f64, f64) {
        let [x, y, z] = point.position_km;
        let lat = z.atan2((x * x + y * y).sqrt()).to_degrees();
        let lon = (y.atan2(x) - gmst_rad(point.time)).to_degrees();
        (lat, (lon + 540.0).rem_euclid(360.0) - 180.0)
    }

    #[test]
    fn unreachable_target_collects_nothing() {
        let points = fixtures::ephemeris(500.0, 0.0, 3_600.0);
        let state = fixtures::state(&points, 0.8);
        let activity = fixtures::activity("eo_collect", 3_600.0)
            .with_param("target_lat_deg", 80.0)
            .with_param("target_lon_deg", 0.0);
        let result = EoCollectHandler
            .process(&activity, &state, &points, &fixtures::config())
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.artifacts["frames_collected"], 0);
        let warning = &result.events[0];
        assert_eq!(warning.kind, EventKind::Warning);
        assert_eq!(warning.category, category::ACCESS);
        assert_eq!(warning.message, "No access windows to target");
    }

    #[test]
    fn overhead_target_is_imaged() {
        let points = fixtures::ephemeris(500.0, 45.0, 600.0);
        let (lat, lon) = ground_track(&points[2]);
        let state = fixtures::state(&points, 0.8);
        let activity = fixtures::activity("eo_collect", 600.0)
            .with_param("target_lat_deg", lat)
            .with_param("target_lon_deg", lon)
            .with_param("target_id", "site-7");
        let result = EoCollectHandler
            .process(&activity, &state, &points, &fixtures::config())
            .unwrap();
        assert!(result.success, "{:?}", result.artifacts);
        let frames = result.artifacts["frames_collected"].as_u64().unwrap();
        assert_eq!(frames % 6, 0);
        let gb = result.artifacts["data_collected_gb"].as_f64().unwrap();
        assert!((gb - frames as f64 * 0.05).abs() < 1e-9);
        let best = result.artifacts["best_gsd_m"].as_f64().unwrap();
        assert!(best >= 0.999 && best < 1.5, "best GSD {best}");
        assert_eq!(result.state_updates.storage_used_gb, Some(gb));
    }

    #[test]
    fn full_recorder_raises_single_violation() {
        let points = fixtures::ephemeris(500.0, 45.0, 600.0);
        let (lat, lon) = ground_track(&points[3]);
        let mut state = fixtures::state(&points, 0.8);
        state.storage_used_gb = 255.9;
        let activity = fixtures::activity("eo_collect", 600.0)
            .with_param("target_lat_deg", lat)
            .with_param("target_lon_deg", lon)
            .with_param("max_off_nadir_deg", 60.0);
        let result = EoCollectHandler
            .process(&activity, &state, &points, &fixtures::config())
            .unwrap();
        let violations = result
            .events
            .iter()
            .filter(|e| e.kind == EventKind::Violation)
            .count();
        assert_eq!(violations, 1);
        assert!(result.state_updates.storage_used_gb.unwrap() <= 256.0);
        assert!(result.artifacts["storage_rejected_steps"].as_u64().unwrap() >= 2);
    }

    fn frames_over_pass(step_s: f64) -> u64 {
        let track = fixtures::ephemeris_every(500.0, 45.0, 300.0, 5.0);
        let (lat, lon) = ground_track(&track[30]);
        let points = fixtures::ephemeris_every(500.0, 45.0, 300.0, step_s);
        let state = fixtures::state(&points, 0.8);
        let activity = fixtures::activity("eo_collect", 300.0)
            .with_param("target_lat_deg", lat)
            .with_param("target_lon_deg", lon)
            .with_param("max_off_nadir_deg", 85.0)
            .with_param("min_elevation_deg", 0.0);
        let result = EoCollectHandler
            .process(&activity, &state, &points, &fixtures::config())
            .unwrap();
        assert!(result.success, "step {step_s} s: {:?}", result.artifacts);
        result.artifacts["frames_collected"].as_u64().unwrap()
    }

    #[test]
    fn frame_count_follows_imaging_time_not_step() {
        // Target stays in view for the whole 300 s: 6 frames/min gives 30 frames.
        let counts: Vec<u64> = [5.0, 45.0, 60.0].into_iter().map(frames_over_pass).collect();
        for count in &counts {
            assert!((29..=30).contains(count), "{counts:?}");
        }
        let spread = counts.iter().max().unwrap() - counts.iter().min().unwrap();
        assert!(spread <= 1, "{counts:?}");
    }

    #[test]
    fn near_full_recorder_keeps_frames_that_fit() {
        let points = fixtures::ephemeris(500.0, 45.0, 600.0);
        let (lat, lon) = ground_track(&points[3]);
        let mut state = fixtures::state(&points, 0.8);
        state.storage_used_gb = 255.98;
        let mut config = fixtures::config();
        config.spacecraft.payload.frame_size_mb = 5.0;
        let activity = fixtures::activity("eo_collect", 600.0)
            .with_param("target_lat_deg", lat)
            .with_param("target_lon_deg", lon)
            .with_param("max_off_nadir_deg", 60.0);
        let result = EoCollectHandler
            .process(&activity, &state, &points, &config)
            .unwrap();

        let frames = result.artifacts["frames_collected"].as_u64().unwrap();
        assert!((3..=4).contains(&frames), "{frames} frames");
        assert!(result.success);
        let storage = result.state_updates.storage_used_gb.unwrap();
        assert!(storage <= 256.0 && storage > 256.0 - 0.005 - 1e-9, "{storage}");
        assert!(result.artifacts["frames_discarded"].as_u64().unwrap() > 0);
        let violations = result
            .events
            .iter()
            .filter(|e| e.kind == EventKind::Violation)
            .count();
        assert_eq!(violations, 1);
    }
}
