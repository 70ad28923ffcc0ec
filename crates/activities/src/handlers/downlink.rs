use msim_config::{SimConfig, SpacecraftConfig};
use msim_core::units::{gb_to_mb, mb_to_gb, mbit_to_mbyte};
use msim_orbits::{EphemerisPoint, GroundSite};
use msim_power::PowerModel;
use serde::Deserialize;

use super::{Budget, require_points, steps};
use crate::event::{self, Event, category};
use crate::params::{self, ActivityParams, ParamError};
use crate::types::{Activity, ActivityResult, SpacecraftState};
use crate::{ActivityHandler, HandlerError};

fn default_min_elevation_deg() -> f64 {
    5.0
}

/// Payload data dump to a ground station.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownlinkHandler;

#[derive(Debug, Clone, Deserialize)]
pub struct DownlinkParams {
    pub station_id: String,
    pub station_lat_deg: f64,
    pub station_lon_deg: f64,
    #[serde(default)]
    pub station_alt_km: f64,
    #[serde(default = "default_min_elevation_deg")]
    pub min_elevation_deg: f64,
    #[serde(default)]
    pub data_rate_mbps: Option<f64>,
}

impl ActivityParams for DownlinkParams {
    fn check(&self) -> Result<(), ParamError> {
        params::within("station_lat_deg", self.station_lat_deg, -90.0, 90.0)?;
        params::within("station_lon_deg", self.station_lon_deg, -180.0, 360.0)?;
        params::within("min_elevation_deg", self.min_elevation_deg, -90.0, 90.0)?;
        params::optional("data_rate_mbps", self.data_rate_mbps, params::non_negative)
    }
}

impl DownlinkParams {
    pub fn site(&self) -> GroundSite {
        GroundSite::new(
            self.station_id.clone(),
            self.station_lat_deg,
            self.station_lon_deg,
            self.station_alt_km,
        )
    }
}

impl ActivityHandler for DownlinkHandler {
    fn activity_type(&self) -> &'static str {
        "downlink"
    }

    fn validate(&self, activity: &Activity) -> Vec<Event> {
        params::validation_events::<DownlinkParams>(activity)
    }

    fn power_consumption_w(&self, _activity: &Activity, spacecraft: &SpacecraftConfig) -> f64 {
        spacecraft.base_power_w + spacecraft.comms.transmitter_power_w
    }

    fn process(
        &self,
        activity: &Activity,
        state: &SpacecraftState,
        ephemeris: &[EphemerisPoint],
        config: &SimConfig,
    ) -> Result<ActivityResult, HandlerError> {
        require_points(ephemeris)?;
        let params = DownlinkParams::parse(activity)?;
        let spacecraft = &config.spacecraft;
        let site = params.site();
        let power = PowerModel::new(spacecraft);
        let rate_mbps = params
            .data_rate_mbps
            .unwrap_or(spacecraft.comms.downlink_rate_mbps);

        let mut result = ActivityResult::new(false);
        let mut budget = Budget::from_state(state);
        let mut downlinked_mb = 0.0;
        let mut contact_s = 0.0;
        let mut max_elevation = f64::NEG_INFINITY;
        let mut in_contact = false;
        let mut passes = 0usize;
        let mut shortfall_steps = 0usize;

        for step in steps(ephemeris) {
            let look = site.look_angles(step.start);
            let visible = look.elevation_deg >= params.min_elevation_deg;
            if visible && !in_contact {
                passes += 1;
                result.events.push(
                    event::info(step.start.time, category::COMMS, format!("AOS {}", site.id))
                        .with("station_id", site.id.as_str())
                        .with("elevation_deg", look.elevation_deg),
                );
            } else if !visible && in_contact {
                result.events.push(
                    event::info(step.start.time, category::COMMS, format!("LOS {}", site.id))
                        .with("station_id", site.id.as_str()),
                );
            }
            in_contact = visible;

            let load_w = spacecraft.base_power_w
                + if visible { spacecraft.comms.transmitter_power_w } else { 0.0 };
            let mut soc_step = power.step(budget.battery_soc, step.start, load_w, step.dt_s);
            if visible {
                contact_s += step.dt_s;
                max_elevation = max_elevation.max(look.elevation_deg);
                if soc_step.is_shortfall() {
                    if shortfall_steps == 0 {
                        result.events.push(
                            event::warning(step.start.time, category::POWER, "Insufficient power for transmission")
                                .with("battery_soc", budget.battery_soc),
                        );
                    }
                    shortfall_steps += 1;
                    soc_step = power.step(budget.battery_soc, step.start, spacecraft.base_power_w, step.dt_s);
                } else {
                    let on_board_mb = gb_to_mb(budget.storage_used_gb);
                    let sent_mb = mbit_to_mbyte(rate_mbps * step.dt_s).min(on_board_mb).max(0.0);
                    downlinked_mb += sent_mb;
                    budget.storage_used_gb = mb_to_gb(on_board_mb - sent_mb).max(0.0);
                }
            }
            budget.battery_soc = soc_step.soc;
            result.profile.push(budget.sample(step.end.time, &soc_step));
        }
        if in_contact {
            if let Some(last) = ephemeris.last() {
                result.events.push(
                    event::info(last.time, category::COMMS, format!("LOS {}", site.id))
                        .with("station_id", site.id.as_str()),
                );
            }
        }

        result.success = passes > 0;
        if passes == 0 {
            result.events.push(
                event::warning(activity.start_time, category::COMMS, "No contact with station")
                    .with("station_id", site.id.as_str()),
            );
        }

        result.state_updates.battery_soc = Some(budget.battery_soc);
        result.state_updates.storage_used_gb = Some(budget.storage_used_gb);
        result.artifact("station_id", site.id.as_str());
        result.artifact("total_downlinked_mb", downlinked_mb);
        result.artifact("contact_duration_s", contact_s);
        result.artifact("passes", passes);
        if max_elevation.is_finite() {
            result.artifact("max_elevation_deg", max_elevation);
        }
        result.artifact("power_shortfall_steps", shortfall_steps);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventKind;
    use crate::handlers::fixtures;

    fn downlink(lat: f64, lon: f64, storage_gb: f64) -> ActivityResult {
        let points = fixtures::ephemeris(500.0, 0.0, 1_200.0);
        let mut state = fixtures::state(&points, 0.8);
        state.storage_used_gb = storage_gb;
        let activity = fixtures::activity("downlink", 1_200.0)
            .with_param("station_id", "GS-1")
            .with_param("station_lat_deg", lat)
            .with_param("station_lon_deg", lon);
        DownlinkHandler
            .process(&activity, &state, &points, &fixtures::config())
            .unwrap()
    }

    fn subsatellite_lon() -> f64 {
        let points = fixtures::ephemeris(500.0, 0.0, 60.0);
        let [x, y, _] = points[0].position_km;
        let lon = (y.atan2(x) - msim_orbits::ground::gmst_rad(points[0].time)).to_degrees();
        (lon + 540.0).rem_euclid(360.0) - 180.0
    }

    #[test]
    fn polar_station_never_sees_equatorial_orbit() {
        let result = downlink(85.0, 0.0, 10.0);
        assert!(!result.success);
        assert_eq!(result.artifacts["total_downlinked_mb"], 0.0);
        assert!(result.events.iter().all(|e| !e.message.starts_with("AOS") && !e.message.starts_with("LOS")));
        assert_eq!(result.events[0].message, "No contact with station");
        assert_eq!(result.state_updates.storage_used_gb, Some(10.0));
    }

    #[test]
    fn pass_drains_recorder_with_aos_and_los() {
        let result = downlink(0.0, subsatellite_lon(), 1.0);
        assert!(result.success);
        let sent = result.artifacts["total_downlinked_mb"].as_f64().unwrap();
        assert!((sent - 1_000.0).abs() < 1e-6, "sent {sent}");
        assert_eq!(result.state_updates.storage_used_gb, Some(0.0));
        let comms: Vec<_> = result
            .events
            .iter()
            .filter(|e| e.category == category::COMMS && e.kind == EventKind::Info)
            .map(|e| &e.message[..3])
            .collect();
        assert_eq!(comms.first(), Some(&"AOS"));
        assert_eq!(comms.last(), Some(&"LOS"));
    }
}
