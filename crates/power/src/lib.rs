//! Power subsystem model: cylindrical-shadow eclipse test, solar array output, and
//! battery state-of-charge integration.
//!
//! Everything here is a pure function of the spacecraft configuration and the
//! inputs. Handlers detect power shortfalls through the `power_limited` flag
//! returned by [`PowerModel::update_soc`] instead of reasoning about batteries
//! themselves.

use chrono::{DateTime, Utc};
use msim_config::{PanelPointing, SpacecraftConfig};
use msim_core::constants::{EARTH_RADIUS_KM, SOLAR_FLUX_W_M2};
use msim_core::time::watt_hours;
use msim_core::vector::{self, Vector3};
use msim_orbits::{EphemerisPoint, epoch};
use serde::Serialize;

const CLAMP_TOLERANCE: f64 = 1e-12;

/// Outcome of one SOC integration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SocStep {
    /// State of charge after the step.
    pub soc: f64,
    /// True iff a rate limit or SOC bound changed the unclamped result.
    pub power_limited: bool,
    /// Generation minus consumption before any limit (W).
    pub net_power_w: f64,
    pub generation_w: f64,
    pub consumption_w: f64,
    pub in_eclipse: bool,
}

impl SocStep {
    /// A limit bit while the bus was drawing from the battery: loads could not be served.
    pub fn is_shortfall(&self) -> bool {
        self.power_limited && self.net_power_w < 0.0
    }
}

/// Sunlit/eclipse geometry test with a cylindrical Earth shadow.
///
/// The spacecraft is shadowed when it lies behind Earth relative to the sun
/// and within one Earth radius of the Earth–sun line.
pub fn in_eclipse(position_km: &Vector3, sun_direction: &Vector3) -> bool {
    let sun = vector::unit(sun_direction);
    let along = vector::dot(position_km, &sun);
    if along >= 0.0 {
        return false;
    }
    let perpendicular = vector::sub(position_km, &vector::scale(&sun, along));
    vector::norm(&perpendicular) < EARTH_RADIUS_KM
}

/// Power model bound to one spacecraft design.
#[derive(Debug, Clone, Copy)]
pub struct PowerModel<'a> {
    spacecraft: &'a SpacecraftConfig,
    sun: Vector3,
}

impl<'a> PowerModel<'a> {
    pub fn new(spacecraft: &'a SpacecraftConfig) -> Self {
        Self {
            spacecraft,
            sun: vector::unit(&spacecraft.power.sun_direction),
        }
    }

    pub fn sun_direction(&self) -> Vector3 {
        self.sun
    }

    pub fn in_eclipse(&self, position_km: &Vector3) -> bool {
        in_eclipse(position_km, &self.sun)
    }

    /// Cosine of the angle between the array normal and the sun line.
    pub fn incidence_cosine(&self, position_km: &Vector3) -> f64 {
        match self.spacecraft.power.panel_pointing {
            PanelPointing::SunTracking => 1.0,
            PanelPointing::Zenith => vector::dot(&vector::unit(position_km), &self.sun),
            PanelPointing::Nadir => -vector::dot(&vector::unit(position_km), &self.sun),
        }
    }

    /// Array output (W): flux × area × efficiency × cos(incidence), zero in shadow.
    pub fn solar_generation_w(&self, position_km: &Vector3) -> f64 {
        if self.in_eclipse(position_km) {
            return 0.0;
        }
        let cosine = self.incidence_cosine(position_km);
        if cosine <= 0.0 {
            return 0.0;
        }
        SOLAR_FLUX_W_M2
            * self.spacecraft.solar_panel_area_m2
            * self.spacecraft.solar_panel_efficiency
            * cosine
    }

    /// Integrate the battery over `dt_s` seconds with the given generation and load.
    pub fn update_soc(&self, soc: f64, generation_w: f64, consumption_w: f64, dt_s: f64) -> SocStep {
        let power = &self.spacecraft.power;
        let capacity_wh = self.spacecraft.battery_capacity_wh;
        let net_power_w = generation_w - consumption_w;

        let (unlimited_w, limited_w) = if net_power_w > 0.0 {
            let efficiency = power.round_trip_efficiency;
            (
                net_power_w * efficiency,
                net_power_w.min(power.max_charge_rate_w) * efficiency,
            )
        } else {
            (net_power_w, net_power_w.max(-power.max_discharge_rate_w))
        };

        let unclamped = soc + watt_hours(unlimited_w, dt_s) / capacity_wh;
        let integrated = soc + watt_hours(limited_w, dt_s) / capacity_wh;
        // A battery already below the floor is held where it is, never raised.
        let floor = power.min_soc.min(soc).max(0.0);
        let new_soc = integrated.clamp(floor, 1.0);

        SocStep {
            soc: new_soc,
            power_limited: (new_soc - unclamped).abs() > CLAMP_TOLERANCE,
            net_power_w,
            generation_w,
            consumption_w,
            in_eclipse: false,
        }
    }

    /// Generation at `point` followed by an SOC update.
    pub fn step(&self, soc: f64, point: &EphemerisPoint, consumption_w: f64, dt_s: f64) -> SocStep {
        let generation_w = self.solar_generation_w(&point.position_km);
        SocStep {
            in_eclipse: self.in_eclipse(&point.position_km),
            ..self.update_soc(soc, generation_w, consumption_w, dt_s)
        }
    }
}

/// Contiguous shadow interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EclipseWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_s: f64,
}

/// Shadow intervals over a sampled ephemeris.
pub fn eclipse_windows(points: &[EphemerisPoint], sun_direction: &Vector3) -> Vec<EclipseWindow> {
    let mut windows = Vec::new();
    let mut open: Option<DateTime<Utc>> = None;
    let mut last_shadowed: Option<DateTime<Utc>> = None;
    for point in points {
        if in_eclipse(&point.position_km, sun_direction) {
            open.get_or_insert(point.time);
            last_shadowed = Some(point.time);
        } else if let (Some(start), Some(end)) = (open.take(), last_shadowed.take()) {
            windows.push(window(start, end));
        }
    }
    if let (Some(start), Some(end)) = (open, last_shadowed) {
        windows.push(window(start, end));
    }
    windows
}

fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> EclipseWindow {
    EclipseWindow {
        start_time: start,
        end_time: end,
        duration_s: epoch::seconds_between(start, end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use msim_config::{
        AdcsConfig, CommsConfig, PayloadConfig, PowerConfig, PropulsionConfig,
    };

    fn spacecraft() -> SpacecraftConfig {
        SpacecraftConfig {
            name: "power-test".into(),
            dry_mass_kg: 450.0,
            initial_propellant_kg: 50.0,
            battery_capacity_wh: 1_000.0,
            solar_panel_area_m2: 2.0,
            solar_panel_efficiency: 0.3,
            base_power_w: 100.0,
            storage_capacity_gb: 100.0,
            power: PowerConfig {
                max_charge_rate_w: 300.0,
                max_discharge_rate_w: 500.0,
                round_trip_efficiency: 0.9,
                min_soc: 0.2,
                ..PowerConfig::default()
            },
            propulsion: PropulsionConfig::default(),
            payload: PayloadConfig::default(),
            comms: CommsConfig::default(),
            adcs: AdcsConfig::default(),
        }
    }

    #[test]
    fn shadow_is_a_cylinder_behind_earth() {
        let sun = [1.0, 0.0, 0.0];
        assert!(in_eclipse(&[-7_000.0, 0.0, 0.0], &sun));
        assert!(in_eclipse(&[-7_000.0, 6_000.0, 0.0], &sun));
        assert!(!in_eclipse(&[-7_000.0, 6_500.0, 0.0], &sun));
        assert!(!in_eclipse(&[7_000.0, 0.0, 0.0], &sun));
        assert!(!in_eclipse(&[0.0, 7_000.0, 0.0], &sun));
    }

    #[test]
    fn generation_uses_solar_constant() {
        let config = spacecraft();
        let model = PowerModel::new(&config);
        let generation = model.solar_generation_w(&[7_000.0, 0.0, 0.0]);
        assert!((generation - 1361.0 * 2.0 * 0.3).abs() < 1e-9);
        assert_eq!(model.solar_generation_w(&[-7_000.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn nadir_panels_see_nothing_on_the_day_side() {
        let mut config = spacecraft();
        config.power.panel_pointing = PanelPointing::Nadir;
        let model = PowerModel::new(&config);
        assert_eq!(model.solar_generation_w(&[7_000.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn charge_is_rate_limited_and_flagged() {
        let config = spacecraft();
        let model = PowerModel::new(&config);
        let step = model.update_soc(0.5, 800.0, 100.0, 3_600.0);
        // 700 W surplus limited to 300 W, times 0.9 efficiency, over one hour.
        assert!((step.soc - (0.5 + 270.0 / 1_000.0)).abs() < 1e-12);
        assert!(step.power_limited);
        assert!(!step.is_shortfall());
    }

    #[test]
    fn unconstrained_charge_is_not_flagged() {
        let config = spacecraft();
        let model = PowerModel::new(&config);
        let step = model.update_soc(0.5, 200.0, 100.0, 60.0);
        assert!(!step.power_limited);
        assert!((step.soc - (0.5 + 100.0 * 0.9 / 60.0 / 1_000.0)).abs() < 1e-12);
    }

    #[test]
    fn discharge_stops_at_min_soc() {
        let config = spacecraft();
        let model = PowerModel::new(&config);
        let step = model.update_soc(0.25, 0.0, 400.0, 3_600.0);
        assert_eq!(step.soc, 0.2);
        assert!(step.power_limited);
        assert!(step.is_shortfall());
    }

    #[test]
    fn battery_below_floor_is_not_raised() {
        let config = spacecraft();
        let model = PowerModel::new(&config);
        let step = model.update_soc(0.1, 0.0, 100.0, 60.0);
        assert_eq!(step.soc, 0.1);
        assert!(step.is_shortfall());
    }

    #[test]
    fn full_battery_clips_at_one() {
        let config = spacecraft();
        let model = PowerModel::new(&config);
        let step = model.update_soc(0.999, 400.0, 100.0, 600.0);
        assert_eq!(step.soc, 1.0);
        assert!(step.power_limited);
    }

    #[test]
    fn energy_per_step_is_bounded_by_rates() {
        let config = spacecraft();
        let model = PowerModel::new(&config);
        let dt = 120.0;
        let bound = config.power.max_charge_rate_w.max(config.power.max_discharge_rate_w) * dt
            / 3_600.0;
        for &(soc, generation, load) in &[
            (0.5, 2_000.0, 0.0),
            (0.5, 0.0, 5_000.0),
            (0.9, 600.0, 50.0),
            (0.21, 0.0, 900.0),
        ] {
            let step = model.update_soc(soc, generation, load, dt);
            assert!((step.soc - soc).abs() * config.battery_capacity_wh <= bound + 1e-9);
            assert!((0.0..=1.0).contains(&step.soc));
        }
    }

    #[test]
    fn eclipse_windows_group_consecutive_shadow_points() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let point = |s: f64, x: f64| EphemerisPoint {
            time: epoch::offset(t0, s),
            position_km: [x, 0.0, 0.0],
            velocity_km_s: [0.0, 7.5, 0.0],
        };
        let points = [
            point(0.0, 7_000.0),
            point(60.0, -7_000.0),
            point(120.0, -7_000.0),
            point(180.0, 7_000.0),
            point(240.0, -7_000.0),
        ];
        let windows = eclipse_windows(&points, &[1.0, 0.0, 0.0]);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].duration_s, 60.0);
        assert_eq!(windows[1].start_time, epoch::offset(t0, 240.0));
    }
}
