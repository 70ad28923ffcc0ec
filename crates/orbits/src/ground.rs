//! Ground-site geometry: Earth rotation, look angles, and contact windows.

use std::f64::consts::TAU;

use chrono::{DateTime, Utc};
use msim_core::constants::EARTH_RADIUS_KM;
use msim_core::vector::{self, Vector3};
use serde::Serialize;

use crate::ephemeris::EphemerisPoint;
use crate::epoch;

/// A fixed location on a spherical Earth.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundSite {
    pub id: String,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

/// Elevation and range of a spacecraft seen from a site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAngles {
    pub elevation_deg: f64,
    pub range_km: f64,
}

/// Contiguous interval during which a site sees the spacecraft above its mask.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub duration_s: f64,
}

/// Greenwich mean sidereal time (rad), IAU-82 expression.
pub fn gmst_rad(at: DateTime<Utc>) -> f64 {
    let t = (epoch::julian_date(at) - 2_451_545.0) / 36_525.0;
    let seconds = 67_310.548_41 + (876_600.0 * 3_600.0 + 8_640_184.812_866) * t
        + 0.093_104 * t * t
        - 6.2e-6 * t * t * t;
    (seconds.rem_euclid(86_400.0) / 240.0).to_radians().rem_euclid(TAU)
}

impl GroundSite {
    pub fn new(id: impl Into<String>, latitude_deg: f64, longitude_deg: f64, altitude_km: f64) -> Self {
        Self {
            id: id.into(),
            latitude_deg,
            longitude_deg,
            altitude_km,
        }
    }

    /// Earth-fixed position (km).
    pub fn ecef_km(&self) -> Vector3 {
        let (slat, clat) = self.latitude_deg.to_radians().sin_cos();
        let (slon, clon) = self.longitude_deg.to_radians().sin_cos();
        let r = EARTH_RADIUS_KM + self.altitude_km;
        [r * clat * clon, r * clat * slon, r * slat]
    }

    /// Inertial position (km) at `at`.
    pub fn eci_km(&self, at: DateTime<Utc>) -> Vector3 {
        let ecef = self.ecef_km();
        let (s, c) = gmst_rad(at).sin_cos();
        [c * ecef[0] - s * ecef[1], s * ecef[0] + c * ecef[1], ecef[2]]
    }

    /// Elevation above the local horizon and slant range to the spacecraft.
    pub fn look_angles(&self, point: &EphemerisPoint) -> LookAngles {
        let site = self.eci_km(point.time);
        let line_of_sight = vector::sub(&point.position_km, &site);
        let range_km = vector::norm(&line_of_sight);
        let up = vector::unit(&site);
        let sin_elevation = if range_km == 0.0 {
            1.0
        } else {
            vector::dot(&line_of_sight, &up) / range_km
        };
        LookAngles {
            elevation_deg: sin_elevation.clamp(-1.0, 1.0).asin().to_degrees(),
            range_km,
        }
    }

    /// Angle between the spacecraft nadir and the line of sight to this site (deg).
    pub fn off_nadir_deg(&self, point: &EphemerisPoint) -> f64 {
        let site = self.eci_km(point.time);
        let nadir = vector::scale(&point.position_km, -1.0);
        let line_of_sight = vector::sub(&site, &point.position_km);
        vector::angle_between(&nadir, &line_of_sight).to_degrees()
    }
}

/// Contact windows of `site` over `points` with elevation at or above `min_elevation_deg`.
pub fn access_windows(
    points: &[EphemerisPoint],
    site: &GroundSite,
    min_elevation_deg: f64,
) -> Vec<AccessWindow> {
    windows_where(points, site, |_, look| look.elevation_deg >= min_elevation_deg)
}

/// Contiguous runs of points for which `in_view` holds, with elevation statistics
/// taken from `site`.
pub fn windows_where<F>(points: &[EphemerisPoint], site: &GroundSite, mut in_view: F) -> Vec<AccessWindow>
where
    F: FnMut(&EphemerisPoint, &LookAngles) -> bool,
{
    let mut windows = Vec::new();
    let mut open: Option<AccessWindow> = None;
    for point in points {
        let look = site.look_angles(point);
        if in_view(point, &look) {
            let window = open.get_or_insert(AccessWindow {
                start_time: point.time,
                end_time: point.time,
                max_elevation_deg: look.elevation_deg,
                duration_s: 0.0,
            });
            window.end_time = point.time;
            window.max_elevation_deg = window.max_elevation_deg.max(look.elevation_deg);
            window.duration_s = epoch::seconds_between(window.start_time, point.time);
        } else if let Some(window) = open.take() {
            windows.push(window);
        }
    }
    windows.extend(open);
    windows
}
