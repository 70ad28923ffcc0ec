//! Classical orbital elements and conversions to and from Cartesian state vectors.

use std::f64::consts::TAU;

use chrono::{DateTime, Utc};
use msim_core::constants::{EARTH_RADIUS_KM, MU_EARTH_KM3_S2};
use msim_core::vector::{self, Vector3};

use crate::OrbitError;

const CIRCULAR_ECCENTRICITY: f64 = 1e-10;

/// Osculating Keplerian elements about Earth. Angles are in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalElements {
    pub semi_major_axis_km: f64,
    pub eccentricity: f64,
    pub inclination_rad: f64,
    pub raan_rad: f64,
    pub arg_perigee_rad: f64,
    pub mean_anomaly_rad: f64,
    pub epoch: DateTime<Utc>,
}

impl OrbitalElements {
    /// Near-circular orbit at `altitude_km` with zero node, perigee, and mean anomaly.
    pub fn circular(altitude_km: f64, inclination_deg: f64, epoch: DateTime<Utc>) -> Self {
        Self {
            semi_major_axis_km: EARTH_RADIUS_KM + altitude_km,
            eccentricity: 0.0,
            inclination_rad: inclination_deg.to_radians(),
            raan_rad: 0.0,
            arg_perigee_rad: 0.0,
            mean_anomaly_rad: 0.0,
            epoch,
        }
    }

    /// Mean motion (rad/s).
    pub fn mean_motion_rad_s(&self) -> f64 {
        (MU_EARTH_KM3_S2 / self.semi_major_axis_km.powi(3)).sqrt()
    }

    /// Orbital period (s).
    pub fn period_s(&self) -> f64 {
        TAU / self.mean_motion_rad_s()
    }

    /// Semi-latus rectum (km).
    pub fn semi_latus_rectum_km(&self) -> f64 {
        self.semi_major_axis_km * (1.0 - self.eccentricity * self.eccentricity)
    }

    /// Recover elements from an ECI state vector.
    pub fn from_state(
        position_km: &Vector3,
        velocity_km_s: &Vector3,
        epoch: DateTime<Utc>,
    ) -> Result<Self, OrbitError> {
        let r = vector::norm(position_km);
        let v = vector::norm(velocity_km_s);
        if r == 0.0 {
            return Err(OrbitError::Degenerate("zero position vector"));
        }
        let energy = 0.5 * v * v - MU_EARTH_KM3_S2 / r;
        if energy >= 0.0 {
            return Err(OrbitError::Unbound {
                energy_km2_s2: energy,
            });
        }
        let h = vector::cross(position_km, velocity_km_s);
        let h_mag = vector::norm(&h);
        if h_mag == 0.0 {
            return Err(OrbitError::Degenerate("rectilinear trajectory"));
        }
        let h_hat = vector::scale(&h, 1.0 / h_mag);
        let (node, q) = plane_basis(&h_hat);

        let rv = vector::dot(position_km, velocity_km_s);
        let e_vec = vector::scale(
            &vector::sub(
                &vector::scale(position_km, v * v - MU_EARTH_KM3_S2 / r),
                &vector::scale(velocity_km_s, rv),
            ),
            1.0 / MU_EARTH_KM3_S2,
        );
        let eccentricity = vector::norm(&e_vec);
        let semi_major_axis_km = -MU_EARTH_KM3_S2 / (2.0 * energy);

        let in_plane_angle = |w: &Vector3| -> f64 {
            vector::dot(w, &q).atan2(vector::dot(w, &node)).rem_euclid(TAU)
        };

        let arg_perigee_rad = if eccentricity > CIRCULAR_ECCENTRICITY {
            in_plane_angle(&e_vec)
        } else {
            0.0
        };
        let argument_of_latitude = in_plane_angle(position_km);
        let true_anomaly = (argument_of_latitude - arg_perigee_rad).rem_euclid(TAU);

        Ok(Self {
            semi_major_axis_km,
            eccentricity,
            inclination_rad: h_hat[2].clamp(-1.0, 1.0).acos(),
            raan_rad: node[1].atan2(node[0]).rem_euclid(TAU),
            arg_perigee_rad,
            mean_anomaly_rad: true_to_mean(true_anomaly, eccentricity),
            epoch,
        })
    }

    /// ECI position and velocity at the stored mean anomaly.
    pub fn to_state(&self) -> (Vector3, Vector3) {
        let e = self.eccentricity;
        let nu = mean_to_true(self.mean_anomaly_rad, e);
        let p = self.semi_latus_rectum_km();
        let r_mag = p / (1.0 + e * nu.cos());

        let node = [self.raan_rad.cos(), self.raan_rad.sin(), 0.0];
        let (si, ci) = self.inclination_rad.sin_cos();
        let h_hat = [si * self.raan_rad.sin(), -si * self.raan_rad.cos(), ci];
        let q = vector::cross(&h_hat, &node);

        let (sw, cw) = self.arg_perigee_rad.sin_cos();
        let periapsis = vector::add(&vector::scale(&node, cw), &vector::scale(&q, sw));
        let normal = vector::add(&vector::scale(&node, -sw), &vector::scale(&q, cw));

        let (sn, cn) = nu.sin_cos();
        let position = vector::scale(
            &vector::add(&vector::scale(&periapsis, cn), &vector::scale(&normal, sn)),
            r_mag,
        );
        let speed_scale = (MU_EARTH_KM3_S2 / p).sqrt();
        let velocity = vector::scale(
            &vector::add(
                &vector::scale(&periapsis, -sn),
                &vector::scale(&normal, e + cn),
            ),
            speed_scale,
        );
        (position, velocity)
    }
}

/// Ascending-node direction and the in-plane vector 90° ahead of it.
fn plane_basis(h_hat: &Vector3) -> (Vector3, Vector3) {
    let k_cross_h = [-h_hat[1], h_hat[0], 0.0];
    let node = if vector::norm(&k_cross_h) < 1e-12 {
        [1.0, 0.0, 0.0]
    } else {
        vector::unit(&k_cross_h)
    };
    let q = vector::cross(h_hat, &node);
    (node, q)
}

/// Solve Kepler's equation for the eccentric anomaly with Newton iteration.
pub fn eccentric_anomaly(mean_anomaly: f64, eccentricity: f64) -> f64 {
    let m = mean_anomaly.rem_euclid(TAU);
    let mut e_anom = if eccentricity < 0.8 { m } else { std::f64::consts::PI };
    for _ in 0..50 {
        let f = e_anom - eccentricity * e_anom.sin() - m;
        let step = f / (1.0 - eccentricity * e_anom.cos());
        e_anom -= step;
        if step.abs() < 1e-13 {
            break;
        }
    }
    e_anom
}

/// Mean anomaly → true anomaly.
pub fn mean_to_true(mean_anomaly: f64, eccentricity: f64) -> f64 {
    let e_anom = eccentric_anomaly(mean_anomaly, eccentricity);
    let (s, c) = (0.5 * e_anom).sin_cos();
    (2.0 * ((1.0 + eccentricity).sqrt() * s).atan2((1.0 - eccentricity).sqrt() * c))
        .rem_euclid(TAU)
}

/// True anomaly → mean anomaly.
pub fn true_to_mean(true_anomaly: f64, eccentricity: f64) -> f64 {
    let (s, c) = (0.5 * true_anomaly).sin_cos();
    let e_anom = 2.0 * ((1.0 - eccentricity).sqrt() * s).atan2((1.0 + eccentricity).sqrt() * c);
    (e_anom - eccentricity * e_anom.sin()).rem_euclid(TAU)
}

/// Circular orbital speed at radius `radius_km` (km/s).
pub fn circular_speed_km_s(radius_km: f64) -> f64 {
    (MU_EARTH_KM3_S2 / radius_km).sqrt()
}

/// Radius of the circular orbit with speed `speed_km_s` (km).
pub fn circular_radius_km(speed_km_s: f64) -> f64 {
    MU_EARTH_KM3_S2 / (speed_km_s * speed_km_s)
}
