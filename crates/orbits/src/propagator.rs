//! Analytic propagation of mean Keplerian elements.
//!
//! Fidelity picks the perturbation model: two-body only, two-body plus J2 secular
//! rates, or J2 plus a linearized drag decay of the semi-major axis using an
//! exponential atmosphere.

use std::f64::consts::TAU;

use chrono::{DateTime, Utc};
use msim_config::Fidelity;
use msim_core::constants::{EARTH_RADIUS_KM, J2, MU_EARTH_KM3_S2};
use msim_core::vector::Vector3;

use crate::elements::OrbitalElements;
use crate::ephemeris::EphemerisPoint;
use crate::tle::Tle;
use crate::{OrbitError, epoch};

/// Ballistic coefficient m / (Cd·A) assumed for drag decay (kg/m²).
pub const DEFAULT_BALLISTIC_COEFFICIENT_KG_M2: f64 = 100.0;

/// Produces ephemeris points for arbitrary epochs.
pub trait Propagator: Send + Sync {
    /// Reference epoch of the underlying elements.
    fn epoch(&self) -> DateTime<Utc>;

    /// State at an arbitrary epoch.
    fn state_at(&self, at: DateTime<Utc>) -> EphemerisPoint;

    /// Points from `start` to `end` at a fixed step. The final point lands exactly on
    /// `end` even when the span is not a whole number of steps.
    fn propagate(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step_s: f64,
    ) -> Result<Vec<EphemerisPoint>, OrbitError> {
        if !(step_s.is_finite() && step_s > 0.0) {
            return Err(OrbitError::InvalidStep(step_s));
        }
        let span = epoch::seconds_between(start, end);
        if span < 0.0 {
            return Err(OrbitError::InvalidSpan);
        }
        let whole_steps = (span / step_s).floor() as usize;
        let mut points = Vec::with_capacity(whole_steps + 2);
        for k in 0..=whole_steps {
            points.push(self.state_at(epoch::offset(start, k as f64 * step_s)));
        }
        if points.last().is_some_and(|p| p.time < end) {
            points.push(self.state_at(end));
        }
        Ok(points)
    }
}

/// Perturbations applied on top of two-body motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PerturbationModel {
    TwoBody,
    J2Secular,
    J2WithDrag { ballistic_coefficient_kg_m2: f64 },
}

impl From<Fidelity> for PerturbationModel {
    fn from(fidelity: Fidelity) -> Self {
        match fidelity {
            Fidelity::Low => PerturbationModel::TwoBody,
            Fidelity::Medium => PerturbationModel::J2Secular,
            Fidelity::High => PerturbationModel::J2WithDrag {
                ballistic_coefficient_kg_m2: DEFAULT_BALLISTIC_COEFFICIENT_KG_M2,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SecularRates {
    raan_rad_s: f64,
    arg_perigee_rad_s: f64,
    mean_anomaly_rad_s: f64,
    semi_major_axis_km_s: f64,
}

/// Keplerian propagator with optional secular perturbations.
#[derive(Debug, Clone)]
pub struct KeplerPropagator {
    elements: OrbitalElements,
    model: PerturbationModel,
    rates: SecularRates,
}

impl KeplerPropagator {
    pub fn new(elements: OrbitalElements, model: PerturbationModel) -> Self {
        let rates = secular_rates(&elements, model);
        Self {
            elements,
            model,
            rates,
        }
    }

    pub fn from_tle(tle: &Tle, fidelity: Fidelity) -> Self {
        Self::new(tle.elements(), fidelity.into())
    }

    /// Circular orbit at `altitude_km` and `inclination_deg`, referenced to `epoch`.
    pub fn circular(
        altitude_km: f64,
        inclination_deg: f64,
        epoch: DateTime<Utc>,
        fidelity: Fidelity,
    ) -> Self {
        Self::new(
            OrbitalElements::circular(altitude_km, inclination_deg, epoch),
            fidelity.into(),
        )
    }

    pub fn from_state(
        position_km: &Vector3,
        velocity_km_s: &Vector3,
        epoch: DateTime<Utc>,
        fidelity: Fidelity,
    ) -> Result<Self, OrbitError> {
        let elements = OrbitalElements::from_state(position_km, velocity_km_s, epoch)?;
        Ok(Self::new(elements, fidelity.into()))
    }

    pub fn elements(&self) -> &OrbitalElements {
        &self.elements
    }

    pub fn model(&self) -> PerturbationModel {
        self.model
    }

    /// Mean elements advanced to `at`.
    pub fn elements_at(&self, at: DateTime<Utc>) -> OrbitalElements {
        let dt = epoch::seconds_between(self.elements.epoch, at);
        let base = &self.elements;
        let n0 = base.mean_motion_rad_s();
        let a_dot = self.rates.semi_major_axis_km_s;
        let floor = EARTH_RADIUS_KM + 80.0;
        let semi_major_axis_km = (base.semi_major_axis_km + a_dot * dt).max(floor);
        // n' = -3/2 n/a · a' integrated once more for the anomaly.
        let n_dot = -1.5 * n0 / base.semi_major_axis_km * a_dot;
        let mean_anomaly_rad = base.mean_anomaly_rad
            + (self.rates.mean_anomaly_rad_s) * dt
            + 0.5 * n_dot * dt * dt;

        OrbitalElements {
            semi_major_axis_km,
            eccentricity: base.eccentricity,
            inclination_rad: base.inclination_rad,
            raan_rad: (base.raan_rad + self.rates.raan_rad_s * dt).rem_euclid(TAU),
            arg_perigee_rad: (base.arg_perigee_rad + self.rates.arg_perigee_rad_s * dt)
                .rem_euclid(TAU),
            mean_anomaly_rad: mean_anomaly_rad.rem_euclid(TAU),
            epoch: at,
        }
    }
}

impl Propagator for KeplerPropagator {
    fn epoch(&self) -> DateTime<Utc> {
        self.elements.epoch
    }

    fn state_at(&self, at: DateTime<Utc>) -> EphemerisPoint {
        let (position_km, velocity_km_s) = self.elements_at(at).to_state();
        EphemerisPoint {
            time: at,
            position_km,
            velocity_km_s,
        }
    }
}

fn secular_rates(elements: &OrbitalElements, model: PerturbationModel) -> SecularRates {
    let n = elements.mean_motion_rad_s();
    let mut rates = SecularRates {
        raan_rad_s: 0.0,
        arg_perigee_rad_s: 0.0,
        mean_anomaly_rad_s: n,
        semi_major_axis_km_s: 0.0,
    };
    if model == PerturbationModel::TwoBody {
        return rates;
    }

    let e2 = elements.eccentricity * elements.eccentricity;
    let p = elements.semi_latus_rectum_km();
    let factor = J2 * (EARTH_RADIUS_KM / p).powi(2);
    let cos_i = elements.inclination_rad.cos();
    rates.raan_rad_s = -1.5 * n * factor * cos_i;
    rates.arg_perigee_rad_s = 0.75 * n * factor * (5.0 * cos_i * cos_i - 1.0);
    rates.mean_anomaly_rad_s = n * (1.0 + 0.75 * factor * (1.0 - e2).sqrt() * (3.0 * cos_i * cos_i - 1.0));

    if let PerturbationModel::J2WithDrag {
        ballistic_coefficient_kg_m2,
    } = model
    {
        let a_m = elements.semi_major_axis_km * 1_000.0;
        let altitude_km = elements.semi_major_axis_km - EARTH_RADIUS_KM;
        let rho = atmospheric_density_kg_m3(altitude_km);
        let mu_m = MU_EARTH_KM3_S2 * 1e9;
        let a_dot_m_s = -rho * (mu_m * a_m).sqrt() / ballistic_coefficient_kg_m2.max(1e-6);
        rates.semi_major_axis_km_s = a_dot_m_s / 1_000.0;
    }
    rates
}

/// Piecewise exponential atmosphere (base altitude km, base density kg/m³, scale height km).
const ATMOSPHERE_TABLE: [(f64, f64, f64); 10] = [
    (150.0, 2.070e-9, 22.523),
    (180.0, 5.464e-10, 29.740),
    (200.0, 2.789e-10, 37.105),
    (250.0, 7.248e-11, 45.546),
    (300.0, 2.418e-11, 53.628),
    (350.0, 9.518e-12, 53.298),
    (400.0, 3.725e-12, 58.515),
    (450.0, 1.585e-12, 60.828),
    (500.0, 6.967e-13, 63.822),
    (600.0, 1.454e-13, 71.835),
];

/// Exponential-atmosphere density at `altitude_km` (kg/m³).
pub fn atmospheric_density_kg_m3(altitude_km: f64) -> f64 {
    if altitude_km < ATMOSPHERE_TABLE[0].0 {
        let (h0, rho0, scale) = ATMOSPHERE_TABLE[0];
        return rho0 * (-(altitude_km - h0) / scale).exp();
    }
    let (h0, rho0, scale) = ATMOSPHERE_TABLE
        .iter()
        .rev()
        .find(|(base, _, _)| altitude_km >= *base)
        .copied()
        .unwrap_or(ATMOSPHERE_TABLE[0]);
    rho0 * (-(altitude_km - h0) / scale).exp()
}
