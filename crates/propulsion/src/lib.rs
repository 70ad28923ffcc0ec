//! Electric-propulsion model: thruster accounting and duty-cycled thrust-arc planning.
//!
//! Thrust is delivered in discrete arcs spread evenly around each orbit, modelling a
//! duty-cycled Hall thruster. The planner assumes unlimited propellant and power;
//! handlers enforce the real budgets arc by arc while executing a plan.

use chrono::{DateTime, Utc};
use msim_config::PropulsionConfig;
use msim_core::constants::G0;
use msim_core::time::watt_hours;
use msim_core::units::kms_to_ms;
use msim_orbits::elements::circular_speed_km_s;
use msim_orbits::epoch;
use serde::Serialize;

/// Upper bound on arcs in a single plan.
pub const MAX_ARCS: usize = 100_000;

/// Thrust, specific impulse, and electrical draw of one thruster string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElectricThruster {
    pub thrust_n: f64,
    pub isp_s: f64,
    pub power_w: f64,
}

impl From<&PropulsionConfig> for ElectricThruster {
    fn from(config: &PropulsionConfig) -> Self {
        Self {
            thrust_n: config.thrust_n,
            isp_s: config.isp_s,
            power_w: config.power_w,
        }
    }
}

impl ElectricThruster {
    /// Effective exhaust velocity vₑ = Isp·g₀ (m/s).
    pub fn exhaust_velocity_m_s(&self) -> f64 {
        self.isp_s * G0
    }

    /// Propellant mass flow at full thrust (kg/s).
    pub fn mass_flow_kg_s(&self) -> f64 {
        self.thrust_n / self.exhaust_velocity_m_s()
    }

    /// Δv delivered by a burn of `duration_s` at constant `mass_kg` (m/s).
    pub fn delta_v_for_duration(&self, mass_kg: f64, duration_s: f64) -> f64 {
        if mass_kg <= 0.0 {
            return 0.0;
        }
        self.thrust_n / mass_kg * duration_s
    }

    /// Burn time needed for `delta_v_m_s` at constant `mass_kg` (s).
    pub fn duration_for_delta_v(&self, mass_kg: f64, delta_v_m_s: f64) -> f64 {
        if self.thrust_n <= 0.0 {
            return f64::INFINITY;
        }
        delta_v_m_s * mass_kg / self.thrust_n
    }

    /// Tsiolkovsky propellant mass Δm = m₀(1 − e^(−Δv/vₑ)) (kg).
    pub fn propellant_for_delta_v(&self, mass_kg: f64, delta_v_m_s: f64) -> f64 {
        mass_kg * (1.0 - (-delta_v_m_s / self.exhaust_velocity_m_s()).exp())
    }

    /// Δv obtainable by expelling `propellant_kg` from `mass_kg` (m/s).
    pub fn delta_v_for_propellant(&self, mass_kg: f64, propellant_kg: f64) -> f64 {
        let final_mass = mass_kg - propellant_kg;
        if final_mass <= 0.0 || propellant_kg <= 0.0 {
            return 0.0;
        }
        self.exhaust_velocity_m_s() * (mass_kg / final_mass).ln()
    }

    /// Electrical energy drawn over `duration_s` (Wh).
    pub fn energy_wh(&self, duration_s: f64) -> f64 {
        watt_hours(self.power_w, duration_s)
    }
}

/// How thrust arcs are distributed around an orbit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutyCycle {
    pub arcs_per_orbit: u32,
    pub arc_width_deg: f64,
}

impl From<&PropulsionConfig> for DutyCycle {
    fn from(config: &PropulsionConfig) -> Self {
        Self {
            arcs_per_orbit: config.arcs_per_orbit.max(1),
            arc_width_deg: config.arc_width_deg,
        }
    }
}

impl DutyCycle {
    /// Fraction of each orbit spent thrusting.
    pub fn fraction(&self) -> f64 {
        (self.arcs_per_orbit as f64 * self.arc_width_deg / 360.0).min(1.0)
    }

    /// Duration of one arc for an orbit of `period_s` (s).
    pub fn arc_duration_s(&self, period_s: f64) -> f64 {
        self.arc_width_deg / 360.0 * period_s
    }
}

/// A single burn window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrustArc {
    pub index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_s: f64,
    /// Orbit position (deg from the maneuver start) where the arc begins.
    pub orbit_angle_deg: f64,
    pub mass_before_kg: f64,
    pub delta_v_m_s: f64,
    pub propellant_kg: f64,
    pub energy_wh: f64,
}

/// Ordered thrust arcs for one maneuver. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrustPlan {
    arcs: Vec<ThrustArc>,
    required_delta_v_m_s: f64,
    truncated: bool,
}

impl ThrustPlan {
    pub fn arcs(&self) -> &[ThrustArc] {
        &self.arcs
    }

    pub fn required_delta_v_m_s(&self) -> f64 {
        self.required_delta_v_m_s
    }

    /// True when the arc limit was hit before the required Δv was laid out.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn planned_delta_v_m_s(&self) -> f64 {
        self.arcs.iter().map(|arc| arc.delta_v_m_s).sum()
    }

    pub fn total_propellant_kg(&self) -> f64 {
        self.arcs.iter().map(|arc| arc.propellant_kg).sum()
    }

    pub fn total_energy_wh(&self) -> f64 {
        self.arcs.iter().map(|arc| arc.energy_wh).sum()
    }

    pub fn total_burn_s(&self) -> f64 {
        self.arcs.iter().map(|arc| arc.duration_s).sum()
    }

    /// Instant the last arc ends, if any.
    pub fn completion(&self) -> Option<DateTime<Utc>> {
        self.arcs.last().map(|arc| arc.end)
    }

    /// Overlap in seconds of `[from, to]` with any arc.
    pub fn thrust_seconds_within(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
        self.arcs
            .iter()
            .filter(|arc| arc.start < to && arc.end > from)
            .map(|arc| {
                let start = arc.start.max(from);
                let end = arc.end.min(to);
                epoch::seconds_between(start, end).max(0.0)
            })
            .sum()
    }

    /// The arc active at `at`, if any.
    pub fn arc_at(&self, at: DateTime<Utc>) -> Option<&ThrustArc> {
        self.arcs.iter().find(|arc| arc.start <= at && at < arc.end)
    }
}

/// Δv (m/s) between circular orbits at two altitudes.
pub fn circular_transfer_delta_v_m_s(start_radius_km: f64, end_radius_km: f64) -> f64 {
    kms_to_ms((circular_speed_km_s(start_radius_km) - circular_speed_km_s(end_radius_km)).abs())
}

/// Lay out duty-cycled arcs delivering `delta_v_m_s`, beginning at `start`.
///
/// Arc duration is fixed by the duty cycle; the Δv of each arc grows as mass is
/// consumed, and the last arc is shortened to the residual Δv. Planning stops at
/// [`MAX_ARCS`], in which case the plan is marked truncated.
pub fn plan_delta_v(
    thruster: &ElectricThruster,
    duty: &DutyCycle,
    delta_v_m_s: f64,
    mass_kg: f64,
    start: DateTime<Utc>,
    period_s: f64,
) -> ThrustPlan {
    let mut plan = ThrustPlan {
        arcs: Vec::new(),
        required_delta_v_m_s: delta_v_m_s.max(0.0),
        truncated: false,
    };
    if delta_v_m_s <= 0.0 || thruster.thrust_n <= 0.0 || mass_kg <= 0.0 || period_s <= 0.0 {
        return plan;
    }

    let arc_duration = duty.arc_duration_s(period_s);
    let slot_spacing = period_s / duty.arcs_per_orbit as f64;
    let mut remaining = delta_v_m_s;
    let mut mass = mass_kg;

    while remaining > 0.0 && plan.arcs.len() < MAX_ARCS {
        let index = plan.arcs.len();
        let orbit = index / duty.arcs_per_orbit as usize;
        let slot = index % duty.arcs_per_orbit as usize;
        let full_arc_dv = thruster.delta_v_for_duration(mass, arc_duration);
        let (duration, delta_v) = if full_arc_dv >= remaining {
            (thruster.duration_for_delta_v(mass, remaining), remaining)
        } else {
            (arc_duration, full_arc_dv)
        };
        let offset = orbit as f64 * period_s + slot as f64 * slot_spacing;
        let arc_start = epoch::offset(start, offset);
        let propellant = thruster.propellant_for_delta_v(mass, delta_v);

        plan.arcs.push(ThrustArc {
            index,
            start: arc_start,
            end: epoch::offset(arc_start, duration),
            duration_s: duration,
            orbit_angle_deg: slot as f64 * 360.0 / duty.arcs_per_orbit as f64,
            mass_before_kg: mass,
            delta_v_m_s: delta_v,
            propellant_kg: propellant,
            energy_wh: thruster.energy_wh(duration),
        });

        mass -= propellant;
        remaining -= delta_v;
    }
    plan.truncated = remaining > 0.0;
    plan
}

/// Plan the arcs for a circular-to-circular altitude change.
pub fn plan_altitude_change(
    thruster: &ElectricThruster,
    duty: &DutyCycle,
    start_radius_km: f64,
    end_radius_km: f64,
    mass_kg: f64,
    start: DateTime<Utc>,
    period_s: f64,
) -> ThrustPlan {
    let delta_v = circular_transfer_delta_v_m_s(start_radius_km, end_radius_km);
    plan_delta_v(thruster, duty, delta_v, mass_kg, start, period_s)
}

/// A single uninterrupted burn for time-critical maneuvers.
pub fn continuous_burn(
    thruster: &ElectricThruster,
    delta_v_m_s: f64,
    mass_kg: f64,
    start: DateTime<Utc>,
) -> ThrustPlan {
    let mut plan = ThrustPlan {
        arcs: Vec::new(),
        required_delta_v_m_s: delta_v_m_s.max(0.0),
        truncated: false,
    };
    if delta_v_m_s <= 0.0 || thruster.thrust_n <= 0.0 || mass_kg <= 0.0 {
        return plan;
    }
    let duration = thruster.duration_for_delta_v(mass_kg, delta_v_m_s);
    plan.arcs.push(ThrustArc {
        index: 0,
        start,
        end: epoch::offset(start, duration),
        duration_s: duration,
        orbit_angle_deg: 0.0,
        mass_before_kg: mass_kg,
        delta_v_m_s,
        propellant_kg: thruster.propellant_for_delta_v(mass_kg, delta_v_m_s),
        energy_wh: thruster.energy_wh(duration),
    });
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use msim_core::constants::EARTH_RADIUS_KM;

    fn thruster() -> ElectricThruster {
        ElectricThruster {
            thrust_n: 0.1,
            isp_s: 1_500.0,
            power_w: 1_500.0,
        }
    }

    fn duty() -> DutyCycle {
        DutyCycle {
            arcs_per_orbit: 2,
            arc_width_deg: 60.0,
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn rocket_equation_is_consistent() {
        let t = thruster();
        let dm = t.propellant_for_delta_v(500.0, 50.0);
        assert!((t.delta_v_for_propellant(500.0, dm) - 50.0).abs() < 1e-9);
        assert!(dm > 1.6 && dm < 1.8, "dm = {dm}");
    }

    #[test]
    fn lowering_500_to_400_needs_about_55_m_s() {
        let dv = circular_transfer_delta_v_m_s(EARTH_RADIUS_KM + 500.0, EARTH_RADIUS_KM + 400.0);
        assert!((dv - 55.8).abs() < 1.0, "dv = {dv}");
    }

    #[test]
    fn plan_meets_required_delta_v_exactly() {
        let plan = plan_delta_v(&thruster(), &duty(), 10.0, 500.0, start(), 5_670.0);
        assert!((plan.planned_delta_v_m_s() - 10.0).abs() < 1e-9);
        let arc_dv_at_start = thruster().delta_v_for_duration(500.0, 5_670.0 / 6.0);
        let expected_arcs = (10.0 / arc_dv_at_start).ceil() as usize;
        assert!(plan.arcs().len() <= expected_arcs);
        assert!(plan.arcs().len() >= expected_arcs - 1);
    }

    #[test]
    fn arcs_are_ordered_and_mass_decreases() {
        let plan = plan_delta_v(&thruster(), &duty(), 5.0, 500.0, start(), 5_670.0);
        for pair in plan.arcs().windows(2) {
            assert!(pair[0].end <= pair[1].start);
            assert!(pair[1].mass_before_kg < pair[0].mass_before_kg);
            assert!(pair[1].delta_v_m_s >= pair[0].delta_v_m_s || pair[1].index == plan.arcs().len() - 1);
        }
        assert_eq!(plan.arcs()[1].orbit_angle_deg, 180.0);
    }

    #[test]
    fn arc_energy_matches_power_times_duration() {
        let plan = plan_delta_v(&thruster(), &duty(), 1.0, 500.0, start(), 5_670.0);
        let arc = &plan.arcs()[0];
        assert!((arc.energy_wh - 1_500.0 * arc.duration_s / 3_600.0).abs() < 1e-9);
    }

    #[test]
    fn zero_thrust_produces_empty_plan() {
        let mut t = thruster();
        t.thrust_n = 0.0;
        let plan = plan_delta_v(&t, &duty(), 5.0, 500.0, start(), 5_670.0);
        assert!(plan.arcs().is_empty());
        assert_eq!(plan.required_delta_v_m_s(), 5.0);
    }

    #[test]
    fn thrust_overlap_is_clipped_to_query() {
        let plan = continuous_burn(&thruster(), 1.0, 500.0, start());
        assert!((plan.arcs()[0].duration_s - 5_000.0).abs() < 1e-9);
        let overlap = plan.thrust_seconds_within(epoch::offset(start(), 4_940.0), epoch::offset(start(), 5_060.0));
        assert!((overlap - 60.0).abs() < 1e-6);
    }

    #[test]
    fn arc_limit_marks_plan_truncated() {
        let mut weak = thruster();
        weak.thrust_n = 1e-6;
        let plan = plan_delta_v(&weak, &duty(), 1.0, 500.0, start(), 5_670.0);
        assert_eq!(plan.arcs().len(), MAX_ARCS);
        assert!(plan.is_truncated());
        assert!(plan.planned_delta_v_m_s() < plan.required_delta_v_m_s());

        let full = plan_delta_v(&thruster(), &duty(), 1.0, 500.0, start(), 5_670.0);
        assert!(!full.is_truncated());
    }
}
