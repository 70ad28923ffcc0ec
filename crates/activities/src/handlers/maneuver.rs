//! Executing a thrust plan against the power and propellant budgets.

use chrono::{DateTime, Utc};
use msim_config::SpacecraftConfig;
use msim_core::constants::MU_EARTH_KM3_S2;
use msim_core::units::ms_to_kms;
use msim_core::vector::{self, Vector3};
use msim_orbits::{EphemerisPoint, epoch};
use msim_orbits::elements::{circular_radius_km, circular_speed_km_s};
use msim_power::PowerModel;
use msim_propulsion::{ElectricThruster, ThrustPlan};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Budget, steps};
use crate::event::{self, Event, category};
use crate::types::{ProfileSample, SpacecraftState, StateUpdate};

/// Fraction of the requested Δv that counts as a successful maneuver.
pub(crate) const SUCCESS_FRACTION: f64 = 0.95;

#[derive(Debug, Clone)]
pub(crate) struct BurnOutcome {
    pub budget: Budget,
    pub achieved_delta_v_m_s: f64,
    pub propellant_used_kg: f64,
    pub arcs_completed: usize,
    pub shortfall_steps: usize,
    pub propellant_exhausted: bool,
    pub events: Vec<Event>,
    pub profile: Vec<ProfileSample>,
}

impl BurnOutcome {
    pub fn met(&self, requested_delta_v_m_s: f64) -> bool {
        requested_delta_v_m_s <= 0.0 || self.achieved_delta_v_m_s >= SUCCESS_FRACTION * requested_delta_v_m_s
    }
}

/// Step through `points`, thrusting only inside the planned arcs.
///
/// Each step draws bus power plus thruster power in proportion to the thrusting
/// share of the step. A step the battery cannot serve delivers no thrust; once
/// the tank runs dry the burn stops.
pub(crate) fn execute_burn(
    state: &SpacecraftState,
    points: &[EphemerisPoint],
    spacecraft: &SpacecraftConfig,
    thruster: &ElectricThruster,
    plan: &ThrustPlan,
) -> BurnOutcome {
    let power = PowerModel::new(spacecraft);
    let base_w = spacecraft.base_power_w;
    let arcs = plan.arcs();
    let mut delivered = vec![(0.0_f64, 0.0_f64); arcs.len()];
    let mut outcome = BurnOutcome {
        budget: Budget::from_state(state),
        achieved_delta_v_m_s: 0.0,
        propellant_used_kg: 0.0,
        arcs_completed: 0,
        shortfall_steps: 0,
        propellant_exhausted: false,
        events: Vec::new(),
        profile: Vec::new(),
    };

    if let (true, Some(first)) = (plan.is_truncated(), points.first()) {
        warn!(
            arcs = arcs.len(),
            planned_delta_v_m_s = plan.planned_delta_v_m_s(),
            "thrust plan truncated at arc limit"
        );
        outcome.events.push(
            event::warning(first.time, category::THRUST, format!("Thrust plan truncated at {} arcs", arcs.len()))
                .with("planned_delta_v_m_s", plan.planned_delta_v_m_s())
                .with("requested_delta_v_m_s", plan.required_delta_v_m_s()),
        );
    }

    for step in steps(points) {
        let from = step.start.time;
        let to = step.end.time;
        let remaining_dv = plan.required_delta_v_m_s() - outcome.achieved_delta_v_m_s;
        let mut thrust_s = if outcome.propellant_exhausted || remaining_dv <= 0.0 {
            0.0
        } else {
            plan.thrust_seconds_within(from, to)
        };
        let load_w = base_w + thruster.power_w * thrust_s / step.dt_s;
        let mut soc_step = power.step(outcome.budget.battery_soc, step.start, load_w, step.dt_s);

        if thrust_s > 0.0 && soc_step.is_shortfall() {
            if outcome.shortfall_steps == 0 {
                outcome.events.push(
                    event::warning(from, category::POWER, "Insufficient power for thrusting; step skipped")
                        .with("battery_soc", outcome.budget.battery_soc)
                        .with("required_w", load_w)
                        .with("generation_w", soc_step.generation_w),
                );
            }
            outcome.shortfall_steps += 1;
            thrust_s = 0.0;
            soc_step = power.step(outcome.budget.battery_soc, step.start, base_w, step.dt_s);
        }
        outcome.budget.battery_soc = soc_step.soc;

        if thrust_s > 0.0 {
            let mass = outcome.budget.mass_kg;
            let mut delta_v = thruster.delta_v_for_duration(mass, thrust_s).min(remaining_dv);
            let mut propellant = thruster.propellant_for_delta_v(mass, delta_v);
            if propellant > outcome.budget.propellant_kg {
                propellant = outcome.budget.propellant_kg;
                delta_v = thruster.delta_v_for_propellant(mass, propellant);
                outcome.propellant_exhausted = true;
                debug!(at = %from, remaining_kg = outcome.budget.propellant_kg, "propellant exhausted mid-burn");
                outcome.events.push(
                    event::warning(from, category::PROPELLANT, "Propellant exhausted; burn cut short")
                        .with("achieved_delta_v_m_s", outcome.achieved_delta_v_m_s + delta_v)
                        .with("requested_delta_v_m_s", plan.required_delta_v_m_s()),
                );
            }

            for (arc, share) in arcs.iter().zip(delivered.iter_mut()) {
                let overlap = overlap_s(arc.start, arc.end, from, to);
                if overlap > 0.0 {
                    share.0 += delta_v * overlap / thrust_s;
                    share.1 += propellant * overlap / thrust_s;
                }
            }
            outcome.achieved_delta_v_m_s += delta_v;
            outcome.propellant_used_kg += propellant;
            outcome.budget.propellant_kg -= propellant;
            outcome.budget.mass_kg -= propellant;
        }
        outcome.profile.push(outcome.budget.sample(to, &soc_step));

        for (arc, (delta_v, propellant)) in arcs.iter().zip(&delivered) {
            if arc.end > from && arc.end <= to && *delta_v > 0.0 {
                outcome.arcs_completed += 1;
                debug!(arc = arc.index, delta_v_m_s = *delta_v, "thrust arc complete");
                outcome.events.push(
                    event::info(arc.end, category::THRUST, format!("Thrust arc {} complete", arc.index))
                        .with("arc_index", arc.index)
                        .with("duration_s", arc.duration_s)
                        .with("delta_v_m_s", *delta_v)
                        .with("propellant_kg", *propellant),
                );
            }
        }
    }
    outcome
}

fn overlap_s(
    arc_start: DateTime<Utc>,
    arc_end: DateTime<Utc>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> f64 {
    let start = arc_start.max(from);
    let end = arc_end.min(to);
    if end > start {
        epoch::seconds_between(start, end)
    } else {
        0.0
    }
}

/// Period of a circular orbit of `radius_km` (s).
pub(crate) fn circular_period_s(radius_km: f64) -> f64 {
    std::f64::consts::TAU * (radius_km.powi(3) / MU_EARTH_KM3_S2).sqrt()
}

/// Radius of the circular orbit reached after an along-track burn of `delta_v_m_s`.
/// A retrograde burn (`lowering`) leaves a faster, lower orbit.
pub(crate) fn radius_after_along_track(radius_km: f64, delta_v_m_s: f64, lowering: bool) -> f64 {
    let v0 = circular_speed_km_s(radius_km);
    let dv = ms_to_kms(delta_v_m_s);
    let v_new = if lowering { v0 + dv } else { (v0 - dv).max(1e-6) };
    circular_radius_km(v_new)
}

/// Move `point` radially onto a circular orbit of `radius_km`, keeping plane and phase.
pub(crate) fn circularize(point: &EphemerisPoint, radius_km: f64) -> (Vector3, Vector3) {
    let r_hat = vector::unit(&point.position_km);
    let radial_speed = vector::dot(&point.velocity_km_s, &r_hat);
    let along = vector::sub(&point.velocity_km_s, &vector::scale(&r_hat, radial_speed));
    let t_hat = vector::unit(&along);
    (
        vector::scale(&r_hat, radius_km),
        vector::scale(&t_hat, circular_speed_km_s(radius_km)),
    )
}

/// Fold a burn outcome into the handler's state update, moving the orbit when
/// `new_radius_km` is given.
pub(crate) fn burn_update(
    outcome: &BurnOutcome,
    end_point: &EphemerisPoint,
    new_radius_km: Option<f64>,
) -> StateUpdate {
    let mut update = StateUpdate {
        battery_soc: Some(outcome.budget.battery_soc),
        propellant_kg: Some(outcome.budget.propellant_kg),
        ..StateUpdate::default()
    };
    if let Some(radius) = new_radius_km.filter(|_| outcome.achieved_delta_v_m_s > 0.0) {
        let (position, velocity) = circularize(end_point, radius);
        update.position_km = Some(position);
        update.velocity_km_s = Some(velocity);
    }
    update
}

/// Artifact entries common to every maneuver.
pub(crate) fn burn_artifacts(
    outcome: &BurnOutcome,
    plan: &ThrustPlan,
) -> impl Iterator<Item = (&'static str, Value)> {
    [
        ("requested_delta_v_m_s", Value::from(plan.required_delta_v_m_s())),
        ("achieved_delta_v_m_s", Value::from(outcome.achieved_delta_v_m_s)),
        ("propellant_used_kg", Value::from(outcome.propellant_used_kg)),
        ("arcs_planned", Value::from(plan.arcs().len())),
        ("plan_truncated", Value::from(plan.is_truncated())),
        ("arcs_completed", Value::from(outcome.arcs_completed)),
        ("power_shortfall_steps", Value::from(outcome.shortfall_steps)),
        ("propellant_exhausted", Value::from(outcome.propellant_exhausted)),
    ]
    .into_iter()
}
