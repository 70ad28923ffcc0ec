use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use mission_sim::activities::event::category;
use mission_sim::engine::OutcomeStatus;
use mission_sim::orbits::{KeplerPropagator, Propagator};
use mission_sim::{
    Activity, EventKind, Fidelity, PlanInput, SimConfig, SimResults, SimulationEngine,
    SpacecraftConfig, SpacecraftState,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn hours(h: i64) -> DateTime<Utc> {
    start() + Duration::hours(h)
}

fn spacecraft() -> SpacecraftConfig {
    serde_json::from_value(json!({
        "name": "demo-eo-sat",
        "dry_mass_kg": 450.0,
        "initial_propellant_kg": 50.0,
        "battery_capacity_wh": 2000.0,
        "solar_panel_area_m2": 6.0,
        "solar_panel_efficiency": 0.3,
        "base_power_w": 150.0,
        "storage_capacity_gb": 256.0,
        "propulsion": {
            "thrust_n": 0.1,
            "isp_s": 1500.0,
            "power_w": 1500.0
        }
    }))
    .expect("spacecraft config")
}

fn initial(
    spacecraft: &SpacecraftConfig,
    altitude_km: f64,
    inclination_deg: f64,
    soc: f64,
) -> SpacecraftState {
    let point =
        KeplerPropagator::circular(altitude_km, inclination_deg, start(), Fidelity::Low).state_at(start());
    SpacecraftState::at_point(&point, spacecraft, soc)
}

fn plan(duration_h: i64, activities: Vec<Activity>) -> PlanInput {
    PlanInput {
        plan_id: "scenario".into(),
        spacecraft_id: "demo-eo-sat".into(),
        start_time: start(),
        end_time: hours(duration_h),
        activities,
    }
}

fn simulate(config: &SimConfig, plan: &PlanInput, initial: &SpacecraftState) -> SimResults {
    SimulationEngine::new()
        .simulate(plan, initial, Fidelity::Medium, config)
        .expect("simulation")
}

#[test]
fn orbit_lowering_burns_propellant_in_thrust_arcs() {
    let config = SimConfig::new(spacecraft());
    let initial = initial(&config.spacecraft, 500.0, 97.4, 0.9);
    let plan = plan(
        6,
        vec![
            Activity::new("lower-1", "orbit_lower", start(), hours(6))
                .with_param("target_altitude_km", 400.0),
        ],
    );
    let results = simulate(&config, &plan, &initial);

    let state = &results.final_state;
    assert!(state.propellant_kg > 0.0 && state.propellant_kg < 50.0);
    assert!((0.0..=1.0).contains(&state.battery_soc));
    assert!((state.mass_kg - (450.0 + state.propellant_kg)).abs() < 1e-9);
    assert!(
        results
            .events_of(EventKind::Info)
            .any(|e| e.category == category::THRUST)
    );
    assert!(state.altitude_km() < 500.0);
    assert!(results.summary.orbit.is_some());
}

#[test]
fn unreachable_target_collects_nothing() {
    let config = SimConfig::new(spacecraft());
    let initial = initial(&config.spacecraft, 500.0, 0.0, 0.9);
    let plan = plan(
        2,
        vec![
            Activity::new("img-1", "eo_collect", start(), hours(1))
                .with_param("target_lat_deg", 80.0)
                .with_param("target_lon_deg", 10.0),
        ],
    );
    let results = simulate(&config, &plan, &initial);

    assert_eq!(results.outcome("img-1").unwrap().status, OutcomeStatus::Failed);
    assert!(
        results
            .events_of(EventKind::Warning)
            .any(|e| e.message == "No access windows to target")
    );
    assert_eq!(results.artifacts["img-1"]["frames_collected"], json!(0));
    assert_eq!(results.final_state.storage_used_gb, 0.0);
}

#[test]
fn downlink_without_contact_sends_nothing() {
    let config = SimConfig::new(spacecraft());
    let mut initial = initial(&config.spacecraft, 500.0, 0.0, 0.9);
    initial.storage_used_gb = 20.0;
    let plan = plan(
        2,
        vec![
            Activity::new("dl-1", "downlink", start(), hours(2))
                .with_param("station_id", "SVALBARD")
                .with_param("station_lat_deg", 78.23)
                .with_param("station_lon_deg", 15.39),
        ],
    );
    let results = simulate(&config, &plan, &initial);

    assert_eq!(results.artifacts["dl-1"]["total_downlinked_mb"], json!(0.0));
    assert!(
        !results
            .events
            .iter()
            .any(|e| e.message.starts_with("AOS") || e.message.starts_with("LOS"))
    );
    assert!(
        results
            .events_of(EventKind::Warning)
            .any(|e| e.message == "No contact with station")
    );
    assert_eq!(results.final_state.storage_used_gb, 20.0);
    assert!(results.access_windows["SVALBARD"].is_empty());
}

#[test]
fn safe_mode_recharges_above_exit_threshold() {
    let config = SimConfig::new(spacecraft());
    let initial = initial(&config.spacecraft, 500.0, 97.4, 0.2);
    let plan = plan(
        3,
        vec![
            Activity::new("safe-1", "safe_mode", start(), hours(3))
                .with_param("min_soc_exit", 0.5),
        ],
    );
    let results = simulate(&config, &plan, &initial);

    assert_eq!(results.outcome("safe-1").unwrap().status, OutcomeStatus::Completed);
    assert!(results.final_state.battery_soc >= 0.5);
    assert!(
        results
            .events_of(EventKind::Info)
            .any(|e| e.message == "exit threshold reached")
    );
}

#[test]
fn safe_mode_without_generation_fails() {
    let mut spacecraft = spacecraft();
    spacecraft.solar_panel_area_m2 = 0.0;
    let config = SimConfig::new(spacecraft);
    let initial = initial(&config.spacecraft, 500.0, 97.4, 0.2);
    let plan = plan(
        3,
        vec![
            Activity::new("safe-1", "safe_mode", start(), hours(3))
                .with_param("min_soc_exit", 0.5),
        ],
    );
    let results = simulate(&config, &plan, &initial);

    assert_eq!(results.outcome("safe-1").unwrap().status, OutcomeStatus::Failed);
    assert!(results.final_state.battery_soc < 0.5);
    assert!(
        results
            .events_of(EventKind::Warning)
            .any(|e| e.message == "exit threshold not reached")
    );
}

#[test]
fn collision_avoidance_then_momentum_dump() {
    let config = SimConfig::new(spacecraft());
    let initial = initial(&config.spacecraft, 520.0, 53.0, 0.9);
    let plan = plan(
        3,
        vec![
            Activity::new("cam-1", "collision_avoidance", start(), hours(1))
                .with_param("delta_v_m_s", 0.2)
                .with_param("direction", "retrograde")
                .with_param("conjunction_id", "CDM-0042"),
            Activity::new("desat-1", "momentum_desat", hours(1), hours(2))
                .with_param("momentum_nms", 2.0),
        ],
    );
    let results = simulate(&config, &plan, &initial);

    assert!(results.outcome("cam-1").unwrap().succeeded());
    assert!(results.outcome("desat-1").unwrap().succeeded());
    assert!(results.final_state.altitude_km() < 520.0);
    assert!(results.summary.state_changes.propellant_used_kg > 0.0);
    assert_eq!(results.summary.activities.total, 2);
    assert_eq!(results.summary.activities.successful, 2);
}
