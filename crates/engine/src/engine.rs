use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use msim_activities::event::{self, category};
use msim_activities::handlers::DownlinkParams;
use msim_activities::{
    Activity, ActivityHandler, ActivityParams, ActivityResult, Event, EventKind, HandlerError,
    HandlerRegistry, PlanInput, ProfileSample, SpacecraftState,
};
use msim_config::{Fidelity, SimConfig, SpacecraftConfig};
use msim_export::OutputBundle;
use msim_orbits::ground::access_windows;
use msim_orbits::{AccessWindow, Ephemeris, KeplerPropagator, Propagator, epoch};
use msim_power::{PowerModel, eclipse_windows};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::EngineError;
use crate::cache::{CacheKey, EphemerisCache};
use crate::results::{ActivityOutcome, OutcomeStatus, RunManifest, SimResults, Summary};

const IDLE: &str = "idle";

/// Runs mission plans against a fixed handler registry.
///
/// The engine holds no per-run state apart from the optional ephemeris cache, so one
/// instance can serve many runs, including from several threads.
#[derive(Debug, Default)]
pub struct SimulationEngine {
    registry: HandlerRegistry,
    cache: EphemerisCache,
}

enum Entry<'a> {
    Planned(&'a Activity),
    Idle(Activity),
}

/// Mutable bookkeeping for one run.
struct Run {
    state: SpacecraftState,
    events: Vec<Event>,
    artifacts: BTreeMap<String, Map<String, Value>>,
    outcomes: Vec<ActivityOutcome>,
    profile: Vec<ProfileSample>,
    orbit_changed: bool,
}

impl SimulationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            cache: EphemerisCache::default(),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &EphemerisCache {
        &self.cache
    }

    /// Simulate `plan` from `initial`.
    ///
    /// Returns `Err` only for malformed top-level input; everything that goes wrong
    /// inside an activity is reported through the event log.
    pub fn simulate(
        &self,
        plan: &PlanInput,
        initial: &SpacecraftState,
        fidelity: Fidelity,
        config: &SimConfig,
    ) -> Result<SimResults, EngineError> {
        config.validate()?;
        validate_plan(plan)?;
        validate_initial_state(initial, &config.spacecraft)?;

        let mut rng = StdRng::seed_from_u64(config.random_seed);
        let run_id = format!("run-{:016x}", rng.random::<u64>());
        info!(
            %run_id,
            plan_id = %plan.plan_id,
            activities = plan.activities.len(),
            %fidelity,
            "simulation started"
        );

        let (span_start, span_end) = span(plan, initial);
        let mut ephemeris = self.propagate(initial, span_start, span_end, fidelity, config)?;

        let mut run = Run {
            state: initial.clone(),
            events: Vec::new(),
            artifacts: BTreeMap::new(),
            outcomes: Vec::new(),
            profile: vec![initial_sample(initial, &config.spacecraft)],
            orbit_changed: false,
        };

        for entry in timeline(plan) {
            match entry {
                Entry::Planned(activity) => {
                    self.run_planned(activity, &mut run, &mut ephemeris, fidelity, config)?
                }
                Entry::Idle(activity) => {
                    self.run_idle(&activity, &mut run, &mut ephemeris, fidelity, config)?
                }
            }
        }

        let spacecraft = &config.spacecraft;
        let points = ephemeris.points().to_vec();
        let eclipses = eclipse_windows(&points, &PowerModel::new(spacecraft).sun_direction());
        let access = station_access(plan, &points);
        let mut summary = Summary::build(
            &run.outcomes,
            &run.events,
            initial,
            &run.state,
            run.orbit_changed,
        );
        let manifest = manifest(run_id, plan, fidelity, config, points.len());

        let output_files = match &config.output_dir {
            Some(dir) => {
                let bundle = OutputBundle {
                    manifest: &manifest,
                    summary: &summary,
                    events: &run.events,
                    ephemeris: &points,
                    profile: &run.profile,
                    access_windows: &access,
                    eclipse_windows: &eclipses,
                };
                match msim_export::write_bundle(dir, &bundle) {
                    Ok(files) => {
                        info!(dir = %dir.display(), files = files.len(), "outputs written");
                        files
                    }
                    Err(err) => {
                        warn!(dir = %dir.display(), error = %err, "failed to write outputs");
                        summary.export_error = Some(err.to_string());
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        info!(
            run_id = %manifest.run_id,
            successful = summary.activities.successful,
            total = summary.activities.total,
            violations = summary.events.violations,
            errors = summary.events.errors,
            "simulation finished"
        );

        Ok(SimResults {
            final_state: run.state,
            events: run.events,
            artifacts: run.artifacts,
            outcomes: run.outcomes,
            profile: run.profile,
            ephemeris: points,
            eclipse_windows: eclipses,
            access_windows: access,
            summary,
            manifest,
            output_files,
        })
    }

    fn propagate(
        &self,
        initial: &SpacecraftState,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        fidelity: Fidelity,
        config: &SimConfig,
    ) -> Result<Ephemeris, EngineError> {
        let step_s = config.time_step_s;
        let propagator: Arc<dyn Propagator> = Arc::new(KeplerPropagator::from_state(
            &initial.position_km,
            &initial.velocity_km_s,
            initial.epoch,
            fidelity,
        )?);
        if !config.enable_cache {
            return Ok(Ephemeris::generate(propagator, start, end, step_s)?);
        }

        let key = CacheKey::new(
            &initial.position_km,
            &initial.velocity_km_s,
            initial.epoch,
            (start, end),
            step_s,
            fidelity,
        );
        if let Some(points) = self.cache.get(&key) {
            debug!(points = points.len(), "ephemeris cache hit");
            return Ok(Ephemeris::from_parts(
                propagator,
                start,
                end,
                step_s,
                points.as_ref().clone(),
            ));
        }
        let ephemeris = Ephemeris::generate(propagator, start, end, step_s)?;
        self.cache
            .insert(key, Arc::new(ephemeris.points().to_vec()));
        Ok(ephemeris)
    }

    fn run_planned(
        &self,
        activity: &Activity,
        run: &mut Run,
        ephemeris: &mut Ephemeris,
        fidelity: Fidelity,
        config: &SimConfig,
    ) -> Result<(), EngineError> {
        debug!(
            activity_id = %activity.activity_id,
            activity_type = %activity.activity_type,
            "dispatching activity"
        );
        let status = self.dispatch(activity, run, ephemeris, fidelity, config)?;
        run.outcomes.push(ActivityOutcome {
            activity_id: activity.activity_id.clone(),
            activity_type: activity.activity_type.clone(),
            start_time: activity.start_time,
            end_time: activity.end_time,
            status,
        });
        Ok(())
    }

    fn dispatch(
        &self,
        activity: &Activity,
        run: &mut Run,
        ephemeris: &mut Ephemeris,
        fidelity: Fidelity,
        config: &SimConfig,
    ) -> Result<OutcomeStatus, EngineError> {
        if activity.end_time <= activity.start_time {
            run.events.push(
                event::error(
                    activity.start_time,
                    category::VALIDATION,
                    "Activity end time must be after its start time",
                )
                .with("activity_id", activity.activity_id.as_str())
                .with("end_time", activity.end_time.to_rfc3339()),
            );
            return Ok(OutcomeStatus::Invalid);
        }

        let Some(handler) = self.registry.get(&activity.activity_type) else {
            warn!(
                activity_id = %activity.activity_id,
                activity_type = %activity.activity_type,
                "no handler registered"
            );
            run.events.push(
                event::error(
                    activity.start_time,
                    category::DISPATCH,
                    format!("Unknown activity type: {}", activity.activity_type),
                )
                .with("activity_id", activity.activity_id.as_str())
                .with("activity_type", activity.activity_type.as_str()),
            );
            advance(&mut run.state, activity.end_time, ephemeris);
            return Ok(OutcomeStatus::Unknown);
        };

        let validation = handler.validate(activity);
        let rejected = validation.iter().any(|e| e.kind == EventKind::Error);
        run.events.extend(validation);
        if rejected {
            debug!(activity_id = %activity.activity_id, "activity failed validation");
            advance(&mut run.state, activity.end_time, ephemeris);
            return Ok(OutcomeStatus::Invalid);
        }

        match invoke(handler, activity, &run.state, ephemeris, config) {
            Ok(mut result) => {
                let success = result.success;
                let artifacts = std::mem::take(&mut result.artifacts);
                fold(run, activity, result, ephemeris, fidelity, config)?;
                run.artifacts.insert(activity.activity_id.clone(), artifacts);
                Ok(if success {
                    OutcomeStatus::Completed
                } else {
                    OutcomeStatus::Failed
                })
            }
            Err(message) => {
                handler_failed(run, activity, message, ephemeris);
                Ok(OutcomeStatus::Error)
            }
        }
    }

    fn run_idle(
        &self,
        activity: &Activity,
        run: &mut Run,
        ephemeris: &mut Ephemeris,
        fidelity: Fidelity,
        config: &SimConfig,
    ) -> Result<(), EngineError> {
        let Some(handler) = self.registry.get(IDLE) else {
            advance(&mut run.state, activity.end_time, ephemeris);
            return Ok(());
        };
        debug!(activity_id = %activity.activity_id, "idle gap");
        match invoke(handler, activity, &run.state, ephemeris, config) {
            Ok(result) => fold(run, activity, result, ephemeris, fidelity, config),
            Err(message) => {
                handler_failed(run, activity, message, ephemeris);
                Ok(())
            }
        }
    }
}

/// Call the handler on the activity's ephemeris window, turning errors and panics into
/// a message.
fn invoke(
    handler: &dyn ActivityHandler,
    activity: &Activity,
    state: &SpacecraftState,
    ephemeris: &Ephemeris,
    config: &SimConfig,
) -> Result<ActivityResult, String> {
    let window = ephemeris.window(activity.start_time, activity.end_time);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        handler.process(activity, state, &window, config)
    }));
    match outcome {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(describe(&err)),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn describe(err: &HandlerError) -> String {
    format!("handler error: {err}")
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_owned());
    format!("handler panicked: {detail}")
}

fn handler_failed(run: &mut Run, activity: &Activity, message: String, ephemeris: &Ephemeris) {
    warn!(
        activity_id = %activity.activity_id,
        activity_type = %activity.activity_type,
        %message,
        "activity failed"
    );
    run.events.push(
        event::error(activity.start_time, category::EXCEPTION, message)
            .with("activity_id", activity.activity_id.as_str())
            .with("activity_type", activity.activity_type.as_str()),
    );
    advance(&mut run.state, activity.end_time, ephemeris);
}

/// Move the clock and the orbit to `at` without touching any resource.
fn advance(state: &mut SpacecraftState, at: DateTime<Utc>, ephemeris: &Ephemeris) {
    if at <= state.epoch {
        return;
    }
    let point = ephemeris.state_at(at);
    state.epoch = at;
    state.position_km = point.position_km;
    state.velocity_km_s = point.velocity_km_s;
}

/// Merge a handler result into the run: apply and clamp the state update, move the
/// clock to the activity end, and re-propagate if the orbit changed.
fn fold(
    run: &mut Run,
    activity: &Activity,
    result: ActivityResult,
    ephemeris: &mut Ephemeris,
    fidelity: Fidelity,
    config: &SimConfig,
) -> Result<(), EngineError> {
    let spacecraft = &config.spacecraft;
    let reported: HashSet<String> = result
        .events
        .iter()
        .filter_map(|e| e.violated_field().map(str::to_owned))
        .collect();
    run.events.extend(result.events);
    run.profile.extend(result.profile);

    let previous = run.state.clone();
    let mut next = previous.clone();
    next.apply(&result.state_updates);

    let end = activity.end_time;
    let mut clamp = |field: &'static str, raw: f64, fallback: f64, lo: f64, hi: f64| -> f64 {
        let clamped = if raw.is_nan() { fallback } else { raw.clamp(lo, hi) };
        if clamped != raw && !reported.contains(field) {
            warn!(activity_id = %activity.activity_id, field, raw, clamped, "state clamped");
            run.events.push(
                event::violation(
                    end,
                    field_category(field),
                    field,
                    format!("{field} out of bounds, clamped to {clamped}"),
                )
                .with("source", "engine")
                .with("activity_id", activity.activity_id.as_str())
                .with("raw_value", json_number(raw))
                .with("clamped_value", clamped),
            );
        }
        clamped
    };
    next.battery_soc = clamp("battery_soc", next.battery_soc, previous.battery_soc, 0.0, 1.0);
    next.propellant_kg = clamp(
        "propellant_kg",
        next.propellant_kg,
        previous.propellant_kg,
        0.0,
        f64::INFINITY,
    );
    next.storage_used_gb = clamp(
        "storage_used_gb",
        next.storage_used_gb,
        previous.storage_used_gb,
        0.0,
        spacecraft.storage_capacity_gb,
    );
    next.rederive_mass(spacecraft.dry_mass_kg);
    next.epoch = end;

    if result.state_updates.changes_orbit() {
        match KeplerPropagator::from_state(&next.position_km, &next.velocity_km_s, end, fidelity) {
            Ok(propagator) => {
                debug!(
                    activity_id = %activity.activity_id,
                    altitude_km = next.altitude_km(),
                    "orbit changed, re-propagating"
                );
                ephemeris.replace_from(end, Arc::new(propagator))?;
                run.orbit_changed = true;
            }
            Err(err) => {
                warn!(activity_id = %activity.activity_id, %err, "rejected post-activity orbit");
                run.events.push(
                    event::error(
                        end,
                        category::EXCEPTION,
                        format!("post-activity orbit rejected: {err}"),
                    )
                    .with("activity_id", activity.activity_id.as_str()),
                );
                let point = ephemeris.state_at(end);
                next.position_km = point.position_km;
                next.velocity_km_s = point.velocity_km_s;
            }
        }
    } else {
        let point = ephemeris.state_at(end);
        next.position_km = point.position_km;
        next.velocity_km_s = point.velocity_km_s;
    }

    run.state = next;
    Ok(())
}

fn field_category(field: &str) -> &'static str {
    match field {
        "battery_soc" => category::POWER,
        "propellant_kg" => category::PROPELLANT,
        _ => category::STORAGE,
    }
}

/// JSON has no NaN or infinity; those are recorded as strings.
fn json_number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()))
}

fn validate_plan(plan: &PlanInput) -> Result<(), EngineError> {
    if plan.end_time <= plan.start_time {
        return Err(EngineError::InvalidHorizon {
            start: plan.start_time,
            end: plan.end_time,
        });
    }

    let mut seen = HashSet::new();
    for activity in &plan.activities {
        if !seen.insert(activity.activity_id.as_str()) {
            return Err(EngineError::DuplicateActivityId(
                activity.activity_id.clone(),
            ));
        }
    }

    // Malformed windows are reported per activity later; they cannot overlap anything.
    let mut ordered: Vec<&Activity> = plan
        .activities
        .iter()
        .filter(|a| a.end_time > a.start_time)
        .collect();
    ordered.sort_by_key(|a| a.start_time);
    let mut latest: Option<&Activity> = None;
    for activity in ordered {
        if let Some(previous) = latest {
            if activity.overlaps(previous) {
                return Err(EngineError::OverlappingActivities {
                    first: previous.activity_id.clone(),
                    second: activity.activity_id.clone(),
                });
            }
        }
        if latest.is_none_or(|previous| activity.end_time > previous.end_time) {
            latest = Some(activity);
        }
    }
    Ok(())
}

fn validate_initial_state(
    state: &SpacecraftState,
    spacecraft: &SpacecraftConfig,
) -> Result<(), EngineError> {
    let invalid = |field, reason: String| EngineError::InvalidInitialState { field, reason };
    if !(0.0..=1.0).contains(&state.battery_soc) {
        return Err(invalid(
            "battery_soc",
            format!("{} is outside [0, 1]", state.battery_soc),
        ));
    }
    if !(state.propellant_kg.is_finite() && state.propellant_kg >= 0.0) {
        return Err(invalid(
            "propellant_kg",
            format!("{} must be non-negative", state.propellant_kg),
        ));
    }
    if !(0.0..=spacecraft.storage_capacity_gb).contains(&state.storage_used_gb) {
        return Err(invalid(
            "storage_used_gb",
            format!(
                "{} is outside [0, {}]",
                state.storage_used_gb, spacecraft.storage_capacity_gb
            ),
        ));
    }
    if state
        .position_km
        .iter()
        .chain(state.velocity_km_s.iter())
        .any(|c| !c.is_finite())
    {
        return Err(invalid("position_km", "state vector is not finite".to_owned()));
    }
    Ok(())
}

/// Interval covering the horizon, the initial epoch, and every well-formed activity.
fn span(plan: &PlanInput, initial: &SpacecraftState) -> (DateTime<Utc>, DateTime<Utc>) {
    plan.activities
        .iter()
        .filter(|a| a.end_time > a.start_time)
        .fold(
            (
                plan.start_time.min(initial.epoch),
                plan.end_time.max(initial.epoch),
            ),
            |(start, end), a| (start.min(a.start_time), end.max(a.end_time)),
        )
}

/// Plan activities in start order (stable on plan order) with idle gaps filled in
/// across the horizon.
fn timeline(plan: &PlanInput) -> Vec<Entry<'_>> {
    let mut ordered: Vec<&Activity> = plan.activities.iter().collect();
    ordered.sort_by_key(|a| a.start_time);

    let mut entries = Vec::with_capacity(ordered.len() * 2 + 1);
    let mut cursor = plan.start_time;
    let mut gaps = 0usize;
    for activity in ordered {
        if activity.end_time > activity.start_time {
            if let Some(idle) = idle_gap(&mut gaps, cursor, activity.start_time.min(plan.end_time)) {
                entries.push(Entry::Idle(idle));
            }
            cursor = cursor.max(activity.end_time);
        }
        entries.push(Entry::Planned(activity));
    }
    if let Some(idle) = idle_gap(&mut gaps, cursor, plan.end_time) {
        entries.push(Entry::Idle(idle));
    }
    entries
}

fn idle_gap(gaps: &mut usize, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Activity> {
    if to <= from {
        return None;
    }
    *gaps += 1;
    Some(Activity::new(format!("idle-{gaps}"), IDLE, from, to))
}

fn initial_sample(state: &SpacecraftState, spacecraft: &SpacecraftConfig) -> ProfileSample {
    let power = PowerModel::new(spacecraft);
    ProfileSample {
        time: state.epoch,
        battery_soc: state.battery_soc,
        storage_used_gb: state.storage_used_gb,
        propellant_kg: state.propellant_kg,
        generation_w: power.solar_generation_w(&state.position_km),
        consumption_w: spacecraft.base_power_w,
        in_eclipse: power.in_eclipse(&state.position_km),
    }
}

/// Contact windows for every ground station a downlink in the plan refers to.
fn station_access(
    plan: &PlanInput,
    points: &[msim_orbits::EphemerisPoint],
) -> BTreeMap<String, Vec<AccessWindow>> {
    let mut stations = BTreeMap::new();
    for activity in plan.activities.iter().filter(|a| a.activity_type == "downlink") {
        let Ok(params) = DownlinkParams::parse(activity) else {
            continue;
        };
        if stations.contains_key(&params.station_id) {
            continue;
        }
        let windows = access_windows(points, &params.site(), params.min_elevation_deg);
        stations.insert(params.station_id.clone(), windows);
    }
    stations
}

fn manifest(
    run_id: String,
    plan: &PlanInput,
    fidelity: Fidelity,
    config: &SimConfig,
    ephemeris_points: usize,
) -> RunManifest {
    let activity_types: BTreeSet<&str> = plan
        .activities
        .iter()
        .map(|a| a.activity_type.as_str())
        .collect();
    let metadata = BTreeMap::from([
        ("engine_version".to_owned(), json!(env!("CARGO_PKG_VERSION"))),
        ("time_step_s".to_owned(), json!(config.time_step_s)),
        ("random_seed".to_owned(), json!(config.random_seed)),
        ("enable_cache".to_owned(), json!(config.enable_cache)),
        ("spacecraft_name".to_owned(), json!(config.spacecraft.name)),
        ("ephemeris_points".to_owned(), json!(ephemeris_points)),
        ("activity_types".to_owned(), json!(activity_types)),
    ]);
    RunManifest {
        run_id,
        plan_id: plan.plan_id.clone(),
        spacecraft_id: plan.spacecraft_id.clone(),
        fidelity,
        start_time: plan.start_time,
        end_time: plan.end_time,
        duration_hours: epoch::seconds_between(plan.start_time, plan.end_time) / 3_600.0,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use msim_activities::StateUpdate;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        start() + Duration::minutes(minutes)
    }

    fn spacecraft() -> SpacecraftConfig {
        serde_json::from_value(json!({
            "name": "engine-test",
            "dry_mass_kg": 450.0,
            "initial_propellant_kg": 50.0,
            "battery_capacity_wh": 2000.0,
            "solar_panel_area_m2": 6.0,
            "solar_panel_efficiency": 0.3,
            "base_power_w": 150.0,
            "storage_capacity_gb": 256.0
        }))
        .unwrap()
    }

    fn config() -> SimConfig {
        SimConfig::new(spacecraft())
    }

    fn initial(config: &SimConfig) -> SpacecraftState {
        let point = KeplerPropagator::circular(500.0, 51.6, start(), Fidelity::Low).state_at(start());
        SpacecraftState::at_point(&point, &config.spacecraft, 0.8)
    }

    fn plan(activities: Vec<Activity>) -> PlanInput {
        PlanInput {
            plan_id: "plan-1".into(),
            spacecraft_id: "sc-1".into(),
            start_time: start(),
            end_time: at(120),
            activities,
        }
    }

    fn run(engine: &SimulationEngine, activities: Vec<Activity>) -> SimResults {
        let config = config();
        engine
            .simulate(&plan(activities), &initial(&config), Fidelity::Low, &config)
            .unwrap()
    }

    struct Panicking;

    impl ActivityHandler for Panicking {
        fn activity_type(&self) -> &'static str {
            "explode"
        }
        fn validate(&self, _activity: &Activity) -> Vec<Event> {
            Vec::new()
        }
        fn power_consumption_w(&self, _activity: &Activity, _spacecraft: &SpacecraftConfig) -> f64 {
            0.0
        }
        fn process(
            &self,
            _activity: &Activity,
            _state: &SpacecraftState,
            _ephemeris: &[msim_orbits::EphemerisPoint],
            _config: &SimConfig,
        ) -> Result<ActivityResult, HandlerError> {
            panic!("boom")
        }
    }

    /// Drains the battery past zero and fills the recorder past capacity.
    struct Overdraw;

    impl ActivityHandler for Overdraw {
        fn activity_type(&self) -> &'static str {
            "overdraw"
        }
        fn validate(&self, _activity: &Activity) -> Vec<Event> {
            Vec::new()
        }
        fn power_consumption_w(&self, _activity: &Activity, _spacecraft: &SpacecraftConfig) -> f64 {
            0.0
        }
        fn process(
            &self,
            activity: &Activity,
            _state: &SpacecraftState,
            _ephemeris: &[msim_orbits::EphemerisPoint],
            _config: &SimConfig,
        ) -> Result<ActivityResult, HandlerError> {
            let mut result = ActivityResult::new(true);
            result.events.push(event::violation(
                activity.start_time,
                category::STORAGE,
                "storage_used_gb",
                "recorder full",
            ));
            result.state_updates = StateUpdate {
                battery_soc: Some(-0.25),
                storage_used_gb: Some(1_000.0),
                ..StateUpdate::default()
            };
            Ok(result)
        }
    }

    fn custom_engine() -> SimulationEngine {
        let registry = HandlerRegistry::builder()
            .with_defaults()
            .unwrap()
            .register(Panicking)
            .unwrap()
            .register(Overdraw)
            .unwrap()
            .build();
        SimulationEngine::with_registry(registry)
    }

    #[test]
    fn empty_plan_idles_across_horizon() {
        let results = run(&SimulationEngine::new(), Vec::new());
        assert_eq!(results.summary.activities.total, 0);
        assert!(results.outcomes.is_empty());
        assert!(results.artifacts.is_empty());
        assert_eq!(results.final_state.epoch, at(120));
        assert_eq!(results.profile.first().map(|s| s.time), Some(start()));
        assert_eq!(results.profile.last().map(|s| s.time), Some(at(120)));
        assert!(results.manifest.run_id.starts_with("run-"));
        assert_eq!(results.manifest.duration_hours, 2.0);
    }

    #[test]
    fn unknown_type_is_reported_and_run_continues() {
        let results = run(
            &SimulationEngine::new(),
            vec![
                Activity::new("mystery", "warp_drive", at(10), at(20)),
                Activity::new("safe", "safe_mode", at(30), at(60)),
            ],
        );
        let error = results
            .events_of(EventKind::Error)
            .find(|e| e.category == category::DISPATCH)
            .unwrap();
        assert!(error.message.contains("warp_drive"));
        assert_eq!(results.outcome("mystery").unwrap().status, OutcomeStatus::Unknown);
        assert!(results.outcome("safe").is_some());
        assert!(!results.artifacts.contains_key("mystery"));
        assert_eq!(results.final_state.propellant_kg, 50.0);
    }

    #[test]
    fn panicking_handler_keeps_state() {
        let engine = custom_engine();
        let results = run(&engine, vec![Activity::new("bad", "explode", at(0), at(120))]);
        let error = results
            .events_of(EventKind::Error)
            .find(|e| e.category == category::EXCEPTION)
            .unwrap();
        assert!(error.message.contains("boom"));
        assert_eq!(results.outcome("bad").unwrap().status, OutcomeStatus::Error);
        assert_eq!(results.final_state.battery_soc, 0.8);
        assert_eq!(results.final_state.epoch, at(120));
    }

    #[test]
    fn engine_clamps_and_reports_unreported_fields() {
        let engine = custom_engine();
        let results = run(&engine, vec![Activity::new("od", "overdraw", at(0), at(10))]);
        let violations: Vec<_> = results.events_of(EventKind::Violation).collect();
        // Handler reported storage itself; the engine only adds the battery.
        assert_eq!(violations.len(), 2);
        let engine_violation = violations
            .iter()
            .find(|e| e.details.get("source") == Some(&json!("engine")))
            .unwrap();
        assert_eq!(engine_violation.violated_field(), Some("battery_soc"));
        assert_eq!(engine_violation.details["raw_value"], json!(-0.25));
        assert_eq!(engine_violation.details["clamped_value"], json!(0.0));

        let state = &results.final_state;
        assert!((0.0..=1.0).contains(&state.battery_soc));
        assert!(state.storage_used_gb <= 256.0);
        for sample in &results.profile {
            assert!((0.0..=1.0).contains(&sample.battery_soc));
        }
    }

    #[test]
    fn overlapping_activities_are_rejected() {
        let config = config();
        let err = SimulationEngine::new()
            .simulate(
                &plan(vec![
                    Activity::new("a", "safe_mode", at(0), at(30)),
                    Activity::new("b", "safe_mode", at(20), at(40)),
                ]),
                &initial(&config),
                Fidelity::Low,
                &config,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::OverlappingActivities { ref first, ref second } if first == "a" && second == "b"
        ));
    }

    #[test]
    fn touching_activities_do_not_overlap() {
        let results = run(
            &SimulationEngine::new(),
            vec![
                Activity::new("a", "safe_mode", at(0), at(30)),
                Activity::new("b", "safe_mode", at(30), at(60)),
            ],
        );
        assert_eq!(results.summary.activities.total, 2);
    }

    #[test]
    fn malformed_window_is_a_validation_error() {
        let results = run(
            &SimulationEngine::new(),
            vec![Activity::new("backwards", "safe_mode", at(40), at(30))],
        );
        assert_eq!(results.outcome("backwards").unwrap().status, OutcomeStatus::Invalid);
        assert!(results
            .events_of(EventKind::Error)
            .any(|e| e.category == category::VALIDATION));
    }

    #[test]
    fn bad_horizon_and_duplicate_ids_fail_fast() {
        let config = config();
        let engine = SimulationEngine::new();
        let mut backwards = plan(Vec::new());
        backwards.end_time = backwards.start_time;
        assert!(matches!(
            engine.simulate(&backwards, &initial(&config), Fidelity::Low, &config),
            Err(EngineError::InvalidHorizon { .. })
        ));

        let dupes = plan(vec![
            Activity::new("x", "safe_mode", at(0), at(10)),
            Activity::new("x", "safe_mode", at(20), at(30)),
        ]);
        assert!(matches!(
            engine.simulate(&dupes, &initial(&config), Fidelity::Low, &config),
            Err(EngineError::DuplicateActivityId(id)) if id == "x"
        ));

        let mut state = initial(&config);
        state.battery_soc = 1.5;
        assert!(matches!(
            engine.simulate(&plan(Vec::new()), &state, Fidelity::Low, &config),
            Err(EngineError::InvalidInitialState { field: "battery_soc", .. })
        ));
    }

    #[test]
    fn idle_gaps_are_numbered_and_not_counted() {
        let results = run(
            &SimulationEngine::new(),
            vec![Activity::new("safe", "safe_mode", at(30), at(60))],
        );
        assert_eq!(results.summary.activities.total, 1);
        assert_eq!(results.artifacts.keys().collect::<Vec<_>>(), vec!["safe"]);
        let binding = plan(vec![Activity::new("safe", "safe_mode", at(30), at(60))]);
        let entries = timeline(&binding);
        let idle_ids: Vec<_> = entries
            .iter()
            .filter_map(|e| match e {
                Entry::Idle(a) => Some(a.activity_id.clone()),
                Entry::Planned(_) => None,
            })
            .collect();
        assert_eq!(idle_ids, vec!["idle-1", "idle-2"]);
    }

    #[test]
    fn identical_inputs_give_identical_outputs() {
        let activities = vec![
            Activity::new("lower", "orbit_lower", at(0), at(90))
                .with_param("target_altitude_km", 490.0),
            Activity::new("safe", "safe_mode", at(90), at(120)),
        ];
        let a = run(&SimulationEngine::new(), activities.clone());
        let b = run(&SimulationEngine::new(), activities);
        assert_eq!(a.summary_json().unwrap(), b.summary_json().unwrap());
        assert_eq!(a.events_json().unwrap(), b.events_json().unwrap());
        assert_eq!(a.manifest.run_id, b.manifest.run_id);
    }

    #[test]
    fn cache_reuses_propagation() {
        let engine = SimulationEngine::new();
        let mut config = config();
        config.enable_cache = true;
        let state = initial(&config);
        let first = engine
            .simulate(&plan(Vec::new()), &state, Fidelity::Medium, &config)
            .unwrap();
        assert_eq!(engine.cache().len(), 1);
        let second = engine
            .simulate(&plan(Vec::new()), &state, Fidelity::Medium, &config)
            .unwrap();
        assert_eq!(engine.cache().len(), 1);
        assert_eq!(first.ephemeris, second.ephemeris);

        engine
            .simulate(&plan(Vec::new()), &state, Fidelity::High, &config)
            .unwrap();
        assert_eq!(engine.cache().len(), 2);
    }

    #[test]
    fn orbit_change_is_propagated_forward() {
        let results = run(
            &SimulationEngine::new(),
            vec![Activity::new("lower", "orbit_lower", at(0), at(120))
                .with_param("target_altitude_km", 495.0)],
        );
        let orbit = results.summary.orbit.unwrap();
        assert!(orbit.altitude_change_km < 0.0);
        assert!(results.final_state.propellant_kg < 50.0);
        let last = results.ephemeris.last().unwrap();
        assert!((last.altitude_km() - results.final_state.altitude_km()).abs() < 1.0);
    }

    #[test]
    fn outputs_are_written_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.output_dir = Some(dir.path().to_path_buf());
        let results = SimulationEngine::new()
            .simulate(
                &plan(vec![Activity::new("dl", "downlink", at(10), at(40))
                    .with_param("station_id", "GS-1")
                    .with_param("station_lat_deg", 10.0)
                    .with_param("station_lon_deg", 20.0)]),
                &initial(&config),
                Fidelity::Low,
                &config,
            )
            .unwrap();
        assert_eq!(results.output_files.len(), 7);
        assert!(results.access_windows.contains_key("GS-1"));
        assert!(dir.path().join(msim_export::SUMMARY).exists());
    }

    #[test]
    fn unwritable_output_dir_still_returns_results() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let mut config = config();
        config.output_dir = Some(blocker.path().join("run"));
        let results = SimulationEngine::new()
            .simulate(&plan(Vec::new()), &initial(&config), Fidelity::Low, &config)
            .unwrap();
        assert!(results.output_files.is_empty());
        assert!(results.summary.export_error.is_some());
        assert!(!results.profile.is_empty());
    }
}
