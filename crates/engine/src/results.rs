//! Run outputs: per-activity outcomes, summary, manifest, and the aggregate result.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use msim_activities::{Event, EventKind, ProfileSample, SpacecraftState};
use msim_config::Fidelity;
use msim_orbits::{AccessWindow, EphemerisPoint};
use msim_power::EclipseWindow;
use serde::Serialize;
use serde_json::{Map, Value};

/// How an explicit plan activity ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Handler ran and reported success.
    Completed,
    /// Handler ran and reported failure.
    Failed,
    /// Rejected by validation before running.
    Invalid,
    /// No handler registered for the type.
    Unknown,
    /// Handler returned an error or panicked.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityOutcome {
    pub activity_id: String,
    pub activity_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: OutcomeStatus,
}

impl ActivityOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ActivityCounts {
    pub total: usize,
    pub successful: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EventCounts {
    pub info: usize,
    pub warnings: usize,
    pub violations: usize,
    pub errors: usize,
}

impl EventCounts {
    pub fn tally(events: &[Event]) -> Self {
        let mut counts = Self::default();
        for event in events {
            match event.kind {
                EventKind::Info => counts.info += 1,
                EventKind::Warning => counts.warnings += 1,
                EventKind::Violation => counts.violations += 1,
                EventKind::Error => counts.errors += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateChanges {
    pub propellant_used_kg: f64,
    pub initial_soc: f64,
    pub final_soc: f64,
    pub final_storage_gb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrbitChange {
    pub initial_altitude_km: f64,
    pub final_altitude_km: f64,
    pub altitude_change_km: f64,
}

/// Derived run statistics written to `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub activities: ActivityCounts,
    pub events: EventCounts,
    pub state_changes: StateChanges,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orbit: Option<OrbitChange>,
    /// Set when the output files could not be written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_error: Option<String>,
}

impl Summary {
    pub fn build(
        outcomes: &[ActivityOutcome],
        events: &[Event],
        initial: &SpacecraftState,
        last: &SpacecraftState,
        orbit_changed: bool,
    ) -> Self {
        Self {
            activities: ActivityCounts {
                total: outcomes.len(),
                successful: outcomes.iter().filter(|o| o.succeeded()).count(),
            },
            events: EventCounts::tally(events),
            state_changes: StateChanges {
                propellant_used_kg: initial.propellant_kg - last.propellant_kg,
                initial_soc: initial.battery_soc,
                final_soc: last.battery_soc,
                final_storage_gb: last.storage_used_gb,
            },
            orbit: orbit_changed.then(|| OrbitChange {
                initial_altitude_km: initial.altitude_km(),
                final_altitude_km: last.altitude_km(),
                altitude_change_km: last.altitude_km() - initial.altitude_km(),
            }),
            export_error: None,
        }
    }
}

/// Identity and span of a run, written to `run_manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunManifest {
    pub run_id: String,
    pub plan_id: String,
    pub spacecraft_id: String,
    pub fidelity: Fidelity,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub metadata: BTreeMap<String, Value>,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct SimResults {
    pub final_state: SpacecraftState,
    pub events: Vec<Event>,
    /// Handler artifacts keyed by activity id.
    pub artifacts: BTreeMap<String, Map<String, Value>>,
    pub outcomes: Vec<ActivityOutcome>,
    pub profile: Vec<ProfileSample>,
    pub ephemeris: Vec<EphemerisPoint>,
    pub eclipse_windows: Vec<EclipseWindow>,
    /// Contact windows keyed by ground-station id.
    pub access_windows: BTreeMap<String, Vec<AccessWindow>>,
    pub summary: Summary,
    pub manifest: RunManifest,
    /// Files written when an output directory was configured.
    pub output_files: Vec<PathBuf>,
}

impl SimResults {
    pub fn outcome(&self, activity_id: &str) -> Option<&ActivityOutcome> {
        self.outcomes.iter().find(|o| o.activity_id == activity_id)
    }

    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    pub fn summary_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.summary)
    }

    pub fn events_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.events)
    }
}
