//! Export helpers for the JSON and CSV artifacts of a simulation run.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use msim_activities::{Event, ProfileSample};
use msim_orbits::{AccessWindow, EphemerisPoint};
use msim_power::EclipseWindow;
use serde::Serialize;
use thiserror::Error;

pub const RUN_MANIFEST: &str = "run_manifest.json";
pub const SUMMARY: &str = "summary.json";
pub const EVENTS: &str = "events.json";
pub const EPHEMERIS: &str = "ephemeris.csv";
pub const PROFILE: &str = "profile.csv";
pub const ACCESS_WINDOWS: &str = "access_windows.json";
pub const ECLIPSE_WINDOWS: &str = "eclipse_windows.json";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode JSON for {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode CSV for {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Create a buffered writer for the target path, handling stdout (`-`) by convention.
pub fn writer_for_path(path: &Path) -> io::Result<Box<dyn Write>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    Ok(Box::new(BufWriter::new(file)))
}

/// Pretty-printed JSON document.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = writer_for_path(path).map_err(io_err)?;
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| ExportError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writeln!(writer).map_err(io_err)?;
    writer.flush().map_err(io_err)
}

#[derive(Serialize)]
struct EphemerisRow {
    time: String,
    x_km: f64,
    y_km: f64,
    z_km: f64,
    vx_km_s: f64,
    vy_km_s: f64,
    vz_km_s: f64,
    altitude_km: f64,
}

impl From<&EphemerisPoint> for EphemerisRow {
    fn from(point: &EphemerisPoint) -> Self {
        let [x_km, y_km, z_km] = point.position_km;
        let [vx_km_s, vy_km_s, vz_km_s] = point.velocity_km_s;
        Self {
            time: point.time.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            x_km,
            y_km,
            z_km,
            vx_km_s,
            vy_km_s,
            vz_km_s,
            altitude_km: point.altitude_km(),
        }
    }
}

fn write_rows<R: Serialize>(
    path: &Path,
    rows: impl IntoIterator<Item = R>,
) -> Result<(), ExportError> {
    let csv_err = |source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let writer = writer_for_path(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut csv = csv::Writer::from_writer(writer);
    for row in rows {
        csv.serialize(row).map_err(csv_err)?;
    }
    csv.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Ephemeris table: time, position, velocity, altitude.
pub fn write_ephemeris_csv(path: &Path, points: &[EphemerisPoint]) -> Result<(), ExportError> {
    write_rows(path, points.iter().map(EphemerisRow::from))
}

/// State profile table, one row per sample.
pub fn write_profile_csv(path: &Path, samples: &[ProfileSample]) -> Result<(), ExportError> {
    write_rows(path, samples.iter())
}

/// Everything a run writes to its output directory.
#[derive(Debug, Clone, Copy)]
pub struct OutputBundle<'a, M: Serialize, S: Serialize> {
    pub manifest: &'a M,
    pub summary: &'a S,
    pub events: &'a [Event],
    pub ephemeris: &'a [EphemerisPoint],
    pub profile: &'a [ProfileSample],
    pub access_windows: &'a BTreeMap<String, Vec<AccessWindow>>,
    pub eclipse_windows: &'a [EclipseWindow],
}

/// Write every output file into `dir`, returning the paths in write order.
pub fn write_bundle<M: Serialize, S: Serialize>(
    dir: &Path,
    bundle: &OutputBundle<'_, M, S>,
) -> Result<Vec<PathBuf>, ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = |name: &str| dir.join(name);

    write_json(&path(RUN_MANIFEST), bundle.manifest)?;
    write_json(&path(SUMMARY), bundle.summary)?;
    write_json(&path(EVENTS), bundle.events)?;
    write_ephemeris_csv(&path(EPHEMERIS), bundle.ephemeris)?;
    write_profile_csv(&path(PROFILE), bundle.profile)?;
    write_json(&path(ACCESS_WINDOWS), bundle.access_windows)?;
    write_json(&path(ECLIPSE_WINDOWS), bundle.eclipse_windows)?;

    Ok([
        RUN_MANIFEST,
        SUMMARY,
        EVENTS,
        EPHEMERIS,
        PROFILE,
        ACCESS_WINDOWS,
        ECLIPSE_WINDOWS,
    ]
    .iter()
    .map(|name| path(name))
    .collect())
}
