//! Two-line element sets: fixed-column parsing, formatting, and synthetic generation.
//!
//! Line layout follows the NORAD convention: 69 columns per line with the
//! modulo-10 checksum in column 69 (digits count their value, `-` counts 1).

use std::f64::consts::TAU;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use msim_core::constants::{EARTH_RADIUS_KM, MU_EARTH_KM3_S2, SECONDS_PER_DAY};
use thiserror::Error;

use crate::elements::OrbitalElements;
use crate::epoch;

/// Width of a TLE data line including the checksum column.
pub const LINE_LENGTH: usize = 69;
/// Eccentricity assumed for synthetic near-circular element sets.
pub const SYNTHETIC_ECCENTRICITY: f64 = 0.0001;

#[derive(Debug, Error, PartialEq)]
pub enum TleError {
    #[error("line {line} has {len} columns, expected {LINE_LENGTH}")]
    Length { line: u8, len: usize },
    #[error("line {line} does not start with `{line} `")]
    LineNumber { line: u8 },
    #[error("line {line} checksum mismatch: computed {computed}, found {found}")]
    Checksum { line: u8, computed: u32, found: char },
    #[error("catalog numbers differ between lines ({first} vs {second})")]
    CatalogMismatch { first: u32, second: u32 },
    #[error("field `{field}` could not be parsed from `{raw}`")]
    Field { field: &'static str, raw: String },
}

/// A validated two-line element set.
#[derive(Debug, Clone, PartialEq)]
pub struct Tle {
    pub name: Option<String>,
    pub line1: String,
    pub line2: String,
    pub catalog_number: u32,
    pub epoch: DateTime<Utc>,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub eccentricity: f64,
    pub arg_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    pub mean_motion_rev_day: f64,
    pub revolution_number: u32,
}

impl Tle {
    /// Parse and checksum-verify a pair of element lines.
    pub fn parse(line1: &str, line2: &str) -> Result<Self, TleError> {
        let line1 = line1.trim_end();
        let line2 = line2.trim_end();
        check_line(line1, 1)?;
        check_line(line2, 2)?;

        let catalog_number: u32 = field(line1, 3, 7, "catalog_number")?;
        let second_catalog: u32 = field(line2, 3, 7, "catalog_number")?;
        if catalog_number != second_catalog {
            return Err(TleError::CatalogMismatch {
                first: catalog_number,
                second: second_catalog,
            });
        }

        let year_two_digit: i32 = field(line1, 19, 20, "epoch_year")?;
        let day_of_year: f64 = field(line1, 21, 32, "epoch_day")?;
        let year = if year_two_digit < 57 {
            2000 + year_two_digit
        } else {
            1900 + year_two_digit
        };
        let epoch = epoch_from_day_of_year(year, day_of_year).ok_or_else(|| TleError::Field {
            field: "epoch",
            raw: columns(line1, 19, 32).to_string(),
        })?;

        let ecc_digits: u32 = field(line2, 27, 33, "eccentricity")?;

        Ok(Self {
            name: None,
            line1: line1.to_string(),
            line2: line2.to_string(),
            catalog_number,
            epoch,
            inclination_deg: field(line2, 9, 16, "inclination")?,
            raan_deg: field(line2, 18, 25, "raan")?,
            eccentricity: ecc_digits as f64 * 1e-7,
            arg_perigee_deg: field(line2, 35, 42, "arg_perigee")?,
            mean_anomaly_deg: field(line2, 44, 51, "mean_anomaly")?,
            mean_motion_rev_day: field(line2, 53, 63, "mean_motion")?,
            revolution_number: field(line2, 64, 68, "revolution_number")?,
        })
    }

    /// Parse a three-line block where the first line is the object name.
    pub fn parse_with_name(name: &str, line1: &str, line2: &str) -> Result<Self, TleError> {
        let mut tle = Self::parse(line1, line2)?;
        let trimmed = name.trim().trim_start_matches("0 ").trim();
        tle.name = (!trimmed.is_empty()).then(|| trimmed.to_string());
        Ok(tle)
    }

    /// Generate a near-circular element set for an orbit at `altitude_km`.
    pub fn synthetic(
        altitude_km: f64,
        inclination_deg: f64,
        epoch: DateTime<Utc>,
        catalog_number: u32,
    ) -> Self {
        let semi_major_axis = EARTH_RADIUS_KM + altitude_km;
        let mean_motion_rad_s = (MU_EARTH_KM3_S2 / semi_major_axis.powi(3)).sqrt();
        let mean_motion_rev_day = mean_motion_rad_s * SECONDS_PER_DAY / TAU;
        Self::from_fields(
            catalog_number,
            epoch,
            inclination_deg,
            0.0,
            SYNTHETIC_ECCENTRICITY,
            0.0,
            0.0,
            mean_motion_rev_day,
        )
    }

    /// Format element values into a checksummed line pair.
    #[allow(clippy::too_many_arguments)]
    pub fn from_fields(
        catalog_number: u32,
        epoch: DateTime<Utc>,
        inclination_deg: f64,
        raan_deg: f64,
        eccentricity: f64,
        arg_perigee_deg: f64,
        mean_anomaly_deg: f64,
        mean_motion_rev_day: f64,
    ) -> Self {
        let catalog_number = catalog_number % 100_000;
        let year_two_digit = epoch.year().rem_euclid(100);
        let day_of_year = epoch.ordinal() as f64
            + (epoch.num_seconds_from_midnight() as f64 + epoch.nanosecond() as f64 * 1e-9)
                / SECONDS_PER_DAY;
        let designator = format!("{:02}001A", year_two_digit);

        let body1 = format!(
            "1 {:05}U {:<8} {:02}{:012.8} {} {} {} 0 {:>4}",
            catalog_number,
            designator,
            year_two_digit,
            day_of_year,
            format_first_derivative(0.0),
            format_exponential(0.0),
            format_exponential(0.0),
            999,
        );
        let line1 = format!("{}{}", body1, checksum(&body1));

        let inclination = normalize_degrees(inclination_deg, 180.0);
        let raan = normalize_degrees(raan_deg, 360.0);
        let arg_perigee = normalize_degrees(arg_perigee_deg, 360.0);
        let mean_anomaly = normalize_degrees(mean_anomaly_deg, 360.0);
        let ecc_digits = (eccentricity.clamp(0.0, 0.999_999_9) * 1e7).round() as u32;

        let body2 = format!(
            "2 {:05} {:8.4} {:8.4} {:07} {:8.4} {:8.4} {:11.8}{:>5}",
            catalog_number,
            inclination,
            raan,
            ecc_digits,
            arg_perigee,
            mean_anomaly,
            mean_motion_rev_day,
            0,
        );
        let line2 = format!("{}{}", body2, checksum(&body2));

        Self {
            name: Some(format!("SYNTH-{catalog_number:05}")),
            line1,
            line2,
            catalog_number,
            epoch,
            inclination_deg: inclination,
            raan_deg: raan,
            eccentricity: ecc_digits as f64 * 1e-7,
            arg_perigee_deg: arg_perigee,
            mean_anomaly_deg: mean_anomaly,
            mean_motion_rev_day,
            revolution_number: 0,
        }
    }

    /// Mean Keplerian elements at the TLE epoch.
    pub fn elements(&self) -> OrbitalElements {
        let n_rad_s = self.mean_motion_rev_day * TAU / SECONDS_PER_DAY;
        OrbitalElements {
            semi_major_axis_km: (MU_EARTH_KM3_S2 / (n_rad_s * n_rad_s)).cbrt(),
            eccentricity: self.eccentricity,
            inclination_rad: self.inclination_deg.to_radians(),
            raan_rad: self.raan_deg.to_radians(),
            arg_perigee_rad: self.arg_perigee_deg.to_radians(),
            mean_anomaly_rad: self.mean_anomaly_deg.to_radians(),
            epoch: self.epoch,
        }
    }
}

/// Modulo-10 checksum over the first 68 columns of a line.
pub fn checksum(line: &str) -> u32 {
    line.chars()
        .take(LINE_LENGTH - 1)
        .map(|c| match c {
            '0'..='9' => c as u32 - '0' as u32,
            '-' => 1,
            _ => 0,
        })
        .sum::<u32>()
        % 10
}

fn check_line(line: &str, number: u8) -> Result<(), TleError> {
    if !line.is_ascii() || line.len() != LINE_LENGTH {
        return Err(TleError::Length {
            line: number,
            len: line.chars().count(),
        });
    }
    let prefix = format!("{number} ");
    if !line.starts_with(&prefix) {
        return Err(TleError::LineNumber { line: number });
    }
    let found = line.as_bytes()[LINE_LENGTH - 1] as char;
    let computed = checksum(line);
    if found.to_digit(10) != Some(computed) {
        return Err(TleError::Checksum {
            line: number,
            computed,
            found,
        });
    }
    Ok(())
}

/// Columns are 1-indexed and inclusive, as in the published format description.
fn columns(line: &str, first: usize, last: usize) -> &str {
    &line[first - 1..last]
}

fn field<T: std::str::FromStr>(
    line: &str,
    first: usize,
    last: usize,
    name: &'static str,
) -> Result<T, TleError> {
    let raw = columns(line, first, last).trim();
    raw.parse().map_err(|_| TleError::Field {
        field: name,
        raw: raw.to_string(),
    })
}

fn epoch_from_day_of_year(year: i32, day_of_year: f64) -> Option<DateTime<Utc>> {
    if !(1.0..367.0).contains(&day_of_year) {
        return None;
    }
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?
        .and_hms_opt(0, 0, 0)?
        .and_utc();
    Some(epoch::offset(start, (day_of_year - 1.0) * SECONDS_PER_DAY))
}

/// Wrap into `[0, limit)` after rounding to the four decimals the format carries.
fn normalize_degrees(value: f64, limit: f64) -> f64 {
    let wrapped = if limit >= 360.0 {
        value.rem_euclid(360.0)
    } else {
        value.clamp(0.0, limit)
    };
    let rounded = (wrapped * 1e4).round() / 1e4;
    if limit >= 360.0 && rounded >= 360.0 {
        rounded - 360.0
    } else {
        rounded
    }
}

/// First derivative of mean motion: sign column followed by `.dddddddd`.
fn format_first_derivative(value: f64) -> String {
    let sign = if value < 0.0 { '-' } else { ' ' };
    let digits = format!("{:.8}", value.abs().min(0.999_999_99));
    format!("{sign}{}", digits.trim_start_matches('0'))
}

/// Assumed-decimal exponential notation, e.g. ` 12345-4` for 0.12345e-4.
fn format_exponential(value: f64) -> String {
    if value == 0.0 {
        return " 00000-0".to_string();
    }
    let sign = if value < 0.0 { '-' } else { ' ' };
    let magnitude = value.abs();
    let mut exponent = magnitude.log10().floor() as i32 + 1;
    let mut mantissa = (magnitude / 10f64.powi(exponent) * 1e5).round() as u32;
    if mantissa >= 100_000 {
        mantissa /= 10;
        exponent += 1;
    }
    let exp_sign = if exponent < 0 { '-' } else { '+' };
    format!("{sign}{mantissa:05}{exp_sign}{}", exponent.unsigned_abs().min(9))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ISS_LINE1: &str = "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_LINE2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    #[test]
    fn parses_reference_element_set() {
        let tle = Tle::parse(ISS_LINE1, ISS_LINE2).unwrap();
        assert_eq!(tle.catalog_number, 25544);
        assert!((tle.inclination_deg - 51.6416).abs() < 1e-9);
        assert!((tle.eccentricity - 0.0006703).abs() < 1e-12);
        assert!((tle.mean_motion_rev_day - 15.72125391).abs() < 1e-9);
        assert_eq!(tle.revolution_number, 56353);
        assert_eq!(tle.epoch.year(), 2008);
        assert_eq!(tle.epoch.ordinal(), 264);
    }

    #[test]
    fn reference_checksums_match() {
        assert_eq!(checksum(ISS_LINE1), 7);
        assert_eq!(checksum(ISS_LINE2), 7);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut bad = ISS_LINE1.to_string();
        bad.replace_range(68..69, "8");
        assert!(matches!(
            Tle::parse(&bad, ISS_LINE2),
            Err(TleError::Checksum { line: 1, computed: 7, .. })
        ));
    }

    #[test]
    fn short_line_is_rejected() {
        assert!(matches!(
            Tle::parse(&ISS_LINE1[..60], ISS_LINE2),
            Err(TleError::Length { line: 1, len: 60 })
        ));
    }

    #[test]
    fn synthetic_lines_are_fixed_width_and_reparse() {
        let epoch = Utc.with_ymd_and_hms(2025, 6, 15, 6, 30, 0).unwrap();
        let tle = Tle::synthetic(500.0, 97.4, epoch, 99_001);
        assert_eq!(tle.line1.len(), LINE_LENGTH);
        assert_eq!(tle.line2.len(), LINE_LENGTH);
        assert_eq!(&tle.line1[18..20], "25");
        assert_eq!(&tle.line2[26..33], "0001000");

        let parsed = Tle::parse(&tle.line1, &tle.line2).unwrap();
        assert_eq!(parsed.catalog_number, 99_001);
        assert!((parsed.inclination_deg - 97.4).abs() < 1e-9);
        assert!((parsed.mean_motion_rev_day - tle.mean_motion_rev_day).abs() < 1e-8);
        assert!((parsed.epoch - epoch).num_milliseconds().abs() < 5);
    }

    #[test]
    fn synthetic_mean_motion_recovers_semi_major_axis() {
        let epoch = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let tle = Tle::synthetic(400.0, 51.6, epoch, 1);
        let parsed = Tle::parse(&tle.line1, &tle.line2).unwrap();
        let a = parsed.elements().semi_major_axis_km;
        assert!((a - (EARTH_RADIUS_KM + 400.0)).abs() < 0.01, "a = {a}");
    }

    #[test]
    fn exponential_fields_use_assumed_decimal() {
        assert_eq!(format_exponential(-0.11606e-4), "-11606-4");
        assert_eq!(format_exponential(0.0), " 00000-0");
        assert_eq!(format_first_derivative(-0.00002182), "-.00002182");
        assert_eq!(format_first_derivative(0.0), " .00000000");
    }
}
