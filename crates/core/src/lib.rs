//! Core units, constants, and shared primitives for the mission simulator workspace.

/// Physical constants expressed in SI units unless the name says otherwise.
pub mod constants {
    /// Standard gravity at Earth's surface (m/s²).
    pub const G0: f64 = 9.80665;
    /// Earth gravitational parameter (km³/s²).
    pub const MU_EARTH_KM3_S2: f64 = 398_600.4418;
    /// Earth equatorial radius (km).
    pub const EARTH_RADIUS_KM: f64 = 6_378.137;
    /// Second zonal harmonic of Earth's gravity field.
    pub const J2: f64 = 1.082_626_68e-3;
    /// Earth rotation rate (rad/s).
    pub const EARTH_ROTATION_RAD_S: f64 = 7.292_115_146_7e-5;
    /// Solar flux at 1 AU (W/m²).
    pub const SOLAR_FLUX_W_M2: f64 = 1361.0;
    /// Seconds per Julian day.
    pub const SECONDS_PER_DAY: f64 = 86_400.0;
    /// Seconds per hour.
    pub const SECONDS_PER_HOUR: f64 = 3_600.0;
}

/// Basic unit conversion helpers.
pub mod units {
    /// Convert kilometres to metres.
    #[inline]
    pub fn km_to_m(v: f64) -> f64 {
        v * 1_000.0
    }

    /// Convert metres to kilometres.
    #[inline]
    pub fn m_to_km(v: f64) -> f64 {
        v / 1_000.0
    }

    /// Convert metres per second to kilometres per second.
    #[inline]
    pub fn ms_to_kms(v: f64) -> f64 {
        v / 1_000.0
    }

    /// Convert kilometres per second to metres per second.
    #[inline]
    pub fn kms_to_ms(v: f64) -> f64 {
        v * 1_000.0
    }

    /// Megabits (link rates) to megabytes.
    #[inline]
    pub fn mbit_to_mbyte(v: f64) -> f64 {
        v / 8.0
    }

    /// Megabytes to gigabytes (decimal).
    #[inline]
    pub fn mb_to_gb(v: f64) -> f64 {
        v / 1_000.0
    }

    /// Gigabytes to megabytes (decimal).
    #[inline]
    pub fn gb_to_mb(v: f64) -> f64 {
        v * 1_000.0
    }
}

/// Lightweight time utilities shared across crates.
pub mod time {
    use super::constants::{SECONDS_PER_DAY, SECONDS_PER_HOUR};

    /// Convert days to seconds.
    #[inline]
    pub fn days_to_seconds(days: f64) -> f64 {
        days * SECONDS_PER_DAY
    }

    /// Convert seconds to days.
    #[inline]
    pub fn seconds_to_days(seconds: f64) -> f64 {
        seconds / SECONDS_PER_DAY
    }

    /// Convert seconds to hours.
    #[inline]
    pub fn seconds_to_hours(seconds: f64) -> f64 {
        seconds / SECONDS_PER_HOUR
    }

    /// Energy in watt-hours delivered by `power_w` over `dt_s` seconds.
    #[inline]
    pub fn watt_hours(power_w: f64, dt_s: f64) -> f64 {
        power_w * dt_s / SECONDS_PER_HOUR
    }
}

/// Minimal vector helpers to avoid ad-hoc `[f64; 3]` math everywhere.
pub mod vector {
    /// Alias for a 3D vector in kilometres or km/s depending on context.
    pub type Vector3 = [f64; 3];

    /// Euclidean norm of a vector.
    #[inline]
    pub fn norm(v: &Vector3) -> f64 {
        dot(v, v).sqrt()
    }

    /// Dot product of two vectors.
    #[inline]
    pub fn dot(a: &Vector3, b: &Vector3) -> f64 {
        a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
    }

    /// Cross product `a × b`.
    #[inline]
    pub fn cross(a: &Vector3, b: &Vector3) -> Vector3 {
        [
            a[1] * b[2] - a[2] * b[1],
            a[2] * b[0] - a[0] * b[2],
            a[0] * b[1] - a[1] * b[0],
        ]
    }

    /// Vector addition.
    #[inline]
    pub fn add(a: &Vector3, b: &Vector3) -> Vector3 {
        [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
    }

    /// Vector subtraction.
    #[inline]
    pub fn sub(a: &Vector3, b: &Vector3) -> Vector3 {
        [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
    }

    /// Scale a vector by a scalar.
    #[inline]
    pub fn scale(v: &Vector3, s: f64) -> Vector3 {
        [v[0] * s, v[1] * s, v[2] * s]
    }

    /// Unit vector in the direction of `v`; the zero vector maps to itself.
    #[inline]
    pub fn unit(v: &Vector3) -> Vector3 {
        let n = norm(v);
        if n == 0.0 { *v } else { scale(v, 1.0 / n) }
    }

    /// Angle between two vectors in radians.
    pub fn angle_between(a: &Vector3, b: &Vector3) -> f64 {
        let denom = norm(a) * norm(b);
        if denom == 0.0 {
            return 0.0;
        }
        (dot(a, b) / denom).clamp(-1.0, 1.0).acos()
    }
}
