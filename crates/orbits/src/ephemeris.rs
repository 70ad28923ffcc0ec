//! Ephemeris points and the piecewise ephemeris the engine slices per activity.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use msim_core::constants::EARTH_RADIUS_KM;
use msim_core::vector::{self, Vector3};

use crate::OrbitError;
use crate::propagator::Propagator;

/// Position and velocity (ECI) at an instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EphemerisPoint {
    pub time: DateTime<Utc>,
    pub position_km: Vector3,
    pub velocity_km_s: Vector3,
}

impl EphemerisPoint {
    /// Geocentric radius (km).
    pub fn radius_km(&self) -> f64 {
        vector::norm(&self.position_km)
    }

    /// Height above a spherical Earth of equatorial radius (km).
    pub fn altitude_km(&self) -> f64 {
        self.radius_km() - EARTH_RADIUS_KM
    }

    pub fn speed_km_s(&self) -> f64 {
        vector::norm(&self.velocity_km_s)
    }
}

struct Segment {
    start: DateTime<Utc>,
    propagator: Arc<dyn Propagator>,
}

/// Sampled ephemeris over a span, possibly stitched from several propagators when
/// the orbit was changed part-way through the run.
pub struct Ephemeris {
    step_s: f64,
    end: DateTime<Utc>,
    points: Vec<EphemerisPoint>,
    segments: Vec<Segment>,
}

impl std::fmt::Debug for Ephemeris {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ephemeris")
            .field("step_s", &self.step_s)
            .field("end", &self.end)
            .field("points", &self.points.len())
            .field("segments", &self.segments.len())
            .finish()
    }
}

impl Ephemeris {
    /// Sample `propagator` over `[start, end]`.
    pub fn generate(
        propagator: Arc<dyn Propagator>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step_s: f64,
    ) -> Result<Self, OrbitError> {
        let points = propagator.propagate(start, end, step_s)?;
        Ok(Self::from_parts(propagator, start, end, step_s, points))
    }

    /// Wrap points that were sampled from `propagator` elsewhere (e.g. a cache).
    pub fn from_parts(
        propagator: Arc<dyn Propagator>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step_s: f64,
        points: Vec<EphemerisPoint>,
    ) -> Self {
        Self {
            step_s,
            end,
            points,
            segments: vec![Segment { start, propagator }],
        }
    }

    pub fn points(&self) -> &[EphemerisPoint] {
        &self.points
    }

    pub fn step_s(&self) -> f64 {
        self.step_s
    }

    /// Evaluate the ephemeris at any instant inside or outside the sampled grid.
    pub fn state_at(&self, at: DateTime<Utc>) -> EphemerisPoint {
        let segment = self
            .segments
            .iter()
            .rev()
            .find(|segment| segment.start <= at)
            .unwrap_or(&self.segments[0]);
        segment.propagator.state_at(at)
    }

    /// Points inside `[start, end]`. Exact boundary points are synthesized when the
    /// sampling grid does not land on them.
    pub fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<EphemerisPoint> {
        if end < start {
            return Vec::new();
        }
        let first = self.points.partition_point(|p| p.time < start);
        let last = self.points.partition_point(|p| p.time <= end);
        let mut window = Vec::with_capacity(last.saturating_sub(first) + 2);
        if self.points.get(first).is_none_or(|p| p.time != start) {
            window.push(self.state_at(start));
        }
        window.extend_from_slice(&self.points[first..last.max(first)]);
        if window.last().is_none_or(|p| p.time != end) {
            window.push(self.state_at(end));
        }
        window
    }

    /// Replace everything after `from` with samples from a new propagator, keeping the
    /// original grid spacing anchored at `from`.
    pub fn replace_from(
        &mut self,
        from: DateTime<Utc>,
        propagator: Arc<dyn Propagator>,
    ) -> Result<(), OrbitError> {
        self.points.retain(|p| p.time < from);
        self.segments.retain(|segment| segment.start < from);
        if from <= self.end {
            let tail = propagator.propagate(from, self.end, self.step_s)?;
            self.points.extend(tail);
        }
        self.segments.push(Segment {
            start: from,
            propagator,
        });
        Ok(())
    }
}
