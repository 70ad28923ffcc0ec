//! In-memory memoization of propagated ephemerides.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use msim_config::Fidelity;
use msim_orbits::EphemerisPoint;
use tracing::warn;

/// Everything that determines a propagation result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    state_bits: [u64; 6],
    epoch: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step_bits: u64,
    fidelity: Fidelity,
}

impl CacheKey {
    pub fn new(
        position_km: &[f64; 3],
        velocity_km_s: &[f64; 3],
        epoch: DateTime<Utc>,
        span: (DateTime<Utc>, DateTime<Utc>),
        step_s: f64,
        fidelity: Fidelity,
    ) -> Self {
        let mut state_bits = [0u64; 6];
        for (slot, value) in state_bits
            .iter_mut()
            .zip(position_km.iter().chain(velocity_km_s.iter()))
        {
            *slot = value.to_bits();
        }
        Self {
            state_bits,
            epoch,
            start: span.0,
            end: span.1,
            step_bits: step_s.to_bits(),
            fidelity,
        }
    }
}

type Entries = HashMap<CacheKey, Arc<Vec<EphemerisPoint>>>;

/// Engine-owned cache. Shared across runs of the same engine, safe across threads.
#[derive(Debug, Default)]
pub struct EphemerisCache {
    entries: Mutex<Entries>,
}

impl EphemerisCache {
    /// Entries are whole immutable ephemerides, so a map left behind by a panicking
    /// run is still consistent and is reused.
    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("ephemeris cache lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<EphemerisPoint>>> {
        self.entries().get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, points: Arc<Vec<EphemerisPoint>>) {
        self.entries().insert(key, points);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}
