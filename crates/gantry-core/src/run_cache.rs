//! Time-bounded cache of resolved run references.
//!
//! Entries are keyed by the verbatim run-reference string from the request,
//! so `latest` and an explicit run id are cached independently even when
//! they denote the same run. Expired entries count as absent: there is no
//! background refresh and no revalidation, the next request simply resolves
//! upstream again and overwrites.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::github::Artifact;

/// A resolved (run, artifact) pair with its resolution time.
#[derive(Debug, Clone)]
pub struct CachedRun {
    /// The concrete run the reference resolved to.
    pub run_id: u64,
    /// The artifact descriptor resolved for that run.
    pub artifact: Artifact,
    /// When the resolution happened.
    pub fetched_at: Instant,
}

/// Per-target map of run reference → [`CachedRun`] with TTL freshness.
#[derive(Debug)]
pub struct RunCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedRun>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::internal("run cache lock poisoned")
}

impl RunCache {
    /// Creates an empty cache whose entries stay fresh for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the entry for `reference` if it is still fresh at `now`.
    ///
    /// # Errors
    /// Returns [`Error::Internal`] if the cache lock is poisoned.
    pub fn get(&self, reference: &str, now: Instant) -> Result<Option<CachedRun>> {
        let entries = self.entries.lock().map_err(poison_err)?;
        Ok(entries
            .get(reference)
            .filter(|entry| now.saturating_duration_since(entry.fetched_at) <= self.ttl)
            .cloned())
    }

    /// Stores `entry` under `reference`, overwriting any prior entry.
    ///
    /// # Errors
    /// Returns [`Error::Internal`] if the cache lock is poisoned.
    pub fn insert(&self, reference: impl Into<String>, entry: CachedRun) -> Result<()> {
        let mut entries = self.entries.lock().map_err(poison_err)?;
        entries.insert(reference.into(), entry);
        Ok(())
    }
}
