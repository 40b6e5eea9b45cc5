//! Process-wide cache of raw measurement payloads.

use crate::error::{log_error, GraphError};
use crate::fetcher::MeasurementFetcher;
use crate::metrics;
use crate::models::{JobId, Query, RawMeasurementPayload};

use hashbrown::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use validator::Validate;

/// Read access to cached measurements.
///
/// The assemblers only read through this trait and never trigger fetches.
pub trait MeasurementSource {
    /// Cached payload for the leading job of `query`, if any.
    fn get(&self, query: &Query) -> Option<Arc<RawMeasurementPayload>>;
}

/// Measurement cache.
///
/// Payloads are keyed by [Query::cache_key] and live until they are invalidated. At most one
/// fetch per key is in flight at any time: concurrent [MeasurementCache::ensure] calls for the
/// same key wait for the first one and then read its result.
pub struct MeasurementCache<F> {
    /// Collaborator used on cache misses
    fetcher: F,
    entries: RwLock<HashMap<String, Arc<RawMeasurementPayload>>>,
    /// Per-key locks of in-flight fetches
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<F: MeasurementFetcher> MeasurementCache<F> {
    /// Create an empty cache.
    ///
    /// # Arguments
    ///
    /// * `fetcher`: Collaborator used to fetch missing measurements
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// The fetch collaborator.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Ensure the cache holds data for a query.
    ///
    /// Returns true if data is present afterwards. Fetch failures and empty responses yield
    /// false and leave nothing new in the cache; there is no retry.
    ///
    /// # Arguments
    ///
    /// * `query`: Query narrowed to a single job, see [Query::for_job]
    /// * `refresh`: Fetch even if the key is already cached
    #[tracing::instrument(level = "DEBUG", skip(self, query), fields(key = %query.cache_key()))]
    pub async fn ensure(&self, query: &Query, refresh: bool) -> bool {
        if let Err(errors) = query.validate() {
            tracing::warn!("skipping fetch of invalid query: {}", errors);
            return false;
        }
        let key = query.cache_key();
        let before = self.lookup(&key);
        if before.is_some() && !refresh {
            metrics::record_lookup(true);
            tracing::debug!("cache hit");
            return true;
        }
        metrics::record_lookup(false);

        let lock = self.key_lock(&key);
        let present = {
            let _guard = lock.lock().await;
            // Another caller may have completed a fetch while we waited.
            let fetched_meanwhile = match (&before, self.lookup(&key)) {
                (None, Some(_)) => true,
                (Some(before), Some(current)) => !Arc::ptr_eq(before, &current),
                _ => false,
            };
            if fetched_meanwhile {
                tracing::debug!("served by concurrent fetch");
                true
            } else {
                self.fetch_and_store(query, &key).await
            }
        };
        self.release_key_lock(&key, lock);
        present
    }

    /// Fetch a query and store a non-empty, valid result.
    async fn fetch_and_store(&self, query: &Query, key: &str) -> bool {
        match self.fetcher.fetch(query).await {
            Ok(Some(payload)) if payload.has_data() => match payload.validate() {
                Ok(()) => {
                    metrics::record_fetch("ok");
                    self.write().insert(key.to_string(), Arc::new(payload));
                    true
                }
                Err(errors) => {
                    metrics::record_fetch("invalid");
                    log_error(&GraphError::InvalidPayload(errors));
                    false
                }
            },
            Ok(_) => {
                metrics::record_fetch("empty");
                tracing::debug!("no measurements");
                // A refreshed query without data must not keep serving stale data.
                self.write().remove(key);
                false
            }
            Err(error) => {
                metrics::record_fetch("error");
                log_error(&error);
                false
            }
        }
    }

    /// Insert a payload directly, bypassing the fetcher.
    ///
    /// # Arguments
    ///
    /// * `query`: Query the payload answers
    /// * `payload`: Payload to store; must pass validation
    pub fn insert(&self, query: &Query, payload: RawMeasurementPayload) -> Result<(), GraphError> {
        payload.validate()?;
        self.write().insert(query.cache_key(), Arc::new(payload));
        Ok(())
    }

    /// Remove all entries belonging to any of the given jobs.
    ///
    /// Returns the number of removed entries.
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub fn invalidate(&self, job_ids: &[JobId]) -> usize {
        let prefixes: Vec<String> = job_ids.iter().map(|id| format!("{}.", id)).collect();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|key, _| !prefixes.iter().any(|p| key.starts_with(p.as_str())));
        let removed = before - entries.len();
        metrics::record_invalidations(removed);
        tracing::debug!("invalidated {} entries", removed);
        removed
    }

    /// Number of cached payloads.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<Arc<RawMeasurementPayload>> {
        self.read().get(key).cloned()
    }

    fn read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<RawMeasurementPayload>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<RawMeasurementPayload>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get or create the lock of a key.
    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop our handle of a key lock, removing the lock once nobody else holds it.
    fn release_key_lock(&self, key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if in_flight
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            in_flight.remove(key);
        }
    }
}

impl<F: MeasurementFetcher> MeasurementSource for MeasurementCache<F> {
    fn get(&self, query: &Query) -> Option<Arc<RawMeasurementPayload>> {
        self.lookup(&query.cache_key())
    }
}
