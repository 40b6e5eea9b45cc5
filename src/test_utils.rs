use crate::benchmarks::{NodeBenchmarks, StaticNodeCapabilities};
use crate::error::GraphError;
use crate::fetcher::MeasurementFetcher;
use crate::models::*;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Create a MetricSeries with only the fields needed for assembly set.
pub(crate) fn series(uid: &str, id: &str, unit: &str, values: &[f64]) -> MetricSeries {
    MetricSeries {
        id: id.to_string(),
        uid: uid.to_string(),
        name: format!("{} {}", uid, id),
        raw_name: "DP".to_string(),
        unit: unit.to_string(),
        interval: 5.0,
        values: values.to_vec(),
        level: Level::Core,
        group: "cpu".to_string(),
        table: uid.split('-').next().unwrap_or(uid).to_string(),
        ..Default::default()
    }
}

/// Create a payload holding the given series and no statistics.
pub(crate) fn payload(traces: Vec<MetricSeries>) -> RawMeasurementPayload {
    RawMeasurementPayload {
        traces,
        statistics: StatisticsBundle::new(),
    }
}

/// Create a job level FLOPS query.
pub(crate) fn query(job_ids: Vec<JobId>) -> Query {
    Query::new(job_ids, "cpu", "FLOPS", Level::Job, None, false)
}

/// Create a node capability table with one node per job.
pub(crate) fn capabilities(
    jobs: &[JobId],
    node: &str,
    peaks: &[(&str, f64)],
) -> StaticNodeCapabilities {
    let benchmarks: NodeBenchmarks = peaks.iter().map(|(k, v)| (k.to_string(), *v)).collect();
    let mut capabilities = StaticNodeCapabilities::new();
    for job in jobs {
        capabilities.insert(*job, node, benchmarks.clone());
    }
    capabilities
}

/// Mock fetcher serving payloads by cache key and counting calls.
#[derive(Debug, Default)]
pub(crate) struct MockFetcher {
    payloads: Mutex<HashMap<String, RawMeasurementPayload>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    fail: bool,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch, keeping it in flight.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every fetch.
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Serve `payload` for the cache key of `query`.
    pub(crate) fn serve(&self, query: &Query, payload: RawMeasurementPayload) {
        self.payloads
            .lock()
            .unwrap()
            .insert(query.cache_key(), payload);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MeasurementFetcher for MockFetcher {
    async fn fetch(&self, query: &Query) -> Result<Option<RawMeasurementPayload>, GraphError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(GraphError::FetchStatus { status: 500 });
        }
        Ok(self.payloads.lock().unwrap().get(&query.cache_key()).cloned())
    }
}
