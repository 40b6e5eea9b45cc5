use lazy_static::lazy_static;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

lazy_static! {
    // Registry for holding metric state
    pub static ref REGISTRY: Registry = Registry::new();
    // Cache lookups by result (hit/miss)
    pub static ref MEASUREMENT_CACHE_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("measurement_cache_lookups", "The number of measurement cache lookups"),
        &["result"]
    ).unwrap();
    // Fetches by outcome (ok/empty/error/invalid)
    pub static ref MEASUREMENT_FETCHES: IntCounterVec = IntCounterVec::new(
        Opts::new("measurement_fetches", "The number of measurement fetches issued"),
        &["outcome"]
    ).unwrap();
    // Cache entries removed by invalidation
    pub static ref MEASUREMENT_CACHE_INVALIDATIONS: IntCounter = IntCounter::new(
        "measurement_cache_invalidations", "The number of cache entries invalidated"
    ).unwrap();
    // Assembly histogram by graph kind
    pub static ref GRAPH_ASSEMBLY_TIME: HistogramVec = HistogramVec::new(
        HistogramOpts{
            common_opts: Opts::new("graph_assembly_time", "The time taken to assemble each graph"),
            buckets: prometheus::DEFAULT_BUCKETS.to_vec(),
        },
        &["kind"],
    ).unwrap();
}

/// Register all collectors with the registry.
///
/// Fails if called more than once.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(MEASUREMENT_CACHE_LOOKUPS.clone()))?;
    REGISTRY.register(Box::new(MEASUREMENT_FETCHES.clone()))?;
    REGISTRY.register(Box::new(MEASUREMENT_CACHE_INVALIDATIONS.clone()))?;
    REGISTRY.register(Box::new(GRAPH_ASSEMBLY_TIME.clone()))?;
    Ok(())
}

/// Render all registered metrics in the text exposition format.
pub fn gather() -> Result<String, prometheus::Error> {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Count a measurement cache lookup
pub fn record_lookup(hit: bool) {
    MEASUREMENT_CACHE_LOOKUPS
        .with_label_values(&[if hit { "hit" } else { "miss" }])
        .inc();
}

/// Count a measurement fetch, labelled by outcome
pub fn record_fetch(outcome: &str) {
    MEASUREMENT_FETCHES.with_label_values(&[outcome]).inc();
}

/// Count invalidated cache entries
pub fn record_invalidations(count: usize) {
    MEASUREMENT_CACHE_INVALIDATIONS.inc_by(count as u64);
}

/// Record the time taken to assemble a graph of a kind
pub fn record_assembly(kind: &str, elapsed: std::time::Duration) {
    GRAPH_ASSEMBLY_TIME
        .with_label_values(&[kind])
        .observe(elapsed.as_secs_f64());
}
