//! Node peak-performance benchmarks.

use crate::models::JobId;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A benchmark id with its display title.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Benchmark {
    pub id: &'static str,
    pub title: &'static str,
}

const fn bench(id: &'static str, title: &'static str) -> Benchmark {
    Benchmark { id, title }
}

/// Compute ceilings, double precision first.
pub const FLOP_BENCHMARKS: [Benchmark; 12] = [
    bench("peakflops", "DP"),
    bench("peakflops_sse", "DP SSE"),
    bench("peakflops_avx", "DP AVX"),
    bench("peakflops_avx_fma", "DP AVX FMA"),
    bench("peakflops_avx512", "DP AVX512"),
    bench("peakflops_avx512_fma", "DP AVX512 FMA"),
    bench("peakflops_sp", "SP"),
    bench("peakflops_sp_sse", "SP SSE"),
    bench("peakflops_sp_avx", "SP AVX"),
    bench("peakflops_sp_avx_fma", "SP AVX FMA"),
    bench("peakflops_sp_avx512", "SP AVX512"),
    bench("peakflops_sp_avx512_fma", "SP AVX512 FMA"),
];

/// Main memory bandwidth. This is the ceiling used by the roofline.
pub const DRAM_BENCHMARKS: [Benchmark; 1] = [bench("bandwidth_mem", "Bandwidth DRAM")];

pub const CACHE_BENCHMARKS: [Benchmark; 3] = [
    bench("bandwidth_l1", "Bandwidth L1"),
    bench("bandwidth_l2", "Bandwidth L2"),
    bench("bandwidth_l3", "Bandwidth L3"),
];

/// Id of the memory bandwidth benchmark.
pub const MEMORY_BANDWIDTH: &str = "bandwidth_mem";

/// Iterate over all known benchmarks.
pub fn all() -> impl Iterator<Item = &'static Benchmark> {
    FLOP_BENCHMARKS
        .iter()
        .chain(DRAM_BENCHMARKS.iter())
        .chain(CACHE_BENCHMARKS.iter())
}

/// Display title of a benchmark id.
pub fn title(id: &str) -> Option<&'static str> {
    all().find(|b| b.id == id).map(|b| b.title)
}

/// Returns true for bandwidth benchmarks, whose values are bytes per second.
pub fn is_bandwidth(id: &str) -> bool {
    id.starts_with("bandwidth_")
}

/// Benchmarks that can be overlaid on a metric of a group.
///
/// FLOPS metrics take the compute ceilings, bandwidth metrics of the memory group the DRAM
/// bandwidth and bandwidth metrics of the cache group the cache bandwidths. Nothing applies to
/// any other combination.
pub fn applicable(group: &str, metric: &str) -> &'static [Benchmark] {
    match (group, metric) {
        (_, "FLOPS") => &FLOP_BENCHMARKS,
        ("memory", "Bandwidth") => &DRAM_BENCHMARKS,
        ("cache", "Bandwidth") => &CACHE_BENCHMARKS,
        _ => &[],
    }
}

/// Returns true if `id` can be overlaid on a metric of a group.
pub fn is_applicable(group: &str, metric: &str, id: &str) -> bool {
    applicable(group, metric).iter().any(|b| b.id == id)
}

/// Peak values by benchmark id, unprefixed (FLOP/s or B/s).
pub type NodeBenchmarks = BTreeMap<String, f64>;

/// Lookup of the nodes of a job and their theoretical peak values.
pub trait NodeCapabilities {
    /// Nodes the job ran on. The first one serves as reference node.
    fn job_nodes(&self, job_id: JobId) -> Vec<String>;

    /// Peak values of one node of a job. `None` if the node is unknown.
    fn peak_values(&self, job_id: JobId, node: &str) -> Option<NodeBenchmarks>;
}

/// Node capabilities held in memory, keyed by job id then node name.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StaticNodeCapabilities {
    jobs: BTreeMap<JobId, BTreeMap<String, NodeBenchmarks>>,
}

impl StaticNodeCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the peak values of one node of a job.
    pub fn insert(&mut self, job_id: JobId, node: &str, benchmarks: NodeBenchmarks) {
        self.jobs
            .entry(job_id)
            .or_default()
            .insert(node.to_string(), benchmarks);
    }
}

impl NodeCapabilities for StaticNodeCapabilities {
    fn job_nodes(&self, job_id: JobId) -> Vec<String> {
        self.jobs
            .get(&job_id)
            .map(|nodes| nodes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn peak_values(&self, job_id: JobId, node: &str) -> Option<NodeBenchmarks> {
        self.jobs.get(&job_id)?.get(node).cloned()
    }
}
