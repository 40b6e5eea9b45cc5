//! Assembly of roofline graphs.
//!
//! A roofline plots achieved performance against operational intensity. Jobs are drawn as
//! markers, the peak values of a reference node as ceilings.

use crate::benchmarks::{self, NodeBenchmarks, NodeCapabilities};
use crate::graph::{self, Graph, LayoutOptions, Trace, TraceMode, XValues};
use crate::measurement_cache::MeasurementSource;
use crate::metrics;
use crate::models::{GraphStyling, JobId, Level, Precision, Query, RooflineQuery};
use crate::palette;
use crate::preferences::GraphOverrides;

use std::collections::BTreeMap;
use std::time::Instant;

const GIGA: f64 = 1e9;
const GIBI: f64 = 1024.0 * 1024.0 * 1024.0;

/// Sample points are integers up to 10^DENSE_DIGITS and log spaced beyond.
const DENSE_DIGITS: u32 = 3;

/// Name of the series holding the total data volume.
const TOTAL_DATA_VOLUME: &str = "total";

/// Everything a roofline is assembled from, apart from the cached measurements.
#[derive(Clone, Copy, Debug)]
pub struct RooflineInput<'a> {
    pub query: &'a RooflineQuery,
    /// Peak values per node set on the graph, taking precedence over the node lookup
    pub benchmarks: &'a BTreeMap<String, NodeBenchmarks>,
    pub styling: &'a GraphStyling,
    pub overrides: &'a GraphOverrides,
    /// Set if fetching the data of the query failed
    pub no_data: bool,
}

/// Query of the achieved FLOP rate of a job on one node.
pub fn flops_query(job_id: JobId, node: &str) -> Query {
    Query::new(vec![job_id], "cpu", "FLOPS", Level::Node, Some(node), false)
}

/// Query of the data volume moved by a job on one node.
pub fn data_volume_query(job_id: JobId, node: &str) -> Query {
    Query::new(
        vec![job_id],
        "memory",
        "Data Volume",
        Level::Node,
        Some(node),
        false,
    )
}

/// Measurement queries needed for the markers of a roofline.
///
/// Data is read from the first node of every job, which is not necessarily the reference node
/// providing the peak values. Jobs without known nodes are skipped.
pub fn data_queries<N>(nodes: &N, job_ids: &[JobId]) -> Vec<Query>
where
    N: NodeCapabilities + ?Sized,
{
    job_ids
        .iter()
        .filter_map(|&job_id| {
            let node = nodes.job_nodes(job_id).into_iter().next()?;
            Some([flops_query(job_id, &node), data_volume_query(job_id, &node)])
        })
        .flatten()
        .collect()
}

/// Assemble a roofline graph.
///
/// Returns a graph without traces if no job, no reference node, no compute ceiling or no
/// precision is selected.
///
/// # Arguments
///
/// * `source`: Cached measurements
/// * `nodes`: Node lookup for job nodes and peak values
/// * `input`: Query and styling of the graph
#[tracing::instrument(level = "DEBUG", skip_all)]
pub fn assemble_roofline<S, N>(source: &S, nodes: &N, input: &RooflineInput) -> Graph
where
    S: MeasurementSource + ?Sized,
    N: NodeCapabilities + ?Sized,
{
    let start = Instant::now();
    let graph = assemble_graph(source, nodes, input);
    metrics::record_assembly("roofline", start.elapsed());
    graph
}

fn assemble_graph<S, N>(source: &S, nodes: &N, input: &RooflineInput) -> Graph
where
    S: MeasurementSource + ?Sized,
    N: NodeCapabilities + ?Sized,
{
    let query = input.query;
    let reference_node = query.node.as_deref().filter(|n| !n.is_empty());
    let precisions = query.precisions();
    let Some(reference_node) = reference_node.filter(|_| {
        !query.job_ids.is_empty() && !query.plot_flops.is_empty() && !precisions.is_empty()
    }) else {
        return Graph {
            traces: Vec::new(),
            layout: layout(input, false),
        };
    };

    let (mut traces, max_intensity) = markers(source, nodes, input, &precisions);
    match peak_values(nodes, input, reference_node) {
        Some(peaks) => {
            let ceilings = ceilings(input, &peaks, max_intensity, traces.len());
            traces.extend(ceilings);
        }
        None => tracing::debug!("no peak values for node {}", reference_node),
    }

    Graph {
        layout: layout(input, input.no_data || traces.is_empty()),
        traces,
    }
}

fn layout(input: &RooflineInput, no_data: bool) -> graph::Layout {
    graph::create_layout(&LayoutOptions {
        y_title: "FLOPS [GFLOPS/s]".to_string(),
        x_title: Some("Operational Intensity [FLOPS/byte]".to_string()),
        rangeslider: false,
        autorange: true,
        x_autotick: true,
        no_data,
        show_legend: input.styling.show_legend,
        ..Default::default()
    })
}

/// Peak values of the reference node in GFLOP/s and GiB/s.
fn peak_values<N>(nodes: &N, input: &RooflineInput, node: &str) -> Option<NodeBenchmarks>
where
    N: NodeCapabilities + ?Sized,
{
    let raw = match input.benchmarks.get(node) {
        Some(peaks) => peaks.clone(),
        None => input
            .query
            .job_ids
            .iter()
            .find_map(|&job_id| nodes.peak_values(job_id, node))?,
    };
    Some(
        raw.into_iter()
            .map(|(id, value)| {
                let divisor = if benchmarks::is_bandwidth(&id) {
                    GIBI
                } else {
                    GIGA
                };
                (id, value / divisor)
            })
            .collect(),
    )
}

/// Markers of the achieved performance of each job and precision.
///
/// Returns the markers and the largest operational intensity among them.
fn markers<S, N>(
    source: &S,
    nodes: &N,
    input: &RooflineInput,
    precisions: &[Precision],
) -> (Vec<Trace>, f64)
where
    S: MeasurementSource + ?Sized,
    N: NodeCapabilities + ?Sized,
{
    let query = input.query;
    let mut traces = Vec::new();
    let mut max_intensity: f64 = 0.0;
    for &job_id in &query.job_ids {
        let Some(node) = nodes.job_nodes(job_id).into_iter().next() else {
            continue;
        };
        let (Some(flops), Some(volume)) = (
            source.get(&flops_query(job_id, &node)),
            source.get(&data_volume_query(job_id, &node)),
        ) else {
            tracing::debug!("incomplete roofline data for job {}", job_id);
            continue;
        };
        let Some(total) = volume
            .traces
            .iter()
            .find(|series| series.name == TOTAL_DATA_VOLUME)
        else {
            continue;
        };

        for precision in precisions {
            let precision = precision.to_string();
            let series = flops.traces.iter().find(|series| series.name == precision);
            let Some(series) = series else {
                continue;
            };
            let achieved = query.plot_by.aggregate(series.unconverted_values());
            let moved = query.plot_by.aggregate(total.unconverted_values());
            let (Some(achieved), Some(moved)) = (achieved, moved) else {
                continue;
            };
            if achieved == 0.0 || moved == 0.0 {
                continue;
            }

            let gflops = achieved / GIGA;
            let intensity = gflops / (moved / GIBI);
            max_intensity = max_intensity.max(intensity);

            let uid = format!("{}-{}", job_id, precision);
            let name = match input.overrides.name(&uid) {
                Some(name) => name.to_string(),
                None => format!("{} {}", job_id, precision),
            };
            let x = XValues::Numbers(vec![intensity]);
            let mut trace = Trace::new(&uid, &name, x, vec![gflops]);
            trace.mode = TraceMode::Markers;
            trace.color = color(input, &uid, traces.len());
            traces.push(trace);
        }
    }
    (traces, max_intensity)
}

/// Sample points of the ceiling curves.
///
/// Tenths up to one, then integers, then multiples of each power of ten, up to the next power of
/// ten above the largest intensity. The exact intersections of the bandwidth ceiling with each
/// compute ceiling are added.
fn sample_points(max_intensity: f64, intersections: &[f64]) -> Vec<f64> {
    let digits = format!("{}", max_intensity.round() as u64).len() as u32;
    let upper = 20.max(10u64.pow(digits.min(DENSE_DIGITS)) + 1);
    let mut points: Vec<f64> = (0..10).map(|i| i as f64 * 0.1).collect();
    points.extend((1..upper).map(|i| i as f64));
    for exponent in DENSE_DIGITS..digits {
        let decade = 10f64.powi(exponent as i32);
        points.extend((2..=10).map(|k| k as f64 * decade));
    }
    points.extend_from_slice(intersections);
    points.sort_by(f64::total_cmp);
    points
}

/// Bandwidth and compute ceilings of the reference node.
fn ceilings(
    input: &RooflineInput,
    peaks: &NodeBenchmarks,
    max_intensity: f64,
    trace_count: usize,
) -> Vec<Trace> {
    let mut flops: Vec<(&str, f64)> = input
        .query
        .plot_flops
        .iter()
        .filter_map(|id| peaks.get(id).map(|value| (id.as_str(), *value)))
        .collect();
    flops.sort_by(|a, b| a.0.cmp(b.0));
    let bandwidth = peaks.get(benchmarks::MEMORY_BANDWIDTH).copied();
    let max_ceiling = flops.iter().map(|(_, value)| *value).reduce(f64::max);

    let intersection = |ceiling: f64| bandwidth.map_or(0.0, |bandwidth| ceiling / bandwidth);
    let intersections: Vec<f64> = match bandwidth {
        Some(_) => flops.iter().map(|(_, value)| intersection(*value)).collect(),
        None => Vec::new(),
    };
    let points = sample_points(max_intensity, &intersections);

    let mut traces = Vec::new();
    if let Some(bandwidth) = bandwidth {
        let y = points
            .iter()
            .map(|x| match max_ceiling {
                Some(ceiling) => (bandwidth * x).min(ceiling),
                None => bandwidth * x,
            })
            .collect();
        let uid = benchmarks::MEMORY_BANDWIDTH;
        let mut trace = Trace::new(uid, uid, XValues::Numbers(points.clone()), y);
        trace.color = color(input, uid, trace_count + traces.len());
        trace.width = 2;
        traces.push(trace);
    }

    for (id, value) in flops {
        let start = intersection(value);
        let x: Vec<f64> = points.iter().copied().filter(|x| *x >= start).collect();
        let y = vec![value; x.len()];
        let mut trace = Trace::new(id, id, XValues::Numbers(x), y);
        trace.color = color(input, id, trace_count + traces.len());
        trace.width = 2;
        traces.push(trace);
    }
    traces
}

fn color(input: &RooflineInput, uid: &str, index: usize) -> String {
    input
        .overrides
        .color(uid)
        .unwrap_or_else(|| palette::pick(&input.styling.color_palette, index))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmarks::StaticNodeCapabilities;
    use crate::measurement_cache::MeasurementCache;
    use crate::models::{MetricSeries, PlotBy};
    use crate::test_utils::{self, MockFetcher};

    struct Fixture {
        cache: MeasurementCache<MockFetcher>,
        nodes: StaticNodeCapabilities,
        query: RooflineQuery,
        benchmarks: BTreeMap<String, NodeBenchmarks>,
        styling: GraphStyling,
        overrides: GraphOverrides,
    }

    impl Fixture {
        /// Job 1 on node n01 with peaks of 100 GFLOP/s and 10 GiB/s.
        fn new() -> Self {
            let nodes = test_utils::capabilities(
                &[1],
                "n01",
                &[
                    ("peakflops", 100.0 * GIGA),
                    ("peakflops_sp", 200.0 * GIGA),
                    ("bandwidth_mem", 10.0 * GIBI),
                ],
            );
            Self {
                cache: MeasurementCache::new(MockFetcher::new()),
                nodes,
                query: RooflineQuery {
                    job_ids: vec![1],
                    node: Some("n01".to_string()),
                    plot_flops: vec!["peakflops".to_string()],
                    ..Default::default()
                },
                benchmarks: BTreeMap::new(),
                styling: GraphStyling::default(),
                overrides: GraphOverrides::default(),
            }
        }

        /// Cache FLOPS and data volume series of a job on n01.
        fn add(&self, job_id: JobId, flops: &[(&str, &[f64])], total: &[f64]) {
            let series: Vec<MetricSeries> = flops
                .iter()
                .map(|(name, values)| named(name, values))
                .collect();
            self.cache
                .insert(&flops_query(job_id, "n01"), test_utils::payload(series))
                .unwrap();
            self.cache
                .insert(
                    &data_volume_query(job_id, "n01"),
                    test_utils::payload(vec![named(TOTAL_DATA_VOLUME, total)]),
                )
                .unwrap();
        }

        fn assemble(&self) -> Graph {
            let input = RooflineInput {
                query: &self.query,
                benchmarks: &self.benchmarks,
                styling: &self.styling,
                overrides: &self.overrides,
                no_data: false,
            };
            assemble_roofline(&self.cache, &self.nodes, &input)
        }
    }

    fn named(name: &str, values: &[f64]) -> MetricSeries {
        let mut series = test_utils::series(name, "0", "", values);
        series.name = name.to_string();
        series
    }

    #[test]
    fn empty_states() {
        let mut fixture = Fixture::new();
        fixture.query.plot_flops.clear();
        let graph = fixture.assemble();
        assert!(graph.traces.is_empty());
        assert_eq!(Some("FLOPS [GFLOPS/s]".to_string()), graph.layout.yaxis.title);
        assert_eq!(
            Some("Operational Intensity [FLOPS/byte]".to_string()),
            graph.layout.xaxis.title
        );
        assert!(!graph.layout.no_data());

        let mut fixture = Fixture::new();
        fixture.query.node = None;
        assert!(fixture.assemble().traces.is_empty());

        let mut fixture = Fixture::new();
        fixture.query.plot_sp = false;
        fixture.query.plot_dp = false;
        assert!(fixture.assemble().traces.is_empty());

        let mut fixture = Fixture::new();
        fixture.query.job_ids.clear();
        assert!(fixture.assemble().traces.is_empty());
    }

    #[test]
    fn data_queries_use_first_node() {
        let mut nodes = test_utils::capabilities(&[1], "n02", &[]);
        nodes.insert(1, "n01", NodeBenchmarks::new());
        let queries = data_queries(&nodes, &[1, 2]);
        assert_eq!(
            vec![flops_query(1, "n01"), data_volume_query(1, "n01")],
            queries
        );
        assert_eq!(Some("n01"), queries[0].node());
        assert_eq!("Data Volume", queries[1].metric);
    }

    #[test]
    fn markers() {
        let fixture = Fixture::new();
        fixture.add(
            1,
            &[("DP", &[10.0 * GIGA, 40.0 * GIGA]), ("SP", &[0.0, 0.0])],
            &[GIBI, 4.0 * GIBI],
        );
        let graph = fixture.assemble();
        // SP is skipped as it never achieved anything.
        let marker = graph.trace("1-DP").unwrap();
        assert!(graph.trace("1-SP").is_none());
        assert_eq!(TraceMode::Markers, marker.mode);
        assert_eq!("1 DP", marker.name);
        assert_eq!(vec![40.0], marker.y);
        assert_eq!(XValues::Numbers(vec![10.0]), marker.x);
        assert_eq!("#1f77b4", marker.color);
    }

    #[test]
    fn markers_aggregate_by_average() {
        let mut fixture = Fixture::new();
        fixture.query.plot_by = PlotBy::Average;
        fixture.overrides.traces.insert(
            "1-DP".to_string(),
            crate::preferences::TraceOverride {
                name: Some("baseline".to_string()),
                color: None,
            },
        );
        fixture.add(1, &[("DP", &[10.0 * GIGA, 30.0 * GIGA])], &[GIBI, 3.0 * GIBI]);
        let graph = fixture.assemble();
        let marker = graph.trace("1-DP").unwrap();
        assert_eq!(vec![20.0], marker.y);
        assert_eq!(XValues::Numbers(vec![10.0]), marker.x);
        assert_eq!("baseline", marker.display_name);
    }

    #[test]
    fn markers_prefer_unconverted_values() {
        let fixture = Fixture::new();
        fixture.add(1, &[("DP", &[1.0])], &[GIBI]);
        let mut flops = named("DP", &[1.0]);
        flops.raw_values = Some(vec![5.0 * GIGA]);
        fixture
            .cache
            .insert(&flops_query(1, "n01"), test_utils::payload(vec![flops]))
            .unwrap();
        let graph = fixture.assemble();
        assert_eq!(vec![5.0], graph.trace("1-DP").unwrap().y);
    }

    #[test]
    fn ceilings() {
        let fixture = Fixture::new();
        let graph = fixture.assemble();
        assert_eq!(vec!["bandwidth_mem", "peakflops"], graph.uids());

        let bandwidth = graph.trace("bandwidth_mem").unwrap();
        assert_eq!("Peak Memory Bandwidth", bandwidth.name);
        assert_eq!(2, bandwidth.width);
        let XValues::Numbers(x) = &bandwidth.x else {
            panic!("expected numeric x values");
        };
        // Tenths, 1..20 and the intersection at 100 / 10.
        assert_eq!(10 + 19 + 1, x.len());
        assert_eq!(Some(&0.0), x.first());
        assert_eq!(Some(&19.0), x.last());
        let at = |value: f64| x.iter().position(|x| *x == value).unwrap();
        assert_eq!(5.0, bandwidth.y[at(0.5)]);
        assert_eq!(100.0, bandwidth.y[at(10.0)]);
        assert_eq!(100.0, bandwidth.y[at(19.0)]);

        let compute = graph.trace("peakflops").unwrap();
        assert_eq!("Peak DP", compute.name);
        let XValues::Numbers(x) = &compute.x else {
            panic!("expected numeric x values");
        };
        assert_eq!(Some(&10.0), x.first());
        assert!(compute.y.iter().all(|y| *y == 100.0));
    }

    #[test]
    fn ceilings_sized_by_intensity() {
        let fixture = Fixture::new();
        fixture.add(1, &[("DP", &[150.0 * GIGA])], &[GIBI]);
        let graph = fixture.assemble();
        let XValues::Numbers(x) = &graph.trace("bandwidth_mem").unwrap().x else {
            panic!("expected numeric x values");
        };
        assert_eq!(Some(&1000.0), x.last());
    }

    #[test]
    fn graph_benchmarks_take_precedence() {
        let mut fixture = Fixture::new();
        fixture.benchmarks.insert(
            "n01".to_string(),
            [("peakflops".to_string(), 50.0 * GIGA)].into(),
        );
        let graph = fixture.assemble();
        // Without a bandwidth the compute ceiling spans all sample points.
        assert_eq!(vec!["peakflops"], graph.uids());
        let compute = graph.trace("peakflops").unwrap();
        assert_eq!(29, compute.y.len());
        assert_eq!(50.0, compute.y[0]);
    }

    #[test]
    fn missing_ceilings_skipped() {
        let mut fixture = Fixture::new();
        fixture.query.plot_flops = vec!["peakflops_avx512".to_string(), "peakflops".to_string()];
        assert_eq!(vec!["bandwidth_mem", "peakflops"], fixture.assemble().uids());
    }

    #[test]
    fn sample_points_reach_large_intensity() {
        let points = sample_points(5e6, &[]);
        assert_eq!(Some(&1e7), points.last());
        assert!(points.contains(&1000.0));
        assert!(points.contains(&2000.0));
        assert!(!points.contains(&1001.0));
        assert_eq!(10 + 1000 + 4 * 9, points.len());
    }

    #[test]
    fn ceilings_reach_furthest_marker() {
        let fixture = Fixture::new();
        fixture.add(1, &[("DP", &[2e6 * GIGA])], &[GIBI]);
        let graph = fixture.assemble();
        let marker = graph.trace("1-DP").unwrap();
        let XValues::Numbers(marker_x) = &marker.x else {
            panic!("expected numeric x values");
        };
        let XValues::Numbers(x) = &graph.trace("bandwidth_mem").unwrap().x else {
            panic!("expected numeric x values");
        };
        assert!(x.last().unwrap() >= &marker_x[0]);
    }

    #[test]
    fn sample_points_sorted() {
        let points = sample_points(0.0, &[2.5, 0.25]);
        assert_eq!(10 + 19 + 2, points.len());
        assert!(points.windows(2).all(|w| w[0] <= w[1]));
    }
}
