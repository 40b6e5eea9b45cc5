//! Assembly of time series graphs from cached measurements.

use crate::benchmarks::{self, NodeCapabilities};
use crate::brace_notation::{self, NumberRanges};
use crate::graph::{self, Fill, Graph, LayoutOptions, Trace, Visibility, XValues};
use crate::measurement_cache::MeasurementSource;
use crate::metrics;
use crate::models::{
    GraphModifiers, GraphSettings, GraphStyling, JobId, Level, Query, RawMeasurementPayload,
};
use crate::palette;
use crate::preferences::{GraphOverrides, GraphPreferences, HideInactive};
use crate::units::{self, UnifiedUnit};

use std::sync::Arc;
use std::time::Instant;

/// Stack group shared by all stacked traces.
const STACK_GROUP: &str = "one";

/// Everything a graph is assembled from, apart from the cached measurements.
#[derive(Clone, Copy, Debug)]
pub struct GraphInput<'a> {
    pub query: &'a Query,
    pub modifiers: &'a GraphModifiers,
    pub settings: &'a GraphSettings,
    pub styling: &'a GraphStyling,
    pub preferences: &'a GraphPreferences,
    pub overrides: &'a GraphOverrides,
    /// Set if fetching the data of the query failed
    pub no_data: bool,
}

/// Result of an assembly.
#[derive(Clone, Debug, PartialEq)]
pub struct Assembly {
    pub graph: Graph,
    /// Settings after applying default visibility and overlay bookkeeping
    pub settings: GraphSettings,
    /// Selected overlays that apply to the queried metric
    pub system_benchmarks: Vec<String>,
}

/// Cached data of one job of the query.
struct JobData {
    job_id: JobId,
    /// Label prefix, empty for single-job graphs
    prefix: String,
    payload: Arc<RawMeasurementPayload>,
}

/// A peak value line to add to the graph.
struct Overlay {
    uid: String,
    name: String,
    value: f64,
}

/// Assemble a graph.
///
/// The measurements of all jobs of the query must already be cached; nothing is fetched here.
/// The result only depends on the inputs, repeated calls yield identical traces.
///
/// # Arguments
///
/// * `source`: Cached measurements
/// * `nodes`: Node lookup for peak value overlays
/// * `input`: Query, modifiers, settings and styling of the graph
#[tracing::instrument(level = "DEBUG", skip_all, fields(metric = %input.query.metric))]
pub fn assemble<S, N>(source: &S, nodes: &N, input: &GraphInput) -> Assembly
where
    S: MeasurementSource + ?Sized,
    N: NodeCapabilities + ?Sized,
{
    let start = Instant::now();
    let assembly = assemble_graph(source, nodes, input);
    metrics::record_assembly("default", start.elapsed());
    assembly
}

fn assemble_graph<S, N>(source: &S, nodes: &N, input: &GraphInput) -> Assembly
where
    S: MeasurementSource + ?Sized,
    N: NodeCapabilities + ?Sized,
{
    let query = input.query;
    let mut settings = input.settings.clone();
    let system_benchmarks = applicable_benchmarks(query, input.modifiers);
    let empty = |settings: GraphSettings, system_benchmarks: Vec<String>| Assembly {
        graph: Graph::no_data(input.styling.show_legend),
        settings,
        system_benchmarks,
    };

    let jobs = collect_jobs(source, query, input.overrides);
    let Some(unified) = units::unify(jobs.iter().filter_map(|j| j.payload.unit())) else {
        tracing::debug!("no measurements for any job");
        return empty(settings, system_benchmarks);
    };
    let unit = unified.unit();
    let range_filter = entity_filter(query, input.modifiers);

    let mut traces = Vec::new();
    let mut data_count = 0;
    // Shared by all jobs, as all stacked traces form one group.
    let mut stack_started = false;
    for job in &jobs {
        let job_unit = job.payload.unit().unwrap_or_default();
        let factor = unified.factor_from(job_unit);
        let job_unit = unified.unit_for(job_unit);
        for (idx, series) in job.payload.traces.iter().enumerate() {
            if let Some(ids) = &range_filter {
                match brace_notation::extract_number(&series.id) {
                    Some(id) if ids.contains(id) => (),
                    _ => continue,
                }
            }

            let name = format!(
                "{}{}",
                job.prefix,
                input.overrides.name(&series.uid).unwrap_or(&series.name)
            );
            let values: Vec<f64> = series.values.iter().map(|v| v * factor).collect();
            let x = XValues::Labels(graph::timestamps(values.len(), series.interval));
            data_count = data_count.max(values.len());

            let mut visible = visibility(&settings, &series.uid);
            if visible.is_on() && !query.deciles {
                let inactive = series.is_inactive();
                let hide_inactive = input.preferences.hide_inactive;
                if !input.modifiers.matches(&series.statistics)
                    || (inactive && hide_inactive == HideInactive::Disabled)
                {
                    visible = Visibility::LegendOnly;
                } else if inactive && hide_inactive == HideInactive::Hidden {
                    visible = Visibility::Hidden;
                }
            }

            let table_name = if !job.prefix.is_empty() {
                format!(
                    "{} <span class=\"font-italic\">{} [{}]</span>",
                    job.prefix.trim_end(),
                    series.variant,
                    series.iteration
                )
            } else if !matches!(series.level, Level::Job | Level::Node) {
                series.id.clone()
            } else {
                String::new()
            };

            let mut trace = Trace::new(&series.uid, &name, x, values);
            trace.raw_name = series.raw_name.clone();
            trace.unit = job_unit.clone();
            trace.color = color(input, &series.uid, traces.len());
            trace.visible = visible;
            trace.legendgroup = series
                .legend_group
                .clone()
                .unwrap_or_else(|| format!("{} {}", series.group, idx));
            trace.table = series.table.clone();
            trace.table_name = table_name;
            trace.statistics = Some(series.statistics);
            if series.stacked {
                trace.fill = Some(if stack_started {
                    Fill::ToNextY
                } else {
                    Fill::ToZeroY
                });
                trace.stackgroup = Some(STACK_GROUP.to_string());
                stack_started = true;
            }
            traces.push(trace);
        }

        let statistic_traces = statistic_traces(input, job, &job_unit, factor, traces.len());
        traces.extend(statistic_traces);
    }

    let overlays = overlays(nodes, input, &jobs, &system_benchmarks, &unified);
    track_overlays(&mut settings, &overlays);
    if let Some(longest) = traces
        .iter()
        .filter(|t| !t.auxiliary)
        .max_by_key(|t| t.y.len())
        .map(|t| t.x.clone())
    {
        for overlay in overlays {
            let mut trace = Trace::new(
                &overlay.uid,
                &overlay.name,
                longest.clone(),
                vec![overlay.value; longest.len()],
            );
            trace.unit = unit.clone();
            trace.color = color(input, &overlay.uid, traces.len());
            trace.visible = visibility(&settings, &overlay.uid);
            trace.legendgroup = "peak".to_string();
            trace.auxiliary = true;
            trace.width = 2;
            traces.push(trace);
        }
    }

    if settings.visible.is_empty() && !traces.is_empty() {
        apply_default_visibility(&mut settings, &mut traces);
    }

    let y_title = if unit.is_empty() {
        query.metric.clone()
    } else {
        format!("{} [{}]", query.metric, unit)
    };
    let percentage = unit == "%";
    let mut layout = graph::create_layout(&LayoutOptions {
        data_count,
        y_title,
        x_title: input
            .preferences
            .x_title
            .then(|| "Runtime [HH:MM:SS]".to_string()),
        autorange: !percentage,
        rangeslider: input.preferences.rangeslider,
        no_data: input.no_data || traces.is_empty(),
        show_legend: input.styling.show_legend,
        ..Default::default()
    });
    if percentage {
        layout.yaxis.range = Some([0.0, 100.0]);
    }

    Assembly {
        graph: Graph { traces, layout },
        settings,
        system_benchmarks,
    }
}

/// Cached payloads of the jobs of a query, in query order. Jobs without data are skipped.
fn collect_jobs<S>(source: &S, query: &Query, overrides: &GraphOverrides) -> Vec<JobData>
where
    S: MeasurementSource + ?Sized,
{
    let multi_job = query.job_ids.len() > 1;
    query
        .job_ids
        .iter()
        .filter_map(|&job_id| {
            let payload = source.get(&query.for_job(job_id))?;
            payload.unit()?;
            let prefix = if multi_job {
                match overrides.prefix(job_id) {
                    Some(prefix) => format!("{} ", prefix),
                    None => format!("{} ", job_id),
                }
            } else {
                String::new()
            };
            Some(JobData {
                job_id,
                prefix,
                payload,
            })
        })
        .collect()
}

/// Entity ids admitted by the range filter, if one applies.
fn entity_filter(query: &Query, modifiers: &GraphModifiers) -> Option<NumberRanges> {
    if !query.level.is_entity_level() || query.deciles {
        return None;
    }
    let range = modifiers.filter_range.as_deref()?.trim();
    if range.is_empty() {
        return None;
    }
    if !brace_notation::is_valid(range) {
        tracing::warn!("ignoring malformed entity range {}", range);
        return None;
    }
    Some(brace_notation::decode_numbers(range))
}

/// Selected overlays that apply to the queried metric.
fn applicable_benchmarks(query: &Query, modifiers: &GraphModifiers) -> Vec<String> {
    modifiers
        .system_benchmarks
        .iter()
        .filter(|id| {
            let applicable = benchmarks::is_applicable(&query.group, &query.metric, id);
            if !applicable {
                tracing::debug!("dropping overlay {} not applicable to {}", id, query.metric);
            }
            applicable
        })
        .cloned()
        .collect()
}

/// Visibility of a trace according to the user's visible set.
fn visibility(settings: &GraphSettings, uid: &str) -> Visibility {
    if settings.visible.is_empty() {
        Visibility::Visible
    } else {
        Visibility::from_bool(settings.visible.iter().any(|v| v == uid))
    }
}

/// Color of the trace at `index`, honouring overrides.
fn color(input: &GraphInput, uid: &str, index: usize) -> String {
    input
        .overrides
        .color(uid)
        .unwrap_or_else(|| palette::pick(&input.styling.color_palette, index))
        .to_string()
}

/// Derived avg/max/min traces of the statistics the user asked for.
fn statistic_traces(
    input: &GraphInput,
    job: &JobData,
    unit: &str,
    factor: f64,
    trace_count: usize,
) -> Vec<Trace> {
    let interval = job
        .payload
        .traces
        .first()
        .map_or(0.0, |series| series.interval);
    let mut traces = Vec::new();
    for raw_name in &input.settings.visible_statistics {
        let Some(statistics) = job.payload.statistics.get(raw_name) else {
            continue;
        };
        let aggregates = [
            ("avg", &statistics.values.avg),
            ("max", &statistics.values.max),
            ("min", &statistics.values.min),
        ];
        for (kind, values) in aggregates {
            if values.is_empty() {
                continue;
            }
            let uid = format!("{}-{}-{}", raw_name, job.job_id, kind);
            let name = format!("{}{} {}", job.prefix, raw_name, kind);
            let y: Vec<f64> = values.iter().map(|v| v * factor).collect();
            let x = XValues::Labels(graph::timestamps(y.len(), interval));
            let mut trace = Trace::new(&uid, &name, x, y);
            trace.raw_name = raw_name.clone();
            trace.unit = unit.to_string();
            trace.color = color(input, &uid, trace_count + traces.len());
            trace.legendgroup = format!("stats_{}", raw_name);
            trace.auxiliary = true;
            traces.push(trace);
        }
    }
    traces
}

/// Peak value overlays of the selected benchmarks.
///
/// Peaks are read from the queried node, or from the first node of every job. At job level a
/// peak covers all nodes of the job.
fn overlays<N>(
    nodes: &N,
    input: &GraphInput,
    jobs: &[JobData],
    system_benchmarks: &[String],
    unified: &UnifiedUnit,
) -> Vec<Overlay>
where
    N: NodeCapabilities + ?Sized,
{
    if system_benchmarks.is_empty() {
        return Vec::new();
    }
    let query = input.query;

    let mut reference_nodes: Vec<(JobId, String)> = Vec::new();
    for job in jobs {
        let node = match query.node() {
            Some(node) => Some(node.to_string()),
            None => nodes.job_nodes(job.job_id).into_iter().next(),
        };
        if let Some(node) = node {
            if !reference_nodes.iter().any(|(_, n)| *n == node) {
                reference_nodes.push((job.job_id, node));
            }
        }
    }

    let mut overlays = Vec::new();
    let multi_node = reference_nodes.len() > 1;
    for (job_id, node) in &reference_nodes {
        let Some(peaks) = nodes.peak_values(*job_id, node) else {
            tracing::debug!("no peak values for node {} of job {}", node, job_id);
            continue;
        };
        let node_count = if query.level == Level::Job {
            nodes.job_nodes(*job_id).len().max(1)
        } else {
            1
        };
        for benchmark in system_benchmarks {
            let Some(peak) = peaks.get(benchmark) else {
                continue;
            };
            let scaled =
                peak * input.modifiers.system_benchmarks_scaling_factor * node_count as f64;
            let name = if multi_node {
                format!("{} {}", node, graph::legend_name(benchmark))
            } else {
                benchmark.clone()
            };
            overlays.push(Overlay {
                uid: format!("{}-peak-{}", node, benchmark),
                name,
                value: unified.convert_peak(scaled),
            });
        }
    }
    overlays
}

/// Keep the visible set in step with the emitted overlays.
///
/// New overlays become visible right away, overlays that are gone leave the visible set.
fn track_overlays(settings: &mut GraphSettings, overlays: &[Overlay]) {
    let current: Vec<String> = overlays.iter().map(|o| o.uid.clone()).collect();
    if !settings.visible.is_empty() {
        let previous = std::mem::take(&mut settings.overlays);
        settings
            .visible
            .retain(|uid| !previous.contains(uid) || current.contains(uid));
        for uid in &current {
            if !previous.contains(uid) && !settings.visible.contains(uid) {
                settings.visible.push(uid.clone());
            }
        }
    }
    settings.overlays = current;
}

/// Make all traces visible on a fresh metric, carrying over visibility by table when only the
/// level changed.
fn apply_default_visibility(settings: &mut GraphSettings, traces: &mut [Trace]) {
    let prev_tables = std::mem::take(&mut settings.prev_visible_tables);
    let mut visible = Vec::new();
    for trace in traces.iter_mut() {
        let included =
            prev_tables.is_empty() || trace.auxiliary || prev_tables.contains(&trace.table);
        if included {
            visible.push(trace.uid.clone());
        } else {
            trace.visible = Visibility::Invisible;
        }
    }
    settings.visible = visible;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmarks::StaticNodeCapabilities;
    use crate::measurement_cache::MeasurementCache;
    use crate::models::{
        FilterConstraint, MetricStatistics, MetricSeries, Operator, StatisticKind,
        StatisticsValues,
    };
    use crate::test_utils::{self, MockFetcher};

    struct Fixture {
        cache: MeasurementCache<MockFetcher>,
        nodes: StaticNodeCapabilities,
        query: Query,
        modifiers: GraphModifiers,
        settings: GraphSettings,
        styling: GraphStyling,
        preferences: GraphPreferences,
        overrides: GraphOverrides,
    }

    impl Fixture {
        fn new(query: Query) -> Self {
            Self {
                cache: MeasurementCache::new(MockFetcher::new()),
                nodes: StaticNodeCapabilities::new(),
                query,
                modifiers: GraphModifiers::default(),
                settings: GraphSettings::default(),
                styling: GraphStyling::default(),
                preferences: GraphPreferences::default(),
                overrides: GraphOverrides::default(),
            }
        }

        fn add(&self, job_id: JobId, traces: Vec<MetricSeries>) {
            self.cache
                .insert(&self.query.for_job(job_id), test_utils::payload(traces))
                .unwrap();
        }

        fn assemble(&self) -> Assembly {
            let input = GraphInput {
                query: &self.query,
                modifiers: &self.modifiers,
                settings: &self.settings,
                styling: &self.styling,
                preferences: &self.preferences,
                overrides: &self.overrides,
                no_data: false,
            };
            assemble(&self.cache, &self.nodes, &input)
        }
    }

    fn core_query() -> Query {
        Query::new(vec![1], "cpu", "FLOPS", Level::Core, None, false)
    }

    fn cores(count: usize) -> Vec<MetricSeries> {
        (0..count)
            .map(|i| {
                test_utils::series(
                    &format!("t{}-c{}", i, i),
                    &format!("c{}", i),
                    "MFLOP/s",
                    &[1.0, 2.0],
                )
            })
            .collect()
    }

    #[test]
    fn no_jobs() {
        let fixture = Fixture::new(test_utils::query(vec![]));
        let assembly = fixture.assemble();
        assert!(assembly.graph.traces.is_empty());
        assert!(assembly.graph.layout.no_data());
    }

    #[test]
    fn no_cached_data() {
        let fixture = Fixture::new(test_utils::query(vec![1, 2]));
        let assembly = fixture.assemble();
        assert!(assembly.graph.traces.is_empty());
        assert!(assembly.graph.layout.no_data());
    }

    #[test]
    fn single_job() {
        let fixture = Fixture::new(core_query());
        fixture.add(1, cores(2));
        let graph = fixture.assemble().graph;
        assert_eq!(vec!["t0-c0", "t1-c1"], graph.uids());
        let trace = &graph.traces[0];
        assert_eq!("t0-c0 c0", trace.display_name);
        assert_eq!("c0", trace.table_name);
        assert_eq!("cpu 0", trace.legendgroup);
        assert_eq!("#1f77b4", trace.color);
        assert_eq!("#ff7f0e", graph.traces[1].color);
        assert_eq!(
            XValues::Labels(vec!["00:00:00".to_string(), "00:00:05".to_string()]),
            trace.x
        );
        assert_eq!(Some("FLOPS [MFLOP/s]".to_string()), graph.layout.yaxis.title);
        assert!(graph.layout.yaxis.autorange);
        assert!(!graph.layout.no_data());
    }

    #[test]
    fn multi_job_unit_scaling() {
        let mut fixture = Fixture::new(test_utils::query(vec![1, 2]));
        fixture.overrides.prefixes.insert(2, "baseline".to_string());
        fixture.add(1, vec![test_utils::series("a", "c0", "KB/s", &[1000.0, 2000.0])]);
        fixture.add(2, vec![test_utils::series("b", "c0", "MB/s", &[1.0, 2.0])]);
        let graph = fixture.assemble().graph;

        assert_eq!(vec!["a", "b"], graph.uids());
        assert_eq!(vec![1.0, 2.0], graph.traces[0].y);
        assert_eq!(vec![1.0, 2.0], graph.traces[1].y);
        assert_eq!("MB/s", graph.traces[0].unit);
        assert_eq!("1 a c0", graph.traces[0].display_name);
        assert_eq!("baseline b c0", graph.traces[1].display_name);
        assert_eq!(
            "baseline <span class=\"font-italic\"> [0]</span>",
            graph.traces[1].table_name
        );
    }

    #[test]
    fn mismatched_base_units_keep_own_base() {
        let mut fixture = Fixture::new(test_utils::query(vec![1, 2]));
        fixture.add(1, vec![test_utils::series("a", "c0", "MB/s", &[1.0])]);
        fixture.add(2, vec![test_utils::series("b", "c0", "W", &[300.0])]);
        let graph = fixture.assemble().graph;

        assert_eq!("MB/s", graph.trace("a").unwrap().unit);
        assert_eq!("MW", graph.trace("b").unwrap().unit);
        assert!((graph.trace("b").unwrap().y[0] - 3e-4).abs() < 1e-12);
        assert_eq!(Some("FLOPS [MB/s]"), graph.layout.yaxis.title.as_deref());
    }

    #[test]
    fn zero_series_policy() {
        let mut fixture = Fixture::new(core_query());
        fixture.add(
            1,
            vec![
                test_utils::series("zero", "c0", "MFLOP/s", &[0.0, 0.0]),
                test_utils::series("busy", "c1", "MFLOP/s", &[1.0, 0.0]),
            ],
        );

        let expectations = [
            (HideInactive::None, Visibility::Visible),
            (HideInactive::Disabled, Visibility::LegendOnly),
            (HideInactive::Hidden, Visibility::Hidden),
        ];
        for (hide_inactive, expected) in expectations {
            fixture.preferences.hide_inactive = hide_inactive;
            let graph = fixture.assemble().graph;
            assert_eq!(expected, graph.trace("zero").unwrap().visible);
            assert_eq!(Visibility::Visible, graph.trace("busy").unwrap().visible);
        }
    }

    #[test]
    fn zero_series_in_deciles_untouched() {
        let mut fixture =
            Fixture::new(Query::new(vec![1], "cpu", "FLOPS", Level::Core, None, true));
        fixture.preferences.hide_inactive = HideInactive::Hidden;
        fixture.add(1, vec![test_utils::series("zero", "0", "MFLOP/s", &[0.0])]);
        let graph = fixture.assemble().graph;
        assert_eq!(Visibility::Visible, graph.traces[0].visible);
    }

    #[test]
    fn uid_stability() {
        let fixture = Fixture::new(core_query());
        fixture.add(1, cores(4));
        let first = fixture.assemble();
        let second = fixture.assemble();
        assert_eq!(first.graph.uids(), second.graph.uids());
        assert_eq!(first, second);
    }

    #[test]
    fn entity_range_filter() {
        let mut fixture = Fixture::new(core_query());
        fixture.add(1, cores(4));
        fixture.modifiers.filter_range = Some("[0-1,3]".to_string());
        assert_eq!(vec!["t0-c0", "t1-c1", "t3-c3"], fixture.assemble().graph.uids());

        // Malformed ranges are ignored.
        fixture.modifiers.filter_range = Some("[0-".to_string());
        assert_eq!(4, fixture.assemble().graph.traces.len());
    }

    #[test]
    fn entity_range_filter_wide_range() {
        let mut fixture = Fixture::new(core_query());
        fixture.add(1, cores(4));
        fixture.modifiers.filter_range = Some("[2-4000000000]".to_string());
        let started = Instant::now();
        assert_eq!(vec!["t2-c2", "t3-c3"], fixture.assemble().graph.uids());
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn entity_range_filter_not_at_node_level() {
        let mut fixture =
            Fixture::new(Query::new(vec![1], "cpu", "FLOPS", Level::Node, None, false));
        fixture.add(1, cores(4));
        fixture.modifiers.filter_range = Some("[0]".to_string());
        assert_eq!(4, fixture.assemble().graph.traces.len());
    }

    #[test]
    fn constraint_filter() {
        let mut fixture = Fixture::new(core_query());
        let mut low = test_utils::series("low", "c0", "MFLOP/s", &[1.0]);
        low.statistics.avg = 1.0;
        let mut high = test_utils::series("high", "c1", "MFLOP/s", &[9.0]);
        high.statistics.avg = 9.0;
        fixture.add(1, vec![low, high]);
        fixture.modifiers.filter_by = Some(StatisticKind::Avg);
        fixture.modifiers.constraints = vec![
            FilterConstraint::new(Operator::Ge, 5.0),
            FilterConstraint::new(Operator::Lt, 10.0),
        ];
        let graph = fixture.assemble().graph;
        assert_eq!(Visibility::LegendOnly, graph.trace("low").unwrap().visible);
        assert_eq!(Visibility::Visible, graph.trace("high").unwrap().visible);
    }

    #[test]
    fn explicit_visibility() {
        let mut fixture = Fixture::new(core_query());
        fixture.add(1, cores(2));
        fixture.settings.visible = vec!["t1-c1".to_string()];
        let assembly = fixture.assemble();
        assert_eq!(
            Visibility::Invisible,
            assembly.graph.trace("t0-c0").unwrap().visible
        );
        assert_eq!(
            Visibility::Visible,
            assembly.graph.trace("t1-c1").unwrap().visible
        );
        assert_eq!(fixture.settings, assembly.settings);
    }

    #[test]
    fn default_visibility() {
        let fixture = Fixture::new(core_query());
        fixture.add(1, cores(2));
        let assembly = fixture.assemble();
        assert_eq!(vec!["t0-c0", "t1-c1"], assembly.settings.visible);
    }

    #[test]
    fn visibility_carry_over_by_table() {
        let mut fixture = Fixture::new(core_query());
        fixture.add(1, cores(3));
        fixture.settings.prev_visible_tables = vec!["t1".to_string()];
        let assembly = fixture.assemble();
        assert_eq!(vec!["t1-c1"], assembly.settings.visible);
        assert!(assembly.settings.prev_visible_tables.is_empty());
        let graph = assembly.graph;
        assert_eq!(Visibility::Invisible, graph.trace("t0-c0").unwrap().visible);
        assert_eq!(Visibility::Visible, graph.trace("t1-c1").unwrap().visible);
        assert_eq!(Visibility::Invisible, graph.trace("t2-c2").unwrap().visible);
    }

    #[test]
    fn stacked_fill() {
        let fixture = Fixture::new(core_query());
        let mut traces = cores(3);
        for series in &mut traces {
            series.stacked = true;
        }
        fixture.add(1, traces);
        let graph = fixture.assemble().graph;
        let fills: Vec<_> = graph.traces.iter().map(|t| t.fill).collect();
        assert_eq!(
            vec![Some(Fill::ToZeroY), Some(Fill::ToNextY), Some(Fill::ToNextY)],
            fills
        );
        assert!(graph
            .traces
            .iter()
            .all(|t| t.stackgroup.as_deref() == Some("one")));
    }

    #[test]
    fn stacked_fill_across_jobs() {
        let fixture = Fixture::new(test_utils::query(vec![1, 2]));
        for job_id in [1, 2] {
            let mut series =
                test_utils::series(&format!("j{}", job_id), "c0", "MFLOP/s", &[1.0]);
            series.stacked = true;
            fixture.add(job_id, vec![series]);
        }
        let graph = fixture.assemble().graph;
        assert_eq!(Some(Fill::ToZeroY), graph.trace("j1").unwrap().fill);
        assert_eq!(Some(Fill::ToNextY), graph.trace("j2").unwrap().fill);
    }

    #[test]
    fn statistic_traces() {
        let mut fixture = Fixture::new(core_query());
        let mut payload = test_utils::payload(cores(1));
        payload.statistics.insert(
            "DP".to_string(),
            MetricStatistics {
                values: StatisticsValues {
                    min: vec![1.0],
                    max: vec![2.0],
                    avg: vec![1.5],
                },
                ..Default::default()
            },
        );
        fixture.cache.insert(&fixture.query, payload).unwrap();
        fixture.settings.visible_statistics = vec!["DP".to_string()];
        let graph = fixture.assemble().graph;
        assert_eq!(vec!["t0-c0", "DP-1-avg", "DP-1-max", "DP-1-min"], graph.uids());
        let avg = graph.trace("DP-1-avg").unwrap();
        assert!(avg.auxiliary);
        assert_eq!("stats_DP", avg.legendgroup);
        assert_eq!(vec![1.5], avg.y);
    }

    #[test]
    fn peak_overlays() {
        let mut fixture = Fixture::new(test_utils::query(vec![1]));
        fixture.nodes = test_utils::capabilities(&[1], "n01", &[("peakflops", 2e9)]);
        fixture.add(1, vec![test_utils::series("a", "c0", "MFLOP/s", &[1.0, 2.0, 3.0])]);
        fixture.modifiers.system_benchmarks = vec!["peakflops".to_string()];
        fixture.modifiers.system_benchmarks_scaling_factor = 0.5;
        fixture.settings.visible = vec!["a".to_string()];

        let assembly = fixture.assemble();
        let overlay = assembly.graph.trace("n01-peak-peakflops").unwrap();
        assert_eq!(vec![1000.0; 3], overlay.y);
        assert_eq!("Peak DP", overlay.name);
        assert_eq!(Visibility::Visible, overlay.visible);
        assert!(overlay.auxiliary);
        assert_eq!(
            vec!["a".to_string(), "n01-peak-peakflops".to_string()],
            assembly.settings.visible
        );
        assert_eq!(vec!["n01-peak-peakflops"], assembly.settings.overlays);

        // Deselecting the benchmark drops the overlay from the visible set.
        fixture.settings = assembly.settings;
        fixture.modifiers.system_benchmarks.clear();
        let assembly = fixture.assemble();
        assert_eq!(vec!["a"], assembly.graph.uids());
        assert_eq!(vec!["a"], assembly.settings.visible);
        assert!(assembly.settings.overlays.is_empty());
    }

    #[test]
    fn peak_overlay_scaled_by_node_count() {
        let mut fixture = Fixture::new(test_utils::query(vec![1]));
        let mut nodes = test_utils::capabilities(&[1], "n01", &[("peakflops", 1e9)]);
        nodes.insert(1, "n02", [("peakflops".to_string(), 1e9)].into());
        fixture.nodes = nodes;
        fixture.add(1, vec![test_utils::series("a", "c0", "GFLOP/s", &[1.0])]);
        fixture.modifiers.system_benchmarks = vec!["peakflops".to_string()];
        let graph = fixture.assemble().graph;
        assert_eq!(vec![2.0], graph.trace("n01-peak-peakflops").unwrap().y);
    }

    #[test]
    fn inapplicable_overlays_pruned() {
        let query = Query::new(vec![1], "energy", "CPU Power", Level::Job, None, false);
        let mut fixture = Fixture::new(query);
        fixture.nodes = test_utils::capabilities(&[1], "n01", &[("peakflops", 1e9)]);
        fixture.add(1, vec![test_utils::series("a", "c0", "W", &[1.0])]);
        fixture.modifiers.system_benchmarks = vec!["peakflops".to_string()];
        let assembly = fixture.assemble();
        assert!(assembly.system_benchmarks.is_empty());
        assert_eq!(vec!["a"], assembly.graph.uids());
    }

    #[test]
    fn missing_peak_is_silent() {
        let mut fixture = Fixture::new(test_utils::query(vec![1]));
        fixture.nodes = test_utils::capabilities(&[1], "n01", &[]);
        fixture.add(1, vec![test_utils::series("a", "c0", "MFLOP/s", &[1.0])]);
        fixture.modifiers.system_benchmarks = vec!["peakflops_avx".to_string()];
        assert_eq!(vec!["a"], fixture.assemble().graph.uids());
    }

    #[test]
    fn overrides_apply() {
        let mut fixture = Fixture::new(core_query());
        fixture.add(1, cores(1));
        fixture.overrides.traces.insert(
            "t0-c0".to_string(),
            crate::preferences::TraceOverride {
                name: Some("renamed".to_string()),
                color: Some("#000000".to_string()),
            },
        );
        let trace = fixture.assemble().graph.traces.remove(0);
        assert_eq!("renamed", trace.name);
        assert_eq!("#000000", trace.color);
    }

    #[test]
    fn percentage_layout() {
        let mut fixture = Fixture::new(test_utils::query(vec![1]));
        fixture.preferences.x_title = true;
        fixture.add(1, vec![test_utils::series("a", "c0", "%", &[50.0])]);
        let layout = fixture.assemble().graph.layout;
        assert!(!layout.yaxis.autorange);
        assert_eq!(Some([0.0, 100.0]), layout.yaxis.range);
        assert_eq!(Some("FLOPS [%]".to_string()), layout.yaxis.title);
        assert_eq!(Some("Runtime [HH:MM:SS]".to_string()), layout.xaxis.title);
    }
}
