//! Data types and associated functions and methods

use crate::stats;

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use strum_macros::{Display, EnumString};
use validator::{Validate, ValidationError};

/// Identifier of a SLURM job.
pub type JobId = u64;

/// Granularity at which a metric is reported.
///
/// Ordered from finest to coarsest. `Device` metrics are gathered by the hardware itself and sit
/// outside of the regular software aggregation hierarchy.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    EnumString,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Level {
    Thread,
    Core,
    Numa,
    Socket,
    Device,
    Node,
    #[default]
    Job,
}

impl Level {
    /// Returns true for levels that report one series per entity (thread, core, ...), which are
    /// the levels an entity range filter applies to.
    pub fn is_entity_level(self) -> bool {
        !matches!(self, Level::Device | Level::Node | Level::Job)
    }
}

/// Identifies which series to display.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Jobs to display, in display order
    #[validate(length(min = 1, message = "at least one job id is required"))]
    pub job_ids: Vec<JobId>,
    /// Metric group, e.g. `cpu` or `memory`
    #[serde(default)]
    pub group: String,
    /// Metric name, e.g. `FLOPS`
    #[validate(length(min = 1, message = "metric must not be empty"))]
    pub metric: String,
    /// Aggregation level
    #[serde(default)]
    pub level: Level,
    /// Node to restrict the series to; irrelevant at job level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Request decile series instead of per-entity series
    #[serde(default)]
    pub deciles: bool,
}

impl Query {
    /// Return a new Query.
    ///
    /// The node is dropped for job level queries as it does not contribute to the result.
    pub fn new(
        job_ids: Vec<JobId>,
        group: &str,
        metric: &str,
        level: Level,
        node: Option<&str>,
        deciles: bool,
    ) -> Self {
        let node = match level {
            Level::Job => None,
            _ => node.filter(|n| !n.is_empty()).map(String::from),
        };
        Self {
            job_ids,
            group: group.to_string(),
            metric: metric.to_string(),
            level,
            node,
            deciles,
        }
    }

    /// Narrow this query to a single job, as used for fetching and caching.
    pub fn for_job(&self, job_id: JobId) -> Self {
        Self {
            job_ids: vec![job_id],
            ..self.clone()
        }
    }

    /// The node of this query, treating an empty name as absent.
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref().filter(|n| !n.is_empty())
    }

    /// Canonical cache key: `{jobId}.{node|job}.{group}.{metric}.{level}.{deciles|default}`.
    ///
    /// Only the leading job id takes part in the key; multi-job queries are cached per job.
    pub fn cache_key(&self) -> String {
        let job = self
            .job_ids
            .first()
            .map(|id| id.to_string())
            .unwrap_or_default();
        format!(
            "{}.{}.{}.{}.{}.{}",
            job,
            self.node().unwrap_or("job"),
            self.group,
            self.metric,
            self.level,
            if self.deciles { "deciles" } else { "default" }
        )
    }
}

impl PartialEq for Query {
    /// Queries are equal if all fields match, ignoring the order of job ids.
    fn eq(&self, other: &Self) -> bool {
        let mut lhs = self.job_ids.clone();
        let mut rhs = other.job_ids.clone();
        lhs.sort_unstable();
        rhs.sort_unstable();
        lhs == rhs
            && self.group == other.group
            && self.metric == other.metric
            && self.level == other.level
            && self.node() == other.node()
            && self.deciles == other.deciles
    }
}

/// Summary statistics of a series.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Statistics {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub median: f64,
    pub std: f64,
    pub var: f64,
    pub sum: f64,
}

impl Statistics {
    /// Return the value of a single statistic.
    pub fn get(&self, kind: StatisticKind) -> f64 {
        match kind {
            StatisticKind::Min => self.min,
            StatisticKind::Max => self.max,
            StatisticKind::Avg => self.avg,
            StatisticKind::Median => self.median,
            StatisticKind::Std => self.std,
            StatisticKind::Var => self.var,
            StatisticKind::Sum => self.sum,
        }
    }
}

/// Names of the entries of [Statistics].
#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StatisticKind {
    Min,
    Max,
    Avg,
    Median,
    Std,
    Var,
    Sum,
}

/// Per-timestep aggregates across all series of one metric.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct StatisticsValues {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub avg: Vec<f64>,
}

/// Aggregates of one metric: per-timestep series and overall statistics.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct MetricStatistics {
    pub values: StatisticsValues,
    pub general: Statistics,
}

/// Statistics bundle of a payload, keyed by raw metric name.
pub type StatisticsBundle = BTreeMap<String, MetricStatistics>;

/// Series ids arrive either as strings (`c12`) or as plain numbers (decile index).
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

/// One raw measured series as returned by the measurements endpoint.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MetricSeries {
    /// Entity identifier within the level, e.g. `c12`
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    /// Stable identity across repeated assembly
    #[validate(length(min = 1, message = "series uid must not be empty"))]
    pub uid: String,
    /// Display name
    pub name: String,
    /// Metric name without entity suffix
    #[serde(default)]
    pub raw_name: String,
    /// Unit of `values`
    #[serde(default)]
    pub unit: String,
    /// Capture interval in seconds
    #[validate(range(min = 0.0, message = "capture interval must not be negative"))]
    #[serde(default)]
    pub interval: f64,
    #[validate(custom = "validate_values")]
    #[serde(default)]
    pub values: Vec<f64>,
    /// Values before the backend's unit conversion, if any was applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_values: Option<Vec<f64>>,
    #[serde(default)]
    pub statistics: Statistics,
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub variant: String,
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub group: String,
    /// Metric table the series was read from
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub stacked: bool,
    #[serde(default, rename = "legend_group", skip_serializing_if = "Option::is_none")]
    pub legend_group: Option<String>,
}

impl MetricSeries {
    /// Values before any backend unit conversion.
    pub fn unconverted_values(&self) -> &[f64] {
        self.raw_values.as_deref().unwrap_or(&self.values)
    }

    /// Returns true if the values of this series sum to zero.
    pub fn is_inactive(&self) -> bool {
        stats::sum(&self.values) == 0.0
    }
}

/// Validate that all values are finite numbers
fn validate_values(values: &[f64]) -> Result<(), ValidationError> {
    if let Some(position) = values.iter().position(|v| !v.is_finite()) {
        let mut error = ValidationError::new("series values must be finite");
        error.add_param("position".into(), &position);
        return Err(error);
    }
    Ok(())
}

/// The result of fetching a [Query] for a single job.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[validate(schema(function = "validate_payload"))]
pub struct RawMeasurementPayload {
    #[validate]
    #[serde(default)]
    pub traces: Vec<MetricSeries>,
    #[serde(default)]
    pub statistics: StatisticsBundle,
}

impl RawMeasurementPayload {
    /// Returns true if the payload carries at least one series.
    pub fn has_data(&self) -> bool {
        !self.traces.is_empty()
    }

    /// Unit of the lead series; all series of a payload share one unit.
    pub fn unit(&self) -> Option<&str> {
        self.traces
            .first()
            .map(|s| s.unit.as_str())
            .filter(|u| !u.is_empty())
    }
}

/// Validate a measurement payload
fn validate_payload(payload: &RawMeasurementPayload) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for series in &payload.traces {
        if !seen.insert(series.uid.as_str()) {
            let mut error = ValidationError::new("series uids must be unique within a payload");
            error.add_param("uid".into(), &series.uid);
            return Err(error);
        }
    }
    Ok(())
}

/// Comparison operator of a value filter.
#[derive(Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Operator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Operator {
    /// Apply the comparison `value <op> threshold`.
    pub fn apply(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
        }
    }
}

/// One `(operator, threshold)` constraint of a comparison filter.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct FilterConstraint {
    pub operator: Operator,
    pub threshold: f64,
}

impl FilterConstraint {
    pub fn new(operator: Operator, threshold: f64) -> Self {
        Self {
            operator,
            threshold,
        }
    }
}

/// User modifiers of a graph that do not require new data.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphModifiers {
    /// Brace notation restricting the entity indices shown, e.g. `[0-3,8]`
    pub filter_range: Option<String>,
    /// Statistic the constraints are compared against
    pub filter_by: Option<StatisticKind>,
    /// Constraints combined with AND
    #[validate(length(max = 2, message = "at most two filter constraints are supported"))]
    pub constraints: Vec<FilterConstraint>,
    /// Selected peak-performance overlays by benchmark id
    pub system_benchmarks: Vec<String>,
    #[validate(range(min = 0.0, message = "scaling factor must not be negative"))]
    pub system_benchmarks_scaling_factor: f64,
}

impl Default for GraphModifiers {
    fn default() -> Self {
        Self {
            filter_range: None,
            filter_by: None,
            constraints: Vec::new(),
            system_benchmarks: Vec::new(),
            system_benchmarks_scaling_factor: 1.0,
        }
    }
}

impl GraphModifiers {
    /// Returns true if the statistics satisfy all constraints. Without a `filter_by` statistic
    /// every series matches.
    pub fn matches(&self, statistics: &Statistics) -> bool {
        match self.filter_by {
            None => true,
            Some(kind) => {
                let value = statistics.get(kind);
                self.constraints
                    .iter()
                    .all(|c| c.operator.apply(value, c.threshold))
            }
        }
    }
}

/// User-driven display state of a graph.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphSettings {
    /// Uids of visible traces; empty means "not yet decided", i.e. all visible
    pub visible: Vec<String>,
    /// Raw metric names to show derived avg/max/min traces for
    pub visible_statistics: Vec<String>,
    /// Tables visible before a level switch, used to carry visibility over
    pub prev_visible_tables: Vec<String>,
    /// Peak overlay uids emitted by the last assembly
    pub overlays: Vec<String>,
}

/// Styling of a graph instance.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphStyling {
    pub color_palette: String,
    pub show_legend: bool,
}

impl Default for GraphStyling {
    fn default() -> Self {
        Self {
            color_palette: crate::palette::DEFAULT_PALETTE.to_string(),
            show_legend: true,
        }
    }
}

/// How achieved performance is aggregated over a run for roofline markers.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, EnumString, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlotBy {
    #[default]
    Peak,
    Average,
    Median,
}

impl PlotBy {
    /// Aggregate a series. Returns `None` for empty input.
    pub fn aggregate(self, values: &[f64]) -> Option<f64> {
        match self {
            Self::Peak => stats::max(values),
            Self::Average => stats::average(values),
            Self::Median => stats::median(values),
        }
    }
}

/// Floating point precision of a roofline marker.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Precision {
    #[strum(serialize = "SP")]
    Single,
    #[strum(serialize = "DP")]
    Double,
}

/// Query of a roofline graph.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RooflineQuery {
    pub job_ids: Vec<JobId>,
    /// Reference node providing the peak values
    pub node: Option<String>,
    #[serde(rename = "plotSP")]
    pub plot_sp: bool,
    #[serde(rename = "plotDP")]
    pub plot_dp: bool,
    pub plot_by: PlotBy,
    /// Selected compute ceilings by benchmark id
    pub plot_flops: Vec<String>,
    /// Allow jobs of different runs; only affects job selection upstream
    pub cross_compare: bool,
}

impl Default for RooflineQuery {
    fn default() -> Self {
        Self {
            job_ids: Vec::new(),
            node: None,
            plot_sp: true,
            plot_dp: true,
            plot_by: PlotBy::Peak,
            plot_flops: Vec::new(),
            cross_compare: false,
        }
    }
}

impl RooflineQuery {
    /// Requested precisions in display order.
    pub fn precisions(&self) -> Vec<Precision> {
        let mut precisions = Vec::new();
        if self.plot_sp {
            precisions.push(Precision::Single);
        }
        if self.plot_dp {
            precisions.push(Precision::Double);
        }
        precisions
    }
}
