//! Command Line Interface (CLI) arguments.

use crate::models::{
    FilterConstraint, GraphModifiers, JobId, Level, Operator, PlotBy, Query, RooflineQuery,
    StatisticKind,
};

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// Jobgraph command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// Base URL of the measurements REST API
    #[arg(
        long,
        default_value = "http://localhost:7000/api/v1",
        env = "JOBGRAPH_API_URL"
    )]
    pub api_url: Url,
    /// Bearer token sent with measurement requests
    #[arg(long, env = "JOBGRAPH_API_TOKEN")]
    pub api_token: Option<String>,
    /// JSON file holding graph preferences and overrides
    #[arg(long, env = "JOBGRAPH_PREFERENCES")]
    pub preferences: Option<PathBuf>,
    /// JSON file holding peak values as `{jobId: {node: {benchmark: value}}}`
    #[arg(long, env = "JOBGRAPH_NODE_BENCHMARKS")]
    pub node_benchmarks: Option<PathBuf>,
    /// Print prometheus metrics to stderr on exit
    #[arg(long, default_value_t = false, env = "JOBGRAPH_METRICS")]
    pub metrics: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Assemble a time series graph of one metric
    Graph(GraphArgs),
    /// Assemble a roofline graph
    Roofline(RooflineArgs),
}

/// Arguments of a time series graph.
#[derive(Clone, Debug, Args)]
pub struct GraphArgs {
    /// Job to include; repeat for multiple jobs
    #[arg(long = "job-id", required = true)]
    pub job_ids: Vec<JobId>,
    /// Metric group
    #[arg(long, default_value = "cpu")]
    pub group: String,
    /// Metric name
    #[arg(long)]
    pub metric: String,
    /// Aggregation level
    #[arg(long, default_value = "job")]
    pub level: Level,
    /// Node to restrict the series to
    #[arg(long)]
    pub node: Option<String>,
    /// Request decile series
    #[arg(long, default_value_t = false)]
    pub deciles: bool,
    /// Entity range in brace notation, e.g. `[0-3,8]`
    #[arg(long)]
    pub filter_range: Option<String>,
    /// Statistic the constraints are compared against
    #[arg(long)]
    pub filter_by: Option<StatisticKind>,
    /// Constraint as `operator:threshold`, e.g. `ge:10`; at most two
    #[arg(long = "constraint", value_parser = FilterConstraint::from_str)]
    pub constraints: Vec<FilterConstraint>,
    /// Peak value overlay by benchmark id; repeat for multiple overlays
    #[arg(long = "system-benchmark")]
    pub system_benchmarks: Vec<String>,
    /// Factor applied to peak value overlays
    #[arg(long, default_value_t = 1.0)]
    pub scaling_factor: f64,
    /// Raw metric name to show avg/max/min traces for
    #[arg(long = "show-statistics")]
    pub show_statistics: Vec<String>,
}

impl GraphArgs {
    pub fn query(&self) -> Query {
        Query::new(
            self.job_ids.clone(),
            &self.group,
            &self.metric,
            self.level,
            self.node.as_deref(),
            self.deciles,
        )
    }

    pub fn modifiers(&self) -> GraphModifiers {
        GraphModifiers {
            filter_range: self.filter_range.clone(),
            filter_by: self.filter_by,
            constraints: self.constraints.clone(),
            system_benchmarks: self.system_benchmarks.clone(),
            system_benchmarks_scaling_factor: self.scaling_factor,
        }
    }
}

/// Arguments of a roofline graph.
#[derive(Clone, Debug, Args)]
pub struct RooflineArgs {
    /// Job to include; repeat for multiple jobs
    #[arg(long = "job-id", required = true)]
    pub job_ids: Vec<JobId>,
    /// Reference node providing the peak values
    #[arg(long)]
    pub node: String,
    /// Compute ceiling by benchmark id; repeat for multiple ceilings
    #[arg(long = "flops", default_value = "peakflops")]
    pub plot_flops: Vec<String>,
    /// Do not plot single precision markers
    #[arg(long, default_value_t = false)]
    pub no_sp: bool,
    /// Do not plot double precision markers
    #[arg(long, default_value_t = false)]
    pub no_dp: bool,
    /// Aggregation of achieved performance
    #[arg(long, default_value = "peak")]
    pub plot_by: PlotBy,
    /// Allow jobs of different runs
    #[arg(long, default_value_t = false)]
    pub cross_compare: bool,
}

impl RooflineArgs {
    pub fn query(&self) -> RooflineQuery {
        RooflineQuery {
            job_ids: self.job_ids.clone(),
            node: Some(self.node.clone()),
            plot_sp: !self.no_sp,
            plot_dp: !self.no_dp,
            plot_by: self.plot_by,
            plot_flops: self.plot_flops.clone(),
            cross_compare: self.cross_compare,
        }
    }
}

impl FromStr for FilterConstraint {
    type Err = String;

    /// Parse `operator:threshold`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (operator, threshold) = s
            .split_once(':')
            .ok_or_else(|| format!("expected operator:threshold, got {}", s))?;
        let operator = Operator::from_str(operator.trim())
            .map_err(|_| format!("unknown operator {}", operator))?;
        let threshold = threshold
            .trim()
            .parse()
            .map_err(|_| format!("invalid threshold {}", threshold))?;
        Ok(Self::new(operator, threshold))
    }
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_arguments() {
        let args = CommandLineArgs::try_parse_from([
            "jobgraph",
            "graph",
            "--job-id",
            "1",
            "--job-id",
            "2",
            "--metric",
            "FLOPS",
            "--level",
            "core",
            "--node",
            "n01",
            "--filter-by",
            "avg",
            "--constraint",
            "ge:10",
            "--constraint",
            "lt: 20.5",
            "--system-benchmark",
            "peakflops",
        ])
        .unwrap();
        let Command::Graph(graph) = args.command else {
            panic!("expected graph command");
        };
        assert_eq!(
            Query::new(vec![1, 2], "cpu", "FLOPS", Level::Core, Some("n01"), false),
            graph.query()
        );
        let modifiers = graph.modifiers();
        assert_eq!(Some(StatisticKind::Avg), modifiers.filter_by);
        assert_eq!(
            vec![
                FilterConstraint::new(Operator::Ge, 10.0),
                FilterConstraint::new(Operator::Lt, 20.5)
            ],
            modifiers.constraints
        );
        assert_eq!(1.0, modifiers.system_benchmarks_scaling_factor);
        assert_eq!("http://localhost:7000/api/v1", args.api_url.as_str());
    }

    #[test]
    fn roofline_arguments() {
        let args = CommandLineArgs::try_parse_from([
            "jobgraph",
            "roofline",
            "--job-id",
            "3",
            "--node",
            "n02",
            "--no-sp",
            "--plot-by",
            "median",
        ])
        .unwrap();
        let Command::Roofline(roofline) = args.command else {
            panic!("expected roofline command");
        };
        let query = roofline.query();
        assert_eq!(vec![3], query.job_ids);
        assert_eq!(Some("n02".to_string()), query.node);
        assert!(!query.plot_sp);
        assert!(query.plot_dp);
        assert_eq!(PlotBy::Median, query.plot_by);
        assert_eq!(vec!["peakflops"], query.plot_flops);
    }

    #[test]
    fn invalid_constraint() {
        assert!(FilterConstraint::from_str("10").is_err());
        assert!(FilterConstraint::from_str("between:10").is_err());
        assert!(FilterConstraint::from_str("gt:x").is_err());
    }
}
