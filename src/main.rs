//! This file defines the jobgraph binary entry point.

use jobgraph::benchmarks::StaticNodeCapabilities;
use jobgraph::cli::{self, Command, CommandLineArgs};
use jobgraph::error::{log_error, GraphError};
use jobgraph::fetcher_http::MeasurementFetcherHttp;
use jobgraph::graph::Graph;
use jobgraph::graph_store::{GraphKind, GraphStore};
use jobgraph::measurement_cache::MeasurementCache;
use jobgraph::metrics;
use jobgraph::preferences::{self, StoredPreferences};
use jobgraph::tracing;

use std::sync::Arc;

/// Id of the single graph assembled per invocation
const GRAPH_ID: &str = "cli";

/// Application entry point
#[tokio::main]
async fn main() {
    let args = cli::parse();
    tracing::init_tracing();
    if let Err(error) = run(&args).await {
        log_error(&error);
        std::process::exit(1);
    }
}

/// Assemble the requested graph and print it as JSON.
async fn run(args: &CommandLineArgs) -> Result<(), GraphError> {
    metrics::register_metrics()?;

    let stored = match &args.preferences {
        Some(path) => preferences::load_preferences(path)?,
        None => StoredPreferences::default(),
    };
    let nodes: StaticNodeCapabilities = match &args.node_benchmarks {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => StaticNodeCapabilities::new(),
    };
    let fetcher = MeasurementFetcherHttp::new(args.api_url.clone(), args.api_token.clone());
    let store = GraphStore::new(Arc::new(MeasurementCache::new(fetcher)), nodes, stored);

    match &args.command {
        Command::Graph(graph_args) => {
            store.register(GRAPH_ID, GraphKind::Default);
            store.set_query(GRAPH_ID, graph_args.query()).await?;
            store.set_modifiers(GRAPH_ID, graph_args.modifiers())?;
            if !graph_args.show_statistics.is_empty() {
                let mut settings = store.settings(GRAPH_ID)?;
                settings.visible_statistics = graph_args.show_statistics.clone();
                store.set_settings(GRAPH_ID, settings)?;
                store.update_graph(GRAPH_ID)?;
            }
        }
        Command::Roofline(roofline_args) => {
            store.register(GRAPH_ID, GraphKind::Roofline);
            store
                .set_roofline_query(GRAPH_ID, roofline_args.query())
                .await?;
        }
    }

    let graph = store
        .graph(GRAPH_ID)?
        .unwrap_or_else(|| Graph::no_data(true));
    println!("{}", serde_json::to_string_pretty(&graph)?);

    if args.metrics {
        eprintln!("{}", metrics::gather()?);
    }
    Ok(())
}
