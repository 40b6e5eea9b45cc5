//! Per-graph query and settings state.
//!
//! The [GraphStore] owns the state of every registered graph, fetches missing measurements
//! through the shared [MeasurementCache] and re-assembles graphs when their inputs change.
//! Consumers read the current graph with [GraphStore::graph] or subscribe to [GraphEvent]s.

use crate::assembler::{self, GraphInput};
use crate::benchmarks::{NodeBenchmarks, NodeCapabilities};
use crate::error::GraphError;
use crate::fetcher::MeasurementFetcher;
use crate::graph::Graph;
use crate::measurement_cache::{MeasurementCache, MeasurementSource};
use crate::models::{
    GraphModifiers, GraphSettings, GraphStyling, JobId, Query, RawMeasurementPayload,
    RooflineQuery,
};
use crate::palette;
use crate::preferences::{GraphOverrides, GraphPreferences, StoredPreferences};
use crate::roofline::{self, RooflineInput};

use futures::future::join_all;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use strum_macros::{Display, EnumString};
use tokio::sync::broadcast;
use validator::Validate;

/// Capacity of the event channel. Slow subscribers miss older events.
const EVENT_CAPACITY: usize = 64;

/// Kind of a registered graph.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GraphKind {
    /// Time series of one metric
    Default,
    Roofline,
}

/// Notification published by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphEvent {
    /// A graph has been re-assembled
    Updated(String),
    /// Cached measurements of these jobs have been dropped
    CacheCleared(Vec<JobId>),
}

/// State of a time series graph.
#[derive(Debug, Default)]
struct DefaultGraph {
    query: Query,
    modifiers: GraphModifiers,
    settings: GraphSettings,
    /// Payloads of the current query per job, kept for export
    raw: BTreeMap<JobId, Arc<RawMeasurementPayload>>,
}

/// State of a roofline graph.
#[derive(Debug, Default)]
struct RooflineGraph {
    query: RooflineQuery,
    /// Peak values per node
    benchmarks: BTreeMap<String, NodeBenchmarks>,
}

#[derive(Debug)]
enum GraphState {
    Default(DefaultGraph),
    Roofline(RooflineGraph),
}

impl GraphState {
    fn kind(&self) -> GraphKind {
        match self {
            Self::Default(_) => GraphKind::Default,
            Self::Roofline(_) => GraphKind::Roofline,
        }
    }

    /// Queries whose measurements the graph is assembled from.
    fn data_queries<N: NodeCapabilities + ?Sized>(&self, nodes: &N) -> Vec<Query> {
        match self {
            Self::Default(graph) => graph
                .query
                .job_ids
                .iter()
                .map(|&job_id| graph.query.for_job(job_id))
                .collect(),
            Self::Roofline(graph) => roofline::data_queries(nodes, &graph.query.job_ids),
        }
    }
}

#[derive(Debug)]
struct GraphEntry {
    state: GraphState,
    styling: GraphStyling,
    /// Last assembled graph
    graph: Option<Graph>,
    /// Set if no measurement of the last data update could be fetched
    no_data: bool,
    /// Serialises data updates of this graph
    update_lock: Arc<tokio::sync::Mutex<()>>,
}

/// Store of all registered graphs.
///
/// Preferences and overrides are shared by all graphs; query, modifiers, settings and styling
/// belong to a single graph.
pub struct GraphStore<F, N> {
    cache: Arc<MeasurementCache<F>>,
    nodes: N,
    graphs: Mutex<HashMap<String, GraphEntry>>,
    preferences: RwLock<GraphPreferences>,
    overrides: RwLock<GraphOverrides>,
    events: broadcast::Sender<GraphEvent>,
}

impl<F, N> GraphStore<F, N>
where
    F: MeasurementFetcher,
    N: NodeCapabilities,
{
    /// Create a store without graphs.
    ///
    /// # Arguments
    ///
    /// * `cache`: Measurement cache, possibly shared with other stores
    /// * `nodes`: Node lookup for peak values and job nodes
    /// * `stored`: Initial preferences and overrides
    pub fn new(cache: Arc<MeasurementCache<F>>, nodes: N, stored: StoredPreferences) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            cache,
            nodes,
            graphs: Mutex::new(HashMap::new()),
            preferences: RwLock::new(stored.preferences),
            overrides: RwLock::new(stored.overrides),
            events,
        }
    }

    pub fn cache(&self) -> &Arc<MeasurementCache<F>> {
        &self.cache
    }

    /// Subscribe to graph updates and cache invalidations.
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.events.subscribe()
    }

    /// Register a graph with default query and settings.
    ///
    /// Registering an id again replaces a graph of another kind and keeps one of the same kind.
    pub fn register(&self, id: &str, kind: GraphKind) {
        let mut graphs = self.lock_graphs();
        if graphs.get(id).is_some_and(|entry| entry.state.kind() == kind) {
            return;
        }
        let mut color_palette = self.preferences().color_palette;
        if color_palette.is_empty() {
            color_palette = palette::DEFAULT_PALETTE.to_string();
        }
        let state = match kind {
            GraphKind::Default => GraphState::Default(DefaultGraph::default()),
            GraphKind::Roofline => GraphState::Roofline(RooflineGraph::default()),
        };
        tracing::debug!("registering {} graph {}", kind, id);
        graphs.insert(
            id.to_string(),
            GraphEntry {
                state,
                styling: GraphStyling {
                    color_palette,
                    show_legend: true,
                },
                graph: None,
                no_data: false,
                update_lock: Arc::new(tokio::sync::Mutex::new(())),
            },
        );
    }

    /// Remove a graph. Its cached measurements stay available to other graphs.
    ///
    /// Returns true if the graph was registered.
    pub fn unregister(&self, id: &str) -> bool {
        self.lock_graphs().remove(id).is_some()
    }

    /// Ids of all registered graphs in ascending order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock_graphs().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn kind(&self, id: &str) -> Result<GraphKind, GraphError> {
        self.entry(id, |entry| entry.state.kind())
    }

    /// The last assembled graph, `None` before the first assembly.
    pub fn graph(&self, id: &str) -> Result<Option<Graph>, GraphError> {
        self.entry(id, |entry| entry.graph.clone())
    }

    /// Returns true if no measurements could be fetched on the last data update.
    pub fn no_data(&self, id: &str) -> Result<bool, GraphError> {
        self.entry(id, |entry| entry.no_data)
    }

    /// Payloads of the current query per job, as of the last data update.
    pub fn raw(
        &self,
        id: &str,
    ) -> Result<BTreeMap<JobId, Arc<RawMeasurementPayload>>, GraphError> {
        self.default_graph(id, |graph| graph.raw.clone())
    }

    pub fn query(&self, id: &str) -> Result<Query, GraphError> {
        self.default_graph(id, |graph| graph.query.clone())
    }

    pub fn modifiers(&self, id: &str) -> Result<GraphModifiers, GraphError> {
        self.default_graph(id, |graph| graph.modifiers.clone())
    }

    pub fn settings(&self, id: &str) -> Result<GraphSettings, GraphError> {
        self.default_graph(id, |graph| graph.settings.clone())
    }

    pub fn styling(&self, id: &str) -> Result<GraphStyling, GraphError> {
        self.entry(id, |entry| entry.styling.clone())
    }

    pub fn roofline_query(&self, id: &str) -> Result<RooflineQuery, GraphError> {
        self.roofline_graph(id, |graph| graph.query.clone())
    }

    pub fn preferences(&self) -> GraphPreferences {
        self.preferences
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn overrides(&self) -> GraphOverrides {
        self.overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Preferences and overrides in their persisted form.
    pub fn stored_preferences(&self) -> StoredPreferences {
        StoredPreferences {
            preferences: self.preferences(),
            overrides: self.overrides(),
        }
    }

    /// Change the query of a time series graph and update its data.
    ///
    /// Settings are reset. If only the level, node, jobs or deciles changed, the tables of the
    /// visible traces are remembered so that visibility carries over to the new series.
    ///
    /// # Arguments
    ///
    /// * `id`: Graph id
    /// * `query`: New query
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub async fn set_query(&self, id: &str, query: Query) -> Result<(), GraphError> {
        let changed = self.entry(id, |entry| {
            let GraphState::Default(graph) = &mut entry.state else {
                return Err(kind_mismatch(id, GraphKind::Default));
            };
            if graph.query == query {
                return Ok(false);
            }
            let same_metric =
                graph.query.group == query.group && graph.query.metric == query.metric;
            let mut prev_visible_tables: Vec<String> = Vec::new();
            if same_metric {
                let traces = entry.graph.iter().flat_map(|graph| &graph.traces);
                for trace in traces {
                    if !trace.table.is_empty()
                        && graph.settings.visible.contains(&trace.uid)
                        && !prev_visible_tables.contains(&trace.table)
                    {
                        prev_visible_tables.push(trace.table.clone());
                    }
                }
            }
            graph.settings = GraphSettings {
                prev_visible_tables,
                ..Default::default()
            };
            graph.raw.clear();
            graph.query = query;
            Ok(true)
        })??;
        if changed {
            self.update_data(id, false).await?;
        }
        Ok(())
    }

    /// Change the query of a roofline graph and update its data.
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub async fn set_roofline_query(
        &self,
        id: &str,
        query: RooflineQuery,
    ) -> Result<(), GraphError> {
        let changed = self.roofline_graph(id, |graph| {
            if graph.query == query {
                return false;
            }
            graph.query = query;
            true
        })?;
        if changed {
            self.update_data(id, false).await?;
        }
        Ok(())
    }

    /// Set the peak values per node of a roofline graph.
    ///
    /// The graph is not re-assembled; call [GraphStore::update_graph] to apply them.
    pub fn set_benchmarks(
        &self,
        id: &str,
        benchmarks: BTreeMap<String, NodeBenchmarks>,
    ) -> Result<(), GraphError> {
        self.roofline_graph(id, |graph| graph.benchmarks = benchmarks)
    }

    /// Change the modifiers of a time series graph and re-assemble it.
    pub fn set_modifiers(&self, id: &str, modifiers: GraphModifiers) -> Result<(), GraphError> {
        modifiers.validate().map_err(GraphError::InvalidQuery)?;
        let changed = self.default_graph(id, |graph| {
            if graph.modifiers == modifiers {
                return false;
            }
            graph.modifiers = modifiers;
            true
        })?;
        if changed {
            self.update_graph(id)?;
        }
        Ok(())
    }

    /// Replace the settings of a time series graph.
    ///
    /// The graph is not re-assembled; call [GraphStore::update_graph] to apply them.
    pub fn set_settings(&self, id: &str, settings: GraphSettings) -> Result<(), GraphError> {
        self.default_graph(id, |graph| graph.settings = settings)
    }

    /// Change the styling of a graph and re-assemble it.
    pub fn set_styling(&self, id: &str, styling: GraphStyling) -> Result<(), GraphError> {
        let changed = self.entry(id, |entry| {
            if entry.styling == styling {
                return false;
            }
            entry.styling = styling;
            true
        })?;
        if changed {
            self.update_graph(id)?;
        }
        Ok(())
    }

    /// Replace the preferences and re-assemble all graphs.
    pub fn set_preferences(&self, preferences: GraphPreferences) -> Result<(), GraphError> {
        *self
            .preferences
            .write()
            .unwrap_or_else(PoisonError::into_inner) = preferences;
        self.update_all_graphs()
    }

    /// Merge overrides into the current ones and re-assemble all graphs.
    pub fn set_overrides(&self, overrides: GraphOverrides) -> Result<(), GraphError> {
        let changed = {
            let mut current = self.overrides.write().unwrap_or_else(PoisonError::into_inner);
            let before = current.clone();
            current.merge(overrides);
            *current != before
        };
        if changed {
            self.update_all_graphs()?;
        }
        Ok(())
    }

    /// Use a palette for all graphs and as the default for new ones.
    pub fn sync_color_palette(&self, palette: &str) -> Result<(), GraphError> {
        self.preferences
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .color_palette = palette.to_string();
        for entry in self.lock_graphs().values_mut() {
            entry.styling.color_palette = palette.to_string();
        }
        self.update_all_graphs()
    }

    /// Drop the cached measurements of jobs and notify subscribers.
    ///
    /// Returns the number of removed cache entries.
    pub fn invalidate(&self, job_ids: &[JobId]) -> usize {
        let removed = self.cache.invalidate(job_ids);
        self.publish(GraphEvent::CacheCleared(job_ids.to_vec()));
        removed
    }

    /// Fetch the measurements of a graph and re-assemble it.
    ///
    /// The fetches of all jobs run concurrently. Concurrent updates of the same graph are
    /// serialised so that the later one is served from the cache. Returns false if no
    /// measurements could be fetched.
    ///
    /// # Arguments
    ///
    /// * `id`: Graph id
    /// * `refresh`: Fetch even if measurements are cached
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub async fn update_data(&self, id: &str, refresh: bool) -> Result<bool, GraphError> {
        let (lock, queries) = self.entry(id, |entry| {
            (
                entry.update_lock.clone(),
                entry.state.data_queries(&self.nodes),
            )
        })?;
        let results = {
            let _guard = lock.lock().await;
            join_all(queries.iter().map(|query| self.cache.ensure(query, refresh))).await
        };
        let no_data = !results.is_empty() && !results.iter().any(|present| *present);
        if no_data {
            tracing::debug!("no measurements for graph {}", id);
        }

        // The query may have changed while fetching; only the current one matters.
        self.entry(id, |entry| {
            entry.no_data = no_data;
            if let GraphState::Default(graph) = &mut entry.state {
                let query = &graph.query;
                graph.raw = query
                    .job_ids
                    .iter()
                    .filter_map(|&job_id| {
                        let payload = self.cache.get(&query.for_job(job_id))?;
                        Some((job_id, payload))
                    })
                    .collect();
            }
        })?;
        self.update_graph(id)?;
        Ok(!no_data)
    }

    /// Re-assemble a graph from cached measurements without fetching.
    pub fn update_graph(&self, id: &str) -> Result<(), GraphError> {
        let preferences = self.preferences();
        let overrides = self.overrides();
        self.entry(id, |entry| match &mut entry.state {
            GraphState::Default(graph) => {
                let input = GraphInput {
                    query: &graph.query,
                    modifiers: &graph.modifiers,
                    settings: &graph.settings,
                    styling: &entry.styling,
                    preferences: &preferences,
                    overrides: &overrides,
                    no_data: entry.no_data,
                };
                let assembly = assembler::assemble(self.cache.as_ref(), &self.nodes, &input);
                graph.settings = assembly.settings;
                graph.modifiers.system_benchmarks = assembly.system_benchmarks;
                entry.graph = Some(assembly.graph);
            }
            GraphState::Roofline(graph) => {
                let input = RooflineInput {
                    query: &graph.query,
                    benchmarks: &graph.benchmarks,
                    styling: &entry.styling,
                    overrides: &overrides,
                    no_data: entry.no_data,
                };
                entry.graph = Some(roofline::assemble_roofline(
                    self.cache.as_ref(),
                    &self.nodes,
                    &input,
                ));
            }
        })?;
        self.publish(GraphEvent::Updated(id.to_string()));
        Ok(())
    }

    /// Re-assemble all registered graphs.
    pub fn update_all_graphs(&self) -> Result<(), GraphError> {
        for id in self.ids() {
            match self.update_graph(&id) {
                // Unregistered in the meantime.
                Err(GraphError::UnknownGraph { .. }) => continue,
                result => result?,
            }
        }
        Ok(())
    }

    fn publish(&self, event: GraphEvent) {
        // Sending only fails without subscribers.
        if self.events.send(event).is_err() {
            tracing::trace!("no subscribers for graph events");
        }
    }

    fn lock_graphs(&self) -> std::sync::MutexGuard<'_, HashMap<String, GraphEntry>> {
        self.graphs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the entry of a graph.
    fn entry<R>(&self, id: &str, f: impl FnOnce(&mut GraphEntry) -> R) -> Result<R, GraphError> {
        let mut graphs = self.lock_graphs();
        let entry = graphs.get_mut(id).ok_or_else(|| GraphError::UnknownGraph {
            id: id.to_string(),
        })?;
        Ok(f(entry))
    }

    fn default_graph<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut DefaultGraph) -> R,
    ) -> Result<R, GraphError> {
        self.entry(id, |entry| match &mut entry.state {
            GraphState::Default(graph) => Ok(f(graph)),
            GraphState::Roofline(_) => Err(kind_mismatch(id, GraphKind::Default)),
        })?
    }

    fn roofline_graph<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut RooflineGraph) -> R,
    ) -> Result<R, GraphError> {
        self.entry(id, |entry| match &mut entry.state {
            GraphState::Roofline(graph) => Ok(f(graph)),
            GraphState::Default(_) => Err(kind_mismatch(id, GraphKind::Roofline)),
        })?
    }
}

fn kind_mismatch(id: &str, expected: GraphKind) -> GraphError {
    GraphError::GraphKindMismatch {
        id: id.to_string(),
        expected,
    }
}
