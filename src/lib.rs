//! This crate provides the measurement cache and graph assembly engine of a benchmarking
//! dashboard for HPC jobs. Given a query naming jobs, a metric and an aggregation level it
//! fetches the raw time series of each job, unifies their units, applies the user's filters
//! and visibility choices and emits renderer-agnostic traces with layout metadata.
//!
//! The main entry point is the [graph_store::GraphStore], which owns the state of each graph
//! and drives the pipeline:
//!
//! * [measurement_cache] keeps fetched payloads per job with at most one fetch in flight per
//!   key.
//! * [assembler] turns cached payloads into time series traces, including derived statistic
//!   traces and peak value overlays.
//! * [roofline] plots achieved performance of jobs against the ceilings of a reference node.
//! * [units] and [brace_notation] provide unit unification and entity range notation.
//!
//! The crate is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [reqwest] fetches measurements from the REST API.
//! * [Serde](serde) performs (de)serialisation of JSON request and response data.
//! * [validator] checks queries and measurement payloads at the cache boundary.

pub mod assembler;
pub mod benchmarks;
pub mod brace_notation;
pub mod cli;
pub mod error;
pub mod fetcher;
pub mod fetcher_http;
pub mod graph;
pub mod graph_store;
pub mod measurement_cache;
pub mod metrics;
pub mod models;
pub mod palette;
pub mod preferences;
pub mod roofline;
pub mod stats;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod units;
