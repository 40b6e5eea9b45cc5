//! Measurement fetch collaborator.

use crate::error::GraphError;
use crate::models::{Query, RawMeasurementPayload};

/// Measurement fetcher trait.
///
/// Defines the interface used by the measurement cache to retrieve data it does not hold.
/// Implementations must be idempotent and must not depend on the state of the cache.
///
/// # Methods
/// * `fetch`: Fetch the measurements of a single job.
pub trait MeasurementFetcher {
    /// Fetch measurements.
    ///
    /// Returns `None` if there is no data for the query.
    ///
    /// # Arguments
    ///
    /// * `query`: Query narrowed to a single job
    fn fetch(
        &self,
        query: &Query,
    ) -> impl std::future::Future<Output = Result<Option<RawMeasurementPayload>, GraphError>> + Send;
}
