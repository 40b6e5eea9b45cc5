use crate::error::GraphError;
use crate::fetcher::MeasurementFetcher;
use crate::models::{Query, RawMeasurementPayload};

use url::Url;

/// HTTP measurement fetcher.
///
/// Implements [MeasurementFetcher] against `GET {base}/measurements/{jobId}`.
#[derive(Debug)]
pub struct MeasurementFetcherHttp {
    reqwest_client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl MeasurementFetcherHttp {
    /// Create a new HTTP measurement fetcher.
    ///
    /// # Arguments
    ///
    /// * `base_url`: Base URL of the REST API
    /// * `token`: Optional bearer token
    pub fn new(base_url: Url, token: Option<String>) -> Self {
        Self {
            reqwest_client: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    /// URL and query parameters of a request for `query`.
    fn request_url(&self, query: &Query) -> Result<Url, GraphError> {
        let job_id = query.job_ids.first().copied().unwrap_or_default();
        // Keep any path of the base URL.
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let mut url = base.join(&format!("measurements/{}", job_id))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("group", &query.group)
                .append_pair("metric", &query.metric)
                .append_pair("level", &query.level.to_string());
            if let Some(node) = query.node() {
                pairs.append_pair("node", node);
            }
            pairs.append_pair("deciles", if query.deciles { "true" } else { "false" });
        }
        Ok(url)
    }
}

impl MeasurementFetcher for MeasurementFetcherHttp {
    /// Fetch measurements of a single job.
    ///
    /// 204 and 404 responses mean there is no data. Any other unsuccessful status is an error.
    ///
    /// # Arguments
    ///
    /// * `query`: Query narrowed to a single job
    #[tracing::instrument(level = "DEBUG", skip(self, query), fields(key = %query.cache_key()))]
    async fn fetch(&self, query: &Query) -> Result<Option<RawMeasurementPayload>, GraphError> {
        let url = self.request_url(query)?;
        let request = if let Some(token) = &self.token {
            self.reqwest_client.get(url).bearer_auth(token)
        } else {
            self.reqwest_client.get(url)
        };
        let response = request.send().await?;
        match response.status() {
            reqwest::StatusCode::OK => Ok(Some(response.json().await?)),
            reqwest::StatusCode::NO_CONTENT | reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => Err(GraphError::FetchStatus {
                status: status.as_u16(),
            }),
        }
    }
}
