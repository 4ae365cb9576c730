use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use meshflow_core::config::NamespaceRule;
use meshflow_core::error::MeshflowError;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use prost::Message;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{FetchError, FetchWindow};
use crate::normalize::{NormalizedTrace, normalize_otlp};

const DETAIL_CONCURRENCY: usize = 8;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    traces: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "traceID")]
    trace_id: String,
}

pub struct TempoClient {
    http: reqwest::Client,
    base_url: String,
}

impl TempoClient {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn search(&self, window: FetchWindow) -> Result<Vec<String>, FetchError> {
        let resp: SearchResponse = self
            .http
            .get(format!("{}/api/search", self.base_url))
            .query(&[
                ("start", window.start.timestamp().to_string()),
                ("end", window.end.timestamp().to_string()),
                ("limit", window.limit.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.traces.into_iter().map(|t| t.trace_id).collect())
    }

    /// Fetches one trace as OTLP protobuf.
    pub async fn trace(&self, trace_id: &str) -> Result<TracesData, FetchError> {
        let body = self
            .http
            .get(format!("{}/api/traces/{trace_id}", self.base_url))
            .header(ACCEPT, "application/protobuf")
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        TracesData::decode(body).map_err(|e| {
            FetchError::Failed(MeshflowError::Parse(format!(
                "failed decoding tempo trace {trace_id}: {e}"
            )))
        })
    }

    pub(super) async fn recent_traces(
        &self,
        window: FetchWindow,
        rules: &[NamespaceRule],
    ) -> Result<Vec<NormalizedTrace>, FetchError> {
        let mut ids = self.search(window).await?;
        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(id.to_ascii_lowercase()));
        debug!(traces = ids.len(), "tempo search returned");

        let results = stream::iter(ids)
            .map(|id| async move { (self.trace(&id).await, id) })
            .buffer_unordered(DETAIL_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        let mut out = Vec::new();
        for (result, id) in results {
            match result {
                Ok(data) => out.extend(normalize_otlp(&data, rules)),
                Err(FetchError::Unavailable(e)) => return Err(FetchError::Unavailable(e)),
                Err(e) => warn!(trace_id = %id, error = %e, "skipping tempo trace"),
            }
        }
        Ok(out)
    }
}
