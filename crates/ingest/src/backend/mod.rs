//! HTTP clients for the tracing backends the collector pulls from.

pub mod jaeger;
pub mod tempo;

use std::time::Duration;

use chrono::{DateTime, Utc};
use meshflow_core::config::{BackendKind, NamespaceRule};
use meshflow_core::error::MeshflowError;
use thiserror::Error;

use crate::normalize::NormalizedTrace;

pub use jaeger::JaegerClient;
pub use tempo::TempoClient;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection refused or timed out. Retried on the next cycle.
    #[error("tracing backend unreachable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Failed(#[from] MeshflowError),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Self::Unavailable(e.to_string())
        } else {
            Self::Failed(MeshflowError::Backend(e.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: usize,
}

/// Scope of one fetch: namespace rules for inference, plus the namespace a
/// manual collection was narrowed to.
#[derive(Debug, Clone, Copy)]
pub struct FetchScope<'a> {
    pub rules: &'a [NamespaceRule],
    pub namespace: Option<&'a str>,
}

pub enum Backend {
    Jaeger(JaegerClient),
    Tempo(TempoClient),
}

impl Backend {
    pub fn new(kind: BackendKind, base_url: &str, timeout: Duration) -> Result<Self, MeshflowError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MeshflowError::Backend(format!("failed to build http client: {e}")))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(match kind {
            BackendKind::Jaeger => Self::Jaeger(JaegerClient::new(http, base_url)),
            BackendKind::Tempo => Self::Tempo(TempoClient::new(http, base_url)),
        })
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Jaeger(_) => BackendKind::Jaeger,
            Self::Tempo(_) => BackendKind::Tempo,
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            Self::Jaeger(c) => c.base_url(),
            Self::Tempo(c) => c.base_url(),
        }
    }

    /// Recent traces inside `window`, normalized and deduplicated by trace id.
    pub async fn recent_traces(
        &self,
        window: FetchWindow,
        scope: FetchScope<'_>,
    ) -> Result<Vec<NormalizedTrace>, FetchError> {
        match self {
            Self::Jaeger(c) => c.recent_traces(window, scope).await,
            Self::Tempo(c) => c.recent_traces(window, scope.rules).await,
        }
    }
}
