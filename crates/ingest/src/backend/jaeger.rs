use std::collections::HashSet;

use meshflow_core::config::NamespaceRule;
use tracing::{debug, warn};

use super::{FetchError, FetchScope, FetchWindow};
use crate::normalize::jaeger::JaegerResponse;
use crate::normalize::{NormalizedTrace, infer_namespace, normalize_jaeger_value};

pub struct JaegerClient {
    http: reqwest::Client,
    base_url: String,
}

impl JaegerClient {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn services(&self) -> Result<Vec<String>, FetchError> {
        let resp: JaegerResponse<String> = self
            .http
            .get(format!("{}/api/services", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.data)
    }

    pub async fn traces_for_service(
        &self,
        service: &str,
        window: FetchWindow,
    ) -> Result<Vec<serde_json::Value>, FetchError> {
        let resp: JaegerResponse<serde_json::Value> = self
            .http
            .get(format!("{}/api/traces", self.base_url))
            .query(&[
                ("service", service.to_string()),
                ("start", window.start.timestamp_micros().to_string()),
                ("end", window.end.timestamp_micros().to_string()),
                ("limit", window.limit.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.data)
    }

    pub(super) async fn recent_traces(
        &self,
        window: FetchWindow,
        scope: FetchScope<'_>,
    ) -> Result<Vec<NormalizedTrace>, FetchError> {
        let services = scoped_services(self.services().await?, scope);
        debug!(services = services.len(), "querying jaeger services");

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for service in services {
            let raw_traces = match self.traces_for_service(&service, window).await {
                Ok(traces) => traces,
                Err(FetchError::Unavailable(e)) => return Err(FetchError::Unavailable(e)),
                Err(e) => {
                    warn!(service = %service, error = %e, "skipping jaeger service");
                    continue;
                }
            };
            for raw in raw_traces {
                let Some(trace) = normalize_jaeger_value(&raw, scope.rules) else {
                    continue;
                };
                if seen.insert(trace.trace_id.clone()) {
                    out.push(trace);
                }
            }
        }
        Ok(out)
    }
}

/// Narrows the service list to the scoped namespace when some inference rule
/// maps to it. Services that cannot be attributed by name are kept otherwise,
/// since their spans may still carry a namespace attribute.
fn scoped_services(services: Vec<String>, scope: FetchScope<'_>) -> Vec<String> {
    let Some(namespace) = scope.namespace else {
        return services;
    };
    let targeted = scope
        .rules
        .iter()
        .filter(|r| r.namespace.eq_ignore_ascii_case(namespace))
        .cloned()
        .collect::<Vec<NamespaceRule>>();
    if targeted.is_empty() {
        return services;
    }
    services
        .into_iter()
        .filter(|svc| infer_namespace(svc, &targeted).eq_ignore_ascii_case(namespace))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, namespace: &str) -> NamespaceRule {
        NamespaceRule {
            pattern: pattern.into(),
            namespace: namespace.into(),
        }
    }

    #[test]
    fn unscoped_keeps_every_service() {
        let rules = vec![rule("ccs", "ccs")];
        let services = vec!["ccs-api".to_string(), "billing".to_string()];
        let scope = FetchScope {
            rules: &rules,
            namespace: None,
        };
        assert_eq!(scoped_services(services.clone(), scope), services);
    }

    #[test]
    fn scoped_filters_by_rules() {
        let rules = vec![rule("ccs", "ccs"), rule("db", "dbaas")];
        let services = vec!["ccs-api".to_string(), "mongodb".to_string()];
        let scope = FetchScope {
            rules: &rules,
            namespace: Some("CCS"),
        };
        assert_eq!(scoped_services(services, scope), vec!["ccs-api".to_string()]);
    }

    #[test]
    fn scope_without_rules_keeps_everything() {
        let services = vec!["ccs-api".to_string(), "mongodb".to_string()];
        let scope = FetchScope {
            rules: &[],
            namespace: Some("ccs"),
        };
        assert_eq!(scoped_services(services.clone(), scope), services);
    }
}
