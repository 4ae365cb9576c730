use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::span::DEFAULT_NAMESPACE;
use crate::time::{dt_to_nanos, parse_time_or_relative};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TimeWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self {
            since: None,
            until: None,
        }
    }

    /// Builds a window from optional RFC 3339 or relative (`15m`) bounds.
    pub fn parse(since: Option<&str>, until: Option<&str>) -> Result<Self> {
        Ok(Self {
            since: since.map(parse_time_or_relative).transpose()?,
            until: until.map(parse_time_or_relative).transpose()?,
        })
    }

    /// Whether a `[start, end]` nanosecond range lies inside the window.
    pub fn contains_range(&self, start: u64, end: u64) -> bool {
        if let Some(since) = self.since
            && start < dt_to_nanos(since)
        {
            return false;
        }
        if let Some(until) = self.until
            && end > dt_to_nanos(until)
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowFilter {
    pub operation_name: Option<String>,
    pub namespace: Option<String>,
    pub environment: Option<String>,
    pub window: TimeWindow,
    pub limit: usize,
}

impl Default for FlowFilter {
    fn default() -> Self {
        Self {
            operation_name: None,
            namespace: None,
            environment: None,
            window: TimeWindow::all(),
            limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DependencyFilter {
    pub namespace: Option<String>,
    pub service_name: Option<String>,
}

/// Case-insensitive namespace allow-list. Empty means every namespace passes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NamespaceAllowList {
    namespaces: Vec<String>,
}

impl NamespaceAllowList {
    pub fn new<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for ns in namespaces {
            let ns = ns.as_ref().trim().to_ascii_lowercase();
            if !ns.is_empty() && !out.contains(&ns) {
                out.push(ns);
            }
        }
        Self { namespaces: out }
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.namespaces
            .iter()
            .any(|ns| ns.eq_ignore_ascii_case(namespace))
    }

    /// Allow-list decision for a trace whose resolved namespace is `namespace`.
    /// Traces that never resolved past `default` are let through so local
    /// development traffic is not dropped wholesale.
    pub fn admits(&self, namespace: &str) -> bool {
        if self.is_empty() || namespace.eq_ignore_ascii_case(DEFAULT_NAMESPACE) {
            return true;
        }
        self.contains(namespace)
    }
}
