use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use meshflow_core::config::{Config, NamespaceRule};
use meshflow_core::filter::NamespaceAllowList;
use meshflow_core::graph::build_flow_graph;
use meshflow_core::query::{CollectionReport, CollectorStatus};
use meshflow_store::Store;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::{Backend, FetchError, FetchScope, FetchWindow};

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub enabled: bool,
    pub interval: Duration,
    pub lookback: Duration,
    pub trace_limit: usize,
    pub allow_list: NamespaceAllowList,
    pub namespace_rules: Vec<NamespaceRule>,
}

impl CollectorOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            enabled: cfg.collector_enabled,
            interval: cfg.collect_interval,
            lookback: cfg.lookback,
            trace_limit: cfg.trace_limit,
            allow_list: NamespaceAllowList::new(&cfg.namespaces),
            namespace_rules: cfg.namespace_rules.clone(),
        }
    }
}

#[derive(Default)]
struct LastRun {
    at: Option<DateTime<Utc>>,
    error: Option<String>,
}

struct Inner {
    store: Store,
    backend: Backend,
    options: CollectorOptions,
    collecting: AtomicBool,
    cycles: AtomicU64,
    last: Mutex<LastRun>,
}

/// Periodically pulls recent traces from the configured backend and records
/// their flow graphs. At most one cycle runs at a time; triggers that arrive
/// while a cycle is in flight are dropped.
#[derive(Clone)]
pub struct Collector {
    inner: Arc<Inner>,
}

/// Clears the in-flight flag when a cycle ends, including on cancellation.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Collector {
    pub fn new(store: Store, backend: Backend, options: CollectorOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                backend,
                options,
                collecting: AtomicBool::new(false),
                cycles: AtomicU64::new(0),
                last: Mutex::new(LastRun::default()),
            }),
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.inner.collecting.load(Ordering::Acquire)
    }

    /// Starts the timer task, or returns `None` when collection is disabled.
    pub fn spawn(&self) -> Option<JoinHandle<()>> {
        if !self.inner.options.enabled {
            info!("trace collector disabled");
            return None;
        }

        let collector = self.clone();
        let period = self.inner.options.interval.max(Duration::from_secs(1));
        info!(
            backend = %self.inner.backend.kind(),
            url = self.inner.backend.base_url(),
            interval = ?period,
            "trace collector started"
        );
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                collector.collect_now(None).await;
            }
        }))
    }

    /// Runs one collection cycle now. With a namespace scope only traces
    /// resolved to that namespace are kept.
    pub async fn collect_now(&self, namespace: Option<&str>) -> CollectionReport {
        let inner = &self.inner;
        if inner
            .collecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("collection already in progress, trigger dropped");
            return CollectionReport::default();
        }
        let _guard = FlightGuard(&inner.collecting);

        let report = self.run_cycle(namespace).await;

        inner.cycles.fetch_add(1, Ordering::Relaxed);
        let mut last = inner.last.lock().unwrap_or_else(|e| e.into_inner());
        last.at = Some(Utc::now());
        last.error = report.error.clone();
        report
    }

    async fn run_cycle(&self, namespace: Option<&str>) -> CollectionReport {
        let inner = &self.inner;
        let options = &inner.options;
        let end = Utc::now();
        let lookback = chrono::Duration::from_std(options.lookback)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let window = FetchWindow {
            start: end - lookback,
            end,
            limit: options.trace_limit,
        };
        let scope = FetchScope {
            rules: &options.namespace_rules,
            namespace,
        };

        let mut report = CollectionReport {
            started: true,
            ..CollectionReport::default()
        };

        let traces = match inner.backend.recent_traces(window, scope).await {
            Ok(traces) => traces,
            Err(FetchError::Unavailable(e)) => {
                debug!(error = %e, "tracing backend unavailable, retrying next cycle");
                report.error = Some(e);
                return report;
            }
            Err(e) => {
                warn!(error = %e, "trace collection failed");
                report.error = Some(e.to_string());
                return report;
            }
        };

        for trace in traces {
            report.traces_seen += 1;
            let resolved = trace.namespace();
            let admitted = match namespace {
                Some(scope) => resolved.eq_ignore_ascii_case(scope),
                None => options.allow_list.admits(resolved),
            };
            if !admitted {
                debug!(trace_id = %trace.trace_id, namespace = resolved, "trace outside namespace filter");
                report.skipped += 1;
                continue;
            }

            let Some(flow) = build_flow_graph(
                &trace.trace_id,
                &trace.spans,
                &trace.operation_name,
                trace.ui_event.as_deref(),
            ) else {
                report.skipped += 1;
                continue;
            };
            inner.store.record_flow(flow);
            report.flows_recorded += 1;
        }

        debug!(
            seen = report.traces_seen,
            recorded = report.flows_recorded,
            skipped = report.skipped,
            "collection cycle finished"
        );
        report
    }

    pub fn status(&self) -> CollectorStatus {
        let inner = &self.inner;
        let last = inner.last.lock().unwrap_or_else(|e| e.into_inner());
        CollectorStatus {
            enabled: inner.options.enabled,
            collecting: self.is_collecting(),
            interval: inner.options.interval,
            lookback: inner.options.lookback,
            backend: inner.backend.kind(),
            backend_url: inner.backend.base_url().to_string(),
            namespaces: inner.options.allow_list.namespaces().to_vec(),
            cycles: inner.cycles.load(Ordering::Relaxed),
            last_run: last.at,
            last_error: last.error.clone(),
        }
    }
}
