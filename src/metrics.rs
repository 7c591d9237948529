use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Process-wide runtime counters, rendered as Prometheus text at `/metrics`.
#[derive(Default)]
pub struct MetricsCollector {
    cycles_started: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_superseded: AtomicU64,
    status_probe_resolved: AtomicU64,
    status_probe_exhausted: AtomicU64,
    status_source_failures: AtomicU64,
    latency_samples_ok: AtomicU64,
    latency_samples_timeout: AtomicU64,
    proxy_queries_ok: AtomicU64,
    proxy_queries_offline: AtomicU64,
    proxy_queries_rejected: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub cycles_superseded: u64,
    pub status_probe_resolved: u64,
    pub status_probe_exhausted: u64,
    pub status_source_failures: u64,
    pub latency_samples_ok: u64,
    pub latency_samples_timeout: u64,
    pub proxy_queries_ok: u64,
    pub proxy_queries_offline: u64,
    pub proxy_queries_rejected: u64,
}

impl MetricsCollector {
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
        INSTANCE.get_or_init(MetricsCollector::default)
    }

    pub fn inc_cycles_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cycles_completed(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cycles_superseded(&self) {
        self.cycles_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_status_probe_resolved(&self) {
        self.status_probe_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_status_probe_exhausted(&self) {
        self.status_probe_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_status_source_failure(&self) {
        self.status_source_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_latency_sample_ok(&self) {
        self.latency_samples_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_latency_sample_timeout(&self) {
        self.latency_samples_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_proxy_query_ok(&self) {
        self.proxy_queries_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_proxy_query_offline(&self) {
        self.proxy_queries_offline.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_proxy_query_rejected(&self) {
        self.proxy_queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_superseded: self.cycles_superseded.load(Ordering::Relaxed),
            status_probe_resolved: self.status_probe_resolved.load(Ordering::Relaxed),
            status_probe_exhausted: self.status_probe_exhausted.load(Ordering::Relaxed),
            status_source_failures: self.status_source_failures.load(Ordering::Relaxed),
            latency_samples_ok: self.latency_samples_ok.load(Ordering::Relaxed),
            latency_samples_timeout: self.latency_samples_timeout.load(Ordering::Relaxed),
            proxy_queries_ok: self.proxy_queries_ok.load(Ordering::Relaxed),
            proxy_queries_offline: self.proxy_queries_offline.load(Ordering::Relaxed),
            proxy_queries_rejected: self.proxy_queries_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Returns the shared collector instance.
pub fn metrics() -> &'static MetricsCollector {
    MetricsCollector::global()
}

pub fn render(output: &mut String, snapshot: MetricsSnapshot) {
    push_counter_group(
        output,
        "beacon_cycles_total",
        "Polling cycle outcomes",
        &[
            ("started", snapshot.cycles_started),
            ("completed", snapshot.cycles_completed),
            ("superseded", snapshot.cycles_superseded),
        ],
        "outcome",
    );

    push_counter_group(
        output,
        "beacon_status_probes_total",
        "Status probe outcomes across all endpoints",
        &[
            ("resolved", snapshot.status_probe_resolved),
            ("exhausted", snapshot.status_probe_exhausted),
        ],
        "outcome",
    );

    output.push_str(
        "# HELP beacon_status_source_failures_total Individual status source failures or timeouts\n",
    );
    output.push_str("# TYPE beacon_status_source_failures_total counter\n");
    output.push_str(&format!(
        "beacon_status_source_failures_total {}\n",
        snapshot.status_source_failures
    ));

    push_counter_group(
        output,
        "beacon_latency_samples_total",
        "Latency probe samples by outcome",
        &[
            ("ok", snapshot.latency_samples_ok),
            ("timeout", snapshot.latency_samples_timeout),
        ],
        "outcome",
    );

    push_counter_group(
        output,
        "beacon_proxy_queries_total",
        "Proxy /api/status query outcomes",
        &[
            ("ok", snapshot.proxy_queries_ok),
            ("offline", snapshot.proxy_queries_offline),
            ("rejected", snapshot.proxy_queries_rejected),
        ],
        "outcome",
    );
}

fn push_counter_group(
    output: &mut String,
    metric: &str,
    help: &str,
    entries: &[(&str, u64)],
    label: &str,
) {
    output.push_str(&format!("# HELP {metric} {help}\n"));
    output.push_str(&format!("# TYPE {metric} counter\n"));
    for (value, total) in entries {
        output.push_str(&format!("{metric}{{{label}=\"{value}\"}} {total}\n"));
    }
}
