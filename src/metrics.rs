use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    register_defaults();
    handle
}

/// Build a recorder-backed handle without installing it globally.
/// Used where a process may construct more than one router (tests).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

fn register_defaults() {
    // Pre-register counters so they appear even before the first increment.
    counter!("trade_events_total").absolute(0);
    counter!("entries_opened_total").absolute(0);
    counter!("entries_failed_total").absolute(0);
    counter!("exits_failed_total").absolute(0);
    counter!("tx_attempts_total").absolute(0);

    gauge!("open_positions").set(0.0);
    gauge!("tracked_mints").set(0.0);

    // Histograms are lazily created on first record; force creation.
    histogram!("send_latency_seconds").record(0.0);
    histogram!("pipeline_latency_seconds").record(0.0);
}
