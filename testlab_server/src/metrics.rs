//! Prometheus metrics for the test status service.

use metrics::counter;

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a finished reconciliation pass.
pub fn reconcile_pass(outcome: &str) {
    counter!("testlab_reconcile_passes_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a remote call that needed its retry.
pub fn remote_retry(operation: &str) {
    counter!("testlab_remote_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record the one-time consumption of a build's reporting gate.
pub fn reporting_consumed() {
    counter!("testlab_reporting_consumed_total").increment(1);
}

/// Record an analytics event handed to the sink.
pub fn event_dispatched(name: &str) {
    counter!("testlab_events_dispatched_total", "event" => name.to_string()).increment(1);
}

/// Record a started test run.
pub fn run_started(platform: &str) {
    counter!("testlab_runs_started_total", "platform" => platform.to_string()).increment(1);
}
