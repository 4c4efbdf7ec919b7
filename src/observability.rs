use std::net::SocketAddr;

use crate::model::Census;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: admission requests. Labels: outcome (admitted, queued, rejected).
pub const ADMISSION_REQUESTS_TOTAL: &str = "bedq_admission_requests_total";

/// Counter: waiting patients seated by the engine. Labels: trigger.
pub const AUTO_ALLOCATIONS_TOTAL: &str = "bedq_auto_allocations_total";

/// Counter: patients discharged or withdrawn from the queue.
pub const DISCHARGES_TOTAL: &str = "bedq_discharges_total";

/// Counter: store-of-record conflicts found at load. Labels: kind.
pub const RECONCILE_ISSUES_TOTAL: &str = "bedq_reconcile_issues_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: beds by status.
pub const BEDS_FREE: &str = "bedq_beds_free";
pub const BEDS_OCCUPIED: &str = "bedq_beds_occupied";
pub const BEDS_MAINTENANCE: &str = "bedq_beds_maintenance";

/// Gauge: patients in the wait queue.
pub const WAIT_QUEUE_DEPTH: &str = "bedq_wait_queue_depth";

/// Gauge: patients holding a bed.
pub const PATIENTS_ADMITTED: &str = "bedq_patients_admitted";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "bedq_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (commits per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "bedq_journal_flush_batch_size";

/// Counter: journal compactions.
pub const JOURNAL_COMPACTIONS_TOTAL: &str = "bedq_journal_compactions_total";

pub fn record_census(census: &Census) {
    metrics::gauge!(BEDS_FREE).set(census.free as f64);
    metrics::gauge!(BEDS_OCCUPIED).set(census.occupied as f64);
    metrics::gauge!(BEDS_MAINTENANCE).set(census.maintenance as f64);
    metrics::gauge!(WAIT_QUEUE_DEPTH).set(census.waiting as f64);
    metrics::gauge!(PATIENTS_ADMITTED).set(census.admitted as f64);
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
/// A second install in the same process is logged and ignored.
pub fn init_metrics(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::warn!("metrics exporter not installed: {e}"),
    }
}

/// Install the fmt subscriber, honouring `RUST_LOG`. Safe to call twice.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn census_without_recorder_is_noop() {
        record_census(&Census {
            free: 1,
            occupied: 2,
            maintenance: 0,
            waiting: 3,
            admitted: 2,
        });
    }

    #[test]
    fn init_without_port_is_noop() {
        init_metrics(None);
        init_tracing();
        init_tracing();
    }
}
