use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: completed scheduling operations. Labels: op.
pub const OPS_TOTAL: &str = "labsched_operations_total";

/// Histogram: book_slot latency in seconds.
pub const BOOK_DURATION_SECONDS: &str = "labsched_book_duration_seconds";

/// Counter: booking notifications that failed delivery (swallowed).
pub const NOTIFY_FAILURES_TOTAL: &str = "labsched_notify_failures_total";

// ── Sweep metrics ───────────────────────────────────────────────

/// Counter: completion sweeps run.
pub const SWEEP_RUNS_TOTAL: &str = "labsched_sweep_runs_total";

/// Counter: slots transitioned to completed by the sweep.
pub const SWEEP_SLOTS_COMPLETED_TOTAL: &str = "labsched_sweep_slots_completed_total";

/// Counter: bookings transitioned to completed by the sweep.
pub const SWEEP_BOOKINGS_COMPLETED_TOTAL: &str = "labsched_sweep_bookings_completed_total";

/// Count a successful façade operation.
pub fn record_op(op: &'static str) {
    metrics::counter!(OPS_TOTAL, "op" => op).increment(1);
}

/// Install the default log subscriber. Call once from the embedding
/// process before constructing the service.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}

/// Install the Prometheus metrics exporter on the given port. No-op if
/// port is None.
pub fn init_metrics(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
