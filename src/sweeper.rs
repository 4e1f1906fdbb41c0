use std::sync::Arc;

use tracing::info;

use crate::service::SchedulingService;

/// Background task that periodically completes lapsed slots and their
/// bookings. The interval comes from the service config (default
/// 30 minutes). The sweep itself is idempotent, so overlapping or
/// redundant runs are harmless.
pub async fn run_sweeper(service: Arc<SchedulingService>) {
    let mut interval = tokio::time::interval(service.config().sweep_interval);
    loop {
        interval.tick().await;
        match service.advance_time().await {
            Ok(report) if report.slots_completed > 0 || report.bookings_completed > 0 => {
                info!(
                    slots = report.slots_completed,
                    bookings = report.bookings_completed,
                    "completion sweep"
                );
            }
            Ok(_) => {}
            Err(e) => {
                // Transient storage trouble; the next tick retries.
                tracing::debug!("sweep skipped: {e}");
            }
        }
    }
}
