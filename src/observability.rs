//! Tracing setup and the structured events emitted at points the daemon's
//! operators actually care about (bonding outcomes, queue backpressure,
//! coordinator resets) rather than scattering ad hoc `info!` calls.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use crate::config::GatewayConfig;

/// Installs the global `tracing` subscriber for the process. Call once,
/// from `main`, before anything else logs.
///
/// # Panics
/// Panics if a global subscriber has already been installed.
pub fn init_tracing(config: &GatewayConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_log_filter));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_span_events(FmtSpan::CLOSE);

    if config.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Emits the structured event for a coordinator reset observed by the
/// engine's startup sequence.
pub fn coordinator_reset_observed(mid: Option<[u8; 4]>, dpa_version: Option<(u8, u8)>) {
    tracing::info!(
        target: "gatewayd_core::engine",
        mid = ?mid.map(|b| format!("{:02X}{:02X}{:02X}{:02X}", b[3], b[2], b[1], b[0])),
        dpa_version = ?dpa_version.map(|(maj, min)| format!("{maj}.{min:02}")),
        "coordinator reset observed"
    );
}

/// Emits the structured event for a queue that rejected an item because
/// it was paused or full.
pub fn queue_backpressure(queue: &str, capacity: usize, reason: &str) {
    tracing::warn!(target: "gatewayd_core::splitter", queue, capacity, reason, "queue rejected item");
}

/// Emits the structured event for a completed IQMESH service call.
pub fn service_completed(service: &str, status: i32, transaction_count: usize) {
    if status == 0 {
        tracing::info!(target: "gatewayd_core::services", service, status, transaction_count, "service completed");
    } else {
        tracing::warn!(target: "gatewayd_core::services", service, status, transaction_count, "service failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitting_events_does_not_panic_without_a_subscriber() {
        coordinator_reset_observed(Some([0x01, 0x02, 0x03, 0x04]), Some((4, 16)));
        queue_backpressure("network", 32, "full");
        service_completed("iqmeshNetwork_BondNodeLocal", 0, 4);
    }
}
