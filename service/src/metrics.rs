//! # Prometheus Metrics
//!
//! Operational metrics for the custody daemon, scraped at the `/metrics`
//! endpoint on the dedicated metrics port.
//!
//! All metrics live in their own [`prometheus::Registry`] so they do not
//! collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Shared handle passed to request handlers.
pub type SharedMetrics = Arc<ServiceMetrics>;

/// Holds all Prometheus metric handles for the service.
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Registry that owns all metrics below.
    registry: Registry,
    /// Successful address verifications.
    pub verifications_total: IntCounter,
    /// Committed transfers.
    pub transfers_total: IntCounter,
    /// Withdrawal requests accepted (pending entries created).
    pub withdrawal_requests_total: IntCounter,
    /// Payouts broadcast and settled.
    pub payouts_total: IntCounter,
    /// Payouts that failed cleanly (hold rolled back).
    pub payout_failures_total: IntCounter,
    /// Payouts escalated to manual reconciliation — every increment here
    /// should page someone.
    pub reconciliations_required_total: IntCounter,
    /// Requests rejected by validation (zero amounts, insufficient
    /// funds, bad signatures, and friends).
    pub rejections_total: IntCounter,
    /// Withdrawals currently awaiting confirmation.
    pub pending_withdrawals: IntGauge,
    /// End-to-end latency of ledger operations in seconds.
    pub operation_latency_seconds: Histogram,
}

impl ServiceMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("satchel".into()), None)
            .expect("failed to create prometheus registry");

        fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
            let c = IntCounter::new(name, help).expect("metric creation");
            registry
                .register(Box::new(c.clone()))
                .expect("metric registration");
            c
        }

        let verifications_total = counter(
            &registry,
            "verifications_total",
            "Successful address verifications",
        );
        let transfers_total = counter(&registry, "transfers_total", "Committed transfers");
        let withdrawal_requests_total = counter(
            &registry,
            "withdrawal_requests_total",
            "Withdrawal requests accepted",
        );
        let payouts_total = counter(&registry, "payouts_total", "Payouts broadcast and settled");
        let payout_failures_total = counter(
            &registry,
            "payout_failures_total",
            "Payouts that failed cleanly with the hold rolled back",
        );
        let reconciliations_required_total = counter(
            &registry,
            "reconciliations_required_total",
            "Payouts with unknown outcome escalated to manual reconciliation",
        );
        let rejections_total = counter(
            &registry,
            "rejections_total",
            "Requests rejected by validation",
        );

        let pending_withdrawals = IntGauge::new(
            "pending_withdrawals",
            "Withdrawals currently awaiting confirmation",
        )
        .expect("metric creation");
        registry
            .register(Box::new(pending_withdrawals.clone()))
            .expect("metric registration");

        let operation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "operation_latency_seconds",
                "End-to-end latency of ledger operations",
            )
            .buckets(vec![0.001, 0.005, 0.025, 0.1, 0.5, 2.5, 10.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            verifications_total,
            transfers_total,
            withdrawal_requests_total,
            payouts_total,
            payout_failures_total,
            reconciliations_required_total,
            rejections_total,
            pending_withdrawals,
            operation_latency_seconds,
        }
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Axum handler for `GET /metrics`.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {e}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_render() {
        let metrics = ServiceMetrics::new();
        metrics.transfers_total.inc();
        metrics.pending_withdrawals.set(3);

        let body = metrics.render().expect("render");
        assert!(body.contains("satchel_transfers_total 1"));
        assert!(body.contains("satchel_pending_withdrawals 3"));
    }
}
