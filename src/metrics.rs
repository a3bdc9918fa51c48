//! Prometheus metrics for the learning platform.
//!
//! Counters follow the naming convention `lms_{area}_{name}_total`.

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

macro_rules! lms_metric {
    (counter, $area:literal, $name:literal) => {
        concat!("lms_", $area, "_", $name, "_total")
    };
}

/// Install the Prometheus exporter on `addr`. Idempotent.
pub fn init_metrics(addr: &str) {
    INIT.call_once(|| {
        let addr: SocketAddr = match addr.parse() {
            Ok(addr) => addr,
            Err(_) => {
                warn!("Invalid metrics addr '{}', using default 127.0.0.1:9898", addr);
                SocketAddr::from(([127, 0, 0, 1], 9898))
            }
        };

        let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
        match builder.install() {
            Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
            Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
        }
    });
}

pub struct LmsMetrics;

impl LmsMetrics {
    pub fn enrollment_created(source: &'static str) {
        ::metrics::counter!(lms_metric!(counter, "enrollment", "created"), "source" => source)
            .increment(1);
    }

    pub fn checkout_started() {
        ::metrics::counter!(lms_metric!(counter, "payment", "checkouts")).increment(1);
    }

    pub fn webhook_received(outcome: &'static str) {
        ::metrics::counter!(lms_metric!(counter, "payment", "webhooks"), "outcome" => outcome)
            .increment(1);
    }

    pub fn quiz_submitted(passed: bool) {
        let result = if passed { "passed" } else { "failed" };
        ::metrics::counter!(lms_metric!(counter, "quiz", "submissions"), "result" => result)
            .increment(1);
    }

    pub fn certificate_issued() {
        ::metrics::counter!(lms_metric!(counter, "certificate", "issued")).increment(1);
    }
}
