use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber; `RUST_LOG` wins over `default_filter` when set.
/// Safe to call more than once, later calls are ignored.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Counters for signed calls, signature checks and AEAD failures.
#[derive(Clone)]
pub struct ClientMetrics {
    pub registry: Registry,
    pub requests_total: IntCounterVec,
    pub verifications_total: IntCounterVec,
    pub decrypt_failures_total: IntCounter,
}

impl ClientMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let requests_total = IntCounterVec::new(
            Opts::new(
                "wechatpay_requests_total",
                "Signed gateway calls by outcome",
            ),
            &["outcome"],
        )?;
        let verifications_total = IntCounterVec::new(
            Opts::new(
                "wechatpay_verifications_total",
                "Gateway signature verifications by outcome",
            ),
            &["outcome"],
        )?;
        let decrypt_failures_total = IntCounter::new(
            "wechatpay_decrypt_failures_total",
            "AEAD payloads that failed to decrypt",
        )?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(verifications_total.clone()))?;
        registry.register(Box::new(decrypt_failures_total.clone()))?;
        Ok(ClientMetrics {
            registry,
            requests_total,
            verifications_total,
            decrypt_failures_total,
        })
    }

    pub fn record_request(&self, outcome: &str) {
        self.requests_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_verification(&self, outcome: &str) {
        self.verifications_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_decrypt_failure(&self) {
        self.decrypt_failures_total.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_registered_and_labelled() {
        let metrics = ClientMetrics::new().expect("metrics");
        metrics.record_request("success");
        metrics.record_request("success");
        metrics.record_verification("mismatch");
        metrics.record_decrypt_failure();

        assert_eq!(metrics.requests_total.with_label_values(&["success"]).get(), 2);
        assert_eq!(
            metrics.verifications_total.with_label_values(&["mismatch"]).get(),
            1
        );
        assert_eq!(metrics.decrypt_failures_total.get(), 1);
        let families = metrics.registry.gather();
        assert!(families
            .iter()
            .any(|family| family.get_name() == "wechatpay_requests_total"));
    }

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing("debug");
        init_tracing("info");
    }
}
