use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram},
};
use opentelemetry_semantic_conventions::attribute::ERROR_TYPE;

/// Instruments recorded by the scheduler. Without an exporter installed these are no-ops.
#[derive(Debug, Clone)]
pub struct OracleMetrics {
    claims_submitted: Counter<u64>,
    txs_invalid: Counter<u64>,
    round_duration: Histogram<f64>,
}

impl OracleMetrics {
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("bridge_oracle");
        OracleMetrics {
            claims_submitted: meter
                .u64_counter("oracle.claims.submitted")
                .with_description("Claims accepted by the bridge")
                .build(),
            txs_invalid: meter
                .u64_counter("oracle.txs.invalid")
                .with_description("Records rejected by validation")
                .build(),
            round_duration: meter
                .f64_histogram("oracle.round.duration")
                .with_unit("s")
                .with_boundaries(vec![
                    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
                ])
                .build(),
        }
    }

    pub fn claims_submitted(&self, chain_id: &str, count: usize) {
        self.claims_submitted
            .add(count as u64, &[KeyValue::new("chain", chain_id.to_owned())]);
    }

    pub fn tx_invalid(&self, chain_id: &str) {
        self.txs_invalid
            .add(1, &[KeyValue::new("chain", chain_id.to_owned())]);
    }

    /// `error` names the failure class of a round that did not complete.
    pub fn round_finished(&self, chain_id: &str, seconds: f64, error: Option<&'static str>) {
        let mut attributes = vec![KeyValue::new("chain", chain_id.to_owned())];
        if let Some(error) = error {
            attributes.push(KeyValue::new(ERROR_TYPE, error));
        }
        self.round_duration.record(seconds, &attributes);
    }
}

impl Default for OracleMetrics {
    fn default() -> Self {
        Self::new()
    }
}
