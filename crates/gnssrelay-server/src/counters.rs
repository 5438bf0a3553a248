//! Per-identity message counters.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

/// Counts kept by a dispatcher run.
///
/// Every decoded message is counted as input, then as either filtered
/// (rejected) or output (accepted), so `input == filtered + output` holds
/// per identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub input: BTreeMap<String, u64>,
    pub filtered: BTreeMap<String, u64>,
    pub output: BTreeMap<String, u64>,
    pub decode_errors: u64,
    /// Decoded messages, accepted or not.
    pub total: u64,
}

impl Counters {
    pub fn record_input(&mut self, identity: &str) {
        *self.input.entry(identity.to_string()).or_default() += 1;
        self.total += 1;
    }

    pub fn record_filtered(&mut self, identity: &str) {
        *self.filtered.entry(identity.to_string()).or_default() += 1;
    }

    pub fn record_output(&mut self, identity: &str) {
        *self.output.entry(identity.to_string()).or_default() += 1;
    }

    pub fn record_decode_error(&mut self) {
        self.decode_errors += 1;
    }

    pub fn input_total(&self) -> u64 {
        self.input.values().sum()
    }

    pub fn filtered_total(&self) -> u64 {
        self.filtered.values().sum()
    }

    pub fn output_total(&self) -> u64 {
        self.output.values().sum()
    }

    pub fn log_summary(&self) {
        info!(
            total = self.total,
            input = self.input_total(),
            filtered = self.filtered_total(),
            output = self.output_total(),
            decode_errors = self.decode_errors,
            "Stream statistics"
        );
        for (identity, count) in &self.input {
            info!(
                identity = %identity,
                input = count,
                filtered = self.filtered.get(identity).copied().unwrap_or(0),
                output = self.output.get(identity).copied().unwrap_or(0),
                "Message counts"
            );
        }
    }
}
