//! Pod metrics consumed by the bridge
//!
//! Records are produced elsewhere (the metrics collector) and are only
//! read here. `synthetic_fleet` builds a deterministic fleet for the
//! scale test and benchmarks.

use serde::{Deserialize, Serialize};

/// Field names in marshaling order; also the dict keys on the Python side
pub const FIELD_NAMES: [&str; 4] = ["pod_name", "adapter_count", "kv_cache_util", "queue_count"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub pod_name: String,
    pub adapter_count: i64,
    /// Fraction in [0, 1] by convention; not enforced
    pub kv_cache_util: f64,
    pub queue_count: i64,
}

/// One field value, borrowed from a record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'r> {
    Text(&'r str),
    Int(i64),
    Float(f64),
}

impl MetricsRecord {
    pub fn new(
        pod_name: impl Into<String>,
        adapter_count: i64,
        kv_cache_util: f64,
        queue_count: i64,
    ) -> Self {
        Self {
            pod_name: pod_name.into(),
            adapter_count,
            kv_cache_util,
            queue_count,
        }
    }

    /// Field values in the same order as `FIELD_NAMES`
    pub fn fields(&self) -> [FieldValue<'_>; 4] {
        [
            FieldValue::Text(&self.pod_name),
            FieldValue::Int(self.adapter_count),
            FieldValue::Float(self.kv_cache_util),
            FieldValue::Int(self.queue_count),
        ]
    }
}

/// Deterministic fleet of `pods` records.
///
/// Utilization stays strictly positive so scorers that take a logarithm
/// of it never see zero.
pub fn synthetic_fleet(pods: usize, adapters: usize) -> Vec<MetricsRecord> {
    (0..pods)
        .map(|i| {
            let util = ((i * 37) % 100) as f64 / 100.0 + 0.005;
            MetricsRecord::new(
                format!("Pod{}", i),
                adapters as i64,
                util,
                ((i * 7) % 10) as i64,
            )
        })
        .collect()
}
