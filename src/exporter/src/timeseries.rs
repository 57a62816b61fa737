//! Export records in the monitoring backend's data model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Resource type all exported Prometheus series are attached to.
pub const PROMETHEUS_TARGET_RESOURCE: &str = "prometheus_target";

/// Kind of measurement a backend metric represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricKind {
    Gauge,
    Cumulative,
}

/// Value type of a backend metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Double,
    Int64,
    Distribution,
}

/// The monitored resource a series belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub labels: BTreeMap<String, String>,
}

/// Metric identity of a series within its resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(rename = "type")]
    pub metric_type: String,
    pub labels: BTreeMap<String, String>,
}

/// Descriptor shared by every point exported for a series.
///
/// Built once per cache refresh and handed out behind an `Arc`, so emitting
/// a point only allocates the point itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDescriptor {
    pub resource: MonitoredResource,
    pub metric: Metric,
    pub metric_kind: MetricKind,
    pub value_type: ValueType,
}

/// Time range of a point in milliseconds since epoch.
///
/// Gauge points only carry an end time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start_time: Option<i64>,
    pub end_time: i64,
}

/// Explicit-bounds distribution built from a classic Prometheus histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub count: i64,
    pub mean: f64,
    pub sum_of_squared_deviation: f64,
    /// Upper bounds of all buckets but the implicit overflow bucket.
    pub bounds: Vec<f64>,
    /// Non-cumulative counts, one more than `bounds`.
    pub bucket_counts: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypedValue {
    Double(f64),
    Int64(i64),
    Distribution(Distribution),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub interval: TimeInterval,
    pub value: TypedValue,
}

/// A single exported point together with its series descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    #[serde(flatten)]
    pub descriptor: std::sync::Arc<SeriesDescriptor>,
    pub points: Vec<Point>,
}

impl TimeSeries {
    pub fn metric_type(&self) -> &str {
        &self.descriptor.metric.metric_type
    }
}
