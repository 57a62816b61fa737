//! Stable series hashing.
//!
//! FNV-1a over the descriptor's identity. Label maps are iterated in sorted
//! order so the hash does not depend on insertion order.

use crate::timeseries::SeriesDescriptor;

const OFFSET64: u64 = 14695981039346656037;
const PRIME64: u64 = 1099511628211;
const SEP: u8 = 0xff;

#[derive(Debug, Clone, Copy)]
struct Fnv64(u64);

impl Fnv64 {
    fn new() -> Self {
        Self(OFFSET64)
    }

    fn add_byte(mut self, b: u8) -> Self {
        self.0 ^= b as u64;
        self.0 = self.0.wrapping_mul(PRIME64);
        self
    }

    fn add(self, s: &str) -> Self {
        s.bytes().fold(self, Fnv64::add_byte)
    }
}

/// Hash identifying the exported stream of a series.
pub fn hash_series(desc: &SeriesDescriptor) -> u64 {
    let mut h = Fnv64::new()
        .add(&desc.resource.resource_type)
        .add_byte(SEP)
        .add(&desc.metric.metric_type);

    for (name, value) in &desc.resource.labels {
        h = h.add_byte(SEP).add(name).add_byte(SEP).add(value);
    }
    h = h.add_byte(SEP);
    for (name, value) in &desc.metric.labels {
        h = h.add_byte(SEP).add(name).add_byte(SEP).add(value);
    }
    h.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::{Metric, MetricKind, MonitoredResource, ValueType};
    use std::collections::BTreeMap;

    fn desc(metric_type: &str, labels: &[(&str, &str)], kind: MetricKind) -> SeriesDescriptor {
        SeriesDescriptor {
            resource: MonitoredResource {
                resource_type: "prometheus_target".to_string(),
                labels: BTreeMap::from([("job".to_string(), "a".to_string())]),
            },
            metric: Metric {
                metric_type: metric_type.to_string(),
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
            metric_kind: kind,
            value_type: ValueType::Double,
        }
    }

    #[test]
    fn test_fnv_known_value() {
        // FNV-1a 64 of "a".
        assert_eq!(Fnv64::new().add("a").0, 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn test_order_independent() {
        let a = desc("m", &[("x", "1"), ("y", "2")], MetricKind::Gauge);
        let b = desc("m", &[("y", "2"), ("x", "1")], MetricKind::Gauge);
        assert_eq!(hash_series(&a), hash_series(&b));
    }

    #[test]
    fn test_identity_changes_hash() {
        let a = desc("m", &[("x", "1")], MetricKind::Gauge);
        let b = desc("m", &[("x", "2")], MetricKind::Gauge);
        let c = desc("n", &[("x", "1")], MetricKind::Gauge);
        assert_ne!(hash_series(&a), hash_series(&b));
        assert_ne!(hash_series(&a), hash_series(&c));
    }

    #[test]
    fn test_kind_not_part_of_identity() {
        let a = desc("m", &[], MetricKind::Gauge);
        let b = desc("m", &[], MetricKind::Cumulative);
        assert_eq!(hash_series(&a), hash_series(&b));
    }
}
