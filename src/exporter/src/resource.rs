//! Splitting series labels into monitored resource and metric labels.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::labels::Labels;
use crate::timeseries::{MonitoredResource, PROMETHEUS_TARGET_RESOURCE};

pub const KEY_LOCATION: &str = "location";
pub const KEY_CLUSTER: &str = "cluster";
pub const KEY_NAMESPACE: &str = "namespace";
pub const KEY_JOB: &str = "job";
pub const KEY_INSTANCE: &str = "instance";

const RESOURCE_KEYS: [&str; 5] = [
    KEY_LOCATION,
    KEY_CLUSTER,
    KEY_NAMESPACE,
    KEY_JOB,
    KEY_INSTANCE,
];

/// Provides the external labels of the exporting instance.
///
/// Read on every cache refresh so that reconfiguration takes effect without
/// rebuilding the cache.
pub trait ExternalLabelSource: Send + Sync {
    fn external_labels(&self) -> Labels;
}

impl<F> ExternalLabelSource for F
where
    F: Fn() -> Labels + Send + Sync,
{
    fn external_labels(&self) -> Labels {
        self()
    }
}

/// External labels that can be replaced at runtime.
///
/// Call `SeriesCache::invalidate_all` after `set` for cached series to pick
/// up the change before their next scheduled refresh.
#[derive(Debug, Clone, Default)]
pub struct SharedExternalLabels {
    inner: Arc<RwLock<Labels>>,
}

impl SharedExternalLabels {
    pub fn new(labels: Labels) -> Self {
        Self {
            inner: Arc::new(RwLock::new(labels)),
        }
    }

    pub fn set(&self, labels: Labels) {
        *self.inner.write() = labels;
    }
}

impl ExternalLabelSource for SharedExternalLabels {
    fn external_labels(&self) -> Labels {
        self.inner.read().clone()
    }
}

/// Split `lset` into the monitored resource and the remaining labels.
///
/// Returns `None` if `job` or `instance` is missing, which is the case for
/// series produced by recording and alerting rules.
///
/// External labels are merged in only for names absent from `lset`, matching
/// Prometheus semantics where series labels win on collision.
pub fn extract_resource(lset: &Labels, external: &Labels) -> Option<(MonitoredResource, Labels)> {
    if !lset.has(KEY_JOB) || !lset.has(KEY_INSTANCE) {
        return None;
    }

    let mut merged = lset.clone();
    for l in external {
        if !lset.has(&l.name) {
            merged.set(l.name.clone(), l.value.clone());
        }
    }

    let resource = MonitoredResource {
        resource_type: PROMETHEUS_TARGET_RESOURCE.to_string(),
        labels: RESOURCE_KEYS
            .iter()
            .map(|k| (k.to_string(), merged.get(k).to_string()))
            .collect(),
    };
    Some((resource, merged.without(&RESOURCE_KEYS)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_identity_labels() {
        let none = Labels::new();
        for lset in [
            Labels::from_pairs([("__name__", "x"), ("job", "a")]),
            Labels::from_pairs([("__name__", "x"), ("instance", "1")]),
            Labels::from_pairs([("__name__", "x")]),
        ] {
            assert!(extract_resource(&lset, &none).is_none(), "{lset}");
        }
    }

    #[test]
    fn test_split() {
        let lset = Labels::from_pairs([
            ("__name__", "http_requests_total"),
            ("job", "a"),
            ("instance", "1:9090"),
            ("namespace", "default"),
            ("path", "/"),
        ]);
        let external = Labels::from_pairs([("location", "europe-west1"), ("cluster", "c1")]);

        let (resource, metric_labels) = extract_resource(&lset, &external).unwrap();

        assert_eq!(resource.resource_type, "prometheus_target");
        assert_eq!(resource.labels["location"], "europe-west1");
        assert_eq!(resource.labels["cluster"], "c1");
        assert_eq!(resource.labels["namespace"], "default");
        assert_eq!(resource.labels["job"], "a");
        assert_eq!(resource.labels["instance"], "1:9090");
        assert_eq!(
            metric_labels,
            Labels::from_pairs([("__name__", "http_requests_total"), ("path", "/")])
        );
    }

    #[test]
    fn test_series_labels_win_over_external() {
        let lset = Labels::from_pairs([("job", "a"), ("instance", "1"), ("cluster", "mine")]);
        let external = Labels::from_pairs([("cluster", "theirs"), ("env", "prod")]);

        let (resource, metric_labels) = extract_resource(&lset, &external).unwrap();

        assert_eq!(resource.labels["cluster"], "mine");
        // Non-resource external labels end up on the metric.
        assert_eq!(metric_labels.get("env"), "prod");
    }

    #[test]
    fn test_absent_resource_labels_are_empty() {
        let lset = Labels::from_pairs([("job", "a"), ("instance", "1")]);
        let (resource, _) = extract_resource(&lset, &Labels::new()).unwrap();

        assert_eq!(resource.labels.len(), 5);
        assert_eq!(resource.labels["location"], "");
        assert_eq!(resource.labels["namespace"], "");
    }

    #[test]
    fn test_shared_external_labels() {
        let shared = SharedExternalLabels::new(Labels::from_pairs([("cluster", "a")]));
        let source: &dyn ExternalLabelSource = &shared;
        assert_eq!(source.external_labels().get("cluster"), "a");

        shared.clone().set(Labels::from_pairs([("cluster", "b")]));
        assert_eq!(source.external_labels().get("cluster"), "b");
    }
}
