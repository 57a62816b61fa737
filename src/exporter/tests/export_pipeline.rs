use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use common::config::ExportConfig;
use exporter::timeseries::{MetricKind, TypedValue, ValueType};
use exporter::{
    Exporter, Labels, LabelResolver, MetricMetadata, MetricType, RefSample, SeriesRef,
    TimeSeries,
};

/// Stand-in for the scrape pipeline's series storage.
#[derive(Clone, Default)]
struct SeriesStore {
    series: Arc<RwLock<HashMap<SeriesRef, Labels>>>,
}

impl SeriesStore {
    fn add(&self, series_ref: SeriesRef, pairs: &[(&str, &str)]) {
        let mut labels = Labels::from_pairs([("job", "node"), ("instance", "host-1:9100")]);
        for (name, value) in pairs {
            labels.set(*name, *value);
        }
        self.series.write().insert(series_ref, labels);
    }

    fn remove(&self, series_ref: SeriesRef) {
        self.series.write().remove(&series_ref);
    }

    fn resolver(&self) -> Arc<dyn LabelResolver> {
        let series = self.series.clone();
        Arc::new(move |r: SeriesRef| series.read().get(&r).cloned())
    }
}

fn target_metadata() -> HashMap<String, MetricMetadata> {
    [
        MetricMetadata::new("node_load1", MetricType::Gauge, "1m load average."),
        MetricMetadata::new("node_cpu_seconds_total", MetricType::Counter, "CPU time."),
        MetricMetadata::new("http_latency_seconds", MetricType::Histogram, "Latency."),
        MetricMetadata::new("job:up:sum", MetricType::Gauge, "Targets up per job."),
    ]
    .into_iter()
    .map(|m| (m.metric.clone(), m))
    .collect()
}

fn setup() -> (SeriesStore, Exporter) {
    let store = SeriesStore::default();
    store.add(1, &[("__name__", "node_load1")]);
    store.add(2, &[("__name__", "node_cpu_seconds_total"), ("mode", "idle")]);
    store.add(3, &[("__name__", "http_latency_seconds_bucket"), ("le", "0.5")]);
    store.add(4, &[("__name__", "http_latency_seconds_bucket"), ("le", "+Inf")]);
    store.add(5, &[("__name__", "http_latency_seconds_sum")]);
    store.add(6, &[("__name__", "http_latency_seconds_count")]);
    // Recording rule output without target identity.
    store
        .series
        .write()
        .insert(7, Labels::from_pairs([("__name__", "job:up:sum")]));

    let config = ExportConfig {
        external_labels: BTreeMap::from([
            ("location".to_string(), "us-central1".to_string()),
            ("cluster".to_string(), "prod".to_string()),
        ]),
        ..ExportConfig::default()
    };
    let exporter = Exporter::new(&config, store.resolver());
    (store, exporter)
}

fn scrape(t: i64, load: f64, cpu: f64, buckets: [f64; 2], sum: f64) -> Vec<RefSample> {
    vec![
        RefSample::new(1, t, load),
        RefSample::new(2, t, cpu),
        RefSample::new(3, t, buckets[0]),
        RefSample::new(4, t, buckets[1]),
        RefSample::new(5, t, sum),
        RefSample::new(6, t, buckets[1]),
        RefSample::new(7, t, 1.0),
    ]
}

fn all_series(exporter: &Exporter, samples: &[RefSample]) -> Vec<TimeSeries> {
    exporter
        .export(&target_metadata(), samples)
        .into_iter()
        .flat_map(|b| b.into_series())
        .collect()
}

fn by_type<'a>(series: &'a [TimeSeries], metric_type: &str) -> &'a TimeSeries {
    series
        .iter()
        .find(|s| s.metric_type() == metric_type)
        .unwrap_or_else(|| panic!("no series of type {metric_type}"))
}

#[test]
fn first_scrape_exports_only_gauges() {
    let (_store, exporter) = setup();

    let out = all_series(&exporter, &scrape(1_000, 0.5, 100.0, [2.0, 4.0], 1.5));

    assert_eq!(out.len(), 1);
    let load = by_type(&out, "prometheus.googleapis.com/node_load1");
    assert_eq!(load.descriptor.metric_kind, MetricKind::Gauge);
    assert_eq!(load.descriptor.resource.labels["location"], "us-central1");
    assert_eq!(load.descriptor.resource.labels["cluster"], "prod");
    assert_eq!(load.descriptor.resource.labels["instance"], "host-1:9100");
    assert!(load.descriptor.metric.labels.is_empty());
}

#[test]
fn second_scrape_exports_cumulatives() {
    let (_store, exporter) = setup();
    all_series(&exporter, &scrape(1_000, 0.5, 100.0, [2.0, 4.0], 1.5));

    let out = all_series(&exporter, &scrape(16_000, 0.7, 112.5, [5.0, 9.0], 4.0));
    assert_eq!(out.len(), 3);

    let cpu = by_type(&out, "prometheus.googleapis.com/node_cpu_seconds_total");
    assert_eq!(cpu.descriptor.metric_kind, MetricKind::Cumulative);
    assert_eq!(cpu.descriptor.metric.labels["mode"], "idle");
    assert_eq!(cpu.points[0].interval.start_time, Some(1_000));
    assert_eq!(cpu.points[0].value, TypedValue::Double(12.5));

    let latency = by_type(&out, "prometheus.googleapis.com/http_latency_seconds");
    assert_eq!(latency.descriptor.value_type, ValueType::Distribution);
    assert!(!latency.descriptor.metric.labels.contains_key("le"));
    let TypedValue::Distribution(d) = &latency.points[0].value else {
        panic!("expected distribution, got {:?}", latency.points[0].value);
    };
    assert_eq!(d.count, 5);
    assert_eq!(d.mean, 0.5);
    assert_eq!(d.bounds, vec![0.5]);
    assert_eq!(d.bucket_counts, vec![3, 2]);
}

#[test]
fn counter_reset_restarts_window() {
    let (_store, exporter) = setup();
    all_series(&exporter, &scrape(1_000, 0.5, 100.0, [2.0, 4.0], 1.5));
    all_series(&exporter, &scrape(16_000, 0.5, 150.0, [2.0, 4.0], 1.5));

    // The host restarted and its counters started over.
    let out = all_series(&exporter, &scrape(31_000, 0.5, 3.0, [0.0, 1.0], 0.2));

    let cpu = by_type(&out, "prometheus.googleapis.com/node_cpu_seconds_total");
    assert_eq!(cpu.points[0].interval.start_time, Some(30_999));
    assert_eq!(cpu.points[0].value, TypedValue::Double(3.0));

    let latency = by_type(&out, "prometheus.googleapis.com/http_latency_seconds");
    assert_eq!(latency.points[0].interval.start_time, Some(30_999));
}

#[test]
fn replayed_scrape_is_dropped() {
    let (_store, exporter) = setup();
    let first = scrape(1_000, 0.5, 100.0, [2.0, 4.0], 1.5);
    let second = scrape(16_000, 0.6, 110.0, [3.0, 5.0], 2.0);
    all_series(&exporter, &first);
    assert_eq!(all_series(&exporter, &second).len(), 3);

    assert!(all_series(&exporter, &second).is_empty());
    assert!(all_series(&exporter, &first).is_empty());
}

#[test]
fn garbage_collection_follows_series_churn() {
    let (store, exporter) = setup();
    all_series(&exporter, &scrape(1_000, 0.5, 100.0, [2.0, 4.0], 1.5));
    all_series(&exporter, &scrape(16_000, 0.5, 110.0, [3.0, 5.0], 2.0));
    let cache = exporter.cache();
    assert_eq!(cache.len(), 7);

    store.remove(1);
    let stats = cache.garbage_collect();
    assert_eq!(stats.entries_dropped, 1);
    assert_eq!(stats.intervals_dropped, 1);

    // The histogram stream stays alive while any component is present.
    for r in [3, 4, 5] {
        store.remove(r);
    }
    let stats = cache.garbage_collect();
    assert_eq!(stats.entries_dropped, 3);
    assert_eq!(stats.intervals_dropped, 0);
    assert_eq!(cache.len(), 3);
}
