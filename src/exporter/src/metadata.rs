//! Metric metadata as exposed by scrape targets.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::naming::{MetricSuffix, split_metric_suffix};

/// Prometheus metric types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    #[default]
    Unknown,
    Counter,
    Gauge,
    Summary,
    Histogram,
    GaugeHistogram,
    Info,
    StateSet,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
            MetricType::GaugeHistogram => "gaugehistogram",
            MetricType::Info => "info",
            MetricType::StateSet => "stateset",
            MetricType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type and help text of a metric family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricMetadata {
    pub metric: String,
    pub metric_type: MetricType,
    pub help: String,
}

impl MetricMetadata {
    pub fn new(metric: impl Into<String>, metric_type: MetricType, help: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            metric_type,
            help: help.into(),
        }
    }
}

/// Source of metric metadata for a single scrape target.
pub trait MetadataSource {
    /// Metadata for the metric family with the given name, if known.
    fn metadata(&self, metric: &str) -> Option<MetricMetadata>;
}

impl MetadataSource for HashMap<String, MetricMetadata> {
    fn metadata(&self, metric: &str) -> Option<MetricMetadata> {
        self.get(metric).cloned()
    }
}

impl<T: MetadataSource + ?Sized> MetadataSource for &T {
    fn metadata(&self, metric: &str) -> Option<MetricMetadata> {
        (**self).metadata(metric)
    }
}

/// Metrics the scraper records about each scrape, for which targets expose
/// no metadata.
const INTERNAL_METRICS: [(&str, &str); 5] = [
    (
        "up",
        "Up indicates whether the last target scrape was successful.",
    ),
    (
        "scrape_samples_scraped",
        "How many samples were scraped during the last successful scrape.",
    ),
    ("scrape_duration_seconds", "Duration of the last scrape."),
    (
        "scrape_samples_post_metric_relabeling",
        "How many samples were ingested after relabeling.",
    ),
    (
        "scrape_series_added",
        "Number of new series added in the last scrape.",
    ),
];

fn internal_metadata(metric: &str) -> Option<MetricMetadata> {
    INTERNAL_METRICS
        .iter()
        .find(|(name, _)| *name == metric)
        .map(|(name, help)| MetricMetadata::new(*name, MetricType::Gauge, *help))
}

fn lookup(target: &dyn MetadataSource, metric: &str) -> Option<MetricMetadata> {
    target
        .metadata(metric)
        .or_else(|| internal_metadata(metric))
}

/// Result of resolving a series name against target metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMetadata {
    pub metadata: MetricMetadata,
    /// Name with the well-known suffix stripped, when the lookup needed it.
    pub base_name: Option<String>,
    pub suffix: MetricSuffix,
}

/// Resolve metadata for a series name.
///
/// Looks up the full name first. Summary, histogram and counter component
/// series are exposed under their family name, so a miss is retried with
/// the well-known suffix stripped.
pub fn resolve_metadata(target: &dyn MetadataSource, metric_name: &str) -> Option<ResolvedMetadata> {
    if let Some(metadata) = lookup(target, metric_name) {
        return Some(ResolvedMetadata {
            metadata,
            base_name: None,
            suffix: MetricSuffix::None,
        });
    }
    let (base, suffix) = split_metric_suffix(metric_name)?;
    lookup(target, base).map(|metadata| ResolvedMetadata {
        metadata,
        base_name: Some(base.to_string()),
        suffix,
    })
}
