//! Prometheus metric name conventions and backend metric type naming.

use std::fmt;

/// Well-known suffix of a Prometheus series name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MetricSuffix {
    #[default]
    None,
    Total,
    Bucket,
    Sum,
    Count,
}

impl MetricSuffix {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricSuffix::None => "",
            MetricSuffix::Total => "_total",
            MetricSuffix::Bucket => "_bucket",
            MetricSuffix::Sum => "_sum",
            MetricSuffix::Count => "_count",
        }
    }
}

impl fmt::Display for MetricSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const SPLIT_SUFFIXES: [MetricSuffix; 4] = [
    MetricSuffix::Total,
    MetricSuffix::Bucket,
    MetricSuffix::Sum,
    MetricSuffix::Count,
];

/// Split a series name into its base name and well-known suffix.
///
/// Returns `None` if the name carries none of the suffixes or if stripping
/// it would leave an empty base name.
pub fn split_metric_suffix(name: &str) -> Option<(&str, MetricSuffix)> {
    SPLIT_SUFFIXES.iter().find_map(|suffix| {
        name.strip_suffix(suffix.as_str())
            .filter(|base| !base.is_empty())
            .map(|base| (base, *suffix))
    })
}

/// Backend metric type for a Prometheus metric name.
pub fn metric_type_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
