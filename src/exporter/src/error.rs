use crate::metadata::MetricType;
use crate::naming::MetricSuffix;
use crate::series_cache::SeriesRef;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The series is no longer known to the scrape pipeline. Expected when
    /// a series rolls off between scrape and export.
    #[error("series reference invalid: {0}")]
    InvalidSeriesRef(SeriesRef),
    #[error("unexpected metric type {metric_type} for metric {metric}")]
    UnsupportedMetricType {
        metric: String,
        metric_type: MetricType,
    },
    #[error("unexpected metric name suffix \"{suffix}\" for metric {metric}")]
    UnexpectedSuffix { metric: String, suffix: MetricSuffix },
    #[error("malformed histogram {metric}: {reason}")]
    MalformedHistogram { metric: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ExportError>;
