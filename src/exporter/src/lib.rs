//! Conversion of scraped Prometheus samples into monitoring backend time
//! series.
//!
//! The [`SeriesCache`] holds per-series conversion state: the derived series
//! descriptor, the counter reset baseline and the last exported interval of
//! every stream. [`SampleBuilder`] turns samples into points using that
//! state, and [`Exporter`] drives both over whole scrapes and cuts the
//! output into request-sized [`ExportBatch`]es.

pub mod batch;
pub mod builder;
pub mod error;
pub mod exporter;
pub mod hash;
pub mod interval;
pub mod labels;
pub mod metadata;
pub mod naming;
pub mod reset;
pub mod resource;
pub mod series_cache;
pub mod timeseries;

pub use batch::{ExportBatch, PushOutcome};
pub use builder::{RefSample, SampleBuilder};
pub use error::{ExportError, Result};
pub use exporter::Exporter;
pub use labels::{Label, Labels};
pub use metadata::{MetadataSource, MetricMetadata, MetricType};
pub use resource::{ExternalLabelSource, SharedExternalLabels};
pub use series_cache::{
    CacheOptions, CachedSeries, Clock, GcStats, LabelResolver, SeriesCache, SeriesRef,
};
pub use timeseries::TimeSeries;
