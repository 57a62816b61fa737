//! Per-scrape export driver.
//!
//! [`Exporter`] runs the sample builder over a scrape, logs and skips samples
//! that fail, and cuts the resulting series into [`ExportBatch`]es. It also
//! owns the background task that garbage collects the series cache.

use std::sync::Arc;
use std::time::Duration;

use common::config::ExportConfig;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::batch::{ExportBatch, PushOutcome};
use crate::builder::{RefSample, SampleBuilder};
use crate::error::ExportError;
use crate::labels::Labels;
use crate::metadata::MetadataSource;
use crate::resource::SharedExternalLabels;
use crate::series_cache::{CacheOptions, LabelResolver, SeriesCache};

impl From<&ExportConfig> for CacheOptions {
    fn from(config: &ExportConfig) -> Self {
        Self {
            metric_prefix: config.metric_prefix.clone(),
            max_label_count: config.max_label_count,
            refresh_interval: config.refresh_interval,
            refresh_jitter: config.refresh_jitter,
        }
    }
}

/// Turns scraped samples into outbound batches.
///
/// Per-series failures are logged and skipped, one bad series never fails
/// a whole scrape.
#[derive(Debug)]
pub struct Exporter {
    cache: Arc<SeriesCache>,
    builder: SampleBuilder,
    external_labels: SharedExternalLabels,
    max_batch_size: usize,
    gc_interval: Duration,
}

impl Exporter {
    pub fn new(config: &ExportConfig, resolver: Arc<dyn LabelResolver>) -> Self {
        let external_labels =
            SharedExternalLabels::new(Labels::from(config.external_labels.clone()));
        let cache = SeriesCache::new(
            CacheOptions::from(config),
            resolver,
            Arc::new(external_labels.clone()),
        );
        Self::with_cache(config, Arc::new(cache), external_labels)
    }

    /// Build an exporter around an existing cache. `external_labels` must be
    /// the source the cache reads from.
    pub fn with_cache(
        config: &ExportConfig,
        cache: Arc<SeriesCache>,
        external_labels: SharedExternalLabels,
    ) -> Self {
        Self {
            builder: SampleBuilder::new(cache.clone()),
            cache,
            external_labels,
            max_batch_size: config.max_batch_size,
            gc_interval: config.gc_interval,
        }
    }

    pub fn cache(&self) -> &Arc<SeriesCache> {
        &self.cache
    }

    /// Replace the external labels and force all series to pick them up.
    pub fn set_external_labels(&self, labels: Labels) {
        self.external_labels.set(labels);
        self.cache.invalidate_all();
    }

    /// Convert the samples of one scrape of `target` into batches.
    pub fn export(&self, target: &dyn MetadataSource, samples: &[RefSample]) -> Vec<ExportBatch> {
        let mut batches = Vec::new();
        let mut current = ExportBatch::new(self.max_batch_size);
        let mut rest = samples;

        while let Some(head) = rest.first() {
            let series_ref = head.series_ref;
            let (tail, result) = self.builder.next(target, rest);
            rest = tail;

            match result {
                Ok(Some(series)) => {
                    if let PushOutcome::Full(series) | PushOutcome::Duplicate(series) =
                        current.push(series)
                    {
                        let full = std::mem::replace(&mut current, ExportBatch::new(self.max_batch_size));
                        batches.push(full);
                        // A fresh batch accepts any series.
                        let outcome = current.push(series);
                        debug_assert!(matches!(outcome, PushOutcome::Added));
                    }
                }
                Ok(None) => {}
                Err(e @ ExportError::InvalidSeriesRef(_)) => {
                    warn!(series_ref, error = %e, "dropping sample of unknown series");
                }
                Err(e) => {
                    warn!(series_ref, error = %e, "dropping samples");
                }
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }

        debug!(
            samples = samples.len(),
            batches = batches.len(),
            "export done"
        );
        batches
    }

    /// Run cache garbage collection in the background until `shutdown`
    /// fires or its sender is dropped.
    pub fn spawn_maintenance(&self, shutdown: oneshot::Receiver<()>) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let interval = self.gc_interval;
        tokio::spawn(async move { cache.run(interval, shutdown).await })
    }
}
