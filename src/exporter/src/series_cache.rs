//! Series cache: maps scrape-time series references to export state.
//!
//! Each entry holds the series labels, the descriptor template built from
//! them, and the counter reset state used to produce backend cumulatives.
//! Descriptors are rebuilt after a randomized refresh deadline so that
//! external label and metadata changes are picked up without refresh spikes
//! when many series were created at once.
//!
//! Sample intervals are tracked per series hash rather than per reference,
//! since references are volatile while the hash identifies the exported
//! stream.
//!
//! All state sits behind a single mutex. Critical sections are map lookups
//! and small struct updates, no I/O.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::{ExportError, Result};
use crate::hash::hash_series;
use crate::interval::{IntervalTracker, SampleInterval};
use crate::labels::{BUCKET_LABEL, Labels, METRIC_NAME_LABEL};
use crate::metadata::{MetadataSource, MetricMetadata, MetricType, ResolvedMetadata, resolve_metadata};
use crate::naming::{MetricSuffix, metric_type_name};
use crate::reset::{ResetAdjusted, ResetState};
use crate::resource::{ExternalLabelSource, extract_resource};
use crate::timeseries::{Metric, MetricKind, SeriesDescriptor, ValueType};

/// Handle assigned by the scrape pipeline to a unique label set. Only valid
/// for the lifetime of one scrape session.
pub type SeriesRef = u64;

/// Resolves series references to their label sets.
pub trait LabelResolver: Send + Sync {
    /// Labels for `series_ref`, or `None` if the reference is no longer valid.
    fn labels(&self, series_ref: SeriesRef) -> Option<Labels>;
}

impl<F> LabelResolver for F
where
    F: Fn(SeriesRef) -> Option<Labels> + Send + Sync,
{
    fn labels(&self, series_ref: SeriesRef) -> Option<Labels> {
        self(series_ref)
    }
}

/// Millisecond wall clock.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Prefix of backend metric types.
    pub metric_prefix: String,
    /// Series with more metric labels than this are not exported.
    pub max_label_count: usize,
    /// Mean time between descriptor refreshes.
    pub refresh_interval: Duration,
    /// Width of the window the refresh deadline is spread over, centered on
    /// `refresh_interval`.
    pub refresh_jitter: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            metric_prefix: "prometheus.googleapis.com".to_string(),
            max_label_count: 100,
            refresh_interval: Duration::from_secs(600),
            refresh_jitter: Duration::from_secs(600),
        }
    }
}

/// Conversion state for an exportable series.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSeries {
    /// The full label set of the series.
    pub labels: Labels,
    pub metadata: MetricMetadata,
    pub descriptor: Arc<SeriesDescriptor>,
    pub suffix: MetricSuffix,
    pub hash: u64,
}

impl CachedSeries {
    pub fn metric_name(&self) -> &str {
        self.labels.get(METRIC_NAME_LABEL)
    }
}

#[derive(Debug)]
struct SeriesCacheEntry {
    labels: Labels,
    /// `None` if the series cannot be converted.
    series: Option<Arc<CachedSeries>>,
    next_refresh: i64,
    reset: ResetState,
}

impl SeriesCacheEntry {
    fn new(labels: Labels) -> Self {
        Self {
            labels,
            series: None,
            next_refresh: i64::MIN,
            reset: ResetState::new(),
        }
    }

    fn should_refresh(&self, now: i64) -> bool {
        now > self.next_refresh
    }
}

struct CacheState {
    entries: HashMap<SeriesRef, SeriesCacheEntry>,
    intervals: IntervalTracker,
    rng: Box<dyn RngCore + Send>,
}

/// Outcome of a garbage collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub entries_dropped: usize,
    pub intervals_dropped: usize,
}

pub struct SeriesCache {
    options: CacheOptions,
    state: Mutex<CacheState>,
    resolver: Arc<dyn LabelResolver>,
    external_labels: Arc<dyn ExternalLabelSource>,
    clock: Clock,
}

impl std::fmt::Debug for SeriesCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesCache")
            .field("options", &self.options)
            .field("entries", &self.len())
            .finish()
    }
}

impl SeriesCache {
    pub fn new(
        options: CacheOptions,
        resolver: Arc<dyn LabelResolver>,
        external_labels: Arc<dyn ExternalLabelSource>,
    ) -> Self {
        Self {
            options,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                intervals: IntervalTracker::new(),
                rng: Box::new(StdRng::from_entropy()),
            }),
            resolver,
            external_labels,
            clock: Arc::new(system_clock),
        }
    }

    /// Replace the random source used for refresh jitter.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.state.get_mut().rng = Box::new(rng);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Export state for `series_ref`.
    ///
    /// Returns `Ok(None)` if the series cannot be exported and should be
    /// skipped. Fails with [`ExportError::InvalidSeriesRef`] if the reference
    /// is unknown to the resolver.
    pub fn get(
        &self,
        series_ref: SeriesRef,
        target: &dyn MetadataSource,
    ) -> Result<Option<Arc<CachedSeries>>> {
        let now = (self.clock)();
        let mut guard = self.state.lock();
        let CacheState { entries, rng, .. } = &mut *guard;

        let entry = match entries.entry(series_ref) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                let labels = self
                    .resolver
                    .labels(series_ref)
                    .ok_or(ExportError::InvalidSeriesRef(series_ref))?;
                v.insert(SeriesCacheEntry::new(labels))
            }
        };
        if entry.should_refresh(now) {
            entry.series = self.populate(&entry.labels, target)?.map(Arc::new);
            entry.next_refresh = self.next_refresh(now, rng.as_mut());
        }
        Ok(entry.series.clone())
    }

    fn next_refresh(&self, now: i64, rng: &mut dyn RngCore) -> i64 {
        let interval = i64::try_from(self.options.refresh_interval.as_millis()).unwrap_or(i64::MAX);
        let jitter_window = self.options.refresh_jitter.as_millis() as f64;
        let jitter = ((rng.r#gen::<f64>() - 0.5) * jitter_window) as i64;
        now.saturating_add(interval).saturating_add(jitter)
    }

    /// Build the conversion state for a label set.
    fn populate(&self, lset: &Labels, target: &dyn MetadataSource) -> Result<Option<CachedSeries>> {
        let external = self.external_labels.external_labels();
        let Some((resource, mut metric_labels)) = extract_resource(lset, &external) else {
            debug!(series = %lset, "unknown resource");
            return Ok(None);
        };

        // The metric name becomes the backend metric type.
        metric_labels.remove(METRIC_NAME_LABEL);
        if metric_labels.len() > self.options.max_label_count {
            debug!(
                series = %lset,
                label_count = metric_labels.len(),
                "too many labels"
            );
            return Ok(None);
        }

        let metric_name = lset.get(METRIC_NAME_LABEL);
        let Some(ResolvedMetadata {
            metadata,
            base_name,
            suffix,
        }) = resolve_metadata(target, metric_name)
        else {
            debug!(metric_name, "metadata not found");
            return Ok(None);
        };

        let mut type_name = metric_name;
        let (metric_kind, value_type) = match metadata.metric_type {
            MetricType::Counter => (MetricKind::Cumulative, ValueType::Double),
            MetricType::Gauge | MetricType::Unknown => (MetricKind::Gauge, ValueType::Double),
            MetricType::Summary => match suffix {
                MetricSuffix::Sum => (MetricKind::Cumulative, ValueType::Double),
                MetricSuffix::Count => (MetricKind::Cumulative, ValueType::Int64),
                // Quantile series.
                MetricSuffix::None => (MetricKind::Gauge, ValueType::Double),
                MetricSuffix::Total | MetricSuffix::Bucket => {
                    return Err(ExportError::UnexpectedSuffix {
                        metric: metric_name.to_string(),
                        suffix,
                    });
                }
            },
            MetricType::Histogram => {
                // Bucket, sum and count series share one distribution stream.
                metric_labels.remove(BUCKET_LABEL);
                if let Some(base) = base_name.as_deref() {
                    type_name = base;
                }
                (MetricKind::Cumulative, ValueType::Distribution)
            }
            MetricType::GaugeHistogram | MetricType::Info | MetricType::StateSet => {
                return Err(ExportError::UnsupportedMetricType {
                    metric: metric_name.to_string(),
                    metric_type: metadata.metric_type,
                });
            }
        };

        let descriptor = SeriesDescriptor {
            resource,
            metric: Metric {
                metric_type: metric_type_name(&self.options.metric_prefix, type_name),
                labels: metric_labels.to_map(),
            },
            metric_kind,
            value_type,
        };
        let hash = hash_series(&descriptor);

        Ok(Some(CachedSeries {
            labels: lset.clone(),
            metadata,
            descriptor: Arc::new(descriptor),
            suffix,
            hash,
        }))
    }

    /// Reset-adjust a cumulative reading of `series_ref`.
    ///
    /// Returns `None` if the sample must be skipped: either the series is
    /// not cached or this is its first reading.
    pub fn get_reset_adjusted(&self, series_ref: SeriesRef, t: i64, v: f64) -> Option<ResetAdjusted> {
        let mut state = self.state.lock();
        state.entries.get_mut(&series_ref)?.reset.adjust(t, v)
    }

    /// Record `[start, end]` as the latest range written for the stream
    /// with the given hash.
    ///
    /// Returns false if the range overlaps what was already written, in
    /// which case the sample must be discarded.
    pub fn update_sample_interval(&self, hash: u64, start: i64, end: i64) -> bool {
        self.state.lock().intervals.update(hash, start, end)
    }

    pub fn sample_interval(&self, hash: u64) -> Option<SampleInterval> {
        self.state.lock().intervals.get(hash)
    }

    /// Force every entry to be refreshed on its next access.
    pub fn invalidate_all(&self) {
        let mut state = self.state.lock();
        for entry in state.entries.values_mut() {
            entry.next_refresh = i64::MIN;
        }
    }

    /// Refresh deadline of an entry, if cached.
    pub fn next_refresh_of(&self, series_ref: SeriesRef) -> Option<i64> {
        self.state
            .lock()
            .entries
            .get(&series_ref)
            .map(|e| e.next_refresh)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose reference no longer resolves, and intervals no
    /// live entry maps to.
    ///
    /// The resolver is queried without holding the cache lock.
    pub fn garbage_collect(&self) -> GcStats {
        let refs: Vec<SeriesRef> = self.state.lock().entries.keys().copied().collect();
        let stale: HashSet<SeriesRef> = refs
            .into_iter()
            .filter(|r| self.resolver.labels(*r).is_none())
            .collect();

        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|r, _| !stale.contains(r));
        let entries_dropped = before - state.entries.len();

        let live: HashSet<u64> = state
            .entries
            .values()
            .filter_map(|e| e.series.as_ref().map(|s| s.hash))
            .collect();
        let intervals_dropped = state.intervals.retain(|h| live.contains(&h));

        GcStats {
            entries_dropped,
            intervals_dropped,
        }
    }

    /// Run garbage collection every `interval` until `shutdown` fires.
    pub async fn run(&self, interval: Duration, mut shutdown: oneshot::Receiver<()>) {
        // tokio rejects a zero period.
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        // The first tick completes immediately.
        ticker.tick().await;

        info!(interval = ?interval, "series cache garbage collection started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("series cache garbage collection stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let stats = self.garbage_collect();
                    debug!(
                        entries_dropped = stats.entries_dropped,
                        intervals_dropped = stats.intervals_dropped,
                        entries = self.len(),
                        "series cache garbage collection done"
                    );
                }
            }
        }
    }
}
