//! Conversion of scraped samples into export records.
//!
//! Samples arrive in scrape order. Classic histograms are spread over
//! several series (`_bucket`, `_sum`, `_count`) that appear next to each
//! other and are folded into a single distribution point here.

use std::sync::Arc;

use tracing::debug;

use crate::error::{ExportError, Result};
use crate::labels::BUCKET_LABEL;
use crate::metadata::{MetadataSource, MetricType};
use crate::naming::MetricSuffix;
use crate::series_cache::{CachedSeries, SeriesCache, SeriesRef};
use crate::timeseries::{Distribution, Point, TimeInterval, TimeSeries, TypedValue};

/// Bit pattern of the NaN Prometheus writes to mark a series stale.
pub(crate) const STALE_NAN_BITS: u64 = 0x7ff0000000000002;

pub(crate) fn is_stale_marker(value: f64) -> bool {
    value.to_bits() == STALE_NAN_BITS
}

/// A scraped sample of the series identified by `series_ref`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefSample {
    pub series_ref: SeriesRef,
    /// Milliseconds since epoch.
    pub t: i64,
    pub v: f64,
}

impl RefSample {
    pub fn new(series_ref: SeriesRef, t: i64, v: f64) -> Self {
        Self { series_ref, t, v }
    }
}

/// Builds export records from samples, one record per call.
#[derive(Debug, Clone)]
pub struct SampleBuilder {
    cache: Arc<SeriesCache>,
}

impl SampleBuilder {
    pub fn new(cache: Arc<SeriesCache>) -> Self {
        Self { cache }
    }

    /// Convert the leading sample(s) of a non-empty `samples` slice.
    ///
    /// Returns the samples not yet consumed together with the outcome for
    /// the consumed ones. `Ok(None)` means the samples were dropped
    /// deliberately: stale markers, first readings of cumulative series,
    /// unexportable series, or points overlapping what was already written.
    /// At least one sample is always consumed.
    pub fn next<'a>(
        &self,
        target: &dyn MetadataSource,
        samples: &'a [RefSample],
    ) -> (&'a [RefSample], Result<Option<TimeSeries>>) {
        let Some((sample, tail)) = samples.split_first() else {
            return (samples, Ok(None));
        };
        let stale = is_stale_marker(sample.v);
        let series = match self.cache.get(sample.series_ref, target) {
            Ok(Some(series)) => series,
            Ok(None) => return (tail, Ok(None)),
            // Series commonly disappear right after their stale marker.
            Err(_) if stale => return (tail, Ok(None)),
            Err(e) => return (tail, Err(e)),
        };
        // A stale histogram component invalidates its whole group, which
        // the histogram path handles.
        if stale && series.metadata.metric_type != MetricType::Histogram {
            return (tail, Ok(None));
        }

        let result = match series.metadata.metric_type {
            MetricType::Counter => Ok(self.cumulative(&series, sample, false)),
            MetricType::Gauge | MetricType::Unknown => Ok(self.gauge(&series, sample)),
            MetricType::Summary => match series.suffix {
                MetricSuffix::Sum => Ok(self.cumulative(&series, sample, false)),
                MetricSuffix::Count => Ok(self.cumulative(&series, sample, true)),
                MetricSuffix::None => Ok(self.gauge(&series, sample)),
                suffix @ (MetricSuffix::Total | MetricSuffix::Bucket) => {
                    Err(ExportError::UnexpectedSuffix {
                        metric: series.metric_name().to_string(),
                        suffix,
                    })
                }
            },
            MetricType::Histogram => return self.histogram(target, &series, samples),
            other @ (MetricType::GaugeHistogram | MetricType::Info | MetricType::StateSet) => {
                Err(ExportError::UnsupportedMetricType {
                    metric: series.metric_name().to_string(),
                    metric_type: other,
                })
            }
        };
        (tail, result)
    }

    fn gauge(&self, series: &CachedSeries, sample: &RefSample) -> Option<TimeSeries> {
        // Gauge points have no start time. Tracking them from zero lets the
        // interval check reject exact duplicates while accepting every newer
        // timestamp.
        if !self.cache.update_sample_interval(series.hash, 0, sample.t) {
            return None;
        }
        Some(TimeSeries {
            descriptor: series.descriptor.clone(),
            points: vec![Point {
                interval: TimeInterval {
                    start_time: None,
                    end_time: sample.t,
                },
                value: TypedValue::Double(sample.v),
            }],
        })
    }

    fn cumulative(&self, series: &CachedSeries, sample: &RefSample, int: bool) -> Option<TimeSeries> {
        let adjusted = self
            .cache
            .get_reset_adjusted(sample.series_ref, sample.t, sample.v)?;
        if !self
            .cache
            .update_sample_interval(series.hash, adjusted.reset_timestamp, sample.t)
        {
            return None;
        }
        let value = if int {
            TypedValue::Int64(adjusted.value as i64)
        } else {
            TypedValue::Double(adjusted.value)
        };
        Some(TimeSeries {
            descriptor: series.descriptor.clone(),
            points: vec![Point {
                interval: TimeInterval {
                    start_time: Some(adjusted.reset_timestamp),
                    end_time: sample.t,
                },
                value,
            }],
        })
    }

    /// Fold the histogram component samples at the head of `samples` into
    /// one distribution point.
    fn histogram<'a>(
        &self,
        target: &dyn MetadataSource,
        first: &CachedSeries,
        samples: &'a [RefSample],
    ) -> (&'a [RefSample], Result<Option<TimeSeries>>) {
        let t = samples[0].t;
        let mut acc = HistogramAccumulator::default();
        let mut consumed = 0;

        for sample in samples {
            let series = match self.cache.get(sample.series_ref, target) {
                Ok(Some(series)) => series,
                // Unexportable series between components are skipped.
                Ok(None) => {
                    consumed += 1;
                    continue;
                }
                // A failing neighbour ends the group and is reported by the
                // next call.
                Err(_) if consumed > 0 => break,
                Err(e) => return (&samples[1..], Err(e)),
            };
            // Stop at the first sample of another series or of a repeated
            // series with a later timestamp.
            if series.hash != first.hash
                || series.metadata.metric_type != MetricType::Histogram
                || sample.t != t
                || !matches!(
                    series.suffix,
                    MetricSuffix::Bucket | MetricSuffix::Sum | MetricSuffix::Count
                )
            {
                break;
            }
            consumed += 1;

            if is_stale_marker(sample.v) {
                acc.skip = true;
                continue;
            }
            let Some(adjusted) =
                self.cache
                    .get_reset_adjusted(sample.series_ref, sample.t, sample.v)
            else {
                // First reading of this component: the window is unknown.
                acc.skip = true;
                continue;
            };
            match series.suffix {
                MetricSuffix::Sum => acc.sum = Some(adjusted.value),
                MetricSuffix::Count => {
                    // The count series is authoritative for the reset time.
                    acc.count = Some(adjusted.value);
                    acc.reset_timestamp = Some(adjusted.reset_timestamp);
                }
                MetricSuffix::Bucket => {
                    let le = series.labels.get(BUCKET_LABEL);
                    match parse_bucket_bound(le) {
                        Some(bound) => acc.buckets.push((bound, adjusted.value)),
                        None => {
                            return (
                                &samples[consumed..],
                                Err(malformed(first, format!("invalid bucket bound {le:?}"))),
                            );
                        }
                    }
                }
                MetricSuffix::None | MetricSuffix::Total => {}
            }
        }

        // Guarantee progress even if the head sample was not a component.
        let rest = &samples[consumed.max(1)..];
        if consumed == 0 {
            return (rest, Err(malformed(first, "unexpected series".to_string())));
        }
        if acc.skip {
            debug!(metric = first.metric_name(), t, "skipping histogram sample");
            return (rest, Ok(None));
        }
        let (Some(count), Some(reset_timestamp)) = (acc.count, acc.reset_timestamp) else {
            return (rest, Err(malformed(first, "missing _count series".to_string())));
        };
        let distribution = match acc.build(count) {
            Ok(d) => d,
            Err(reason) => return (rest, Err(malformed(first, reason))),
        };
        if !self
            .cache
            .update_sample_interval(first.hash, reset_timestamp, t)
        {
            return (rest, Ok(None));
        }
        (
            rest,
            Ok(Some(TimeSeries {
                descriptor: first.descriptor.clone(),
                points: vec![Point {
                    interval: TimeInterval {
                        start_time: Some(reset_timestamp),
                        end_time: t,
                    },
                    value: TypedValue::Distribution(distribution),
                }],
            })),
        )
    }
}

fn malformed(series: &CachedSeries, reason: String) -> ExportError {
    ExportError::MalformedHistogram {
        metric: series.descriptor.metric.metric_type.clone(),
        reason,
    }
}

fn parse_bucket_bound(le: &str) -> Option<f64> {
    match le {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        _ => le.parse().ok().filter(|b: &f64| !b.is_nan()),
    }
}

#[derive(Debug, Default)]
struct HistogramAccumulator {
    /// Upper bound and cumulative count per bucket, in arrival order.
    buckets: Vec<(f64, f64)>,
    sum: Option<f64>,
    count: Option<f64>,
    reset_timestamp: Option<i64>,
    skip: bool,
}

impl HistogramAccumulator {
    /// Convert cumulative Prometheus buckets into an explicit-bounds
    /// distribution with per-bucket counts.
    fn build(mut self, count: f64) -> std::result::Result<Distribution, String> {
        self.buckets.sort_by(|a, b| a.0.total_cmp(&b.0));

        let count = count as i64;
        let sum = self.sum.unwrap_or(0.0);
        let mean = if count > 0 { sum / count as f64 } else { 0.0 };

        let mut bounds = Vec::with_capacity(self.buckets.len());
        let mut bucket_counts = Vec::with_capacity(self.buckets.len() + 1);
        let mut prev = 0i64;
        let mut lower = 0.0f64;
        let mut dev = 0.0;

        for (bound, cumulative) in &self.buckets {
            let cumulative = *cumulative as i64;
            let val = cumulative - prev;
            if val < 0 {
                return Err(format!(
                    "bucket le={bound} has lower cumulative count {cumulative} than its predecessor {prev}"
                ));
            }
            // Approximate each observation by its bucket midpoint.
            let x = if bound.is_infinite() {
                lower
            } else {
                lower + (bound - lower) / 2.0
            };
            dev += val as f64 * (x - mean) * (x - mean);

            bucket_counts.push(val);
            prev = cumulative;
            if bound.is_infinite() {
                break;
            }
            bounds.push(*bound);
            lower = *bound;
        }
        // Without an explicit +Inf bucket the overflow is derived from the count.
        if bucket_counts.len() == bounds.len() {
            let overflow = count - prev;
            if overflow < 0 {
                return Err(format!(
                    "count {count} lower than cumulative bucket count {prev}"
                ));
            }
            dev += overflow as f64 * (lower - mean) * (lower - mean);
            bucket_counts.push(overflow);
        }

        Ok(Distribution {
            count,
            mean,
            sum_of_squared_deviation: dev,
            bounds,
            bucket_counts,
        })
    }
}
