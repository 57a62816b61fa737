use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use exporter::{
    CacheOptions, Labels, MetricMetadata, MetricType, SeriesCache, SeriesRef,
};

const THREADS: usize = 16;

fn cache() -> Arc<SeriesCache> {
    let resolver = |r: SeriesRef| {
        Some(Labels::from_pairs([
            ("__name__", "requests_total".to_string()),
            ("job", "api".to_string()),
            ("instance", format!("10.0.0.{r}:8080")),
        ]))
    };
    Arc::new(SeriesCache::new(
        CacheOptions::default(),
        Arc::new(resolver),
        Arc::new(Labels::new),
    ))
}

fn target() -> HashMap<String, MetricMetadata> {
    HashMap::from([(
        "requests_total".to_string(),
        MetricMetadata::new("requests_total", MetricType::Counter, "Requests served."),
    )])
}

#[test]
fn concurrent_interval_updates_admit_one_writer() {
    let cache = cache();
    let accepted = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                if cache.update_sample_interval(42, 1000, 2000) {
                    accepted.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    let interval = cache.sample_interval(42).unwrap();
    assert_eq!((interval.start, interval.end), (1000, 2000));
}

#[test]
fn concurrent_gets_share_one_entry() {
    let cache = cache();
    let target = target();

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| s.spawn(|| cache.get(7, &target).unwrap().unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(cache.len(), 1);
    assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
}

#[test]
fn concurrent_reset_adjustment_is_serialised() {
    let cache = cache();
    let target = target();
    cache.get(1, &target).unwrap();
    assert!(cache.get_reset_adjusted(1, 0, 0.0).is_none());

    // Every reading is at or above the baseline, so none is a reset and all
    // keep the original anchor.
    thread::scope(|s| {
        for i in 0..THREADS {
            let cache = &cache;
            s.spawn(move || {
                for j in 0..100 {
                    let t = (i * 100 + j + 1) as i64;
                    let adjusted = cache.get_reset_adjusted(1, t, t as f64).unwrap();
                    assert_eq!(adjusted.reset_timestamp, 0);
                }
            });
        }
    });
}

#[test]
fn gc_races_with_lookups() {
    let cache = cache();
    let target = target();

    thread::scope(|s| {
        for i in 0..THREADS {
            let (cache, target) = (&cache, &target);
            s.spawn(move || {
                for r in 0..50 {
                    let series = cache.get((i * 50 + r) as SeriesRef, target).unwrap().unwrap();
                    cache.update_sample_interval(series.hash, 0, r as i64 + 1);
                }
            });
        }
        s.spawn(|| {
            for _ in 0..20 {
                cache.garbage_collect();
            }
        });
    });

    // Every reference still resolves, so nothing may be collected.
    assert_eq!(cache.len(), THREADS * 50);
    let stats = cache.garbage_collect();
    assert_eq!(stats.entries_dropped, 0);
    assert_eq!(stats.intervals_dropped, 0);
}
