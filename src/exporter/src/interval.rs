//! Per-stream tracking of the most recently written time range.
//!
//! The backend requires points of a stream to cover non-overlapping,
//! monotonically advancing ranges. A candidate range is accepted if it
//! extends the current range from the same start, or begins at or after
//! the current end.

use std::collections::HashMap;

/// A `[start, end]` range in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInterval {
    pub start: i64,
    pub end: i64,
}

impl SampleInterval {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Whether `[start, end]` may follow this interval.
    ///
    /// A start equal to the current end counts as touching, not overlapping.
    pub fn accepts(&self, start: i64, end: i64) -> bool {
        (start == self.start && end > self.end) || start >= self.end
    }
}

/// Most recent interval per series hash.
#[derive(Debug, Default)]
pub struct IntervalTracker {
    intervals: HashMap<u64, SampleInterval>,
}

impl IntervalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `[start, end]` for `hash` if it is acceptable.
    ///
    /// Returns false and leaves state untouched otherwise; the caller must
    /// then discard the sample.
    pub fn update(&mut self, hash: u64, start: i64, end: i64) -> bool {
        match self.intervals.get(&hash) {
            Some(current) if !current.accepts(start, end) => false,
            _ => {
                self.intervals.insert(hash, SampleInterval::new(start, end));
                true
            }
        }
    }

    pub fn get(&self, hash: u64) -> Option<SampleInterval> {
        self.intervals.get(&hash).copied()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Drop intervals for which `keep` returns false. Returns the number dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(u64) -> bool) -> usize {
        let before = self.intervals.len();
        self.intervals.retain(|hash, _| keep(*hash));
        before - self.intervals.len()
    }
}
