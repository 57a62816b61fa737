//! Outbound request batches with a size limit and one point per series.

use std::collections::HashSet;

use serde::Serialize;

use crate::hash::hash_series;
use crate::timeseries::TimeSeries;

/// Default number of series per outbound request.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 200;

/// Result of offering a series to a batch. Rejected series are handed back.
#[derive(Debug, PartialEq)]
pub enum PushOutcome {
    Added,
    /// The batch reached its size limit.
    Full(TimeSeries),
    /// The batch already holds a point of the same series. The backend
    /// rejects such requests, so the batch must be flushed first.
    Duplicate(TimeSeries),
}

/// Time series bound for a single write request.
#[derive(Debug, Clone, Serialize)]
pub struct ExportBatch {
    #[serde(skip)]
    max_size: usize,
    #[serde(skip)]
    hashes: HashSet<u64>,
    series: Vec<TimeSeries>,
}

impl ExportBatch {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            hashes: HashSet::new(),
            series: Vec::new(),
        }
    }

    pub fn push(&mut self, series: TimeSeries) -> PushOutcome {
        if self.is_full() {
            return PushOutcome::Full(series);
        }
        if !self.hashes.insert(hash_series(&series.descriptor)) {
            return PushOutcome::Duplicate(series);
        }
        self.series.push(series);
        PushOutcome::Added
    }

    pub fn is_full(&self) -> bool {
        self.series.len() >= self.max_size
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn series(&self) -> &[TimeSeries] {
        &self.series
    }

    pub fn into_series(self) -> Vec<TimeSeries> {
        self.series
    }
}
