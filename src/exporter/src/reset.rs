//! Counter reset tracking for conversion to backend cumulatives.

/// Reset-tracking state of a single cumulative series.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResetState {
    has_reset: bool,
    reset_value: f64,
    reset_timestamp: i64,
}

/// A counter reading anchored to the start of its accumulation window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResetAdjusted {
    pub reset_timestamp: i64,
    pub value: f64,
}

impl ResetState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adjust a raw cumulative reading taken at `t`.
    ///
    /// The first reading only establishes the baseline and yields `None`: the
    /// window over which it accumulated is unknown. A reading below the
    /// baseline is taken as a counter reset. The true reset instant is
    /// unknown, so the window restarts one millisecond before `t`, which
    /// keeps it non-empty and unlikely to collide with an earlier point.
    pub fn adjust(&mut self, t: i64, v: f64) -> Option<ResetAdjusted> {
        if !self.has_reset {
            self.has_reset = true;
            self.reset_timestamp = t;
            self.reset_value = v;
            return None;
        }
        if v < self.reset_value {
            self.reset_value = 0.0;
            self.reset_timestamp = t - 1;
        }
        Some(ResetAdjusted {
            reset_timestamp: self.reset_timestamp,
            value: v - self.reset_value,
        })
    }

    pub fn has_baseline(&self) -> bool {
        self.has_reset
    }
}
