//! Running jitter statistics
//!
//! [`RunningStatistics`] keeps integer sums so it can be updated from the
//! firing context in constant time. Derived values (mean, variance, stddev)
//! are computed on demand, outside the state lock.
//!
//! [`MagnitudeTracker`] records |jitter| into an HDR histogram for percentile
//! reporting. Its storage is allocated once and never resized while recording.

use hdrhistogram::Histogram;

use crate::models::MagnitudePercentiles;
use crate::numeric::{isqrt_rounded, signed_div};

/// Min/max/count/sum/sum-of-squares accumulator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunningStatistics {
    min: i64,
    max: i64,
    count: u64,
    sum: i64,
    sum_squares: i64,
}

impl Default for RunningStatistics {
    fn default() -> Self {
        RunningStatistics {
            min: i64::MAX,
            max: i64::MIN,
            count: 0,
            sum: 0,
            sum_squares: 0,
        }
    }
}

impl RunningStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Sums saturate instead of wrapping on pathological inputs
    pub fn record(&mut self, jitter_ns: i64) {
        self.min = self.min.min(jitter_ns);
        self.max = self.max.max(jitter_ns);
        self.count += 1;
        self.sum = self.sum.saturating_add(jitter_ns);
        self.sum_squares = self
            .sum_squares
            .saturating_add(jitter_ns.saturating_mul(jitter_ns));
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> i64 {
        self.sum
    }

    pub fn sum_squares(&self) -> i64 {
        self.sum_squares
    }

    fn count_i64(&self) -> i64 {
        i64::try_from(self.count).unwrap_or(i64::MAX)
    }

    pub fn mean(&self) -> i64 {
        if self.count == 0 {
            return 0;
        }
        signed_div(self.sum, self.count_i64())
    }

    /// E[X²] − E[X]² in integer arithmetic; truncating divisions bias it slightly
    pub fn variance(&self) -> i64 {
        if self.count == 0 {
            return 0;
        }
        let n = self.count_i64();
        let square_of_sum = signed_div(self.sum.saturating_mul(self.sum), n);
        signed_div(self.sum_squares.saturating_sub(square_of_sum), n)
    }

    /// Rounding artifacts can push the variance below zero; those clamp to 0
    pub fn stddev(&self) -> u64 {
        isqrt_rounded(self.variance().max(0) as u64)
    }
}

/// Largest magnitude tracked exactly (60 s); larger samples saturate
const MAGNITUDE_MAX_NS: u64 = 60_000_000_000;

/// Percentile tracker for |jitter|
#[derive(Clone, Debug)]
pub struct MagnitudeTracker {
    histogram: Histogram<u64>,
}

impl MagnitudeTracker {
    pub fn new() -> Result<Self, hdrhistogram::CreationError> {
        // 3 significant figures, 1 ns resolution
        let histogram = Histogram::<u64>::new_with_bounds(1, MAGNITUDE_MAX_NS, 3)?;
        Ok(MagnitudeTracker { histogram })
    }

    pub fn record(&mut self, jitter_ns: i64) {
        self.histogram.saturating_record(jitter_ns.unsigned_abs());
    }

    pub fn reset(&mut self) {
        self.histogram.reset();
    }

    /// Overwrite this tracker with `source` without allocating
    pub fn copy_from(&mut self, source: &MagnitudeTracker) {
        // Both sides share the same bounds, so set_to takes the memcpy path
        if self.histogram.set_to(&source.histogram).is_err() {
            self.histogram.reset();
        }
    }

    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    pub fn percentiles(&self) -> MagnitudePercentiles {
        if self.histogram.is_empty() {
            return MagnitudePercentiles::default();
        }
        MagnitudePercentiles {
            p50_ns: self.histogram.value_at_quantile(0.50),
            p99_ns: self.histogram.value_at_quantile(0.99),
            p99_9_ns: self.histogram.value_at_quantile(0.999),
            max_ns: self.histogram.max(),
        }
    }
}
