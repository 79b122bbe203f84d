//! Periodic sampler state machine
//!
//! `Idle → Running → Idle` (on stop or run exhaustion). The engine is clock-free:
//! the driver passes in the delivery time of every firing, which keeps the
//! scheduling logic deterministic under test.
//!
//! Two timelines are tracked on purpose:
//! - the *deadline* grid advances by whole nominal periods and never drifts
//! - jitter is measured between *actual* firing times

use std::time::Duration;

use crate::error::{ConfigError, ControlError};
use crate::models::{
    RunCount, RunMode, SamplerConfig, SamplerState, StatisticsReport, Timestamp, MAX_PERIOD_MS,
};
use crate::sampler::histogram::{HistogramAccumulator, HistogramConfig};
use crate::sampler::statistics::{MagnitudeTracker, RunningStatistics};

/// Result of a single firing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FireOutcome {
    /// Arm the next firing at this deadline
    Reschedule(Timestamp),
    /// The run is over; the sampler is idle
    Stop,
}

/// What one firing did, for the driver's bookkeeping
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FireReport {
    pub outcome: FireOutcome,
    /// Periods skipped because the firing was late
    pub missed: u64,
    /// Jitter recorded by this firing (none on the first firing of a run)
    pub jitter_ns: Option<i64>,
}

/// Check a nominal period against `1..=MAX_PERIOD_MS`
pub fn validate_period(period: Duration) -> Result<(), ControlError> {
    if period.is_zero() {
        return Err(ControlError::InvalidArgument("period must be at least 1 ms".to_string()));
    }
    if period > Duration::from_millis(MAX_PERIOD_MS as u64) {
        return Err(ControlError::InvalidArgument(format!(
            "period {} ms exceeds {} ms",
            period.as_millis(),
            MAX_PERIOD_MS
        )));
    }
    Ok(())
}

/// The scheduling core with its statistics and histogram
#[derive(Debug)]
pub struct PeriodicSampler {
    period: Duration,
    state: SamplerState,
    /// Deadline of the pending firing while running
    deadline: Option<Timestamp>,
    /// `None` means the next firing is the first of the run and yields no sample
    last_sample_time: Option<Timestamp>,
    statistics: RunningStatistics,
    magnitudes: MagnitudeTracker,
    histogram: HistogramAccumulator,
    /// Incremented on every start so stale firings can be told apart
    run_id: u64,
    firings: u64,
    overruns: u64,
}

impl PeriodicSampler {
    pub fn new(period: Duration, histogram: HistogramConfig) -> Result<Self, Box<dyn std::error::Error>> {
        validate_period(period)?;
        Ok(PeriodicSampler {
            period,
            state: SamplerState::Idle,
            deadline: None,
            last_sample_time: None,
            statistics: RunningStatistics::new(),
            magnitudes: MagnitudeTracker::new()?,
            histogram: HistogramAccumulator::new(histogram)?,
            run_id: 0,
            firings: 0,
            overruns: 0,
        })
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn run_count(&self) -> RunCount {
        self.state.run_count()
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn firings(&self) -> u64 {
        self.firings
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    pub fn statistics(&self) -> &RunningStatistics {
        &self.statistics
    }

    pub fn histogram(&self) -> &HistogramAccumulator {
        &self.histogram
    }

    pub fn histogram_config(&self) -> HistogramConfig {
        self.histogram.config()
    }

    /// Change the nominal period. Idle only.
    pub fn set_period(&mut self, period: Duration) -> Result<(), ControlError> {
        if self.is_running() {
            return Err(ControlError::AlreadyRunning);
        }
        validate_period(period)?;
        self.period = period;
        Ok(())
    }

    /// Replace the bin layout and clear the histogram. Idle only.
    pub fn configure_histogram(&mut self, config: HistogramConfig) -> Result<(), ConfigError> {
        if self.is_running() {
            return Err(ConfigError::Busy);
        }
        self.histogram.configure(config)
    }

    /// Begin a run. Returns the deadline of the first firing, `now + period`.
    ///
    /// Statistics and histogram are reset here, never in the firing path.
    pub fn start(&mut self, config: SamplerConfig, now: Timestamp) -> Result<Timestamp, ControlError> {
        if self.is_running() {
            return Err(ControlError::AlreadyRunning);
        }
        let mode = config.run_count.as_run_mode().ok_or_else(|| {
            ControlError::InvalidArgument("run count must be finite or infinite".to_string())
        })?;
        validate_period(config.period)?;

        self.period = config.period;
        self.statistics.reset();
        self.magnitudes.reset();
        self.histogram.reset();
        self.last_sample_time = None;
        self.firings = 0;
        self.overruns = 0;
        self.run_id = self.run_id.wrapping_add(1);

        let first = now + self.period;
        self.deadline = Some(first);
        self.state = SamplerState::Running { remaining: mode };
        Ok(first)
    }

    /// Cancel the pending firing. No-op when idle.
    ///
    /// Returns whether a run was actually cancelled.
    pub fn stop(&mut self) -> bool {
        let was_running = self.is_running();
        self.state = SamplerState::Idle;
        self.deadline = None;
        was_running
    }

    /// Handle a firing delivered at `now`.
    pub fn on_fire(&mut self, now: Timestamp) -> FireReport {
        let remaining = match self.state {
            SamplerState::Running { remaining } => remaining,
            SamplerState::Idle => {
                return FireReport {
                    outcome: FireOutcome::Stop,
                    missed: 0,
                    jitter_ns: None,
                }
            }
        };

        let period_ns = self.period.as_nanos() as u64;
        let previous = self.deadline.unwrap_or(now);
        let (next_deadline, missed) = advance_deadline(previous, now, period_ns);

        let jitter_ns = self.last_sample_time.map(|t_prev| {
            let jitter = now.nanos_since(t_prev).saturating_sub(period_ns as i64);
            self.statistics.record(jitter);
            self.magnitudes.record(jitter);
            self.histogram.record(jitter);
            jitter
        });
        self.last_sample_time = Some(now);
        self.firings += 1;
        self.overruns += missed;

        let outcome = match remaining {
            RunMode::Finite(n) => match std::num::NonZeroU32::new(n.get() - 1) {
                Some(left) => {
                    self.state = SamplerState::Running { remaining: RunMode::Finite(left) };
                    FireOutcome::Reschedule(next_deadline)
                }
                None => {
                    self.state = SamplerState::Idle;
                    FireOutcome::Stop
                }
            },
            RunMode::Infinite => FireOutcome::Reschedule(next_deadline),
        };

        self.deadline = match outcome {
            FireOutcome::Reschedule(next) => Some(next),
            FireOutcome::Stop => None,
        };

        FireReport {
            outcome,
            missed,
            jitter_ns,
        }
    }

    /// Copy the raw accumulators into `scratch`. Runs under the state lock,
    /// so it only copies: no allocation, no percentile scans.
    pub fn capture_into(&self, scratch: &mut StatisticsScratch) {
        scratch.statistics = self.statistics;
        scratch.magnitudes.copy_from(&self.magnitudes);
        scratch.histogram.copy_from(&self.histogram);
    }
}

/// Reader-side copy of the accumulators, reused across statistics reads
#[derive(Clone, Debug)]
pub struct StatisticsScratch {
    statistics: RunningStatistics,
    magnitudes: MagnitudeTracker,
    histogram: HistogramAccumulator,
}

impl StatisticsScratch {
    pub fn new() -> Result<Self, hdrhistogram::CreationError> {
        Ok(StatisticsScratch {
            statistics: RunningStatistics::new(),
            magnitudes: MagnitudeTracker::new()?,
            histogram: HistogramAccumulator::default(),
        })
    }

    /// Derived values are computed here, off the firing path
    pub fn report(&self) -> StatisticsReport {
        let stats = self.statistics;
        StatisticsReport {
            count: stats.count(),
            min: stats.min(),
            max: stats.max(),
            sum: stats.sum(),
            mean: stats.mean(),
            variance: stats.variance(),
            stddev: stats.stddev(),
            magnitude: self.magnitudes.percentiles(),
            histogram: self.histogram.snapshot(),
        }
    }
}

/// Advance `previous` by whole periods until it is at or after `now`.
///
/// Always moves at least one period. Returns the new deadline and how many
/// extra periods were skipped.
pub fn advance_deadline(previous: Timestamp, now: Timestamp, period_ns: u64) -> (Timestamp, u64) {
    let behind = now.as_nanos().saturating_sub(previous.as_nanos());
    let steps = behind.div_ceil(period_ns).max(1);
    let next = Timestamp::from_nanos(
        previous
            .as_nanos()
            .saturating_add(steps.saturating_mul(period_ns)),
    );
    (next, steps - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use std::num::NonZeroU32;

    const MS: u64 = 1_000_000;

    fn finite(n: u32) -> RunCount {
        RunCount::Finite(NonZeroU32::new(n).unwrap())
    }

    fn sampler() -> PeriodicSampler {
        PeriodicSampler::new(Duration::from_millis(10), HistogramConfig::new(20, 1000)).unwrap()
    }

    fn ts(nanos: u64) -> Timestamp {
        Timestamp::from_nanos(nanos)
    }

    #[test]
    fn test_new_rejects_bad_period() {
        assert!(PeriodicSampler::new(Duration::ZERO, HistogramConfig::default()).is_err());
        assert!(PeriodicSampler::new(Duration::from_millis(1001), HistogramConfig::default()).is_err());
    }

    #[test]
    fn test_start_arms_first_deadline() {
        let mut s = sampler();
        let first = s.start(SamplerConfig::from_millis(10, RunCount::Infinite), ts(5 * MS)).unwrap();
        assert_eq!(first, ts(15 * MS));
        assert!(s.is_running());
        assert_eq!(s.run_count(), RunCount::Infinite);
    }

    #[test]
    fn test_start_while_running_fails() {
        let mut s = sampler();
        s.start(SamplerConfig::from_millis(10, RunCount::Infinite), ts(0)).unwrap();
        let err = s.start(SamplerConfig::from_millis(10, finite(3)), ts(0)).unwrap_err();
        assert_eq!(err, ControlError::AlreadyRunning);
        assert_eq!(s.run_count(), RunCount::Infinite);
    }

    #[test]
    fn test_start_with_stopped_run_count_is_invalid() {
        let mut s = sampler();
        let err = s.start(SamplerConfig::from_millis(10, RunCount::Stopped), ts(0)).unwrap_err();
        assert!(matches!(err, ControlError::InvalidArgument(_)));
        assert!(!s.is_running());
    }

    #[test]
    fn test_finite_run_fires_exactly_n_times() {
        let mut s = sampler();
        let mut deadline = s.start(SamplerConfig::from_millis(10, finite(5)), ts(0)).unwrap();
        let mut firings = 0;
        loop {
            firings += 1;
            match s.on_fire(deadline).outcome {
                FireOutcome::Reschedule(next) => deadline = next,
                FireOutcome::Stop => break,
            }
        }
        assert_eq!(firings, 5);
        assert_eq!(s.state(), SamplerState::Idle);
        // First firing produces no jitter sample
        assert_eq!(s.statistics().count(), 4);
        assert_eq!(s.firings(), 5);
    }

    #[test]
    fn test_jitter_binning_against_literal_gaps() {
        let mut s = sampler();
        s.start(SamplerConfig::from_millis(10, RunCount::Infinite), ts(0)).unwrap();

        let first = s.on_fire(ts(10 * MS));
        assert_eq!(first.jitter_ns, None);
        let second = s.on_fire(ts(20 * MS));
        assert_eq!(second.jitter_ns, Some(0));
        let third = s.on_fire(ts(30_300_000));
        assert_eq!(third.jitter_ns, Some(300_000));

        let counts = s.histogram().counts();
        assert_eq!(counts[10], 1);
        // 300 µs lies far beyond the last bin and clamps into it
        assert_eq!(counts[19], 1);
        assert_eq!(s.statistics().min(), 0);
        assert_eq!(s.statistics().max(), 300_000);
    }

    #[test]
    fn test_deadline_is_drift_free() {
        let mut s = sampler();
        let first = s.start(SamplerConfig::from_millis(10, RunCount::Infinite), ts(0)).unwrap();
        // Late by 3 ms: the next deadline stays on the 10 ms grid
        let report = s.on_fire(first + Duration::from_millis(3));
        assert_eq!(report.outcome, FireOutcome::Reschedule(ts(20 * MS)));
        assert_eq!(report.missed, 0);
        // Early-ish delivery relative to the late one still keeps the grid
        let report = s.on_fire(ts(20 * MS + 100));
        assert_eq!(report.outcome, FireOutcome::Reschedule(ts(30 * MS)));
    }

    #[test]
    fn test_missed_ticks_skip_whole_periods() {
        let mut s = sampler();
        s.start(SamplerConfig::from_millis(10, RunCount::Infinite), ts(0)).unwrap();
        // Deadline was 10 ms, delivered at 45 ms: no burst, next deadline 50 ms
        let report = s.on_fire(ts(45 * MS));
        assert_eq!(report.outcome, FireOutcome::Reschedule(ts(50 * MS)));
        assert_eq!(report.missed, 3);
        assert_eq!(s.overruns(), 3);
    }

    #[test]
    fn test_set_period_while_running_is_rejected() {
        let mut s = sampler();
        s.start(SamplerConfig::from_millis(10, RunCount::Infinite), ts(0)).unwrap();
        assert_eq!(s.set_period(Duration::from_millis(20)), Err(ControlError::AlreadyRunning));
        assert_eq!(s.period(), Duration::from_millis(10));
    }

    #[test]
    fn test_configure_histogram_while_running_is_busy() {
        let mut s = sampler();
        s.start(SamplerConfig::from_millis(10, RunCount::Infinite), ts(0)).unwrap();
        assert_eq!(s.configure_histogram(HistogramConfig::new(8, 500)), Err(ConfigError::Busy));
        assert_eq!(s.histogram_config(), HistogramConfig::new(20, 1000));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut s = sampler();
        assert!(!s.stop());
        s.start(SamplerConfig::from_millis(10, RunCount::Infinite), ts(0)).unwrap();
        assert!(s.stop());
        assert!(!s.stop());
        assert_eq!(s.state(), SamplerState::Idle);
        assert_eq!(s.deadline(), None);
    }

    #[test]
    fn test_fire_while_idle_stops() {
        let mut s = sampler();
        let report = s.on_fire(ts(MS));
        assert_eq!(report.outcome, FireOutcome::Stop);
        assert_eq!(s.firings(), 0);
    }

    #[test]
    fn test_restart_resets_accumulators() {
        let mut s = sampler();
        s.start(SamplerConfig::from_millis(10, RunCount::Infinite), ts(0)).unwrap();
        s.on_fire(ts(10 * MS));
        s.on_fire(ts(21 * MS));
        assert_eq!(s.statistics().count(), 1);
        let run_id = s.run_id();
        s.stop();

        s.start(SamplerConfig::from_millis(5, finite(2)), ts(100 * MS)).unwrap();
        assert_eq!(s.statistics().count(), 0);
        assert_eq!(s.histogram().snapshot().total(), 0);
        assert_eq!(s.period(), Duration::from_millis(5));
        assert_ne!(s.run_id(), run_id);
        // First firing of the new run yields no sample despite the old timestamp
        assert_eq!(s.on_fire(ts(105 * MS)).jitter_ns, None);
    }

    #[test]
    fn test_capture_into_report() {
        let mut s = sampler();
        s.start(SamplerConfig::from_millis(10, RunCount::Infinite), ts(0)).unwrap();
        for t in [10 * MS, 20 * MS + 400, 30 * MS - 400, 40 * MS] {
            s.on_fire(ts(t));
        }
        let mut scratch = StatisticsScratch::new().unwrap();
        s.capture_into(&mut scratch);
        let report = scratch.report();
        assert_eq!(report.count, 3);
        assert_eq!(report.min, -800);
        assert_eq!(report.max, 400);
        assert_eq!(report.sum, 0);
        assert_eq!(report.mean, 0);
        assert_eq!(report.histogram.total(), 3);
        assert_eq!(report.histogram.bins.len(), 20);
        assert_eq!(report.magnitude.max_ns, 800);
    }

    #[test]
    fn test_scratch_is_detached_and_reusable() {
        let mut s = sampler();
        s.start(SamplerConfig::from_millis(10, RunCount::Infinite), ts(0)).unwrap();
        s.on_fire(ts(10 * MS));
        s.on_fire(ts(20 * MS + 2_000));

        let mut scratch = StatisticsScratch::new().unwrap();
        s.capture_into(&mut scratch);
        s.on_fire(ts(30 * MS));
        // Recording after the capture leaves the scratch untouched
        assert_eq!(scratch.report().count, 1);
        assert_eq!(scratch.report().magnitude.max_ns, 2_000);

        s.capture_into(&mut scratch);
        let report = scratch.report();
        assert_eq!(report.count, 2);
        assert_eq!(report.histogram.total(), 2);
        assert_eq!(report.min, -2_000);
    }

    #[test]
    fn test_advance_deadline_on_exact_boundary() {
        assert_eq!(advance_deadline(ts(10), ts(10), 10), (ts(20), 0));
        assert_eq!(advance_deadline(ts(10), ts(20), 10), (ts(20), 0));
        assert_eq!(advance_deadline(ts(10), ts(21), 10), (ts(30), 1));
        // A firing that arrives before its deadline still moves forward one period
        assert_eq!(advance_deadline(ts(10), ts(5), 10), (ts(20), 0));
    }
}
