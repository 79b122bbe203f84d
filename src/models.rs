//! Core data types for LatTest.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::ops::Add;
use std::time::Duration;

use crate::sampler::histogram::HistogramConfig;

/// Nanoseconds per millisecond
pub const NANOS_PER_MS: u64 = 1_000_000;

/// Maximum nominal period accepted by the sampler (1 second)
pub const MAX_PERIOD_MS: u32 = 1000;

/// A point on the monotonic clock, in nanoseconds since an arbitrary epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Signed distance `self - earlier` in nanoseconds.
    pub fn nanos_since(&self, earlier: Timestamp) -> i64 {
        (self.0 as i128 - earlier.0 as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        let nanos = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(nanos))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// How long an active run lasts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Fire exactly this many more times
    Finite(NonZeroU32),
    /// Fire until stopped
    Infinite,
}

/// Requested run count, including the stopped state.
///
/// Replaces a signed counter where zero meant stopped and negative meant infinite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunCount {
    Stopped,
    Finite(NonZeroU32),
    Infinite,
}

impl From<RunMode> for RunCount {
    fn from(mode: RunMode) -> Self {
        match mode {
            RunMode::Finite(n) => RunCount::Finite(n),
            RunMode::Infinite => RunCount::Infinite,
        }
    }
}

impl RunCount {
    /// The running mode this count requests, or `None` for `Stopped`.
    pub fn as_run_mode(&self) -> Option<RunMode> {
        match self {
            RunCount::Stopped => None,
            RunCount::Finite(n) => Some(RunMode::Finite(*n)),
            RunCount::Infinite => Some(RunMode::Infinite),
        }
    }
}

impl fmt::Display for RunCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunCount::Stopped => write!(f, "0"),
            RunCount::Finite(n) => write!(f, "{}", n),
            RunCount::Infinite => write!(f, "infinite"),
        }
    }
}

/// Command accepted by the control operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    Stop,
    Infinite,
    /// Start a finite run; zero is rejected
    Finite(u32),
}

/// Parameters for one run of the sampler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Nominal period, at most [`MAX_PERIOD_MS`]
    pub period: Duration,
    pub run_count: RunCount,
}

impl SamplerConfig {
    pub fn new(period: Duration, run_count: RunCount) -> Self {
        SamplerConfig { period, run_count }
    }

    pub fn from_millis(period_ms: u32, run_count: RunCount) -> Self {
        SamplerConfig::new(Duration::from_millis(period_ms as u64), run_count)
    }
}

/// Scheduling state of the sampler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerState {
    /// Not scheduled
    Idle,
    /// Scheduled, counting down or infinite
    Running { remaining: RunMode },
}

impl SamplerState {
    pub fn is_running(&self) -> bool {
        matches!(self, SamplerState::Running { .. })
    }

    pub fn run_count(&self) -> RunCount {
        match self {
            SamplerState::Idle => RunCount::Stopped,
            SamplerState::Running { remaining } => RunCount::from(*remaining),
        }
    }
}

impl fmt::Display for SamplerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerState::Idle => write!(f, "stopped"),
            SamplerState::Running { .. } => write!(f, "running"),
        }
    }
}

/// Read-only view of the sampler for status reporting
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SamplerStatus {
    pub state: SamplerState,
    pub period: Duration,
    pub run_count: RunCount,
    /// Firings of the current (or last) run
    pub firings: u64,
    /// Whole periods skipped because a firing was delivered late
    pub overruns: u64,
    pub clock_resolution: Duration,
    pub histogram: HistogramConfig,
}

/// One histogram bin for reporting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HistogramBin {
    /// Inclusive lower bound of the bin in nanoseconds of jitter
    pub lower_bound_ns: i64,
    pub count: u64,
}

/// Ordered copy of the histogram
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HistogramSnapshot {
    pub bin_width_ns: u64,
    pub bins: Vec<HistogramBin>,
    /// Samples below bin 0 (always zero under the clamp policy)
    pub underflow: u64,
    /// Samples above the last bin (always zero under the clamp policy)
    pub overflow: u64,
}

impl HistogramSnapshot {
    /// Every sample accounted for, including out-of-range ones
    pub fn total(&self) -> u64 {
        self.bins.iter().map(|b| b.count).sum::<u64>() + self.underflow + self.overflow
    }
}

/// Percentiles of the absolute jitter, in nanoseconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MagnitudePercentiles {
    pub p50_ns: u64,
    pub p99_ns: u64,
    pub p99_9_ns: u64,
    pub max_ns: u64,
}

/// Aggregated jitter statistics, all values in nanoseconds
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StatisticsReport {
    pub count: u64,
    /// `i64::MAX` while no sample has been recorded
    pub min: i64,
    /// `i64::MIN` while no sample has been recorded
    pub max: i64,
    pub sum: i64,
    pub mean: i64,
    /// In ns^2
    pub variance: i64,
    pub stddev: u64,
    pub magnitude: MagnitudePercentiles,
    pub histogram: HistogramSnapshot,
}
