//! Signed-bin jitter histogram
//!
//! Bins are laid out around zero jitter. With `B` bins of width `W`:
//! - even `B`: bin `B/2` covers `[0, W)`
//! - odd `B`: bin `(B-1)/2` straddles zero, covering `[-W/2, W/2)`
//!
//! Both layouts come from one formula, see [`HistogramConfig::bin_lower_bound`].

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::{HistogramBin, HistogramSnapshot};
use crate::numeric::signed_div;

/// Maximum number of bins
pub const MAX_BIN_COUNT: u16 = 256;

/// Maximum bin width (one second)
pub const MAX_BIN_WIDTH_NS: u64 = 1_000_000_000;

/// What happens to samples beyond the outermost bins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgePolicy {
    /// Accumulate in the extreme bin
    #[default]
    Clamp,
    /// Count in separate underflow/overflow counters
    Separate,
}

impl EdgePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgePolicy::Clamp => "clamp",
            EdgePolicy::Separate => "separate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clamp" => Some(EdgePolicy::Clamp),
            "separate" => Some(EdgePolicy::Separate),
            _ => None,
        }
    }
}

/// Bin layout of the histogram
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HistogramConfig {
    /// 1..=256
    pub bin_count: u16,
    /// Width of each bin in nanoseconds, 1..=1e9
    pub bin_width_ns: u64,
    #[serde(default)]
    pub edge_policy: EdgePolicy,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        HistogramConfig {
            bin_count: 20,
            bin_width_ns: 1024, // 2^10 ns
            edge_policy: EdgePolicy::Clamp,
        }
    }
}

impl HistogramConfig {
    pub fn new(bin_count: u16, bin_width_ns: u64) -> Self {
        HistogramConfig {
            bin_count,
            bin_width_ns,
            edge_policy: EdgePolicy::Clamp,
        }
    }

    pub fn with_edge_policy(mut self, edge_policy: EdgePolicy) -> Self {
        self.edge_policy = edge_policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bin_count == 0 || self.bin_count > MAX_BIN_COUNT {
            return Err(ConfigError::InvalidArgument(format!(
                "bin count {} outside 1..={}",
                self.bin_count, MAX_BIN_COUNT
            )));
        }
        if self.bin_width_ns == 0 || self.bin_width_ns > MAX_BIN_WIDTH_NS {
            return Err(ConfigError::InvalidArgument(format!(
                "bin width {} ns outside 1..={}",
                self.bin_width_ns, MAX_BIN_WIDTH_NS
            )));
        }
        Ok(())
    }

    /// `(W/2)·(B mod 2) + (i − ⌈B/2⌉)·W`
    pub fn bin_lower_bound(&self, index: usize) -> i64 {
        let count = self.bin_count as i64;
        let width = self.bin_width_ns as i64;
        let half_up = (count + 1) / 2;
        (width / 2) * (count % 2) + (index as i64 - half_up) * width
    }
}

/// Where a sample lands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Bin(usize),
    Underflow,
    Overflow,
}

/// Fixed-capacity histogram of jitter samples
#[derive(Clone, Debug)]
pub struct HistogramAccumulator {
    config: HistogramConfig,
    bins: Vec<u64>,
    underflow: u64,
    overflow: u64,
}

impl Default for HistogramAccumulator {
    fn default() -> Self {
        Self::with_valid_config(HistogramConfig::default())
    }
}

impl HistogramAccumulator {
    pub fn new(config: HistogramConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: HistogramConfig) -> Self {
        let mut bins = Vec::with_capacity(MAX_BIN_COUNT as usize);
        bins.resize(config.bin_count as usize, 0);
        HistogramAccumulator {
            config,
            bins,
            underflow: 0,
            overflow: 0,
        }
    }

    pub fn config(&self) -> HistogramConfig {
        self.config
    }

    /// Replace the layout and clear every bin. The caller guarantees the sampler is idle.
    pub fn configure(&mut self, config: HistogramConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        // Storage was reserved for MAX_BIN_COUNT, so this never reallocates
        self.bins.clear();
        self.bins.resize(config.bin_count as usize, 0);
        self.underflow = 0;
        self.overflow = 0;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.bins.iter_mut().for_each(|b| *b = 0);
        self.underflow = 0;
        self.overflow = 0;
    }

    pub fn bin_lower_bound(&self, index: usize) -> i64 {
        self.config.bin_lower_bound(index)
    }

    fn slot_for(&self, jitter_ns: i64) -> Slot {
        let offset = jitter_ns.saturating_sub(self.config.bin_lower_bound(0));
        let index = signed_div(offset, self.config.bin_width_ns as i64);
        let last = self.bins.len() as i64 - 1;

        // Offsets in (-W, 0) truncate to index 0, so test the offset sign as well
        if offset < 0 {
            match self.config.edge_policy {
                EdgePolicy::Clamp => Slot::Bin(0),
                EdgePolicy::Separate => Slot::Underflow,
            }
        } else if index > last {
            match self.config.edge_policy {
                EdgePolicy::Clamp => Slot::Bin(last as usize),
                EdgePolicy::Separate => Slot::Overflow,
            }
        } else {
            Slot::Bin(index as usize)
        }
    }

    /// Count one jitter sample. Never drops a sample.
    pub fn record(&mut self, jitter_ns: i64) {
        match self.slot_for(jitter_ns) {
            Slot::Bin(i) => self.bins[i] += 1,
            Slot::Underflow => self.underflow += 1,
            Slot::Overflow => self.overflow += 1,
        }
    }

    pub fn counts(&self) -> &[u64] {
        &self.bins
    }

    /// Overwrite this accumulator with `source`. Both reserve
    /// `MAX_BIN_COUNT` bins up front, so this never reallocates.
    pub fn copy_from(&mut self, source: &HistogramAccumulator) {
        self.config = source.config;
        self.bins.clear();
        self.bins.extend_from_slice(&source.bins);
        self.underflow = source.underflow;
        self.overflow = source.overflow;
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            bin_width_ns: self.config.bin_width_ns,
            bins: self
                .bins
                .iter()
                .enumerate()
                .map(|(i, &count)| HistogramBin {
                    lower_bound_ns: self.config.bin_lower_bound(i),
                    count,
                })
                .collect(),
            underflow: self.underflow,
            overflow: self.overflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_layout_centers_on_zero() {
        let config = HistogramConfig::new(20, 1000);
        assert_eq!(config.bin_lower_bound(0), -10_000);
        assert_eq!(config.bin_lower_bound(10), 0);
        assert_eq!(config.bin_lower_bound(19), 9_000);
    }

    #[test]
    fn test_odd_layout_straddles_zero() {
        let config = HistogramConfig::new(5, 1000);
        assert_eq!(config.bin_lower_bound(0), -2_500);
        assert_eq!(config.bin_lower_bound(2), -500);
        assert_eq!(config.bin_lower_bound(3), 500);
    }

    #[test]
    fn test_single_bin_layout() {
        let config = HistogramConfig::new(1, 1000);
        assert_eq!(config.bin_lower_bound(0), -500);
    }

    #[test]
    fn test_default_matches_power_of_two_layout() {
        // bin 10 covers 0..1023 ns, bin 11 covers 1024..2047 ns
        let mut hist = HistogramAccumulator::default();
        hist.record(0);
        hist.record(1023);
        hist.record(1024);
        assert_eq!(hist.counts()[10], 2);
        assert_eq!(hist.counts()[11], 1);
    }

    #[test]
    fn test_record_clamps_out_of_range() {
        let mut hist = HistogramAccumulator::new(HistogramConfig::new(20, 1000)).unwrap();
        hist.record(0);
        hist.record(300_000);
        hist.record(-10_500);
        hist.record(i64::MIN);
        hist.record(i64::MAX);
        assert_eq!(hist.counts()[10], 1);
        assert_eq!(hist.counts()[19], 2);
        assert_eq!(hist.counts()[0], 2);
        assert_eq!(hist.snapshot().total(), 5);
    }

    #[test]
    fn test_record_negative_inside_range() {
        let mut hist = HistogramAccumulator::new(HistogramConfig::new(20, 1000)).unwrap();
        hist.record(-1);
        hist.record(-10_000);
        assert_eq!(hist.counts()[9], 1);
        assert_eq!(hist.counts()[0], 1);
    }

    #[test]
    fn test_separate_edge_policy() {
        let config = HistogramConfig::new(4, 100).with_edge_policy(EdgePolicy::Separate);
        let mut hist = HistogramAccumulator::new(config).unwrap();
        hist.record(-201);
        hist.record(-200);
        hist.record(199);
        hist.record(200);
        let snapshot = hist.snapshot();
        assert_eq!(snapshot.underflow, 1);
        assert_eq!(snapshot.overflow, 1);
        assert_eq!(snapshot.bins[0].count, 1);
        assert_eq!(snapshot.bins[3].count, 1);
        assert_eq!(snapshot.total(), 4);
    }

    #[test]
    fn test_configure_validates_and_clears() {
        let mut hist = HistogramAccumulator::default();
        hist.record(5);
        assert!(matches!(
            hist.configure(HistogramConfig::new(0, 10)),
            Err(ConfigError::InvalidArgument(_))
        ));
        assert!(matches!(
            hist.configure(HistogramConfig::new(257, 10)),
            Err(ConfigError::InvalidArgument(_))
        ));
        assert!(matches!(
            hist.configure(HistogramConfig::new(8, 0)),
            Err(ConfigError::InvalidArgument(_))
        ));
        // Failed attempts leave the layout and counts alone
        assert_eq!(hist.config(), HistogramConfig::default());
        assert_eq!(hist.snapshot().total(), 1);

        hist.configure(HistogramConfig::new(256, 10)).unwrap();
        assert_eq!(hist.counts().len(), 256);
        assert_eq!(hist.snapshot().total(), 0);
    }

    #[test]
    fn test_snapshot_pairs_bounds_with_counts() {
        let mut hist = HistogramAccumulator::new(HistogramConfig::new(3, 10)).unwrap();
        hist.record(0);
        let snapshot = hist.snapshot();
        let bounds: Vec<i64> = snapshot.bins.iter().map(|b| b.lower_bound_ns).collect();
        assert_eq!(bounds, vec![-15, -5, 5]);
        assert_eq!(snapshot.bins[1].count, 1);
        assert_eq!(snapshot.bin_width_ns, 10);
    }

    #[test]
    fn test_copy_from_reuses_storage() {
        let config = HistogramConfig::new(256, 4).with_edge_policy(EdgePolicy::Separate);
        let mut source = HistogramAccumulator::new(config).unwrap();
        source.record(0);
        source.record(-1_000);

        let mut copy = HistogramAccumulator::default();
        let storage = copy.counts().as_ptr();
        copy.copy_from(&source);
        assert_eq!(copy.counts().as_ptr(), storage);
        assert_eq!(copy.config(), config);
        assert_eq!(copy.snapshot(), source.snapshot());

        source.record(3);
        assert_eq!(copy.snapshot().total(), 2);
    }
}
