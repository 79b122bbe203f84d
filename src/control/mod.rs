//! Control surface
//!
//! The only mutation path into a running service. Every operation is a single
//! synchronous state transition attempt: on error the sampler is left untouched.

pub mod channel;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, ControlError};
use crate::models::{ControlCommand, RunMode, SamplerStatus, StatisticsReport, MAX_PERIOD_MS};
use crate::sampler::histogram::{EdgePolicy, HistogramConfig};
use crate::sampler::SamplerService;

pub use channel::{Attribute, ControlChannel, MAX_RESPONSE_BYTES};

/// Handle onto a [`SamplerService`]
#[derive(Clone)]
pub struct ControlSurface {
    service: Arc<SamplerService>,
}

impl ControlSurface {
    pub fn new(service: Arc<SamplerService>) -> Self {
        ControlSurface { service }
    }

    pub fn service(&self) -> &Arc<SamplerService> {
        &self.service
    }

    pub fn get_status(&self) -> SamplerStatus {
        self.service.status()
    }

    /// Set the nominal period in milliseconds (1..=1000). Idle only.
    pub fn set_period(&self, ms: u32) -> Result<(), ControlError> {
        if ms == 0 || ms > MAX_PERIOD_MS {
            return Err(ControlError::InvalidArgument(format!(
                "period must be 1..={} ms, got {}",
                MAX_PERIOD_MS, ms
            )));
        }
        self.service.set_period(Duration::from_millis(ms as u64))
    }

    /// `Stop` is always legal; starting requires the sampler to be idle.
    pub fn control(&self, command: ControlCommand) -> Result<(), ControlError> {
        match command {
            ControlCommand::Stop => {
                self.service.stop();
                Ok(())
            }
            ControlCommand::Infinite => self.service.start(RunMode::Infinite),
            ControlCommand::Finite(n) => {
                let n = NonZeroU32::new(n).ok_or_else(|| {
                    ControlError::InvalidArgument("run count must be positive".to_string())
                })?;
                self.service.start(RunMode::Finite(n))
            }
        }
    }

    /// Replace the bin layout, keeping the current edge policy. Idle only.
    pub fn set_histogram_config(&self, bin_count: u16, bin_width_ns: u64) -> Result<(), ConfigError> {
        let policy = self.service.histogram_config().edge_policy;
        self.set_histogram_layout(bin_count, bin_width_ns, policy)
    }

    pub fn set_histogram_layout(
        &self,
        bin_count: u16,
        bin_width_ns: u64,
        edge_policy: EdgePolicy,
    ) -> Result<(), ConfigError> {
        let config = HistogramConfig::new(bin_count, bin_width_ns).with_edge_policy(edge_policy);
        self.service.configure_histogram(config)
    }

    pub fn histogram_config(&self) -> HistogramConfig {
        self.service.histogram_config()
    }

    pub fn get_statistics(&self) -> StatisticsReport {
        self.service.statistics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunCount;

    fn surface() -> ControlSurface {
        let service = SamplerService::new(Duration::from_millis(1), HistogramConfig::default()).unwrap();
        ControlSurface::new(Arc::new(service))
    }

    #[test]
    fn test_set_period_bounds() {
        let control = surface();
        assert!(matches!(control.set_period(0), Err(ControlError::InvalidArgument(_))));
        assert!(matches!(control.set_period(1001), Err(ControlError::InvalidArgument(_))));
        control.set_period(1000).unwrap();
        assert_eq!(control.get_status().period, Duration::from_millis(1000));
    }

    #[test]
    fn test_finite_zero_is_invalid() {
        let control = surface();
        assert!(matches!(
            control.control(ControlCommand::Finite(0)),
            Err(ControlError::InvalidArgument(_))
        ));
        assert_eq!(control.get_status().run_count, RunCount::Stopped);
    }

    #[test]
    fn test_mutations_rejected_while_running() {
        let control = surface();
        control.control(ControlCommand::Infinite).unwrap();
        assert_eq!(control.set_period(5), Err(ControlError::AlreadyRunning));
        assert_eq!(control.control(ControlCommand::Finite(2)), Err(ControlError::AlreadyRunning));
        assert_eq!(control.set_histogram_config(10, 500), Err(ConfigError::Busy));
        assert_eq!(control.get_status().period, Duration::from_millis(1));

        control.control(ControlCommand::Stop).unwrap();
        control.control(ControlCommand::Stop).unwrap();
        control.set_period(5).unwrap();
    }

    #[test]
    fn test_set_histogram_config_keeps_edge_policy() {
        let control = surface();
        control.set_histogram_layout(8, 2000, EdgePolicy::Separate).unwrap();
        control.set_histogram_config(4, 1000).unwrap();
        let config = control.histogram_config();
        assert_eq!(config.bin_count, 4);
        assert_eq!(config.bin_width_ns, 1000);
        assert_eq!(config.edge_policy, EdgePolicy::Separate);
    }

    #[test]
    fn test_invalid_histogram_config() {
        let control = surface();
        assert!(matches!(control.set_histogram_config(0, 1000), Err(ConfigError::InvalidArgument(_))));
        assert!(matches!(control.set_histogram_config(257, 1000), Err(ConfigError::InvalidArgument(_))));
        assert!(matches!(control.set_histogram_config(20, 0), Err(ConfigError::InvalidArgument(_))));
        assert_eq!(control.histogram_config(), HistogramConfig::default());
    }
}
