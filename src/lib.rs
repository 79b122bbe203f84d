//! LatTest: periodic timer jitter sampler
//!
//! Fires at a nominal fixed period, measures the actual elapsed time between
//! firings, and keeps running statistics plus a signed-bin histogram of the
//! deviation ("jitter") from the nominal period.
//!
//! The crate is organized into functional modules:
//! - **numeric**: overflow-safe signed division and rounded integer square root
//! - **sampler**: the scheduling engine, its accumulators, and the firing threads
//! - **control**: the control surface and its textual channel
//! - **config**: persisted settings
//! - **log_collector**: decoupled logging pipeline
//! - **error**: unified error type hierarchy
//! - **models**: shared value types

// Core foundational modules
pub mod error;
pub mod models;
pub mod numeric;

// Scheduling engine and firing context
pub mod sampler;

// Control surface and textual channel
pub mod control;

// Settings persistence
pub mod config;

// Robust, decoupled logging system
pub mod log_collector;

// Re-export the log crate for macro usage
pub use log;

pub use log_collector::{LogCollector, LogLine};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{AppError, ChannelError, ConfigError, ControlError, Result, SettingsError};

pub use models::{
    ControlCommand, HistogramBin, HistogramSnapshot, MagnitudePercentiles, RunCount, RunMode,
    SamplerConfig, SamplerState, SamplerStatus, StatisticsReport, Timestamp,
};

pub use numeric::{isqrt_rounded, signed_div};

pub use sampler::{
    EdgePolicy, HistogramAccumulator, HistogramConfig, PeriodicSampler, RunningStatistics,
    SamplerService,
};

pub use control::{ControlChannel, ControlSurface};

pub use config::{Settings, SettingsManager};

/// Crate version, from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
