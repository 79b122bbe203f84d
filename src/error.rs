//! Unified error type hierarchy for LatTest
//!
//! Provides structured error handling with ControlError, ConfigError,
//! SettingsError, ChannelError, and AppError.
//!
//! Every sampler error is local and synchronous: the operation that returns it
//! leaves the sampler state untouched.

use std::io;
use thiserror::Error;

/// Errors from start/stop/period operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// Attempted mutation while a run is active
    #[error("Sampler is already running")]
    AlreadyRunning,

    /// Out-of-range period, non-positive run count, or malformed command
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The OS refused to create the firing thread
    #[error("Could not spawn firing thread: {0}")]
    ThreadSpawn(String),
}

/// Errors from histogram reconfiguration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Histogram reconfiguration while a run is active
    #[error("Histogram cannot be reconfigured while the sampler is running")]
    Busy,

    /// Bin count or bin width out of bounds
    #[error("Invalid histogram configuration: {0}")]
    InvalidArgument(String),
}

/// Settings file loading and validation errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in settings: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Settings validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during settings operations: {0}")]
    IoError(#[from] io::Error),
}

/// Errors surfaced by the textual control channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Attribute '{attribute}' is not {access}")]
    PermissionDenied {
        attribute: &'static str,
        access: &'static str,
    },

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Process setup and teardown errors
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// File I/O error (read/write/create)
    #[error("I/O error: {0}")]
    Io(String),

    /// Settings load or validation error
    #[error("Settings error: {0}")]
    Settings(String),

    /// Service or logger initialization failed
    #[error("Initialization failed: {0}")]
    ModuleInit(String),
}

impl From<io::Error> for AppError {
    fn from(e: io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<SettingsError> for AppError {
    fn from(e: SettingsError) -> Self {
        AppError::Settings(e.to_string())
    }
}

/// Top-level result type for operations that may fail.
/// Example: `fn risky_operation() -> Result<String>`
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
