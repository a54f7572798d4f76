//! Unified error handling for fleet-counter
//!
//! Every fallible operation in the crate returns [`FleetResult`]. Variants are
//! grouped by the resource that failed so the binary can decide between a
//! fatal exit (initialization) and log-and-continue (periodic tasks).

use std::fmt;
use std::io;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum FleetError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        source: Option<BoxError>,
    },

    /// OS resource errors (shared memory segment, semaphore, thread creation)
    #[error("Resource error: {message}")]
    Resource {
        message: String,
        resource_type: String,
        source: Option<BoxError>,
    },

    /// Bounded waits that ran out
    #[error("Timeout error: {message} (timeout: {timeout_ms}ms)")]
    Timeout { message: String, timeout_ms: u64 },

    /// Cross-process lock failures
    #[error("Concurrency error: {message}")]
    Concurrency {
        message: String,
        operation: Option<String>,
        source: Option<BoxError>,
    },

    /// Leader lock artifact errors
    #[error("Election error: {message} (path: {path})")]
    Election {
        message: String,
        path: String,
        source: Option<BoxError>,
    },

    /// Worker process launch errors
    #[error("Process error: {message}")]
    Process {
        message: String,
        command: String,
        source: Option<BoxError>,
    },

    /// Validation errors (console input, configuration values)
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        value: Option<String>,
    },

    /// Filesystem errors (event log sink)
    #[error("Filesystem error: {message} (path: {path})")]
    Filesystem {
        message: String,
        path: String,
        source: Option<BoxError>,
    },
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Resource,
    Timeout,
    Concurrency,
    Election,
    Process,
    Validation,
    Filesystem,
}

impl ErrorCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            ErrorCategory::Config => "Configuration",
            ErrorCategory::Resource => "Resource",
            ErrorCategory::Timeout => "Timeout",
            ErrorCategory::Concurrency => "Concurrency",
            ErrorCategory::Election => "Election",
            ErrorCategory::Process => "Process",
            ErrorCategory::Validation => "Validation",
            ErrorCategory::Filesystem => "Filesystem",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Result type alias for convenience
pub type FleetResult<T> = Result<T, FleetError>;

impl FleetError {
    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            FleetError::Config { .. } => ErrorCategory::Config,
            FleetError::Resource { .. } => ErrorCategory::Resource,
            FleetError::Timeout { .. } => ErrorCategory::Timeout,
            FleetError::Concurrency { .. } => ErrorCategory::Concurrency,
            FleetError::Election { .. } => ErrorCategory::Election,
            FleetError::Process { .. } => ErrorCategory::Process,
            FleetError::Validation { .. } => ErrorCategory::Validation,
            FleetError::Filesystem { .. } => ErrorCategory::Filesystem,
        }
    }

    /// Whether a periodic task keeps running after this error.
    ///
    /// Initialization never retries: a non-recoverable error at startup ends
    /// the process.
    pub fn is_recoverable(&self) -> bool {
        match self {
            FleetError::Config { .. } => false,
            FleetError::Resource { .. } => false,
            FleetError::Timeout { .. } => false,
            FleetError::Concurrency { .. } => false,
            FleetError::Election { .. } => false,
            FleetError::Process { .. } => true,
            FleetError::Validation { .. } => true,
            FleetError::Filesystem { .. } => true,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            FleetError::Config { message, .. } => format!("Configuration problem: {}", message),
            FleetError::Resource {
                message,
                resource_type,
                ..
            } => format!("Resource issue ({}): {}", resource_type, message),
            FleetError::Timeout {
                message,
                timeout_ms,
            } => format!("Gave up after {}ms: {}", timeout_ms, message),
            FleetError::Concurrency { message, .. } => format!("Lock problem: {}", message),
            FleetError::Election { message, path, .. } => {
                format!("Leader election failed at {}: {}", path, message)
            }
            FleetError::Process {
                message, command, ..
            } => format!("Could not run '{}': {}", command, message),
            FleetError::Validation { message, .. } => format!("Invalid input: {}", message),
            FleetError::Filesystem { message, path, .. } => {
                format!("File system problem with {}: {}", path, message)
            }
        }
    }
}

impl From<config::ConfigError> for FleetError {
    fn from(err: config::ConfigError) -> Self {
        FleetError::Config {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Constructors used across the crate
pub mod errors {
    use super::*;

    pub fn config_error(message: impl Into<String>) -> FleetError {
        FleetError::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn resource_error(
        message: impl Into<String>,
        resource_type: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> FleetError {
        FleetError::Resource {
            message: message.into(),
            resource_type: resource_type.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn timeout_error(message: impl Into<String>, timeout_ms: u64) -> FleetError {
        FleetError::Timeout {
            message: message.into(),
            timeout_ms,
        }
    }

    pub fn concurrency_error(message: impl Into<String>, operation: &str) -> FleetError {
        FleetError::Concurrency {
            message: message.into(),
            operation: Some(operation.to_string()),
            source: None,
        }
    }

    pub fn election_error(
        message: impl Into<String>,
        path: &std::path::Path,
        source: io::Error,
    ) -> FleetError {
        FleetError::Election {
            message: message.into(),
            path: path.display().to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn process_error(
        message: impl Into<String>,
        command: impl Into<String>,
        source: io::Error,
    ) -> FleetError {
        FleetError::Process {
            message: message.into(),
            command: command.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn validation_error(
        message: impl Into<String>,
        field: Option<&str>,
        value: Option<&str>,
    ) -> FleetError {
        FleetError::Validation {
            message: message.into(),
            field: field.map(str::to_string),
            value: value.map(str::to_string),
        }
    }

    pub fn filesystem_error(
        message: impl Into<String>,
        path: &std::path::Path,
        source: io::Error,
    ) -> FleetError {
        FleetError::Filesystem {
            message: message.into(),
            path: path.display().to_string(),
            source: Some(Box::new(source)),
        }
    }
}
