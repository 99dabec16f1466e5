//! Error types for audio route coordination

use thiserror::Error;

/// Result type for routing operations
pub type RouteResult<T> = Result<T, RouteError>;

/// Errors that can occur while coordinating call audio routes
///
/// None of these are fatal. The coordinator folds them into its state
/// machine and degrades along Bluetooth → Speaker → Earpiece.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// No paired and connected hands-free device
    #[error("No Bluetooth headset available")]
    BluetoothUnavailable,

    /// SCO link never confirmed within the retry budget
    #[error("Bluetooth SCO activation timed out after {attempts} attempts")]
    ScoActivationTimeout { attempts: u8 },

    /// Platform kept reporting SCO connected after teardown retries
    #[error("Bluetooth SCO teardown timed out after {attempts} attempts")]
    ScoTeardownTimeout { attempts: u8 },

    /// Platform refused a route-setting call
    #[error("Hardware command '{operation}' rejected: {reason}")]
    HardwareCommandRejected { operation: String, reason: String },

    /// Hands-free profile proxy could not be acquired
    #[error("Hands-free profile proxy unavailable: {reason}")]
    ProfileProxyUnavailable { reason: String },

    /// Proximity sensor missing or registration refused
    #[error("Proximity sensor unavailable: {reason}")]
    SensorUnavailable { reason: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The route service task is no longer running
    #[error("Audio route service stopped")]
    ServiceStopped,
}

impl RouteError {
    /// Create a hardware rejection error
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HardwareCommandRejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a profile proxy error
    pub fn profile_proxy(reason: impl Into<String>) -> Self {
        Self::ProfileProxyUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a sensor error
    pub fn sensor(reason: impl Into<String>) -> Self {
        Self::SensorUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether retrying later (or on a fresh platform event) may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            RouteError::BluetoothUnavailable
            | RouteError::ScoActivationTimeout { .. }
            | RouteError::ScoTeardownTimeout { .. }
            | RouteError::HardwareCommandRejected { .. }
            | RouteError::ProfileProxyUnavailable { .. } => true,
            RouteError::SensorUnavailable { .. }
            | RouteError::Configuration { .. }
            | RouteError::ServiceStopped => false,
        }
    }

    /// Short category name for log fields
    pub fn category(&self) -> &'static str {
        match self {
            RouteError::BluetoothUnavailable | RouteError::ProfileProxyUnavailable { .. } => {
                "bluetooth"
            }
            RouteError::ScoActivationTimeout { .. } | RouteError::ScoTeardownTimeout { .. } => "sco",
            RouteError::HardwareCommandRejected { .. } => "hardware",
            RouteError::SensorUnavailable { .. } => "sensor",
            RouteError::Configuration { .. } => "configuration",
            RouteError::ServiceStopped => "service",
        }
    }
}
