use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid Bluetooth address: {0:?}")]
pub struct InvalidAddress(pub String);

/// Failures reported by a radio capability provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    #[error("Bluetooth hardware is not available")]
    HardwareUnavailable,
    #[error("radio operation timed out")]
    OperationTimedOut,
    #[error("radio operation not permitted")]
    PermissionDenied,
    #[error("radio backend failure: {0}")]
    Backend(String),
}

/// Failures reported by a permission provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("permission backend failure: {0}")]
    Backend(String),
    #[error("could not open system settings: {0}")]
    Settings(String),
}

/// User-facing error taxonomy. Every notice names one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    PermissionDenied,
    AdapterUnavailable,
    AlreadyInProgress,
    DiscoveryAborted,
    OperationTimedOut,
    AdapterOff,
    RadioFailure,
}

impl ErrorKind {
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorKind::AdapterUnavailable)
    }

    /// Plain-language description shown in notices.
    pub fn describe(self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "Bluetooth permissions were not granted",
            ErrorKind::AdapterUnavailable => "Bluetooth isn't available on this device",
            ErrorKind::AlreadyInProgress => "A scan is already running",
            ErrorKind::DiscoveryAborted => "The scan stopped because Bluetooth was turned off",
            ErrorKind::OperationTimedOut => "Bluetooth did not respond in time, try again",
            ErrorKind::AdapterOff => "Bluetooth is turned off",
            ErrorKind::RadioFailure => "Bluetooth reported an unexpected problem",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::AdapterUnavailable => "AdapterUnavailable",
            ErrorKind::AlreadyInProgress => "AlreadyInProgress",
            ErrorKind::DiscoveryAborted => "DiscoveryAborted",
            ErrorKind::OperationTimedOut => "OperationTimedOut",
            ErrorKind::AdapterOff => "AdapterOff",
            ErrorKind::RadioFailure => "RadioFailure",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("permission denied (blocked: {blocked})")]
    PermissionDenied { blocked: bool },
    #[error("Bluetooth adapter unavailable")]
    AdapterUnavailable,
    #[error("discovery already in progress")]
    AlreadyInProgress,
    #[error("discovery aborted by power-off")]
    DiscoveryAborted,
    #[error("operation timed out")]
    OperationTimedOut,
    #[error("Bluetooth adapter is powered off")]
    AdapterOff,
    #[error(transparent)]
    Radio(RadioError),
    #[error(transparent)]
    Permission(#[from] PermissionError),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::PermissionDenied { .. } | CoreError::Permission(_) => ErrorKind::PermissionDenied,
            CoreError::AdapterUnavailable => ErrorKind::AdapterUnavailable,
            CoreError::AlreadyInProgress => ErrorKind::AlreadyInProgress,
            CoreError::DiscoveryAborted => ErrorKind::DiscoveryAborted,
            CoreError::OperationTimedOut => ErrorKind::OperationTimedOut,
            CoreError::AdapterOff => ErrorKind::AdapterOff,
            CoreError::Radio(_) => ErrorKind::RadioFailure,
        }
    }
}

impl From<RadioError> for CoreError {
    fn from(err: RadioError) -> Self {
        match err {
            RadioError::HardwareUnavailable => CoreError::AdapterUnavailable,
            RadioError::OperationTimedOut => CoreError::OperationTimedOut,
            RadioError::PermissionDenied => CoreError::PermissionDenied { blocked: false },
            other => CoreError::Radio(other),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
