//! Unified error types for the guardian core library.
//!
//! This module provides a unified error type [`GuardianError`] that covers all
//! failure modes across the guardian system. Each module also has its own
//! specific error type ([`OtpError`](crate::otp::OtpError),
//! [`ActuatorError`](crate::actuator::ActuatorError),
//! [`SamplerError`](crate::health::SamplerError),
//! [`FrameError`](crate::telemetry::FrameError),
//! [`ConfigError`](crate::config::ConfigError)) for internal use.
//!
//! Only a rejected OTP ever reaches a remote client. Actuator, sampler and
//! transport faults are logged where they happen and never change the
//! controller's decisions.
//!
//! # Example
//!
//! ```rust
//! use guardian_core::error::{GuardianError, Result};
//! use guardian_core::otp::OtpCode;
//!
//! fn check(payload: &[u8]) -> Result<()> {
//!     OtpCode::parse(payload)?;
//!     Ok(())
//! }
//!
//! assert!(check(b"123456").is_ok());
//! assert!(matches!(check(b"12a456"), Err(GuardianError::InvalidOtp(_))));
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::actuator::ActuatorError;
use crate::health::SamplerError;
use crate::otp::OtpError;
use crate::telemetry::FrameError;

/// The unified error type for all guardian operations.
#[derive(Debug, Error)]
pub enum GuardianError {
    // =========================================================================
    // ACCESS CONTROL ERRORS
    // =========================================================================
    /// The submitted passcode is malformed.
    #[error("Invalid OTP: {0}")]
    InvalidOtp(#[from] OtpError),

    /// The access controller task is no longer running.
    #[error("Access controller has stopped")]
    ControllerStopped,

    // =========================================================================
    // HARDWARE ERRORS
    // =========================================================================
    /// The lock relay could not be driven.
    #[error("Actuator fault: {0}")]
    ActuatorFault(#[from] ActuatorError),

    /// A health sample could not be taken.
    #[error("Health sampler fault: {0}")]
    SamplerFault(#[from] SamplerError),

    /// A status frame could not be interpreted.
    #[error("Malformed status frame: {0}")]
    MalformedFrame(#[from] FrameError),

    // =========================================================================
    // BLUETOOTH ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and bluetoothd is running."
    )]
    BluetoothAdapterNotFound,

    /// The BLE transport failed.
    #[error("Bluetooth transport error: {0}")]
    TransportFault(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // I/O ERRORS
    // =========================================================================
    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for guardian operations.
pub type Result<T> = std::result::Result<T, GuardianError>;

impl GuardianError {
    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to Bluetooth.
    #[inline]
    #[must_use]
    pub const fn is_bluetooth_error(&self) -> bool {
        matches!(
            self,
            Self::BluetoothAdapterNotFound | Self::TransportFault(_)
        )
    }

    /// Returns `true` if this error represents an expected operational state
    /// rather than a system failure.
    #[inline]
    #[must_use]
    pub const fn is_expected_state(&self) -> bool {
        matches!(self, Self::InvalidOtp(_))
    }

    /// Returns `true` if this error is recovered locally without operator
    /// intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidOtp(_)
                | Self::ActuatorFault(_)
                | Self::SamplerFault(_)
                | Self::TransportFault(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidOtp(_) | Self::MalformedFrame(_) => 400,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 404 Not Found
            Self::ConfigNotFound(_) => 404,

            // 500 Internal Server Error - server-side issues
            Self::ActuatorFault(_) | Self::SamplerFault(_) | Self::IoError(_) => 500,

            // 503 Service Unavailable
            Self::ControllerStopped
            | Self::BluetoothAdapterNotFound
            | Self::TransportFault(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidOtp(_) => "INVALID_OTP",
            Self::ControllerStopped => "CONTROLLER_STOPPED",
            Self::ActuatorFault(_) => "ACTUATOR_FAULT",
            Self::SamplerFault(_) => "SAMPLER_FAULT",
            Self::MalformedFrame(_) => "MALFORMED_FRAME",
            Self::BluetoothAdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::TransportFault(_) => "TRANSPORT_FAULT",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for GuardianError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path.into()),
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::WriteError { source, .. } => Self::IoError(source),
            e @ ConfigError::ValidationError { .. } => Self::ConfigValidationError(e.to_string()),
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

#[cfg(feature = "bluetooth")]
impl From<bluer::Error> for GuardianError {
    fn from(err: bluer::Error) -> Self {
        Self::TransportFault(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_otp_error_is_expected_state() {
        let err: GuardianError = OtpError::WrongLength { actual: 3 }.into();
        assert!(err.is_expected_state());
        assert!(err.is_recoverable());
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.error_code(), "INVALID_OTP");
    }

    #[test]
    fn test_config_error_classification() {
        assert!(GuardianError::ConfigNotFound(PathBuf::from("/test")).is_config_error());
        assert!(GuardianError::ConfigParseError("syntax error".into()).is_config_error());
        assert!(GuardianError::ConfigValidationError("bad".into()).is_config_error());
        assert!(!GuardianError::ControllerStopped.is_config_error());
    }

    #[test]
    fn test_bluetooth_error_classification() {
        assert!(GuardianError::BluetoothAdapterNotFound.is_bluetooth_error());
        assert!(GuardianError::TransportFault("gone".into()).is_bluetooth_error());
        assert!(!GuardianError::ControllerStopped.is_bluetooth_error());
    }

    #[test]
    fn test_recoverable_errors() {
        let sampler = SamplerError::Parse {
            what: "uptime",
            input: String::new(),
        };
        assert!(GuardianError::from(sampler).is_recoverable());
        assert!(GuardianError::from(ActuatorError::Released).is_recoverable());
        assert!(!GuardianError::ControllerStopped.is_recoverable());
        assert!(!GuardianError::BluetoothAdapterNotFound.is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(GuardianError::ControllerStopped.http_status_code(), 503);
        assert_eq!(
            GuardianError::ConfigParseError("x".into()).http_status_code(),
            422
        );
        assert_eq!(
            GuardianError::ConfigNotFound(PathBuf::new()).http_status_code(),
            404
        );
        assert_eq!(
            GuardianError::IoError(IoErr::new(ErrorKind::Other, "x")).http_status_code(),
            500
        );
    }

    #[test]
    fn test_from_config_error() {
        use crate::config::ConfigError;

        let err: GuardianError = ConfigError::NotFound("/etc/guardian/config.toml".into()).into();
        assert!(matches!(err, GuardianError::ConfigNotFound(_)));

        let err: GuardianError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "relay.gpio_pin",
                message: "too big".into(),
            },
            ConfigError::ValidationError {
                field: "http.bind",
                message: "bad".into(),
            },
        ])
        .into();
        let text = err.to_string();
        assert!(text.contains("relay.gpio_pin"));
        assert!(text.contains("http.bind"));
    }

    #[test]
    fn test_error_display_messages() {
        let err: GuardianError = OtpError::NonDigit { position: 2 }.into();
        assert!(err.to_string().contains("position 2"));
        assert!(GuardianError::BluetoothAdapterNotFound
            .to_string()
            .contains("No Bluetooth adapter found"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<GuardianError>();
        assert_sync::<GuardianError>();
    }
}
