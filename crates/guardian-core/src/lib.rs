//! # guardian-core
//!
//! Core access control logic for the guardian OTP-gated lockbox.
//!
//! A remote client writes a six digit one-time passcode. On success the
//! controller opens the lock, reports the new state to every subscriber and
//! closes the lock again after a fixed interval unless a fresh passcode
//! re-arms it. A compact six byte status frame carries verification state,
//! lock state and device health.
//!
//! ## Architecture
//!
//! - [`access`] - The access control state machine (an actor) and its handle
//! - [`telemetry`] - Status frame encoding and decoding
//! - [`otp`] - OTP payload validation
//! - [`notify`] - Broadcast fan-out of status frames
//! - [`health`] - Health sampling from the host
//! - [`refresh`] - Periodic health refresh task
//! - [`actuator`] - Lock relay and display interfaces with their built-in backends
//! - [`lcd`] - I2C character LCD display
//! - [`simulated`] - In-memory relay, display and sampler
//! - [`config`] - Configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas
//! - `gatt` - BLE GATT peripheral (feature `bluetooth`)

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod access;
pub mod actuator;
pub mod config;
pub mod error;
#[cfg(feature = "bluetooth")]
pub mod gatt;
pub mod health;
pub mod lcd;
pub mod notify;
pub mod otp;
pub mod refresh;
pub mod simulated;
pub mod telemetry;
pub mod types;

// Re-export primary types for convenience
pub use access::{AccessController, StatusReport, AUTO_CLOSE_DELAY, SETTLE_DELAY};
#[cfg(feature = "gpio")]
pub use actuator::GpioRelay;
pub use actuator::{ActuatorError, Display, LockActuator, LogDisplay, SysfsRelay};
pub use config::{Config, ConfigError, ConfigResult, DisplayBackend, RelayBackend};
pub use error::{GuardianError, Result};
#[cfg(feature = "bluetooth")]
pub use gatt::GattServer;
pub use health::{BuiltinSampler, HealthSampler, HostSampler, SamplerError};
pub use lcd::LcdDisplay;
pub use notify::{NotificationHub, StatusSubscription};
pub use otp::{OtpCode, OtpError};
pub use simulated::SimulatedRelay;
pub use telemetry::{FrameError, StatusFrame};
pub use types::{HealthReading, LockState, SafetyStatus, StatusSnapshot};
