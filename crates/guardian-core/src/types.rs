//! Shared domain types.
//!
//! These are the plain values that flow into and out of the access
//! controller. The wire encoding lives in [`crate::telemetry`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Physical state of the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Relay de-energised, box secured.
    #[default]
    Locked,
    /// Relay energised, box accessible until the auto-close deadline.
    Open,
}

impl LockState {
    /// Returns `true` when the lock is open.
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Whether the actuation subsystem is currently operable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SafetyStatus {
    /// Subsystem powered down.
    Inactive = 0,
    /// Normal operation.
    #[default]
    Active = 1,
    /// Taken out of service for maintenance.
    Maintenance = 2,
    /// Not reachable.
    Offline = 3,
}

impl SafetyStatus {
    /// Wire byte for this status.
    #[inline]
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte. Returns `None` for values outside `0..=3`.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Inactive),
            1 => Some(Self::Active),
            2 => Some(Self::Maintenance),
            3 => Some(Self::Offline),
            _ => None,
        }
    }
}

/// Battery, voltage and safety snapshot of the host.
///
/// Voltage is kept in tenths of a volt so it survives the integer wire
/// encoding with one decimal digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthReading {
    /// Remaining battery, nominally `0..=100`. Out-of-range values are
    /// clamped when encoded.
    #[schema(example = 100)]
    pub battery_percent: i32,

    /// Supply voltage ×10.
    #[schema(example = 120)]
    pub voltage_tenths: i32,

    /// Actuation subsystem status.
    pub safety: SafetyStatus,
}

impl HealthReading {
    /// Battery reported before the first successful sample.
    pub const DEFAULT_BATTERY_PERCENT: i32 = 100;

    /// 12.0 V.
    pub const DEFAULT_VOLTAGE_TENTHS: i32 = 120;

    /// Build a reading from a voltage in volts, keeping one decimal digit.
    ///
    /// The fractional part beyond the first decimal is truncated, not rounded.
    #[must_use]
    pub fn from_volts(battery_percent: i32, volts: f64, safety: SafetyStatus) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let voltage_tenths = (volts * 10.0) as i32;
        Self {
            battery_percent,
            voltage_tenths,
            safety,
        }
    }

    /// Voltage in volts.
    #[must_use]
    pub fn volts(&self) -> f64 {
        f64::from(self.voltage_tenths) / 10.0
    }
}

impl Default for HealthReading {
    fn default() -> Self {
        Self {
            battery_percent: Self::DEFAULT_BATTERY_PERCENT,
            voltage_tenths: Self::DEFAULT_VOLTAGE_TENTHS,
            safety: SafetyStatus::Active,
        }
    }
}

/// Typed view of the controller state, derived on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "otp_verified": true,
    "lock": "open",
    "health": {
        "battery_percent": 98,
        "voltage_tenths": 120,
        "safety": "active"
    }
}))]
pub struct StatusSnapshot {
    /// Whether the last accepted OTP is still in effect.
    pub otp_verified: bool,

    /// Current lock state.
    pub lock: LockState,

    /// Last stored health reading.
    pub health: HealthReading,
}
