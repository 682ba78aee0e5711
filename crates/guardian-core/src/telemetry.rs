//! Status frame encoding.
//!
//! The remote client reads (and is notified with) a fixed six byte frame:
//!
//! ```text
//! offset  field             encoding
//! 0       otp_verified      0 | 1
//! 1       lock_open         0 | 1
//! 2       battery_percent   0..=100, clamped
//! 3       safety_status     0 inactive, 1 active, 2 maintenance, 3 offline
//! 4       voltage_tenths    high byte, (v*10) >> 8 & 0xff
//! 5       voltage_tenths    low byte,  (v*10) & 0xff
//! ```
//!
//! The frame is a view over controller state and is recomputed on every
//! read; it is never stored as a source of truth.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{HealthReading, LockState, SafetyStatus, StatusSnapshot};

/// Size of an encoded status frame.
pub const FRAME_LEN: usize = 6;

/// Errors raised when interpreting bytes as a status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Payload is not [`FRAME_LEN`] bytes long.
    #[error("status frame must be {FRAME_LEN} bytes (got {actual})")]
    BadLength {
        /// Length of the rejected payload.
        actual: usize,
    },

    /// Byte 3 does not name a known safety status.
    #[error("unknown safety status byte: {0}")]
    UnknownSafetyStatus(u8),
}

/// Encoded six byte status frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusFrame([u8; FRAME_LEN]);

impl StatusFrame {
    /// Wrap raw bytes received from elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::BadLength`] if `bytes` is not six bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let raw: [u8; FRAME_LEN] = bytes.try_into().map_err(|_| FrameError::BadLength {
            actual: bytes.len(),
        })?;
        Ok(Self(raw))
    }

    /// Borrow the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// Owned copy of the bytes, as handed to the transport.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Lower-case hex rendering, e.g. `000064010078`.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for StatusFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusFrame({:?})", self.0)
    }
}

impl From<StatusFrame> for Vec<u8> {
    fn from(frame: StatusFrame) -> Self {
        frame.to_vec()
    }
}

/// Encode controller state into a status frame.
///
/// Battery is clamped to `0..=100`. Voltage tenths keep only their low 16
/// bits, masked byte by byte: `-7` becomes `ff f9`, `70000` becomes `11 70`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn encode(otp_verified: bool, lock_open: bool, health: &HealthReading) -> StatusFrame {
    let battery = u8::try_from(health.battery_percent.clamp(0, 100)).unwrap_or(100);
    let tenths = health.voltage_tenths;
    let volt_hi = ((tenths >> 8) & 0xFF) as u8;
    let volt_lo = (tenths & 0xFF) as u8;

    StatusFrame([
        u8::from(otp_verified),
        u8::from(lock_open),
        battery,
        health.safety.as_byte(),
        volt_hi,
        volt_lo,
    ])
}

/// Encode a typed snapshot.
#[must_use]
pub fn encode_snapshot(snapshot: &StatusSnapshot) -> StatusFrame {
    encode(
        snapshot.otp_verified,
        snapshot.lock.is_open(),
        &snapshot.health,
    )
}

/// Decode a frame back into a snapshot.
///
/// Only the fields that survive encoding are recovered: battery comes back
/// clamped and voltage comes back in whole tenths.
///
/// # Errors
///
/// Returns [`FrameError::UnknownSafetyStatus`] if byte 3 is not `0..=3`.
pub fn decode(frame: &StatusFrame) -> Result<StatusSnapshot, FrameError> {
    let [verified, open, battery, safety, volt_hi, volt_lo] = frame.0;
    let safety = SafetyStatus::from_byte(safety).ok_or(FrameError::UnknownSafetyStatus(safety))?;

    Ok(StatusSnapshot {
        otp_verified: verified != 0,
        lock: if open != 0 {
            LockState::Open
        } else {
            LockState::Locked
        },
        health: HealthReading {
            battery_percent: i32::from(battery),
            voltage_tenths: i32::from(u16::from_be_bytes([volt_hi, volt_lo])),
            safety,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(battery: i32, tenths: i32) -> HealthReading {
        HealthReading {
            battery_percent: battery,
            voltage_tenths: tenths,
            safety: SafetyStatus::Active,
        }
    }

    #[test]
    fn test_boot_frame() {
        let frame = encode(false, false, &HealthReading::default());
        assert_eq!(frame.as_bytes(), &[0, 0, 100, 1, 0, 120]);
        assert_eq!(frame.to_hex(), "000064010078");
    }

    #[test]
    fn test_open_and_verified_flags() {
        let frame = encode(true, true, &HealthReading::default());
        assert_eq!(frame.as_bytes()[0], 1);
        assert_eq!(frame.as_bytes()[1], 1);
    }

    #[test]
    fn test_battery_is_clamped() {
        assert_eq!(encode(false, false, &health(-5, 120)).as_bytes()[2], 0);
        assert_eq!(encode(false, false, &health(150, 120)).as_bytes()[2], 100);
        assert_eq!(encode(false, false, &health(42, 120)).as_bytes()[2], 42);
    }

    #[test]
    fn test_voltage_bytes_are_big_endian() {
        // 300.0 V -> 3000 tenths -> 0x0bb8
        let frame = encode(false, false, &health(100, 3000));
        assert_eq!(frame.as_bytes()[4], 0x0b);
        assert_eq!(frame.as_bytes()[5], 0xb8);
    }

    #[test]
    fn test_voltage_keeps_low_sixteen_bits() {
        let frame = encode(false, false, &health(100, -7));
        assert_eq!(&frame.as_bytes()[4..], &[0xFF, 0xF9]);

        // 7000.0 V -> 70000 tenths -> 0x0001_1170
        let frame = encode(false, false, &health(100, 70_000));
        assert_eq!(&frame.as_bytes()[4..], &[0x11, 0x70]);
    }

    #[test]
    fn test_safety_byte() {
        let mut reading = HealthReading::default();
        reading.safety = SafetyStatus::Maintenance;
        assert_eq!(encode(false, false, &reading).as_bytes()[3], 2);
        reading.safety = SafetyStatus::Offline;
        assert_eq!(encode(false, false, &reading).as_bytes()[3], 3);
    }

    #[test]
    fn test_decode_recovers_surviving_fields() {
        let snapshot = StatusSnapshot {
            otp_verified: true,
            lock: LockState::Open,
            health: HealthReading::from_volts(150, 12.87, SafetyStatus::Maintenance),
        };
        let decoded = decode(&encode_snapshot(&snapshot)).unwrap();

        assert!(decoded.otp_verified);
        assert_eq!(decoded.lock, LockState::Open);
        assert_eq!(decoded.health.battery_percent, 100);
        assert_eq!(decoded.health.voltage_tenths, 128);
        assert_eq!(decoded.health.safety, SafetyStatus::Maintenance);
    }

    #[test]
    fn test_decode_rejects_unknown_safety() {
        let frame = StatusFrame::from_bytes(&[0, 0, 100, 9, 0, 120]).unwrap();
        assert_eq!(decode(&frame), Err(FrameError::UnknownSafetyStatus(9)));
    }

    #[test]
    fn test_from_bytes_rejects_bad_length() {
        assert_eq!(
            StatusFrame::from_bytes(&[0, 0, 100]),
            Err(FrameError::BadLength { actual: 3 })
        );
    }
}
