//! One-time passcode validation.
//!
//! The remote client writes the code as raw bytes. A payload is accepted
//! only when it is exactly [`OTP_LENGTH`] ASCII decimal digits; anything
//! else is rejected before the controller state is touched.

use std::fmt;

use thiserror::Error;

/// Number of digits in a passcode.
pub const OTP_LENGTH: usize = 6;

/// Reasons an OTP payload is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OtpError {
    /// The payload is not exactly six bytes long.
    #[error("OTP must be exactly {OTP_LENGTH} digits (got {actual} bytes)")]
    WrongLength {
        /// Length of the rejected payload.
        actual: usize,
    },

    /// The payload contains a byte that is not an ASCII decimal digit.
    #[error("OTP contains a non-digit character at position {position}")]
    NonDigit {
        /// Zero-based index of the first offending byte.
        position: usize,
    },
}

/// Result type for OTP validation.
pub type OtpResult<T> = std::result::Result<T, OtpError>;

/// A validated six-digit passcode.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OtpCode([u8; OTP_LENGTH]);

impl OtpCode {
    /// Validate a raw payload.
    ///
    /// # Errors
    ///
    /// Returns [`OtpError::WrongLength`] or [`OtpError::NonDigit`].
    pub fn parse(payload: &[u8]) -> OtpResult<Self> {
        let digits: [u8; OTP_LENGTH] = payload
            .try_into()
            .map_err(|_| OtpError::WrongLength {
                actual: payload.len(),
            })?;

        if let Some(position) = digits.iter().position(|b| !b.is_ascii_digit()) {
            return Err(OtpError::NonDigit { position });
        }

        Ok(Self(digits))
    }

    /// Masked form for displays and logs.
    #[must_use]
    pub fn masked() -> &'static str {
        "******"
    }
}

// Codes never appear in Debug output.
impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OtpCode").field(&Self::masked()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_codes() {
        for code in ["123456", "000000", "999999"] {
            let otp = OtpCode::parse(code.as_bytes()).unwrap();
            assert_eq!(otp, OtpCode(code.as_bytes().try_into().unwrap()));
        }
    }

    #[test]
    fn test_wrong_length() {
        assert_eq!(
            OtpCode::parse(b""),
            Err(OtpError::WrongLength { actual: 0 })
        );
        assert_eq!(
            OtpCode::parse(b"12345"),
            Err(OtpError::WrongLength { actual: 5 })
        );
        assert_eq!(
            OtpCode::parse(b"1234567"),
            Err(OtpError::WrongLength { actual: 7 })
        );
    }

    #[test]
    fn test_non_digit() {
        assert_eq!(
            OtpCode::parse(b"12a456"),
            Err(OtpError::NonDigit { position: 2 })
        );
        assert_eq!(
            OtpCode::parse(b" 23456"),
            Err(OtpError::NonDigit { position: 0 })
        );
        // Unicode digits are not ASCII digits.
        assert!(OtpCode::parse("١٢٣".as_bytes()).is_err());
        // Non-UTF-8 bytes.
        assert_eq!(
            OtpCode::parse(&[0xff, b'1', b'2', b'3', b'4', b'5']),
            Err(OtpError::NonDigit { position: 0 })
        );
    }

    #[test]
    fn test_every_single_byte_substitution_is_checked() {
        for position in 0..OTP_LENGTH {
            for byte in (0u8..=255).filter(|b| !b.is_ascii_digit()) {
                let mut payload = *b"123456";
                payload[position] = byte;
                assert_eq!(
                    OtpCode::parse(&payload),
                    Err(OtpError::NonDigit { position })
                );
            }
        }
    }

    #[test]
    fn test_debug_is_masked() {
        let otp = OtpCode::parse(b"424242").unwrap();
        assert!(!format!("{otp:?}").contains("424242"));
    }
}
