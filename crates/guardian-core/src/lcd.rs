//! 16x2 HD44780 character LCD behind a PCF8574 I2C backpack.
//!
//! The controller is driven in 4-bit mode. Each expander byte carries one
//! nibble on P4..P7 plus the register select, enable and backlight lines.
//! Lines are written in place and padded to the full width, so a new
//! message never needs the slow clear command.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::actuator::{fit_line, Display, DISPLAY_COLUMNS};

/// Usual address of a PCF8574 backpack.
pub const DEFAULT_I2C_ADDRESS: u16 = 0x27;

const REGISTER_SELECT: u8 = 0x01;
const ENABLE: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CLEAR: u8 = 0x01;
const ENTRY_MODE_LEFT: u8 = 0x06;
const DISPLAY_ON: u8 = 0x0C;
const FUNCTION_4BIT_2LINE: u8 = 0x28;
const LINE_ADDRESS: [u8; 2] = [0x80, 0xC0];

/// Byte sink in front of the LCD.
pub trait LcdBus: Send + 'static {
    /// Transport error.
    type Error: fmt::Display;

    /// Write one byte to the port expander.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the expander did not take the byte.
    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error>;
}

#[cfg(feature = "gpio")]
impl LcdBus for rppal::i2c::I2c {
    type Error = rppal::i2c::Error;

    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.write(&[byte]).map(|_| ())
    }
}

/// Character LCD display.
pub struct LcdDisplay<B> {
    bus: B,
}

impl<B> fmt::Debug for LcdDisplay<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LcdDisplay").finish_non_exhaustive()
    }
}

#[cfg(feature = "gpio")]
impl LcdDisplay<rppal::i2c::I2c> {
    /// Open the backpack at `address` on I2C `bus` and initialise the LCD.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus cannot be opened or nothing answers at
    /// `address`.
    pub fn open(bus: u8, address: u16) -> Result<Self, rppal::i2c::Error> {
        let mut i2c = rppal::i2c::I2c::with_bus(bus)?;
        i2c.set_slave_address(address)?;
        Self::new(i2c)
    }
}

impl<B: LcdBus> LcdDisplay<B> {
    /// Run the power-on sequence over `bus` and blank the screen.
    ///
    /// # Errors
    ///
    /// Returns the bus error if any initialisation byte is refused.
    pub fn new(bus: B) -> Result<Self, B::Error> {
        let mut lcd = Self { bus };
        lcd.init()?;
        Ok(lcd)
    }

    fn init(&mut self) -> Result<(), B::Error> {
        thread::sleep(Duration::from_millis(50));
        // Force 8-bit mode three times whatever state the LCD is in, then
        // drop to 4-bit.
        for wait_us in [4500, 4500, 150] {
            self.pulse(0x30, 0)?;
            thread::sleep(Duration::from_micros(wait_us));
        }
        self.pulse(0x20, 0)?;

        for command in [FUNCTION_4BIT_2LINE, DISPLAY_ON, ENTRY_MODE_LEFT] {
            self.command(command)?;
        }
        self.clear_screen()
    }

    fn clear_screen(&mut self) -> Result<(), B::Error> {
        self.command(CLEAR)?;
        thread::sleep(Duration::from_millis(2));
        Ok(())
    }

    fn write_lines(&mut self, lines: [&str; 2]) -> Result<(), B::Error> {
        for (address, line) in LINE_ADDRESS.into_iter().zip(lines) {
            self.command(address)?;
            let cells = fit_line(line)
                .chars()
                .map(rom_char)
                .chain(std::iter::repeat(b' '))
                .take(DISPLAY_COLUMNS);
            for cell in cells {
                self.send(cell, REGISTER_SELECT)?;
            }
        }
        Ok(())
    }

    fn command(&mut self, byte: u8) -> Result<(), B::Error> {
        self.send(byte, 0)
    }

    fn send(&mut self, byte: u8, mode: u8) -> Result<(), B::Error> {
        self.pulse(byte & 0xF0, mode)?;
        self.pulse(byte << 4, mode)
    }

    fn pulse(&mut self, nibble: u8, mode: u8) -> Result<(), B::Error> {
        let data = nibble | mode | BACKLIGHT;
        self.bus.write_byte(data | ENABLE)?;
        self.bus.write_byte(data)
    }
}

impl<B: LcdBus> Display for LcdDisplay<B> {
    fn show(&mut self, line1: &str, line2: &str) {
        info!(target: "guardian::display", "LCD: {} | {}", fit_line(line1), fit_line(line2));
        if let Err(e) = self.write_lines([line1, line2]) {
            warn!(error = %e, "LCD write failed");
        }
    }

    fn clear(&mut self) {
        if let Err(e) = self.clear_screen() {
            warn!(error = %e, "LCD clear failed");
        }
    }
}

/// Printable ASCII maps to itself; anything else shows as `?`.
fn rom_char(c: char) -> u8 {
    u8::try_from(c)
        .ok()
        .filter(|b| (0x20..0x7F).contains(b))
        .unwrap_or(b'?')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Wire(Arc<Mutex<Vec<u8>>>);

    impl Wire {
        fn take(&self) -> Vec<u8> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl LcdBus for Wire {
        type Error = Infallible;

        fn write_byte(&mut self, byte: u8) -> Result<(), Infallible> {
            self.0.lock().unwrap().push(byte);
            Ok(())
        }
    }

    struct Refused;

    impl LcdBus for Refused {
        type Error = &'static str;

        fn write_byte(&mut self, _byte: u8) -> Result<(), &'static str> {
            Err("nack")
        }
    }

    /// Reassemble `(is_data, byte)` pairs from enable-strobed nibbles.
    fn decode(wire: &[u8]) -> Vec<(bool, u8)> {
        let nibbles: Vec<u8> = wire
            .chunks(2)
            .map(|strobe| {
                assert_eq!(strobe[0], strobe[1] | ENABLE);
                assert_ne!(strobe[1] & BACKLIGHT, 0);
                strobe[1]
            })
            .collect();
        nibbles
            .chunks(2)
            .map(|pair| {
                (
                    pair[0] & REGISTER_SELECT != 0,
                    (pair[0] & 0xF0) | (pair[1] >> 4),
                )
            })
            .collect()
    }

    fn padded(text: &str) -> Vec<(bool, u8)> {
        let mut cells: Vec<(bool, u8)> = text.bytes().map(|b| (true, b)).collect();
        cells.resize(DISPLAY_COLUMNS, (true, b' '));
        cells
    }

    #[test]
    fn test_init_ends_with_clear() {
        let wire = Wire::default();
        let _lcd = LcdDisplay::new(wire.clone()).unwrap();
        let bytes = wire.take();
        // Three 8-bit resets and the 4-bit switch are single nibbles.
        assert_eq!(bytes.len(), 4 * 2 + 4 * 4);
        let commands = decode(&bytes[8..]);
        assert_eq!(
            commands,
            vec![
                (false, FUNCTION_4BIT_2LINE),
                (false, DISPLAY_ON),
                (false, ENTRY_MODE_LEFT),
                (false, CLEAR),
            ]
        );
    }

    #[test]
    fn test_show_writes_both_lines_padded() {
        let wire = Wire::default();
        let mut lcd = LcdDisplay::new(wire.clone()).unwrap();
        wire.take();

        lcd.show("Lock Opened!", "Remove Items");

        let mut expected = vec![(false, 0x80)];
        expected.extend(padded("Lock Opened!"));
        expected.push((false, 0xC0));
        expected.extend(padded("Remove Items"));
        assert_eq!(decode(&wire.take()), expected);
    }

    #[test]
    fn test_long_and_non_ascii_lines() {
        let wire = Wire::default();
        let mut lcd = LcdDisplay::new(wire.clone()).unwrap();
        wire.take();

        lcd.show("0123456789abcdefXYZ", "café");

        let written = decode(&wire.take());
        assert_eq!(written[1..17], padded("0123456789abcdef")[..]);
        assert_eq!(written[18..], padded("caf?")[..]);
    }

    #[test]
    fn test_refused_bus_fails_init() {
        assert_eq!(LcdDisplay::new(Refused).unwrap_err(), "nack");
    }
}
