//! Lock actuator and display feedback.
//!
//! The access controller drives the physical world only through
//! [`LockActuator`] and [`Display`]. Both are fire-and-forget from the
//! controller's point of view: failures are logged and never change the
//! state machine's decisions.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

/// Character width of one display line.
pub const DISPLAY_COLUMNS: usize = 16;

/// Actuator failures. Non-fatal; the controller logs them.
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// Writing to the GPIO line failed.
    #[error("GPIO {pin} write to {} failed: {source}", path.display())]
    Gpio {
        /// BCM pin number.
        pin: u32,
        /// File that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The actuator has been released and can no longer be driven.
    #[error("actuator has been released")]
    Released,

    /// The GPIO character device refused the line.
    #[cfg(feature = "gpio")]
    #[error("GPIO {pin} unavailable: {source}")]
    Line {
        /// BCM pin number.
        pin: u32,
        /// Underlying driver error.
        #[source]
        source: rppal::gpio::Error,
    },

    /// The pin number cannot name a GPIO line.
    #[error("GPIO {0} does not exist")]
    InvalidPin(u32),

    /// Injected failure from a simulated relay.
    #[error("simulated relay fault on {0}")]
    Simulated(&'static str),
}

/// Result type for actuator commands.
pub type ActuatorResult<T> = std::result::Result<T, ActuatorError>;

/// Relay that holds the lock shut.
pub trait LockActuator: Send + 'static {
    /// Energise the relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware could not be driven.
    fn open(&mut self) -> ActuatorResult<()>;

    /// De-energise the relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware could not be driven.
    fn close(&mut self) -> ActuatorResult<()>;

    /// Hand the hardware back to the system. Called once during shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware could not be released cleanly.
    fn release(&mut self) -> ActuatorResult<()>;
}

/// Two-line text display.
pub trait Display: Send + 'static {
    /// Show two lines. Best-effort.
    fn show(&mut self, line1: &str, line2: &str);

    /// Blank the display.
    fn clear(&mut self) {
        self.show("", "");
    }
}

impl<T: LockActuator + ?Sized> LockActuator for Box<T> {
    fn open(&mut self) -> ActuatorResult<()> {
        (**self).open()
    }

    fn close(&mut self) -> ActuatorResult<()> {
        (**self).close()
    }

    fn release(&mut self) -> ActuatorResult<()> {
        (**self).release()
    }
}

impl<T: Display + ?Sized> Display for Box<T> {
    fn show(&mut self, line1: &str, line2: &str) {
        (**self).show(line1, line2);
    }

    fn clear(&mut self) {
        (**self).clear();
    }
}

/// Truncate a line to the display width, on character boundaries.
#[must_use]
pub fn fit_line(line: &str) -> &str {
    line.char_indices()
        .nth(DISPLAY_COLUMNS)
        .map_or(line, |(idx, _)| &line[..idx])
}

// ============================================================================
// GPIO relay
// ============================================================================

/// Relay on a BCM GPIO line driven through the GPIO character device.
///
/// The line is claimed as a low output on construction, so the lock starts
/// closed. Releasing drives it low and hands the line back.
#[cfg(feature = "gpio")]
#[derive(Debug)]
pub struct GpioRelay {
    pin: u32,
    line: Option<rppal::gpio::OutputPin>,
}

#[cfg(feature = "gpio")]
impl GpioRelay {
    /// Claim BCM `pin` as an output and drive it low.
    ///
    /// # Errors
    ///
    /// Returns [`ActuatorError::Line`] if the GPIO peripheral or the line is
    /// unavailable, or [`ActuatorError::InvalidPin`] for an impossible pin.
    pub fn new(pin: u32) -> ActuatorResult<Self> {
        let bcm = u8::try_from(pin).map_err(|_| ActuatorError::InvalidPin(pin))?;
        let line = rppal::gpio::Gpio::new()
            .and_then(|gpio| gpio.get(bcm))
            .map_err(|source| ActuatorError::Line { pin, source })?
            .into_output_low();

        info!(pin, "GPIO relay ready");
        Ok(Self {
            pin,
            line: Some(line),
        })
    }

    fn line(&mut self) -> ActuatorResult<&mut rppal::gpio::OutputPin> {
        self.line.as_mut().ok_or(ActuatorError::Released)
    }
}

#[cfg(feature = "gpio")]
impl LockActuator for GpioRelay {
    fn open(&mut self) -> ActuatorResult<()> {
        debug!(pin = self.pin, "relay high");
        self.line()?.set_high();
        Ok(())
    }

    fn close(&mut self) -> ActuatorResult<()> {
        debug!(pin = self.pin, "relay low");
        self.line()?.set_low();
        Ok(())
    }

    fn release(&mut self) -> ActuatorResult<()> {
        // Dropping the pin restores its previous mode.
        if let Some(mut line) = self.line.take() {
            line.set_low();
        }
        Ok(())
    }
}

// ============================================================================
// Sysfs relay
// ============================================================================

/// Relay on a GPIO line driven through the legacy sysfs GPIO interface.
///
/// `pin` is a BCM number. Sysfs numbers lines globally, so the pin is offset
/// by the base of the SoC GPIO chip (512 on recent Raspberry Pi kernels).
/// The line is exported and configured as a low output on construction,
/// so the lock starts closed.
#[derive(Debug)]
pub struct SysfsRelay {
    pin: u32,
    line: u32,
    root: PathBuf,
    released: bool,
}

impl SysfsRelay {
    /// Export BCM `pin` under `root` (normally `/sys/class/gpio`) and drive
    /// it low.
    ///
    /// # Errors
    ///
    /// Returns [`ActuatorError::Gpio`] if the line cannot be configured.
    pub fn new(root: impl Into<PathBuf>, pin: u32) -> ActuatorResult<Self> {
        let root = root.into();
        let base = soc_chip_base(&root).map_err(|source| ActuatorError::Gpio {
            pin,
            path: root.clone(),
            source,
        })?;
        let relay = Self {
            pin,
            line: base + pin,
            root,
            released: false,
        };

        if !relay.line_dir().exists() {
            relay.write(&relay.root.join("export"), &relay.line.to_string())?;
        }
        relay.write(&relay.line_dir().join("direction"), "out")?;
        relay.set_level(false)?;

        info!(pin, line = relay.line, root = %relay.root.display(), "sysfs GPIO relay ready");
        Ok(relay)
    }

    fn line_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.line))
    }

    fn set_level(&self, high: bool) -> ActuatorResult<()> {
        if self.released {
            return Err(ActuatorError::Released);
        }
        self.write(&self.line_dir().join("value"), if high { "1" } else { "0" })
    }

    fn write(&self, path: &Path, value: &str) -> ActuatorResult<()> {
        std::fs::write(path, value).map_err(|source| ActuatorError::Gpio {
            pin: self.pin,
            path: path.to_path_buf(),
            source,
        })
    }
}

impl LockActuator for SysfsRelay {
    fn open(&mut self) -> ActuatorResult<()> {
        debug!(pin = self.pin, "relay high");
        self.set_level(true)
    }

    fn close(&mut self) -> ActuatorResult<()> {
        debug!(pin = self.pin, "relay low");
        self.set_level(false)
    }

    fn release(&mut self) -> ActuatorResult<()> {
        if self.released {
            return Ok(());
        }
        self.set_level(false)?;
        self.released = true;
        self.write(&self.root.join("unexport"), &self.line.to_string())
    }
}

/// Base of the SoC GPIO chip under a sysfs GPIO root.
///
/// The SoC chip carries a `pinctrl-*` label. Without one the lowest chip
/// base is used, and a tree with no chips at all counts as base 0.
fn soc_chip_base(root: &Path) -> std::io::Result<u32> {
    let mut lowest: Option<u32> = None;
    for entry in std::fs::read_dir(root)? {
        let chip = entry?.path();
        let is_chip = chip
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("gpiochip"));
        if !is_chip {
            continue;
        }

        let Some(base) = read_trimmed(&chip.join("base")).and_then(|b| b.parse::<u32>().ok())
        else {
            continue;
        };
        if read_trimmed(&chip.join("label")).is_some_and(|label| label.starts_with("pinctrl-")) {
            return Ok(base);
        }
        lowest = Some(lowest.map_or(base, |low| low.min(base)));
    }
    Ok(lowest.unwrap_or(0))
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
}

// ============================================================================
// Log display
// ============================================================================

/// Display that writes its lines to the log.
///
/// Used when no character LCD is attached.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl Display for LogDisplay {
    fn show(&mut self, line1: &str, line2: &str) {
        info!(target: "guardian::display", "LCD: {} | {}", fit_line(line1), fit_line(line2));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("export"), "").unwrap();
        std::fs::write(dir.path().join("unexport"), "").unwrap();
        std::fs::create_dir(dir.path().join("gpio18")).unwrap();
        dir
    }

    fn read(dir: &tempfile::TempDir, file: &str) -> String {
        std::fs::read_to_string(dir.path().join(file)).unwrap()
    }

    #[test]
    fn test_fit_line() {
        assert_eq!(fit_line("Lock Opened!"), "Lock Opened!");
        assert_eq!(fit_line("0123456789abcdefXYZ"), "0123456789abcdef");
        assert_eq!(fit_line("ééééééééééééééééé").chars().count(), 16);
    }

    #[test]
    fn test_sysfs_relay_starts_low() {
        let dir = fake_sysfs();
        let _relay = SysfsRelay::new(dir.path(), 18).unwrap();
        assert_eq!(read(&dir, "gpio18/direction"), "out");
        assert_eq!(read(&dir, "gpio18/value"), "0");
    }

    #[test]
    fn test_sysfs_relay_open_close() {
        let dir = fake_sysfs();
        let mut relay = SysfsRelay::new(dir.path(), 18).unwrap();

        relay.open().unwrap();
        assert_eq!(read(&dir, "gpio18/value"), "1");

        relay.close().unwrap();
        assert_eq!(read(&dir, "gpio18/value"), "0");
    }

    #[test]
    fn test_sysfs_relay_release() {
        let dir = fake_sysfs();
        let mut relay = SysfsRelay::new(dir.path(), 18).unwrap();
        relay.open().unwrap();

        relay.release().unwrap();
        assert_eq!(read(&dir, "gpio18/value"), "0");
        assert_eq!(read(&dir, "unexport"), "18");
        assert!(matches!(relay.open(), Err(ActuatorError::Released)));
        // Releasing twice is harmless.
        relay.release().unwrap();
    }

    #[test]
    fn test_sysfs_relay_offsets_by_soc_chip_base() {
        let dir = tempfile::tempdir().unwrap();
        let chips = [
            ("gpiochip512", "pinctrl-bcm2711"),
            ("gpiochip504", "raspberrypi-exp-gpio"),
        ];
        for (chip, label) in chips {
            let chip_dir = dir.path().join(chip);
            std::fs::create_dir(&chip_dir).unwrap();
            std::fs::write(chip_dir.join("base"), format!("{}\n", &chip[8..])).unwrap();
            std::fs::write(chip_dir.join("label"), format!("{label}\n")).unwrap();
        }
        std::fs::write(dir.path().join("export"), "").unwrap();
        std::fs::write(dir.path().join("unexport"), "").unwrap();
        std::fs::create_dir(dir.path().join("gpio530")).unwrap();

        let mut relay = SysfsRelay::new(dir.path(), 18).unwrap();
        assert_eq!(read(&dir, "gpio530/value"), "0");
        relay.open().unwrap();
        assert_eq!(read(&dir, "gpio530/value"), "1");

        relay.release().unwrap();
        assert_eq!(read(&dir, "unexport"), "530");
    }

    #[test]
    fn test_soc_chip_base_without_label_uses_lowest() {
        let dir = tempfile::tempdir().unwrap();
        for base in ["570", "512"] {
            let chip_dir = dir.path().join(format!("gpiochip{base}"));
            std::fs::create_dir(&chip_dir).unwrap();
            std::fs::write(chip_dir.join("base"), base).unwrap();
        }
        assert_eq!(soc_chip_base(dir.path()).unwrap(), 512);

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(soc_chip_base(empty.path()).unwrap(), 0);
    }

    #[test]
    fn test_sysfs_relay_missing_root() {
        let err = SysfsRelay::new("/nonexistent/gpio", 18).unwrap_err();
        assert!(matches!(err, ActuatorError::Gpio { pin: 18, .. }));
    }
}
