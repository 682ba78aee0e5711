//! Application configuration management.
//!
//! Configuration is read from a TOML file and layered with environment
//! overrides of the form `GUARDIAN__SECTION__KEY` (for example
//! `GUARDIAN__HTTP__BIND=0.0.0.0:3000`). A missing file yields defaults.
//!
//! ```toml
//! [device]
//! name = "GuardianSafe"
//!
//! [relay]
//! backend = "gpio"
//! gpio_pin = 18
//!
//! [display]
//! backend = "lcd"
//! i2c_address = 39
//!
//! [health]
//! refresh_interval_secs = 60
//!
//! [http]
//! enabled = true
//! bind = "127.0.0.1:3000"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "GUARDIAN_CONFIG";

/// Prefix for per-key environment overrides.
pub const ENV_PREFIX: &str = "GUARDIAN";

/// Highest BCM GPIO line on a Raspberry Pi.
const MAX_GPIO_PIN: u32 = 53;

/// Longest name BlueZ accepts for an adapter alias.
const MAX_DEVICE_NAME_LEN: usize = 248;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required config file does not exist.
    #[error("configuration file not found: {0}")]
    NotFound(String),

    /// The file or environment could not be parsed into a [`Config`].
    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// The configuration could not be rendered as TOML.
    #[error("failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// The configuration could not be written.
    #[error("failed to write {path}: {source}")]
    WriteError {
        /// Destination path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// One field holds an invalid value.
    #[error("invalid {field}: {message}")]
    ValidationError {
        /// Dotted field name, e.g. `relay.gpio_pin`.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device identity.
    pub device: DeviceConfig,
    /// Lock relay.
    pub relay: RelayConfig,
    /// Feedback display.
    pub display: DisplayConfig,
    /// Health sampling.
    pub health: HealthConfig,
    /// Local diagnostics API.
    pub http: HttpConfig,
    /// BLE peripheral.
    pub bluetooth: BluetoothConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// Device identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Advertised local name.
    pub name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "GuardianSafe".to_string(),
        }
    }
}

/// How the lock relay is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayBackend {
    /// GPIO line through the GPIO character device.
    #[default]
    Gpio,
    /// GPIO line through the legacy `/sys/class/gpio` interface.
    Sysfs,
    /// No hardware; relay commands are only logged.
    Simulated,
}

/// Lock relay settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay driver.
    pub backend: RelayBackend,
    /// BCM pin number. The sysfs backend offsets it by the SoC chip base.
    pub gpio_pin: u32,
    /// Sysfs GPIO root, used by the `sysfs` backend.
    pub sysfs_root: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend: RelayBackend::Gpio,
            gpio_pin: 18,
            sysfs_root: PathBuf::from("/sys/class/gpio"),
        }
    }
}

/// Where display feedback goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayBackend {
    /// I2C character LCD, falling back to the log when it does not answer.
    #[default]
    Lcd,
    /// Log lines only.
    Log,
}

/// Display settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Display driver.
    pub backend: DisplayBackend,
    /// I2C bus number (`/dev/i2c-N`).
    pub i2c_bus: u8,
    /// 7-bit address of the LCD backpack.
    pub i2c_address: u16,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            backend: DisplayBackend::Lcd,
            i2c_bus: 1,
            i2c_address: crate::lcd::DEFAULT_I2C_ADDRESS,
        }
    }
}

/// Health sampling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds between periodic samples.
    pub refresh_interval_secs: u64,
    /// Uptime source used for the simulated battery drain.
    pub uptime_path: PathBuf,
    /// `vcgencmd` executable.
    pub vcgencmd: String,
    /// Upper bound on a `vcgencmd` invocation.
    pub command_timeout_ms: u64,
}

impl HealthConfig {
    /// Refresh period as a [`Duration`].
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            uptime_path: PathBuf::from("/proc/uptime"),
            vcgencmd: "vcgencmd".to_string(),
            command_timeout_ms: 2000,
        }
    }
}

/// Local diagnostics API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whether to serve the API at all.
    pub enabled: bool,
    /// Listen address.
    pub bind: String,
}

impl HttpConfig {
    /// Parsed listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if `bind` is not `host:port`.
    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::ValidationError {
                field: "http.bind",
                message: format!("'{}' is not a socket address: {e}", self.bind),
            })
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

/// BLE peripheral settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Whether to register the GATT application and advertise.
    pub enabled: bool,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// JSON file logs plus compact stdout instead of pretty stdout.
    pub production: bool,
}

impl Config {
    /// Load configuration from `path`, which must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file is missing, or a parse
    /// or validation error.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_or_default(path)
    }

    /// Load configuration from `path` if it exists, falling back to defaults,
    /// then apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.as_ref())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let write_error = |source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_error)
    }

    /// Check every field, collecting all violations.
    ///
    /// # Errors
    ///
    /// Returns the single violation, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        let name_len = self.device.name.trim().len();
        if name_len == 0 || self.device.name.len() > MAX_DEVICE_NAME_LEN {
            errors.push(ConfigError::ValidationError {
                field: "device.name",
                message: format!("must be 1-{MAX_DEVICE_NAME_LEN} bytes"),
            });
        }

        if self.relay.gpio_pin > MAX_GPIO_PIN {
            errors.push(ConfigError::ValidationError {
                field: "relay.gpio_pin",
                message: format!("{} is not a BCM pin (0-{MAX_GPIO_PIN})", self.relay.gpio_pin),
            });
        }

        if !(0x03..=0x77).contains(&self.display.i2c_address) {
            errors.push(ConfigError::ValidationError {
                field: "display.i2c_address",
                message: format!(
                    "{:#04x} is not a 7-bit I2C address",
                    self.display.i2c_address
                ),
            });
        }

        if self.health.refresh_interval_secs == 0 {
            errors.push(ConfigError::ValidationError {
                field: "health.refresh_interval_secs",
                message: "must be at least 1".to_string(),
            });
        }

        if !(1..=60_000).contains(&self.health.command_timeout_ms) {
            errors.push(ConfigError::ValidationError {
                field: "health.command_timeout_ms",
                message: "must be between 1 and 60000".to_string(),
            });
        }

        if self.http.enabled {
            if let Err(e) = self.http.socket_addr() {
                errors.push(e);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Path of the configuration file: `$GUARDIAN_CONFIG` if set, else the
    /// platform default.
    #[must_use]
    pub fn resolve_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV).map_or_else(default_config_path, PathBuf::from)
    }
}

/// Platform default config location.
///
/// On Raspberry Pi: `/etc/guardian/config.toml`
/// For development: `~/.config/guardian/config.toml`
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/guardian/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "guardian").map_or_else(
            || PathBuf::from("config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}
