//! Host health sampling.
//!
//! [`HostSampler`] approximates battery and supply voltage on a Raspberry
//! Pi without dedicated monitoring hardware: battery drains one percent per
//! hour of uptime, and the core voltage reported by `vcgencmd` is scaled up
//! to the nominal 12 V supply.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::HealthConfig;
use crate::types::{HealthReading, SafetyStatus};

/// Supply voltage assumed when `vcgencmd` is unavailable.
pub const FALLBACK_VOLTS: f64 = 12.0;

/// Ratio between the nominal supply and the SoC core voltage.
const CORE_TO_SUPPLY_SCALE: f64 = 10.0;

const SECS_PER_HOUR: f64 = 3600.0;

/// Sampler failures. Recovered by the refresh task.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// The uptime source could not be read.
    #[error("failed to read uptime from {}: {source}", path.display())]
    Uptime {
        /// Uptime file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A sample source produced output that could not be parsed.
    #[error("failed to parse {what}: {input:?}")]
    Parse {
        /// Which value was being parsed.
        what: &'static str,
        /// Offending input.
        input: String,
    },

    /// An external command could not be run or exited unsuccessfully.
    #[error("command '{command}' failed: {message}")]
    Command {
        /// Command that was run.
        command: String,
        /// Failure description.
        message: String,
    },

    /// An external command did not finish in time.
    #[error("command '{command}' timed out after {timeout_ms} ms")]
    Timeout {
        /// Command that was run.
        command: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },
}

/// Result type for health sampling.
pub type SamplerResult<T> = std::result::Result<T, SamplerError>;

/// Source of [`HealthReading`]s.
pub trait HealthSampler: Send + Sync + 'static {
    /// Take one reading.
    fn sample(&self) -> impl Future<Output = SamplerResult<HealthReading>> + Send;
}

// ============================================================================
// Host sampler
// ============================================================================

/// Samples the local host.
#[derive(Debug, Clone)]
pub struct HostSampler {
    uptime_path: PathBuf,
    vcgencmd: String,
    command_timeout: Duration,
}

impl HostSampler {
    /// Build a sampler from the `[health]` config section.
    #[must_use]
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            uptime_path: config.uptime_path.clone(),
            vcgencmd: config.vcgencmd.clone(),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        }
    }

    async fn uptime_secs(&self) -> SamplerResult<f64> {
        let content = tokio::fs::read_to_string(&self.uptime_path)
            .await
            .map_err(|source| SamplerError::Uptime {
                path: self.uptime_path.clone(),
                source,
            })?;
        parse_uptime(&content)
    }

    async fn core_volts(&self) -> SamplerResult<f64> {
        let command = format!("{} measure_volts core", self.vcgencmd);
        let output = tokio::time::timeout(
            self.command_timeout,
            Command::new(&self.vcgencmd)
                .args(["measure_volts", "core"])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| SamplerError::Timeout {
            command: command.clone(),
            timeout_ms: u64::try_from(self.command_timeout.as_millis()).unwrap_or(u64::MAX),
        })?
        .map_err(|e| SamplerError::Command {
            command: command.clone(),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(SamplerError::Command {
                command,
                message: format!("exited with {}", output.status),
            });
        }

        parse_measure_volts(&String::from_utf8_lossy(&output.stdout))
    }
}

impl HealthSampler for HostSampler {
    async fn sample(&self) -> SamplerResult<HealthReading> {
        let battery = battery_from_uptime(self.uptime_secs().await?);

        let volts = match self.core_volts().await {
            Ok(core) => core * CORE_TO_SUPPLY_SCALE,
            Err(e) => {
                debug!(error = %e, "core voltage unavailable, assuming {FALLBACK_VOLTS} V");
                FALLBACK_VOLTS
            }
        };

        Ok(HealthReading::from_volts(battery, volts, SafetyStatus::Active))
    }
}

/// Parse the first field of `/proc/uptime`.
///
/// # Errors
///
/// Returns [`SamplerError::Parse`] if the content has no leading number.
pub fn parse_uptime(content: &str) -> SamplerResult<f64> {
    content
        .split_whitespace()
        .next()
        .and_then(|field| field.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .ok_or_else(|| SamplerError::Parse {
            what: "uptime",
            input: content.trim().to_string(),
        })
}

/// Parse `vcgencmd measure_volts` output such as `volt=1.2000V`.
///
/// # Errors
///
/// Returns [`SamplerError::Parse`] if the output has no `volt=` value.
pub fn parse_measure_volts(output: &str) -> SamplerResult<f64> {
    output
        .trim()
        .split_once('=')
        .map(|(_, value)| value.trim_end_matches('V'))
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|volts| volts.is_finite())
        .ok_or_else(|| SamplerError::Parse {
            what: "measure_volts output",
            input: output.trim().to_string(),
        })
}

/// Simulated drain: one percent per full hour of uptime, floored at zero.
#[must_use]
pub fn battery_from_uptime(uptime_secs: f64) -> i32 {
    #[allow(clippy::cast_possible_truncation)]
    let hours = (uptime_secs / SECS_PER_HOUR).floor().min(100.0) as i32;
    (100 - hours).max(0)
}

// ============================================================================
// Fixed sampler
// ============================================================================

/// Sampler that always returns the same reading.
///
/// Used on hosts without `/proc/uptime`, and as a stand-in in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSampler(pub HealthReading);

impl HealthSampler for FixedSampler {
    async fn sample(&self) -> SamplerResult<HealthReading> {
        Ok(self.0)
    }
}

/// One of the built-in samplers, chosen at startup.
#[derive(Debug, Clone)]
pub enum BuiltinSampler {
    /// Reads the host.
    Host(HostSampler),
    /// Constant reading.
    Fixed(FixedSampler),
}

impl BuiltinSampler {
    /// The host sampler when the uptime source exists, otherwise a fixed
    /// default reading.
    #[must_use]
    pub fn detect(config: &HealthConfig) -> Self {
        if config.uptime_path.exists() {
            Self::Host(HostSampler::new(config))
        } else {
            warn!(
                path = %config.uptime_path.display(),
                "uptime source missing, reporting fixed health"
            );
            Self::Fixed(FixedSampler::default())
        }
    }
}

impl HealthSampler for BuiltinSampler {
    async fn sample(&self) -> SamplerResult<HealthReading> {
        match self {
            Self::Host(s) => s.sample().await,
            Self::Fixed(s) => s.sample().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(uptime_path: PathBuf, vcgencmd: &str) -> HealthConfig {
        HealthConfig {
            uptime_path,
            vcgencmd: vcgencmd.to_string(),
            ..HealthConfig::default()
        }
    }

    #[test]
    fn test_parse_uptime() {
        assert!((parse_uptime("7260.51 28000.10\n").unwrap() - 7260.51).abs() < 1e-9);
        assert!(parse_uptime("").is_err());
        assert!(parse_uptime("abc 1.0").is_err());
        assert!(parse_uptime("-3 1.0").is_err());
    }

    #[test]
    fn test_parse_measure_volts() {
        assert!((parse_measure_volts("volt=1.2000V\n").unwrap() - 1.2).abs() < 1e-9);
        assert!((parse_measure_volts("volt=0.8563V").unwrap() - 0.8563).abs() < 1e-9);
        assert!(parse_measure_volts("error").is_err());
        assert!(parse_measure_volts("volt=V").is_err());
    }

    #[test]
    fn test_battery_from_uptime() {
        assert_eq!(battery_from_uptime(0.0), 100);
        assert_eq!(battery_from_uptime(3599.0), 100);
        assert_eq!(battery_from_uptime(3600.0), 99);
        assert_eq!(battery_from_uptime(7.5 * 3600.0), 93);
        assert_eq!(battery_from_uptime(1_000.0 * 3600.0), 0);
    }

    #[tokio::test]
    async fn test_host_sampler_without_vcgencmd_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let uptime = dir.path().join("uptime");
        std::fs::write(&uptime, "7200.00 100.00\n").unwrap();

        let sampler = HostSampler::new(&config_with(uptime, "/nonexistent/vcgencmd"));
        let reading = sampler.sample().await.unwrap();

        assert_eq!(reading.battery_percent, 98);
        assert_eq!(reading.voltage_tenths, 120);
        assert_eq!(reading.safety, SafetyStatus::Active);
    }

    #[tokio::test]
    async fn test_host_sampler_missing_uptime_is_error() {
        let sampler = HostSampler::new(&config_with(
            PathBuf::from("/nonexistent/uptime"),
            "vcgencmd",
        ));
        assert!(matches!(
            sampler.sample().await,
            Err(SamplerError::Uptime { .. })
        ));
    }

    #[tokio::test]
    async fn test_fixed_sampler() {
        let reading = HealthReading::from_volts(55, 11.9, SafetyStatus::Maintenance);
        assert_eq!(FixedSampler(reading).sample().await.unwrap(), reading);
    }

    #[test]
    fn test_detect_picks_fixed_without_uptime() {
        let sampler = BuiltinSampler::detect(&config_with(PathBuf::from("/nonexistent/uptime"), "x"));
        assert!(matches!(sampler, BuiltinSampler::Fixed(_)));
    }
}
