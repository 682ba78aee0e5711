//! In-memory collaborators for running without hardware.
//!
//! [`SimulatedRelay`] backs the `simulated` relay backend and, together with
//! [`RecordingDisplay`] and [`ScriptedSampler`], lets tests observe exactly
//! what the access controller asked the outside world to do.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::actuator::{fit_line, ActuatorError, ActuatorResult, Display, LockActuator};
use crate::health::{HealthSampler, SamplerError, SamplerResult};
use crate::types::HealthReading;

/// Commands a [`SimulatedRelay`] remembers; older ones are dropped.
pub const RELAY_LOG_CAPACITY: usize = 256;

/// A command received by a [`SimulatedRelay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand {
    /// `open()`
    Open,
    /// `close()`
    Close,
    /// `release()`
    Release,
}

impl RelayCommand {
    const fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Release => "release",
        }
    }
}

/// Relay that records commands instead of driving hardware.
///
/// Clones share the same command log, which keeps the last
/// [`RELAY_LOG_CAPACITY`] commands.
#[derive(Debug, Clone, Default)]
pub struct SimulatedRelay {
    log: Arc<Mutex<VecDeque<RelayCommand>>>,
    fail: Arc<Mutex<bool>>,
}

impl SimulatedRelay {
    /// A relay with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recent commands, oldest first.
    #[must_use]
    pub fn commands(&self) -> Vec<RelayCommand> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    /// Make every following command fail after being recorded.
    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap_or_else(PoisonError::into_inner) = failing;
    }

    fn record(&self, command: RelayCommand) -> ActuatorResult<()> {
        info!(target: "guardian::relay", ?command, "simulated relay");
        {
            let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            if log.len() == RELAY_LOG_CAPACITY {
                log.pop_front();
            }
            log.push_back(command);
        }

        if *self.fail.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(ActuatorError::Simulated(command.name()));
        }
        Ok(())
    }
}

impl LockActuator for SimulatedRelay {
    fn open(&mut self) -> ActuatorResult<()> {
        self.record(RelayCommand::Open)
    }

    fn close(&mut self) -> ActuatorResult<()> {
        self.record(RelayCommand::Close)
    }

    fn release(&mut self) -> ActuatorResult<()> {
        self.record(RelayCommand::Release)
    }
}

/// Display that keeps every pair of lines it was asked to show.
///
/// Clones share the same history.
#[derive(Debug, Clone, Default)]
pub struct RecordingDisplay {
    lines: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingDisplay {
    /// A display with an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All shown line pairs, oldest first, truncated as a real display would.
    #[must_use]
    pub fn history(&self) -> Vec<(String, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// First lines only.
    #[must_use]
    pub fn headlines(&self) -> Vec<String> {
        self.history().into_iter().map(|(line1, _)| line1).collect()
    }
}

impl Display for RecordingDisplay {
    fn show(&mut self, line1: &str, line2: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((fit_line(line1).to_string(), fit_line(line2).to_string()));
    }
}

/// Sampler that replays a script of results.
///
/// Once the script is exhausted every further sample fails.
#[derive(Debug, Default)]
pub struct ScriptedSampler {
    script: Mutex<VecDeque<Option<HealthReading>>>,
}

impl ScriptedSampler {
    /// Build from a script; `None` entries produce a sampler error.
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = Option<HealthReading>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    fn next(&self) -> Option<HealthReading> {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .flatten()
    }
}

impl HealthSampler for ScriptedSampler {
    async fn sample(&self) -> SamplerResult<HealthReading> {
        self.next().ok_or_else(|| SamplerError::Command {
            command: "scripted".to_string(),
            message: "no reading scripted".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SafetyStatus;

    #[test]
    fn test_relay_clones_share_log() {
        let relay = SimulatedRelay::new();
        let mut handle = relay.clone();
        handle.open().unwrap();
        handle.close().unwrap();
        assert_eq!(relay.commands(), vec![RelayCommand::Open, RelayCommand::Close]);
    }

    #[test]
    fn test_failing_relay_still_records() {
        let mut relay = SimulatedRelay::new();
        relay.set_failing(true);
        assert!(matches!(relay.open(), Err(ActuatorError::Simulated("open"))));
        assert_eq!(relay.commands(), vec![RelayCommand::Open]);
    }

    #[test]
    fn test_relay_log_is_bounded() {
        let mut relay = SimulatedRelay::new();
        for _ in 0..RELAY_LOG_CAPACITY {
            relay.open().unwrap();
        }
        relay.close().unwrap();

        let commands = relay.commands();
        assert_eq!(commands.len(), RELAY_LOG_CAPACITY);
        assert_eq!(commands.first(), Some(&RelayCommand::Open));
        assert_eq!(commands.last(), Some(&RelayCommand::Close));
    }

    #[test]
    fn test_display_truncates() {
        let display = RecordingDisplay::new();
        display.clone().show("A very long first line", "ok");
        assert_eq!(
            display.history(),
            vec![("A very long firs".to_string(), "ok".to_string())]
        );
    }

    #[tokio::test]
    async fn test_scripted_sampler() {
        let reading = HealthReading::from_volts(80, 11.5, SafetyStatus::Active);
        let sampler = ScriptedSampler::new([Some(reading), None]);
        assert_eq!(sampler.sample().await.unwrap(), reading);
        assert!(sampler.sample().await.is_err());
        assert!(sampler.sample().await.is_err());
    }
}
