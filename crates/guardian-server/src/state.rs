//! Application state shared across handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use guardian_core::{AccessController, Config};

/// State handed to every handler.
pub type SharedState = AppState;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Debug)]
struct AppStateInner {
    controller: AccessController,
    config: Config,
    started_at: DateTime<Utc>,
}

impl AppState {
    /// Wrap a running controller and the configuration it was built from.
    #[must_use]
    pub fn new(controller: AccessController, config: Config) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                controller,
                config,
                started_at: Utc::now(),
            }),
        }
    }

    /// Handle to the access controller.
    #[must_use]
    pub fn controller(&self) -> &AccessController {
        &self.inner.controller
    }

    /// Configuration loaded at startup.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// When the server started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// Whole seconds since the server started.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        let elapsed = Utc::now() - self.inner.started_at;
        u64::try_from(elapsed.num_seconds()).unwrap_or(0)
    }
}
