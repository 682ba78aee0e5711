//! Periodic health refresh.
//!
//! Takes one sample at startup, then one per interval, and hands each
//! reading to the access controller. A failed sample keeps the previous
//! reading (or the default one if nothing has been sampled yet). The task
//! ends on its own once the controller stops.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::access::AccessController;
use crate::health::HealthSampler;
use crate::types::HealthReading;

/// Spawn the refresh task.
pub fn spawn<S: HealthSampler>(
    sampler: S,
    controller: AccessController,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(run(sampler, controller, period))
}

async fn run<S: HealthSampler>(sampler: S, controller: AccessController, period: Duration) {
    info!(period_secs = period.as_secs(), "health refresh started");

    let mut last: Option<HealthReading> = None;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // The first tick completes immediately and doubles as the startup sample.
        ticker.tick().await;

        let reading = match sampler.sample().await {
            Ok(reading) => reading,
            Err(e) => {
                let fallback = last.unwrap_or_default();
                warn!(error = %e, ?fallback, "health sample failed, keeping previous reading");
                fallback
            }
        };
        last = Some(reading);

        if controller.update_health(reading).await.is_err() {
            debug!("controller stopped, ending health refresh");
            break;
        }
    }
}
