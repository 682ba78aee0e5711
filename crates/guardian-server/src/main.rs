//! # guardian-server
//!
//! Lockbox controller daemon.
//!
//! This binary provides:
//! - The access controller driving the lock relay
//! - A BLE GATT peripheral for OTP writes and status notifications
//! - A loopback HTTP diagnostics API
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, no GPIO or Bluetooth hardware
//! GUARDIAN__RELAY__BACKEND=simulated GUARDIAN__BLUETOOTH__ENABLED=false \
//!     cargo run --package guardian-server
//!
//! # Production (on Raspberry Pi)
//! GUARDIAN_ENV=production ./guardian-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use anyhow::Context;
use guardian_core::config::{DisplayConfig, RelayConfig};
use guardian_core::{
    refresh, AccessController, BuiltinSampler, Config, Display, DisplayBackend, LockActuator,
    LogDisplay, NotificationHub, RelayBackend, SimulatedRelay, SysfsRelay,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use guardian_server::api::create_router;
use guardian_server::logging;
use guardian_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = Config::resolve_path();
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    logging::init(logging::production_from_env() || config.logging.production)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        device = %config.device.name,
        "Starting guardian-server"
    );

    let actuator = build_actuator(&config.relay)?;
    let display = build_display(&config.display);
    let controller = AccessController::spawn(actuator, display, NotificationHub::default());

    let refresh_task = refresh::spawn(
        BuiltinSampler::detect(&config.health),
        controller.clone(),
        config.health.refresh_interval(),
    );

    #[cfg(feature = "bluetooth")]
    let gatt = start_gatt(&config, &controller).await;

    let http = if config.http.enabled {
        Some(start_http(&config, AppState::new(controller.clone(), config.clone())).await?)
    } else {
        info!("HTTP API disabled");
        None
    };

    controller.announce_ready().await?;
    info!("guardian ready");

    wait_for_shutdown().await?;

    // Stop accepting requests before the lock is closed and released.
    #[cfg(feature = "bluetooth")]
    drop(gatt);
    if let Some((stop, task)) = http {
        let _ = stop.send(());
        if let Err(e) = task.await {
            warn!(error = %e, "HTTP server task failed");
        }
    }

    controller.shutdown().await;
    refresh_task.abort();

    info!("guardian-server stopped");
    Ok(())
}

fn build_actuator(relay: &RelayConfig) -> anyhow::Result<Box<dyn LockActuator>> {
    let hint = || {
        format!(
            "failed to set up GPIO {} (set relay.backend = \"simulated\" to run without hardware)",
            relay.gpio_pin
        )
    };

    match relay.backend {
        RelayBackend::Gpio => gpio_relay(relay.gpio_pin).with_context(hint),
        RelayBackend::Sysfs => {
            let relay = SysfsRelay::new(&relay.sysfs_root, relay.gpio_pin).with_context(hint)?;
            Ok(Box::new(relay))
        }
        RelayBackend::Simulated => {
            warn!("using simulated relay, the lock will not move");
            Ok(Box::new(SimulatedRelay::new()))
        }
    }
}

#[cfg(feature = "gpio")]
fn gpio_relay(pin: u32) -> anyhow::Result<Box<dyn LockActuator>> {
    Ok(Box::new(guardian_core::GpioRelay::new(pin)?))
}

#[cfg(not(feature = "gpio"))]
fn gpio_relay(_pin: u32) -> anyhow::Result<Box<dyn LockActuator>> {
    anyhow::bail!("built without the gpio feature; use relay.backend = \"sysfs\"")
}

fn build_display(display: &DisplayConfig) -> Box<dyn Display> {
    match display.backend {
        DisplayBackend::Lcd => lcd_display(display),
        DisplayBackend::Log => Box::new(LogDisplay),
    }
}

#[cfg(feature = "gpio")]
fn lcd_display(display: &DisplayConfig) -> Box<dyn Display> {
    match guardian_core::LcdDisplay::open(display.i2c_bus, display.i2c_address) {
        Ok(lcd) => {
            let (bus, address) = (display.i2c_bus, display.i2c_address);
            info!(bus, address, "LCD ready");
            Box::new(lcd)
        }
        Err(e) => {
            warn!(error = %e, "LCD not found, continuing without display");
            Box::new(LogDisplay)
        }
    }
}

#[cfg(not(feature = "gpio"))]
fn lcd_display(_display: &DisplayConfig) -> Box<dyn Display> {
    warn!("built without the gpio feature, LCD unavailable");
    Box::new(LogDisplay)
}

#[cfg(feature = "bluetooth")]
async fn start_gatt(
    config: &Config,
    controller: &AccessController,
) -> Option<guardian_core::GattServer> {
    if !config.bluetooth.enabled {
        info!("Bluetooth peripheral disabled");
        return None;
    }

    match guardian_core::GattServer::start(&config.device.name, controller.clone()).await {
        Ok(server) => {
            info!(adapter = server.adapter_name(), "Bluetooth peripheral running");
            Some(server)
        }
        Err(e) => {
            // The HTTP API stays usable without a radio.
            error!(error = %e, "Bluetooth peripheral unavailable");
            None
        }
    }
}

async fn start_http(
    config: &Config,
    state: AppState,
) -> anyhow::Result<(oneshot::Sender<()>, JoinHandle<()>)> {
    let addr = config.http.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let app = create_router(state);
    let task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = stop_rx.await;
        });
        if let Err(e) = server.await {
            error!(error = %e, "HTTP server error");
        }
    });

    Ok((stop_tx, task))
}

async fn wait_for_shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).context("SIGINT handler")?;
        let mut sigterm = signal(SignalKind::terminate()).context("SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating shutdown...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("Ctrl+C handler")?;
        info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}
