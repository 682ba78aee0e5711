//! Access control state machine.
//!
//! One actor task owns the lock state, the verification flag, the last
//! health reading and both timers. Every event source (OTP writes relayed
//! by a transport, the health refresh task, the timers themselves) reaches
//! the state through that task, so events are applied one at a time.
//!
//! ```text
//!                 valid OTP                     settle elapsed
//!   ┌────────┐ ───────────────▶ (settling) ─────────────────────▶ ┌──────┐
//!   │ Locked │                                                    │ Open │
//!   └────────┘ ◀────────────────────────────────────────────────── └──────┘
//!        ▲        auto-close deadline, explicit close, shutdown      │
//!        └─────────────────────── valid OTP re-arms ◀────────────────┘
//! ```
//!
//! Opening is two-phase: the relay is energised, and only after
//! [`SETTLE_DELAY`] does the lock count as open and subscribers hear about
//! it. The settle is a deadline watched by the actor loop, not a sleep in a
//! handler, so a close arriving mid-settle is applied immediately and the
//! stale settle never fires.
//!
//! Timers are plain `Option<Instant>` deadlines owned by the actor.
//! Re-arming replaces the value, so at most one auto-close and one settle
//! exist at any time.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::actuator::{Display, LockActuator};
use crate::error::{GuardianError, Result};
use crate::notify::{NotificationHub, StatusSubscription};
use crate::otp::{OtpCode, OtpError};
use crate::telemetry::{self, StatusFrame};
use crate::types::{HealthReading, LockState, StatusSnapshot};

/// Time the relay needs before the lock is reported open.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Time an open lock stays open without a fresh OTP.
pub const AUTO_CLOSE_DELAY: Duration = Duration::from_secs(15);

const COMMAND_BUFFER: usize = 32;

/// Current state together with its wire encoding, taken from the same read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Typed view.
    pub snapshot: StatusSnapshot,
    /// Six byte frame.
    pub frame: StatusFrame,
}

enum Command {
    SubmitOtp {
        payload: Vec<u8>,
        reply: oneshot::Sender<std::result::Result<(), OtpError>>,
    },
    Close {
        reply: oneshot::Sender<StatusReport>,
    },
    Status {
        reply: oneshot::Sender<StatusReport>,
    },
    UpdateHealth {
        reading: HealthReading,
    },
    Ready,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the access controller actor.
///
/// Cheap to clone; every clone talks to the same state. The actor stops
/// after [`shutdown`](Self::shutdown) or once every handle is dropped.
#[derive(Debug, Clone)]
pub struct AccessController {
    tx: mpsc::Sender<Command>,
    hub: NotificationHub,
}

impl AccessController {
    /// Start the actor on the current Tokio runtime.
    ///
    /// The lock starts `Locked`, unverified, with the default health reading.
    pub fn spawn<A, D>(actuator: A, display: D, hub: NotificationHub) -> Self
    where
        A: LockActuator,
        D: Display,
    {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let machine = Machine::new(actuator, display, hub.clone());
        tokio::spawn(machine.run(rx));
        Self { tx, hub }
    }

    /// Submit an OTP payload as written by the remote client.
    ///
    /// Returns once the payload has been accepted or rejected. Acceptance
    /// starts the open sequence; it does not wait for the settle delay.
    ///
    /// # Errors
    ///
    /// Returns [`GuardianError::InvalidOtp`] for a malformed payload, which
    /// leaves the state untouched, or [`GuardianError::ControllerStopped`].
    pub async fn submit_otp(&self, payload: &[u8]) -> Result<()> {
        let payload = payload.to_vec();
        self.request(|reply| Command::SubmitOtp { payload, reply })
            .await?
            .map_err(GuardianError::from)
    }

    /// Close the lock now, whatever its state.
    ///
    /// # Errors
    ///
    /// Returns [`GuardianError::ControllerStopped`] if the actor is gone.
    pub async fn close(&self) -> Result<StatusReport> {
        self.request(|reply| Command::Close { reply }).await
    }

    /// Current state. Never mutates anything.
    ///
    /// # Errors
    ///
    /// Returns [`GuardianError::ControllerStopped`] if the actor is gone.
    pub async fn status(&self) -> Result<StatusReport> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Current status frame.
    ///
    /// # Errors
    ///
    /// Returns [`GuardianError::ControllerStopped`] if the actor is gone.
    pub async fn frame(&self) -> Result<StatusFrame> {
        Ok(self.status().await?.frame)
    }

    /// Store a new health reading. Lock and verification state are not
    /// touched; subscribers are notified if the frame changes.
    ///
    /// # Errors
    ///
    /// Returns [`GuardianError::ControllerStopped`] if the actor is gone.
    pub async fn update_health(&self, reading: HealthReading) -> Result<()> {
        self.send(Command::UpdateHealth { reading }).await
    }

    /// Tell the display that start-up has finished.
    ///
    /// # Errors
    ///
    /// Returns [`GuardianError::ControllerStopped`] if the actor is gone.
    pub async fn announce_ready(&self) -> Result<()> {
        self.send(Command::Ready).await
    }

    /// Close and notify (best-effort), release the actuator and stop the
    /// actor. Later requests fail with [`GuardianError::ControllerStopped`].
    ///
    /// Calling this on an already stopped controller is a no-op.
    pub async fn shutdown(&self) {
        if self.request(|reply| Command::Shutdown { reply }).await.is_err() {
            debug!("access controller already stopped");
        }
    }

    /// Subscribe to status change notifications.
    #[must_use]
    pub fn subscribe(&self) -> StatusSubscription {
        self.hub.subscribe()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| GuardianError::ControllerStopped)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| GuardianError::ControllerStopped)
    }
}

// ============================================================================
// Actor
// ============================================================================

struct Machine<A, D> {
    lock: LockState,
    otp_verified: bool,
    health: HealthReading,
    /// Pending end of the open settle delay.
    settle: Option<Instant>,
    /// Armed auto-close deadline. `Some` exactly when `lock` is `Open`.
    auto_close: Option<Instant>,
    actuator: A,
    display: D,
    hub: NotificationHub,
}

impl<A: LockActuator, D: Display> Machine<A, D> {
    fn new(actuator: A, mut display: D, hub: NotificationHub) -> Self {
        display.show("Guardian Safe", "Initializing...");
        Self {
            lock: LockState::Locked,
            otp_verified: false,
            health: HealthReading::default(),
            settle: None,
            auto_close: None,
            actuator,
            display,
            hub,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!("access controller started");
        loop {
            tokio::select! {
                biased;

                () = wait_for(self.auto_close) => self.on_auto_close(),
                () = wait_for(self.settle) => self.on_settled(),
                command = rx.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => {
                        debug!("all controller handles dropped");
                        self.shutdown();
                        break;
                    }
                },
            }
        }
        info!("access controller stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SubmitOtp { payload, reply } => {
                let result = self.on_otp(&payload);
                let _ = reply.send(result);
            }
            Command::Close { reply } => {
                info!("close requested");
                self.close_lock();
                let _ = reply.send(self.report());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.report());
            }
            Command::UpdateHealth { reading } => self.on_health(reading),
            Command::Ready => self.display.show("Guardian Safe", "Ready"),
            // Handled by the run loop.
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn on_otp(&mut self, payload: &[u8]) -> std::result::Result<(), OtpError> {
        self.display.show("Verifying OTP", OtpCode::masked());

        if let Err(e) = OtpCode::parse(payload) {
            info!(error = %e, "OTP rejected");
            self.display.show("Invalid OTP", "Try Again");
            return Err(e);
        }

        info!(lock = ?self.lock, "OTP verified");
        self.otp_verified = true;
        self.display.show("OTP Verified!", "Opening...");
        self.notify();
        self.begin_open();
        Ok(())
    }

    fn begin_open(&mut self) {
        self.display.show("Opening Lock...", "Stand By");
        if let Err(e) = self.actuator.open() {
            warn!(error = %e, "relay open failed");
        }

        let now = Instant::now();
        self.settle = Some(now + SETTLE_DELAY);
        if self.lock.is_open() {
            // Replace, never stack, the running deadline.
            self.auto_close = Some(now + AUTO_CLOSE_DELAY);
        }
    }

    fn on_settled(&mut self) {
        self.settle = None;
        self.lock = LockState::Open;
        self.auto_close = Some(Instant::now() + AUTO_CLOSE_DELAY);

        info!(auto_close_secs = AUTO_CLOSE_DELAY.as_secs(), "lock opened");
        self.display.show("Lock Opened!", "Remove Items");
        self.notify();
    }

    fn on_auto_close(&mut self) {
        self.auto_close = None;
        if self.lock.is_open() {
            info!("auto-closing lock");
            self.close_lock();
        }
    }

    fn on_health(&mut self, reading: HealthReading) {
        let before = self.frame();
        self.health = reading;
        debug!(?reading, "health updated");
        if self.frame() != before {
            self.notify();
        }
    }

    fn close_lock(&mut self) {
        self.settle = None;
        self.auto_close = None;

        if let Err(e) = self.actuator.close() {
            warn!(error = %e, "relay close failed");
        }
        self.lock = LockState::Locked;
        self.otp_verified = false;

        info!("lock closed");
        self.display.show("Lock Closed", "Ready");
        self.notify();
    }

    fn shutdown(&mut self) {
        info!("shutting down access controller");
        self.display.show("Shutting Down", "");
        self.close_lock();
        if let Err(e) = self.actuator.release() {
            warn!(error = %e, "relay release failed");
        }
        self.display.clear();
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            otp_verified: self.otp_verified,
            lock: self.lock,
            health: self.health,
        }
    }

    fn frame(&self) -> StatusFrame {
        telemetry::encode(self.otp_verified, self.lock.is_open(), &self.health)
    }

    fn report(&self) -> StatusReport {
        StatusReport {
            snapshot: self.snapshot(),
            frame: self.frame(),
        }
    }

    fn notify(&self) {
        self.hub.publish(self.frame());
    }
}

/// Resolve at `deadline`, or never when there is none.
fn wait_for(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(at) => sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}
