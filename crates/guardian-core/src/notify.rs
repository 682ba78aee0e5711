//! Status change fan-out.
//!
//! The access controller publishes a fresh [`StatusFrame`] after every
//! change. Transports subscribe and relay frames to the remote client.
//! Publishing never fails from the controller's point of view: having no
//! subscribers, or a subscriber that has fallen behind, is not an error.

use tokio::sync::broadcast;
use tracing::trace;

use crate::telemetry::StatusFrame;

/// Frames buffered per subscriber before the oldest are dropped.
pub const DEFAULT_CAPACITY: usize = 16;

/// Broadcast hub for status frames.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<StatusFrame>,
}

impl NotificationHub {
    /// Create a hub that buffers `capacity` frames per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Push a frame to every current subscriber. Best-effort.
    pub fn publish(&self, frame: StatusFrame) {
        match self.tx.send(frame) {
            Ok(receivers) => trace!(?frame, receivers, "status notified"),
            Err(_) => trace!(?frame, "status changed with no subscribers"),
        }
    }

    /// Register a new subscriber. It sees frames published from now on.
    #[must_use]
    pub fn subscribe(&self) -> StatusSubscription {
        StatusSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiving end of a [`NotificationHub`].
#[derive(Debug)]
pub struct StatusSubscription {
    rx: broadcast::Receiver<StatusFrame>,
}

impl StatusSubscription {
    /// Wait for the next frame.
    ///
    /// A subscriber that fell behind skips straight to the frames still
    /// buffered. Returns `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<StatusFrame> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(frame),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(skipped, "subscriber lagged, skipping stale frames");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take a frame if one is ready, without waiting.
    pub fn try_next(&mut self) -> Option<StatusFrame> {
        loop {
            match self.rx.try_recv() {
                Ok(frame) => return Some(frame),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::encode;
    use crate::types::HealthReading;

    fn frame(verified: bool, open: bool) -> StatusFrame {
        encode(verified, open, &HealthReading::default())
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let hub = NotificationHub::default();
        hub.publish(frame(true, false));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let hub = NotificationHub::default();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish(frame(true, true));

        assert_eq!(a.next().await, Some(frame(true, true)));
        assert_eq!(b.next().await, Some(frame(true, true)));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_frames() {
        let hub = NotificationHub::default();
        hub.publish(frame(true, false));

        let mut late = hub.subscribe();
        assert_eq!(late.try_next(), None);

        hub.publish(frame(false, false));
        assert_eq!(late.next().await, Some(frame(false, false)));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_to_buffered() {
        let hub = NotificationHub::new(2);
        let mut slow = hub.subscribe();

        hub.publish(frame(false, false));
        hub.publish(frame(true, false));
        hub.publish(frame(true, true));

        assert_eq!(slow.next().await, Some(frame(true, false)));
        assert_eq!(slow.next().await, Some(frame(true, true)));
    }

    #[tokio::test]
    async fn test_closed_hub_ends_subscription() {
        let hub = NotificationHub::default();
        let mut sub = hub.subscribe();
        drop(hub);
        assert_eq!(sub.next().await, None);
    }
}
