//! BLE Transport Abstraction
//!
//! The monitor drives the radio through [`Transport`]. Requests return
//! immediately; their outcomes come back as [`TransportEvent`]s on the
//! channel the transport was built with, so the monitor handles them one at a
//! time in its own context.

use crate::domain::errors::TransportError;
use crate::domain::models::DiscoveredPeripheral;
use std::fmt;
use uuid::Uuid;

/// Outcomes and notifications emitted by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Discovered(DiscoveredPeripheral),
    ScanFailed(TransportError),
    Connected {
        id: String,
    },
    ConnectFailed {
        id: String,
        error: TransportError,
    },
    ServicesDiscovered {
        id: String,
    },
    DiscoveryFailed {
        id: String,
        error: TransportError,
    },
    Notification {
        id: String,
        value: Vec<u8>,
    },
    /// Notifications for `id` could not be enabled after `subscribe` returned
    SubscribeFailed {
        id: String,
        error: TransportError,
    },
    /// The notification stream of `id` broke
    NotificationError {
        id: String,
        error: TransportError,
    },
    Disconnected {
        id: String,
        result: Result<(), TransportError>,
    },
}

pub trait Transport: Send {
    /// Start delivering `Discovered` events for every advertisement seen
    fn start_scan(&mut self) -> Result<(), TransportError>;

    fn stop_scan(&mut self);

    /// Answered by `Connected` or `ConnectFailed`
    fn connect(&mut self, id: &str);

    /// Answered by `ServicesDiscovered` or `DiscoveryFailed`
    fn discover_services(&mut self, id: &str);

    /// Enable notifications; values arrive as `Notification` events until the
    /// returned subscription is cancelled or the link drops. Enabling may
    /// still fail afterwards, reported as `SubscribeFailed`.
    fn subscribe(
        &mut self,
        id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Subscription, TransportError>;

    /// Answered by `Disconnected`
    fn disconnect(&mut self, id: &str);
}

/// Handle to an enabled characteristic notification.
///
/// Consumed by [`Subscription::cancel`]. Dropping it releases the handle
/// without touching the transport, which is what happens when the link is
/// already gone.
pub struct Subscription {
    cancel: Box<dyn FnOnce() + Send>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Box::new(cancel),
        }
    }

    pub fn cancel(self) {
        (self.cancel)()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_cancel_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let subscription = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        subscription.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_does_not_cancel() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let subscription = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(subscription);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
