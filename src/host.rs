//! Foreground/background process host
//!
//! On mobile the engine runs inside a long-lived foreground service that owns
//! the progress notification. The coordinator asks the host to start on the
//! first enqueue of an idle engine and to stop once nothing is left to do.

use crate::types::Notification;

/// Process host that keeps the engine alive while work is pending
pub trait BackgroundHost: Send + Sync {
    /// Work arrived; keep the process alive
    fn start(&self);

    /// Queue and slots are empty; the process may go idle
    fn stop(&self);

    /// Render the current notification content
    fn update_notification(&self, notification: &Notification);
}

/// Host for environments without a foreground service (servers, tests)
pub struct NoOpHost;

impl BackgroundHost for NoOpHost {
    fn start(&self) {
        tracing::debug!("Background host start requested");
    }

    fn stop(&self) {
        tracing::debug!("Background host stop requested");
    }

    fn update_notification(&self, notification: &Notification) {
        tracing::trace!(
            content = %notification.content,
            percent = notification.percent,
            "Notification update"
        );
    }
}
