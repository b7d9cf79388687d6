//! Typed event surface consumed by the external notifier.

use tokio::sync::broadcast;

/// Capacity of the broadcast channel behind the bus.
const BUS_CAPACITY: usize = 16;

/// Last resolved server version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Server software string, e.g. `Paper version git-Paper-123`.
    pub server_software: String,
    /// Minecraft version, e.g. `1.20.1`.
    pub mc_version: String,
}

/// Events raised by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// The server came up and its version was resolved.
    Wakeup(VersionInfo),
    /// The server stopped.
    Closed,
    /// The active render job target changed; `None` means no job is running.
    Rendered(Option<String>),
}

/// Broadcast bus for [`MonitorEvent`]s.
///
/// Multiple subscribers each receive every event emitted after they
/// subscribed. Emitting with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    /// Create a new bus.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Subscribe to events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: MonitorEvent) {
        tracing::debug!(?event, "Emitting monitor event");
        if self.tx.send(event).is_err() {
            tracing::debug!("No event subscribers registered");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(MonitorEvent::Closed);
        bus.emit(MonitorEvent::Rendered(Some("overworld".to_string())));

        assert_eq!(rx.recv().await.unwrap(), MonitorEvent::Closed);
        assert_eq!(
            rx.recv().await.unwrap(),
            MonitorEvent::Rendered(Some("overworld".to_string()))
        );
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        // Must not panic or error.
        bus.emit(MonitorEvent::Closed);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let info = VersionInfo {
            server_software: "Paper version git-Paper-123".to_string(),
            mc_version: "1.20.1".to_string(),
        };
        bus.emit(MonitorEvent::Wakeup(info.clone()));

        assert_eq!(a.recv().await.unwrap(), MonitorEvent::Wakeup(info.clone()));
        assert_eq!(b.recv().await.unwrap(), MonitorEvent::Wakeup(info));
    }
}
