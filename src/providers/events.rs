use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::models::AuthEvent;

/// Fan-out of provider events to every subscriber, in emission order.
///
/// Each subscriber gets its own unbounded queue so a slow consumer never
/// causes events to be dropped or reordered.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<UnboundedSender<AuthEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<AuthEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver `event` to all live subscribers, forgetting closed ones.
    pub fn emit(&self, event: AuthEvent) {
        debug!("Emitting auth event {}", event.kind.as_str());
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthEvent, AuthEventKind};

    #[tokio::test]
    async fn events_arrive_in_order_and_closed_subscribers_are_dropped() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let second = bus.subscribe();
        drop(second);

        bus.emit(AuthEvent::signed_out());
        bus.emit(AuthEvent::new(AuthEventKind::TokenRefreshed, None));

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(first.recv().await.unwrap().kind, AuthEventKind::SignedOut);
        assert_eq!(
            first.recv().await.unwrap().kind,
            AuthEventKind::TokenRefreshed
        );
    }
}
