//! Lifecycle hooks for external observers.
//!
//! The subsystem publishes an [`AuthEvent`] after each committed state change.
//! Observers subscribe to the [`EventBus`]; publishing never blocks and never
//! fails, so an absent or slow observer cannot affect token state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::models::{OneShotPurpose, Provider};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    SessionIssued {
        user_id: i64,
        rotated: bool,
        at: DateTime<Utc>,
    },
    SessionRevoked {
        user_id: i64,
        at: DateTime<Utc>,
    },
    OneShotIssued {
        user_id: i64,
        purpose: OneShotPurpose,
        at: DateTime<Utc>,
    },
    OneShotConsumed {
        user_id: i64,
        purpose: OneShotPurpose,
        at: DateTime<Utc>,
    },
    AccountLinked {
        user_id: i64,
        provider: Provider,
        created: bool,
        at: DateTime<Utc>,
    },
}

impl AuthEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SessionIssued { .. } => "session.issued",
            Self::SessionRevoked { .. } => "session.revoked",
            Self::OneShotIssued { .. } => "one_shot.issued",
            Self::OneShotConsumed { .. } => "one_shot.consumed",
            Self::AccountLinked { .. } => "account.linked",
        }
    }
}

/// Fan-out channel owned by the service process.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Slow receivers past `capacity` observe `RecvError::Lagged`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: AuthEvent) {
        // Zero receivers is not an error.
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Log every event until the bus is dropped.
pub fn spawn_log_observer(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!(event = event.name(), detail = ?event, "auth event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth event observer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("auth event bus closed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        let event = AuthEvent::SessionRevoked {
            user_id: 7,
            at: Utc::now(),
        };
        bus.publish(event.clone());
        assert_eq!(first.recv().await.ok(), Some(event.clone()));
        assert_eq!(second.recv().await.ok(), Some(event));
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        assert_eq!(bus.receiver_count(), 0);
        bus.publish(AuthEvent::SessionIssued {
            user_id: 1,
            rotated: false,
            at: Utc::now(),
        });
    }

    #[test]
    fn event_names_are_dotted() {
        let event = AuthEvent::OneShotConsumed {
            user_id: 1,
            purpose: OneShotPurpose::EmailVerification,
            at: Utc::now(),
        };
        assert_eq!(event.name(), "one_shot.consumed");
    }
}
