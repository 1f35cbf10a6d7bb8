/// In-process live event hub
///
/// Chat messages and notifications are published here after they are
/// committed. SSE handlers subscribe and filter the shared feed down to what
/// the connected user may see.
///
/// The hub is a `tokio::sync::broadcast` channel. A slow subscriber that
/// falls more than `capacity` events behind skips the missed events and
/// keeps going; clients recover by re-fetching over REST.
///
/// # Example
///
/// ```no_run
/// use matrix_shared::events::{EventHub, LiveEvent, Subscription};
/// use futures::StreamExt;
/// use uuid::Uuid;
///
/// # async fn example(room_id: Uuid, user_id: Uuid) {
/// let hub = EventHub::new(256);
/// let mut events = std::pin::pin!(hub.stream(Subscription::Room(room_id)));
///
/// while let Some(event) = events.next().await {
///     println!("{}", event.name());
/// }
/// # }
/// ```

use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use uuid::Uuid;

use crate::models::chat::ChatMessage;
use crate::models::notification::Notification;

/// Default channel capacity
pub const DEFAULT_CAPACITY: usize = 1024;

/// Event delivered to live subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LiveEvent {
    ChatMessage(ChatMessage),
    Notification(Notification),
}

impl LiveEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::ChatMessage(_) => "chat_message",
            LiveEvent::Notification(_) => "notification",
        }
    }
}

/// What a subscriber wants to receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// Messages posted to one room
    Room(Uuid),

    /// A user's notifications and direct messages; `admin` adds admin
    /// broadcasts
    User { user_id: Uuid, admin: bool },
}

impl Subscription {
    pub fn matches(&self, event: &LiveEvent) -> bool {
        match (self, event) {
            (Subscription::Room(room_id), LiveEvent::ChatMessage(message)) => {
                message.room_id == Some(*room_id)
            }
            (Subscription::Room(_), LiveEvent::Notification(_)) => false,
            (Subscription::User { user_id, .. }, LiveEvent::ChatMessage(message)) => {
                message.receiver_id == Some(*user_id)
            }
            (Subscription::User { user_id, admin }, LiveEvent::Notification(notification)) => {
                match notification.user_id {
                    Some(recipient) => recipient == *user_id,
                    None => *admin,
                }
            }
        }
    }
}

/// Broadcast hub shared by all request handlers
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<Arc<LiveEvent>>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event, returning how many subscribers received it
    ///
    /// Having no subscribers is normal and returns 0.
    pub fn publish(&self, event: LiveEvent) -> usize {
        let name = event.name();
        match self.sender.send(Arc::new(event)) {
            Ok(receivers) => {
                tracing::trace!(event = name, receivers, "Published live event");
                receivers
            }
            Err(_) => 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LiveEvent>> {
        self.sender.subscribe()
    }

    /// Stream of events matching `subscription`
    ///
    /// Lagged gaps are logged and skipped.
    pub fn stream(&self, subscription: Subscription) -> impl Stream<Item = Arc<LiveEvent>> {
        BroadcastStream::new(self.subscribe()).filter_map(move |item| async move {
            match item {
                Ok(event) if subscription.matches(&event) => Some(event),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, ?subscription, "Live subscriber lagged");
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::NotificationKind;
    use chrono::Utc;

    fn room_message(room_id: Option<Uuid>, receiver_id: Option<Uuid>) -> LiveEvent {
        LiveEvent::ChatMessage(ChatMessage {
            id: Uuid::new_v4(),
            room_id,
            sender_id: Uuid::new_v4(),
            sender_name: "coach".to_string(),
            receiver_id,
            content: "hello".to_string(),
            created_at: Utc::now(),
            is_system: false,
            read: false,
        })
    }

    fn notification(user_id: Option<Uuid>) -> LiveEvent {
        LiveEvent::Notification(Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: NotificationKind::System,
            title: "t".to_string(),
            message: "m".to_string(),
            data: None,
            read: false,
            created_at: Utc::now(),
        })
    }

    #[test]
    fn test_subscription_matching() {
        let room = Uuid::new_v4();
        let user = Uuid::new_v4();

        assert!(Subscription::Room(room).matches(&room_message(Some(room), None)));
        assert!(!Subscription::Room(room).matches(&room_message(Some(Uuid::new_v4()), None)));

        let buyer = Subscription::User { user_id: user, admin: false };
        let admin = Subscription::User { user_id: user, admin: true };

        assert!(buyer.matches(&room_message(None, Some(user))));
        assert!(buyer.matches(&notification(Some(user))));
        assert!(!buyer.matches(&notification(None)));
        assert!(admin.matches(&notification(None)));
        assert!(!admin.matches(&notification(Some(Uuid::new_v4()))));
    }

    #[test]
    fn test_event_serialization() {
        let value = serde_json::to_value(room_message(None, None)).unwrap();
        assert_eq!(value["type"], "chat_message");
        assert_eq!(value["data"]["content"], "hello");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = EventHub::new(8);
        assert_eq!(hub.publish(notification(None)), 0);
    }

    #[tokio::test]
    async fn test_stream_filters_by_subscription() {
        let hub = EventHub::new(8);
        let room = Uuid::new_v4();
        let mut stream = Box::pin(hub.stream(Subscription::Room(room)));

        assert_eq!(hub.subscriber_count(), 1);
        hub.publish(room_message(Some(Uuid::new_v4()), None));
        hub.publish(notification(None));
        hub.publish(room_message(Some(room), None));

        let event = stream.next().await.unwrap();
        match event.as_ref() {
            LiveEvent::ChatMessage(message) => assert_eq!(message.room_id, Some(room)),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
