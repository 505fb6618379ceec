use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

/// Per-owner fan-out of live events. Publishing never blocks; events for an
/// owner with no live subscribers are dropped.
#[derive(Clone)]
pub struct NotificationHub<T: Clone> {
    channels: Arc<Mutex<HashMap<Uuid, broadcast::Sender<T>>>>,
}

impl<T: Clone> Default for NotificationHub<T> {
    fn default() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Clone> NotificationHub<T> {
    pub fn subscribe(&self, owner_id: Uuid) -> broadcast::Receiver<T> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        // Owners whose observers all left without ever receiving an event.
        channels.retain(|_, sender| sender.receiver_count() > 0);
        channels
            .entry(owner_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Returns how many live subscribers received the event.
    pub fn publish(&self, owner_id: Uuid, event: T) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = channels.get(&owner_id) else {
            return 0;
        };

        match sender.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                // Every receiver is gone.
                channels.remove(&owner_id);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let hub = NotificationHub::<u32>::default();
        assert_eq!(hub.publish(Uuid::new_v4(), 7), 0);
    }

    #[tokio::test]
    async fn events_reach_only_the_owner() {
        let hub = NotificationHub::<u32>::default();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut rx = hub.subscribe(owner);
        let mut other_rx = hub.subscribe(other);

        assert_eq!(hub.publish(owner, 42), 1);
        assert_eq!(rx.recv().await.unwrap(), 42);
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn closed_channels_are_forgotten() {
        let hub = NotificationHub::<u32>::default();
        let owner = Uuid::new_v4();
        drop(hub.subscribe(owner));

        assert_eq!(hub.publish(owner, 1), 0);
        assert!(hub.channels.lock().unwrap().is_empty());
    }

    #[test]
    fn abandoned_channels_are_pruned_on_subscribe() {
        let hub = NotificationHub::<u32>::default();
        let gone = Uuid::new_v4();
        let live = Uuid::new_v4();
        drop(hub.subscribe(gone));

        let _rx = hub.subscribe(live);
        let channels = hub.channels.lock().unwrap();
        assert_eq!(channels.len(), 1);
        assert!(channels.contains_key(&live));
    }
}
