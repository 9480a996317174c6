#![forbid(unsafe_code)]

use super::RecorderEvent;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::trace;

#[derive(Debug, Default)]
struct Subscribers {
    next_id: u64,
    senders: Vec<(u64, flume::Sender<RecorderEvent>)>,
}

/// Fan-out of recorder events. Subscribers that are dropped are removed, and
/// each subscriber sees events in publish order.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = flume::unbounded();
        let mut subscribers = self.subscribers.lock();
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.senders.push((id, tx));
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn publish(&self, event: RecorderEvent) {
        let mut subscribers = self.subscribers.lock();
        trace!(?event, subscribers = subscribers.senders.len(), "publishing event");
        subscribers
            .senders
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().senders.len()
    }
}

/// Receiving end of [`EventBus::subscribe`]. Unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: flume::Receiver<RecorderEvent>,
    bus: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    pub async fn recv(&self) -> Option<RecorderEvent> {
        self.rx.recv_async().await.ok()
    }

    pub fn try_recv(&self) -> Option<RecorderEvent> {
        self.rx.try_recv().ok()
    }

    /// Everything published so far that has not been received yet.
    pub fn drain(&self) -> Vec<RecorderEvent> {
        self.rx.try_iter().collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().senders.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_subscription_stops_receiving() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(RecorderEvent::PlanCleared);
        drop(second);
        assert_eq!(bus.subscriber_count(), 1);
        bus.publish(RecorderEvent::PlanCleared);

        assert_eq!(first.drain().len(), 2);
    }

    #[test]
    fn subscriptions_outliving_the_bus_are_harmless() {
        let bus = EventBus::new();
        let subscription = bus.subscribe();
        drop(bus);
        assert!(subscription.try_recv().is_none());
        drop(subscription);
    }
}
