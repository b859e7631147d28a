//! Publish-subscribe fan-out for telemetry
//!
//! Every subscriber gets its own bounded queue. A slow subscriber loses
//! frames instead of stalling the simulation; a dropped subscriber is
//! removed on the next publish.

use crossbeam_channel::{self as cc, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Queue depth and latching for a topic
#[derive(Debug, Clone)]
pub struct TopicConfig {
    /// Frames each subscriber can hold before new ones are dropped
    pub buffer_size: usize,
    /// Replay the newest frame to every new subscriber
    pub latch: bool,
    pub name: Arc<str>,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            latch: false,
            name: Arc::from("telemetry"),
        }
    }
}

impl TopicConfig {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Per-subscriber queue depth (at least 1)
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    pub fn latch(mut self, enable: bool) -> Self {
        self.latch = enable;
        self
    }
}

struct Shared<T> {
    config: TopicConfig,
    senders: RwLock<Vec<cc::Sender<T>>>,
    last: Mutex<Option<T>>,
    dropped: AtomicU64,
}

/// Fan-out point for one kind of message
///
/// Handles are cheap to clone and all feed the same subscribers.
///
/// # Example
/// ```
/// use linebot_core::telemetry::Topic;
///
/// let topic = Topic::<u32>::new("ticks");
/// let sub = topic.subscribe();
/// topic.publish(7);
/// assert_eq!(sub.try_recv(), Some(7));
/// ```
pub struct Topic<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> Topic<T> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::with_config(TopicConfig::new(name))
    }

    pub fn with_config(config: TopicConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                senders: RwLock::new(Vec::new()),
                last: Mutex::new(None),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> Arc<str> {
        self.shared.config.name.clone()
    }

    /// Offer `message` to every subscriber without blocking
    pub fn publish(&self, message: T) {
        if self.shared.config.latch {
            *self.shared.last.lock() = Some(message.clone());
        }

        let mut closed: Vec<cc::Sender<T>> = Vec::new();
        for tx in self.shared.senders.read().iter() {
            match tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => closed.push(tx.clone()),
            }
        }

        if !closed.is_empty() {
            let mut senders = self.shared.senders.write();
            let before = senders.len();
            senders.retain(|tx| !closed.iter().any(|c| c.same_channel(tx)));
            tracing::debug!(
                "{}: removed {} closed subscriber(s)",
                self.shared.config.name,
                before - senders.len()
            );
        }
    }

    /// Open a new subscription; a latched frame is queued right away
    pub fn subscribe(&self) -> Subscriber<T> {
        let (tx, rx) = cc::bounded(self.shared.config.buffer_size);
        if let Some(frame) = self.shared.last.lock().clone() {
            // A fresh queue always has room
            let _ = tx.try_send(frame);
        }
        self.shared.senders.write().push(tx);
        Subscriber { rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.senders.read().len()
    }

    /// Frames discarded because a subscriber's queue was full
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Newest frame, when latching is on
    pub fn latched(&self) -> Option<T> {
        self.shared.last.lock().clone()
    }

    /// Forget the latched frame so new subscribers start empty
    pub fn clear_latch(&self) {
        self.shared.last.lock().take();
    }
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Receiving end of a topic subscription
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscriber<T> {
    rx: cc::Receiver<T>,
}

impl<T> Subscriber<T> {
    /// Block until a message arrives; `None` once every topic handle is gone
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout`
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Everything queued right now
    pub fn drain(&self) -> impl Iterator<Item = T> + '_ {
        self.rx.try_iter()
    }

    /// Blocking iterator that ends when every topic handle is dropped
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.rx.iter()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_every_subscriber_gets_each_frame() {
        let topic = Topic::<i32>::new("frames");
        let first = topic.subscribe();
        let second = topic.subscribe();

        topic.publish(42);

        assert_eq!(first.try_recv(), Some(42));
        assert_eq!(second.try_recv(), Some(42));
        assert!(first.is_empty());
    }

    #[test]
    fn test_late_subscriber_sees_latched_frame() {
        let topic = Topic::<i32>::with_config(TopicConfig::new("latched").latch(true));
        topic.publish(1);
        topic.publish(2);

        let late = topic.subscribe();
        assert_eq!(late.try_recv(), Some(2));
        assert_eq!(late.try_recv(), None);
        assert_eq!(topic.latched(), Some(2));
    }

    #[test]
    fn test_clear_latch() {
        let topic = Topic::<i32>::with_config(TopicConfig::new("latched").latch(true));
        topic.publish(5);
        topic.clear_latch();
        assert_eq!(topic.latched(), None);
        assert!(topic.subscribe().is_empty());

        // Latching continues with the next frame
        topic.publish(6);
        assert_eq!(topic.subscribe().try_recv(), Some(6));
    }

    #[test]
    fn test_unlatched_topic_forgets() {
        let topic = Topic::<i32>::new("plain");
        topic.publish(1);
        assert_eq!(topic.latched(), None);
        assert!(topic.subscribe().is_empty());
    }

    #[test]
    fn test_closed_subscribers_are_removed() {
        let topic = Topic::<i32>::new("frames");
        let kept = topic.subscribe();
        {
            let _gone = topic.subscribe();
            assert_eq!(topic.subscriber_count(), 2);
        }
        topic.publish(1);
        assert_eq!(topic.subscriber_count(), 1);
        assert_eq!(kept.try_recv(), Some(1));
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let topic = Topic::<i32>::with_config(TopicConfig::new("small").buffer_size(2));
        let slow = topic.subscribe();
        for i in 0..5 {
            topic.publish(i);
        }
        assert_eq!(topic.subscriber_count(), 1);
        assert_eq!(topic.dropped_count(), 3);
        assert_eq!(slow.drain().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(slow.len(), 0);
    }

    #[test]
    fn test_recv_timeout_expires() {
        let topic = Topic::<i32>::new("quiet");
        let sub = topic.subscribe();
        assert_eq!(sub.recv_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    fn test_publishes_across_threads() {
        let topic = Topic::<u64>::new("threads");
        let sub = topic.subscribe();
        let publisher = topic.clone();

        thread::spawn(move || {
            for i in 0..10 {
                publisher.publish(i);
            }
        })
        .join()
        .unwrap();
        drop(topic);

        let received: Vec<u64> = sub.iter().collect();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }
}
