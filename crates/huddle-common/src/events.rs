use tokio::sync::broadcast;

/// Fan-out bus: every subscriber sees every published value once.
///
/// Slow subscribers that fall more than `capacity` values behind get a
/// `RecvError::Lagged` on their next receive, as with any tokio broadcast.
pub struct EventBus<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Publish a value; returns how many subscribers it reached.
    pub fn publish(&self, event: T) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Ping {
        Chat { from: String, text: String },
        Reaction(String),
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(Ping::Reaction("👍".into()));

        let event = rx.recv().await.unwrap();
        assert_eq!(event, Ping::Reaction("👍".into()));
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_one_copy() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(Ping::Chat {
            from: "alice".into(),
            text: "hi".into(),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert!(matches!(e1, Ping::Chat { ref from, .. } if from == "alice"));
        assert_eq!(e1, e2);
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn publish_returns_zero_with_no_subscribers() {
        let bus: EventBus<Ping> = EventBus::new(4);
        assert_eq!(bus.publish(Ping::Reaction("x".into())), 0);
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let bus = EventBus::new(4);
        let other = bus.clone();
        let _rx1 = bus.subscribe();
        let _rx2 = other.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        assert_eq!(other.publish(Ping::Reaction("🎉".into())), 2);
    }
}
