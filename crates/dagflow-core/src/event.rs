use crate::types::RunEvent;

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: RunEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunId, RunStatus};

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(RunEvent::RunFinished {
            run_id: RunId::from_string("r1"),
            status: RunStatus::Completed,
        });
        match rx.recv().await.unwrap() {
            RunEvent::RunFinished { run_id, status } => {
                assert_eq!(run_id.0, "r1");
                assert_eq!(status, RunStatus::Completed);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(RunEvent::RunStarted {
            run_id: RunId::new(),
            nodes: 0,
        });
    }
}
