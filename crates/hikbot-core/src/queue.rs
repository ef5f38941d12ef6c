// ── Result queue ──
//
// The one queue shared by every producer of outbound events (task
// handlers, alert notifiers, the video recorder) and the result worker
// pool. It is built once at startup and handed to each component.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::warn;

use crate::events::OutboundEvent;

/// Unbounded multi-producer, multi-consumer FIFO of outbound events.
#[derive(Clone)]
pub struct ResultQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    tx: mpsc::UnboundedSender<OutboundEvent>,
    rx: Mutex<mpsc::UnboundedReceiver<OutboundEvent>>,
}

impl ResultQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(QueueInner {
                tx,
                rx: Mutex::new(rx),
            }),
        }
    }

    pub fn put(&self, event: OutboundEvent) {
        if let Err(e) = self.inner.tx.send(event) {
            // Unreachable while the receiver lives in the same struct.
            warn!(event = e.0.name(), "result queue closed, dropping event");
        }
    }

    /// Pop the next event if one is ready.
    pub async fn try_get(&self) -> Option<OutboundEvent> {
        self.inner.rx.lock().await.try_recv().ok()
    }

    /// Wait for the next event.
    pub async fn get(&self) -> Option<OutboundEvent> {
        self.inner.rx.lock().await.recv().await
    }

    /// Number of events waiting.
    pub async fn len(&self) -> usize {
        self.inner.rx.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ResultQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::OutboundKind;

    fn text(text: &str) -> OutboundEvent {
        OutboundEvent {
            cam_id: "cam_1".into(),
            cam_description: "Front door".into(),
            message: None,
            kind: OutboundKind::SendText { text: text.into() },
        }
    }

    fn body(event: &OutboundEvent) -> &str {
        match &event.kind {
            OutboundKind::SendText { text } => text,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn fifo_order_across_clones() {
        let queue = ResultQueue::new();
        let producer = queue.clone();
        producer.put(text("first"));
        producer.put(text("second"));

        assert_eq!(queue.len().await, 2);
        assert_eq!(body(&queue.try_get().await.expect("first")), "first");
        assert_eq!(body(&queue.get().await.expect("second")), "second");
        assert!(queue.try_get().await.is_none());
        assert!(queue.is_empty().await);
    }
}
