// ── Result workers ──
//
// A fixed pool of tasks draining the result queue into the outbound
// dispatcher. Each worker takes everything currently queued, then
// sleeps briefly before polling again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::dispatch::OutboundEventDispatcher;
use crate::queue::ResultQueue;

pub const DEFAULT_WORKERS: usize = 4;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct ResultWorkerManager {
    queue: ResultQueue,
    dispatcher: Arc<OutboundEventDispatcher>,
    workers: usize,
    poll_interval: Duration,
}

impl ResultWorkerManager {
    pub fn new(queue: ResultQueue, dispatcher: Arc<OutboundEventDispatcher>, workers: usize) -> Self {
        Self {
            queue,
            dispatcher,
            workers: workers.max(1),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Spawn the worker pool. Workers exit once `cancel` fires.
    pub fn start(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        (0..self.workers)
            .map(|id| {
                tokio::spawn(result_worker(
                    id,
                    self.queue.clone(),
                    Arc::clone(&self.dispatcher),
                    self.poll_interval,
                    cancel.clone(),
                ))
            })
            .collect()
    }
}

async fn result_worker(
    id: usize,
    queue: ResultQueue,
    dispatcher: Arc<OutboundEventDispatcher>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    debug!(worker = id, "result worker started");
    loop {
        while let Some(event) = queue.try_get().await {
            let (cam_id, name) = (event.cam_id.clone(), event.name());
            if let Err(e) = dispatcher.dispatch(event).await {
                error!(worker = id, cam = %cam_id, event = name, error = %e, "failed to deliver result");
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
    debug!(worker = id, "result worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{OutboundEvent, OutboundKind};
    use crate::messenger::Messenger;
    use crate::testutil::{RecordingMessenger, Sent};

    fn text(chat_id: i64, text: &str) -> OutboundEvent {
        OutboundEvent {
            cam_id: "cam_1".into(),
            cam_description: "Front door".into(),
            message: Some(crate::events::MessageRef {
                chat_id,
                message_id: 1,
                user_id: chat_id,
            }),
            kind: OutboundKind::SendText { text: text.into() },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn workers_keep_going_after_failures() {
        let messenger = Arc::new(RecordingMessenger {
            fail_chat: Some(1),
            ..RecordingMessenger::default()
        });
        let dispatcher = Arc::new(OutboundEventDispatcher::new(
            Arc::clone(&messenger) as Arc<dyn Messenger>,
            Vec::new(),
        ));
        let queue = ResultQueue::new();
        let manager = ResultWorkerManager::new(queue.clone(), dispatcher, 2);
        let cancel = CancellationToken::new();
        let workers = manager.start(&cancel);

        for i in 0..6 {
            queue.put(text(i % 3, &format!("message {i}")));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        queue.put(text(2, "late"));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let sent = messenger.sent();
        assert_eq!(sent.len(), 5);
        assert!(sent.contains(&Sent::Text {
            chat_id: 2,
            reply_to: Some(1),
            text: "late".into(),
        }));
        assert!(queue.is_empty().await);

        cancel.cancel();
        for worker in workers {
            worker.await.expect("worker exits cleanly");
        }
    }
}
