// ── Alert notification fan-out ──
//
// Each detected alert launches up to three independent tasks (text,
// video clip, snapshot), gated by the detection's config flags. A failing
// task is logged and never affects its siblings.

use std::future::Future;
use std::sync::Arc;

use chrono::Local;
use hikbot_api::{CameraApi, Detection};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::config::{AlertConfig, CameraConfig, SnapshotConfig};
use crate::error::CoreError;
use crate::events::{OutboundEvent, OutboundKind};
use crate::queue::ResultQueue;
use crate::videogif::{RecordTrigger, VideoGifRecorder};

pub struct AlarmNotifier {
    cam_id: String,
    cam_description: String,
    api: Arc<dyn CameraApi>,
    snapshot: SnapshotConfig,
    alert: AlertConfig,
    queue: ResultQueue,
    recorder: Arc<VideoGifRecorder>,
}

impl AlarmNotifier {
    pub fn new(
        cam: &CameraConfig,
        api: Arc<dyn CameraApi>,
        queue: ResultQueue,
        recorder: Arc<VideoGifRecorder>,
    ) -> Self {
        Self {
            cam_id: cam.id.clone(),
            cam_description: cam.description.clone(),
            api,
            snapshot: cam.snapshot.clone(),
            alert: cam.alert.clone(),
            queue,
            recorder,
        }
    }

    /// Launch the notifications configured for `detection`.
    pub fn notify(self: &Arc<Self>, detection: Detection, alert_count: u64) -> Vec<JoinHandle<()>> {
        let conf = *self.alert.detection(detection);
        let mut tasks = Vec::with_capacity(3);

        if conf.send_text {
            let this = Arc::clone(self);
            tasks.push(self.spawn("text", async move {
                this.send_text(detection);
                Ok(())
            }));
        }
        if conf.send_videogif {
            let this = Arc::clone(self);
            tasks.push(self.spawn("videogif", async move {
                this.recorder
                    .start_recording(conf.rewind, RecordTrigger::Alert(detection))
            }));
        }
        if conf.sendpic {
            let this = Arc::clone(self);
            tasks.push(self.spawn("snapshot", async move {
                this.send_snapshot(detection, alert_count, !conf.fullpic).await
            }));
        }

        if tasks.is_empty() {
            debug!(cam = %self.cam_id, %detection, "no notifications configured for detection");
        }
        tasks
    }

    fn spawn<F>(&self, notification: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        let cam_id = self.cam_id.clone();
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                error!(cam = %cam_id, notification, error = %e, "alert notification failed");
            }
        })
    }

    fn send_text(&self, detection: Detection) {
        let text = format!(
            "Alert on {} ({}): {} at {}",
            self.cam_description,
            self.cam_id,
            detection.label(),
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        self.put(OutboundKind::SendText { text });
    }

    async fn send_snapshot(
        &self,
        detection: Detection,
        alert_count: u64,
        resize: bool,
    ) -> Result<(), CoreError> {
        let resolution = resize.then_some(self.snapshot.resize);
        let img = self.api.take_snapshot(self.snapshot.channel, resolution).await?;
        self.put(OutboundKind::AlertSnapshot {
            img,
            taken_at: Local::now(),
            detection,
            alert_count,
            resized: resize,
        });
        Ok(())
    }

    /// Queue a plain text notice for every alert recipient.
    pub(crate) fn broadcast(&self, text: String) {
        self.put(OutboundKind::SendText { text });
    }

    fn put(&self, kind: OutboundKind) {
        self.queue.put(OutboundEvent {
            cam_id: self.cam_id.clone(),
            cam_description: self.cam_description.clone(),
            message: None,
            kind,
        });
    }
}
