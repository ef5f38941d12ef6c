// ── Alarm service ──
//
// Enables the configured camera-side detection triggers and runs one
// supervised monitor task that reads the camera alert stream, detects
// events and fans out notifications.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use hikbot_api::{CameraApi, Detection};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Service, ServiceState, ServiceType};
use crate::config::{AlertConfig, CameraConfig};
use crate::detector::ChunkDetector;
use crate::error::CoreError;
use crate::notifier::AlarmNotifier;

pub const ALARM_SERVICE_NAME: &str = "alarm";

const RECONNECT_DELAY: Duration = Duration::from_millis(500);

struct MonitorRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct AlarmService {
    cam_id: String,
    config: AlertConfig,
    stream_timeout: Duration,
    api: Arc<dyn CameraApi>,
    notifier: Arc<AlarmNotifier>,
    state: watch::Sender<ServiceState>,
    alert_count: Arc<AtomicU64>,
    run: Mutex<Option<MonitorRun>>,
}

impl AlarmService {
    pub fn new(cam: &CameraConfig, api: Arc<dyn CameraApi>, notifier: Arc<AlarmNotifier>) -> Self {
        let (state, _) = watch::channel(ServiceState::Stopped);
        Self {
            cam_id: cam.id.clone(),
            config: cam.alert.clone(),
            stream_timeout: cam.stream_timeout,
            api,
            notifier,
            state,
            alert_count: Arc::new(AtomicU64::new(0)),
            run: Mutex::new(None),
        }
    }

    /// Alerts detected since the bot started.
    pub fn alert_count(&self) -> u64 {
        self.alert_count.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    /// Whether the monitor task for the current run is still alive.
    pub async fn monitor_running(&self) -> bool {
        self.run
            .lock()
            .await
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Enable or disable one camera-side detection trigger.
    ///
    /// Returns the text to show the user, including the "already
    /// enabled/disabled" answer, which is not an error.
    pub async fn trigger_switch(&self, detection: Detection, state: bool) -> Result<String, CoreError> {
        let label = detection.label();
        match self.api.switch(detection, state).await {
            Ok(Some(status)) => Ok(status),
            Ok(None) => Ok(format!(
                "{label} successfully {}",
                if state { "enabled" } else { "disabled" }
            )),
            Err(e) => Err(CoreError::runtime(format!(
                "Failed to {} {label} on {}: {}",
                if state { "enable" } else { "disable" },
                self.cam_id,
                CoreError::from(e)
            ))),
        }
    }
}

#[async_trait]
impl Service for AlarmService {
    fn service_type(&self) -> ServiceType {
        ServiceType::Alarm
    }

    fn name(&self) -> &str {
        ALARM_SERVICE_NAME
    }

    fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    fn enabled_in_conf(&self) -> bool {
        self.config.enabled
    }

    async fn start(&self) -> Result<(), CoreError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == ServiceState::Stopped {
                *state = ServiceState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(CoreError::runtime(format!(
                "Alarm service on {} already started",
                self.cam_id
            )));
        }

        for detection in self.config.enabled_detections() {
            if let Err(e) = self.trigger_switch(detection, true).await {
                self.state.send_replace(ServiceState::Stopped);
                return Err(e);
            }
        }

        let cancel = CancellationToken::new();
        let monitor = AlarmMonitor {
            cam_id: self.cam_id.clone(),
            api: Arc::clone(&self.api),
            notifier: Arc::clone(&self.notifier),
            alert_delay: self.config.delay,
            read_timeout: self.stream_timeout,
            alert_count: Arc::clone(&self.alert_count),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(monitor.run());
        *self.run.lock().await = Some(MonitorRun { cancel, handle });

        self.state.send_replace(ServiceState::Started);
        info!(cam = %self.cam_id, "alarm service started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        let mut previous = ServiceState::Stopped;
        let stopped = self.state.send_if_modified(|state| {
            previous = *state;
            if *state == ServiceState::Started {
                *state = ServiceState::Stopped;
                true
            } else {
                false
            }
        });
        if !stopped {
            let reason = match previous {
                ServiceState::Starting => "is still starting",
                _ => "already stopped",
            };
            return Err(CoreError::runtime(format!(
                "Alarm service on {} {reason}",
                self.cam_id
            )));
        }

        if let Some(run) = self.run.lock().await.take() {
            run.cancel.cancel();
        }
        info!(cam = %self.cam_id, "alarm service stopped");
        Ok(())
    }
}

// ── Monitor task ─────────────────────────────────────────────────────

/// Supervised reader of the camera alert stream.
///
/// Any failure (connection error, read timeout, stream end) is logged
/// and the stream is reopened after a fixed delay. Only cancellation
/// ends the task.
struct AlarmMonitor {
    cam_id: String,
    api: Arc<dyn CameraApi>,
    notifier: Arc<AlarmNotifier>,
    alert_delay: Duration,
    read_timeout: Duration,
    alert_count: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl AlarmMonitor {
    async fn run(self) {
        debug!(cam = %self.cam_id, "alarm monitor running");
        // Set after the first failure of a streak, cleared by the next chunk.
        let mut failing = false;
        loop {
            match self.watch_stream(&mut failing).await {
                Ok(()) => break,
                Err(e) => {
                    error!(
                        cam = %self.cam_id,
                        task = "alarm_monitor",
                        error = %e,
                        "alert stream failed, reconnecting in {}ms",
                        RECONNECT_DELAY.as_millis()
                    );
                    if !failing {
                        failing = true;
                        self.notifier.broadcast(format!(
                            "Alert stream on {} failed: {e}. Reconnecting.",
                            self.cam_id
                        ));
                    }
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
        debug!(cam = %self.cam_id, "alarm monitor exited");
    }

    /// Read the stream until cancelled (`Ok`) or until it fails.
    async fn watch_stream(&self, failing: &mut bool) -> Result<(), CoreError> {
        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(()),
            opened = tokio::time::timeout(self.read_timeout, self.api.alert_stream()) => opened,
        };
        let mut stream = opened.map_err(|_| CoreError::Timeout {
            timeout_secs: self.read_timeout.as_secs(),
        })??;
        info!(cam = %self.cam_id, "alert stream connected");

        let mut last_alert: Option<Instant> = None;
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(()),
                next = tokio::time::timeout(self.read_timeout, stream.next()) => next,
            };
            let chunk = match next {
                Err(_) => {
                    return Err(CoreError::Timeout {
                        timeout_secs: self.read_timeout.as_secs(),
                    });
                }
                Ok(None) => return Err(CoreError::ChunkLoopExhausted),
                Ok(Some(chunk)) => chunk?,
            };
            if std::mem::take(failing) {
                info!(cam = %self.cam_id, "alert stream recovered");
            }
            self.handle_chunk(&chunk, &mut last_alert);
        }
    }

    fn handle_chunk(&self, chunk: &str, last_alert: &mut Option<Instant>) {
        if last_alert.is_some_and(|at| at.elapsed() < self.alert_delay) {
            return;
        }

        let detection = match ChunkDetector::detect(chunk) {
            Ok(Some(detection)) => detection,
            Ok(None) => return,
            Err(e) => {
                // Heartbeat events such as videoloss land here.
                debug!(cam = %self.cam_id, error = %e, "skipping alert chunk");
                return;
            }
        };

        let alert_count = self.alert_count.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(cam = %self.cam_id, %detection, alert_count, "alert detected");
        self.notifier.notify(detection, alert_count);
        *last_alert = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::config::DetectionConfig;
    use crate::events::{OutboundEvent, OutboundKind};
    use crate::queue::ResultQueue;
    use crate::testutil::{self, FakeApi};

    fn alarm(cam: &CameraConfig, api: &Arc<FakeApi>, queue: &ResultQueue) -> AlarmService {
        let api: Arc<dyn CameraApi> = Arc::clone(api) as Arc<dyn CameraApi>;
        let notifier = testutil::notifier(cam, Arc::clone(&api), queue);
        AlarmService::new(cam, api, notifier)
    }

    async fn drain(queue: &ResultQueue) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Some(event) = queue.try_get().await {
            events.push(event);
        }
        events
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_is_rejected_without_second_monitor() {
        let mut cam = testutil::camera_config();
        cam.alert.motion.enabled = true;
        let api = Arc::new(FakeApi::default());
        let queue = ResultQueue::new();
        let service = alarm(&cam, &api, &queue);

        service.start().await.expect("first start");
        let err = service.start().await.unwrap_err();
        assert!(matches!(err, CoreError::ServiceRuntime { .. }));

        tokio::time::sleep(secs(1)).await;
        assert!(service.started());
        assert!(service.monitor_running().await);
        assert_eq!(api.alert_streams.load(Ordering::SeqCst), 1);
        assert_eq!(api.switch_calls(), vec![(Detection::Motion, true)]);

        service.stop().await.expect("stop");
        let err = service.stop().await.unwrap_err();
        assert!(matches!(err, CoreError::ServiceRuntime { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trigger_enable_leaves_service_stopped() {
        let mut cam = testutil::camera_config();
        cam.alert.line.enabled = true;
        let api = Arc::new(FakeApi {
            fail_switch: true,
            ..FakeApi::default()
        });
        let queue = ResultQueue::new();
        let service = alarm(&cam, &api, &queue);

        let err = service.start().await.unwrap_err();
        assert!(matches!(err, CoreError::ServiceRuntime { ref message } if message.contains("Line Crossing Detection")));
        assert_eq!(service.state(), ServiceState::Stopped);
        assert!(!service.monitor_running().await);
        assert_eq!(api.alert_streams.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_monitor() {
        let cam = testutil::camera_config();
        let api = Arc::new(FakeApi::default());
        let queue = ResultQueue::new();
        let service = alarm(&cam, &api, &queue);

        service.start().await.expect("start");
        let mut state = service.subscribe();
        service.stop().await.expect("stop");
        assert_eq!(*state.borrow_and_update(), ServiceState::Stopped);

        tokio::time::sleep(secs(1)).await;
        assert!(!service.monitor_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn detections_inside_alert_delay_are_dropped() {
        let mut cam = testutil::camera_config();
        cam.alert.delay = secs(5);
        let text_only = DetectionConfig {
            send_text: true,
            ..DetectionConfig::default()
        };
        cam.alert.motion = text_only;
        cam.alert.line = text_only;

        // Detections at t=0, 1, 2 and 7 seconds.
        let api = Arc::new(FakeApi::with_script([
            (secs(0), "<eventType>VMD</eventType>"),
            (secs(1), "<eventType>VMD</eventType>"),
            (secs(1), "<eventType>linedetection</eventType>"),
            (secs(5), "<eventType>VMD</eventType>"),
        ]));
        let queue = ResultQueue::new();
        let service = alarm(&cam, &api, &queue);

        service.start().await.expect("start");
        tokio::time::sleep(secs(20)).await;

        let events = drain(&queue).await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e.kind, OutboundKind::SendText { .. } if e.message.is_none())));
        assert_eq!(service.alert_count(), 2);
        service.stop().await.expect("stop");
    }

    #[tokio::test(start_paused = true)]
    async fn single_detection_produces_one_resized_alert_snapshot() {
        let mut cam = testutil::camera_config();
        cam.alert.delay = Duration::ZERO;
        cam.alert.motion = DetectionConfig {
            sendpic: true,
            fullpic: false,
            ..DetectionConfig::default()
        };
        let api = Arc::new(FakeApi::with_script([
            (Duration::ZERO, "noise"),
            (Duration::ZERO, "<eventType>VMD<"),
            (Duration::ZERO, "noise"),
        ]));
        let queue = ResultQueue::new();
        let service = alarm(&cam, &api, &queue);

        service.start().await.expect("start");
        tokio::time::sleep(secs(1)).await;

        let events = drain(&queue).await;
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            OutboundKind::AlertSnapshot {
                resized,
                alert_count,
                detection,
                ..
            } => {
                assert!(*resized);
                assert_eq!(*alert_count, 1);
                assert_eq!(*detection, Detection::Motion);
            }
            other => panic!("expected alert snapshot, got {other:?}"),
        }
        assert_eq!(api.last_resize(), Some(Some(cam.snapshot.resize)));
        service.stop().await.expect("stop");
    }

    #[tokio::test(start_paused = true)]
    async fn ended_stream_is_reopened() {
        let cam = testutil::camera_config();
        let api = Arc::new(FakeApi {
            end_stream: true,
            ..FakeApi::default()
        });
        let queue = ResultQueue::new();
        let service = alarm(&cam, &api, &queue);

        service.start().await.expect("start");
        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert!(api.alert_streams.load(Ordering::SeqCst) >= 3);
        assert!(service.monitor_running().await);

        service.stop().await.expect("stop");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_stream_times_out_and_reconnects() {
        let mut cam = testutil::camera_config();
        cam.stream_timeout = secs(10);
        let api = Arc::new(FakeApi::default());
        let queue = ResultQueue::new();
        let service = alarm(&cam, &api, &queue);

        service.start().await.expect("start");
        tokio::time::sleep(secs(11)).await;
        assert_eq!(api.alert_streams.load(Ordering::SeqCst), 2);

        service.stop().await.expect("stop");
    }

    #[tokio::test(start_paused = true)]
    async fn failure_streak_is_broadcast_once() {
        let cam = testutil::camera_config();
        let api = Arc::new(FakeApi {
            end_stream: true,
            ..FakeApi::default()
        });
        let queue = ResultQueue::new();
        let service = alarm(&cam, &api, &queue);

        service.start().await.expect("start");
        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert!(api.alert_streams.load(Ordering::SeqCst) >= 3);

        let events = drain(&queue).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].kind,
            OutboundKind::SendText { text } if text.contains("Alert stream on") && text.contains(&cam.id)
        ));
        assert!(events[0].message.is_none());
        service.stop().await.expect("stop");
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_stream_open_times_out_and_reconnects() {
        let mut cam = testutil::camera_config();
        cam.stream_timeout = secs(10);
        let api = Arc::new(FakeApi {
            hang_open: true,
            ..FakeApi::default()
        });
        let queue = ResultQueue::new();
        let service = alarm(&cam, &api, &queue);

        service.start().await.expect("start");
        tokio::time::sleep(secs(35)).await;
        assert_eq!(api.alert_streams.load(Ordering::SeqCst), 4);
        assert!(service.monitor_running().await);

        let events = drain(&queue).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].kind,
            OutboundKind::SendText { text } if text.contains("timed out")
        ));
        service.stop().await.expect("stop");
    }

    #[tokio::test(start_paused = true)]
    async fn huge_alert_delay_suppresses_later_detections() {
        let mut cam = testutil::camera_config();
        cam.alert.delay = Duration::MAX;
        cam.stream_timeout = secs(7200);
        cam.alert.motion = DetectionConfig {
            send_text: true,
            ..DetectionConfig::default()
        };
        let api = Arc::new(FakeApi::with_script([
            (Duration::ZERO, "<eventType>VMD</eventType>"),
            (secs(3600), "<eventType>VMD</eventType>"),
        ]));
        let queue = ResultQueue::new();
        let service = alarm(&cam, &api, &queue);

        service.start().await.expect("start");
        tokio::time::sleep(secs(3601)).await;

        assert_eq!(service.alert_count(), 1);
        assert!(service.monitor_running().await);
        service.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn trigger_switch_reports_already_in_state() {
        let cam = testutil::camera_config();
        let api = Arc::new(FakeApi {
            already: Some("Motion Detection already enabled".into()),
            ..FakeApi::default()
        });
        let queue = ResultQueue::new();
        let service = alarm(&cam, &api, &queue);

        let text = service
            .trigger_switch(Detection::Motion, true)
            .await
            .expect("switch");
        assert_eq!(text, "Motion Detection already enabled");
    }
}
