use hikbot_api::{Detection, IrcutFilter};
use tracing::{debug, warn};

use crate::camera::Camera;
use crate::config::StreamKind;
use crate::error::CoreError;
use crate::events::{InboundEvent, InboundKind, OutboundEvent, OutboundKind};
use crate::queue::ResultQueue;
use crate::services::alarm::ALARM_SERVICE_NAME;
use crate::services::{Service, ServiceType};
use crate::videogif::RecordTrigger;

/// Runs user commands and queues one reply per command.
///
/// Handler failures become a text reply to the triggering message.
pub struct InboundEventDispatcher {
    queue: ResultQueue,
}

impl InboundEventDispatcher {
    pub fn new(queue: ResultQueue) -> Self {
        Self { queue }
    }

    pub async fn dispatch(&self, event: InboundEvent) {
        let InboundEvent { cam, message, kind } = event;
        debug!(cam = %cam.id(), task = kind.name(), "handling inbound event");

        let result = match kind {
            InboundKind::TakeSnapshot { resize } => take_snapshot(&cam, resize).await,
            InboundKind::RecordVideoGif { rewind } => cam
                .recorder()
                .start_recording(rewind, RecordTrigger::Command(message))
                .map(|()| None),
            InboundKind::ConfigureAlarm { state } => configure_alarm(&cam, state).await,
            InboundKind::ConfigureDetection { detection, state } => {
                configure_detection(&cam, detection, state).await
            }
            InboundKind::ConfigureStream { stream, state } => {
                configure_stream(&cam, stream, state).await
            }
            InboundKind::ConfigureIrcutFilter { filter } => configure_ircut(&cam, filter).await,
            InboundKind::CameraStatus => Ok(Some(OutboundKind::SendText {
                text: camera_status(&cam).await,
            })),
        };

        let reply = match result {
            Ok(Some(reply)) => reply,
            Ok(None) => return,
            Err(e) => {
                warn!(cam = %cam.id(), task = kind.name(), error = %e, "command failed");
                OutboundKind::SendText {
                    text: if e.is_user_facing() {
                        e.to_string()
                    } else {
                        format!("Command failed on {}: {e}", cam.description())
                    },
                }
            }
        };

        self.queue.put(OutboundEvent {
            cam_id: cam.id().to_owned(),
            cam_description: cam.description().to_owned(),
            message: Some(message),
            kind: reply,
        });
    }
}

// ── Task handlers ────────────────────────────────────────────────────

type TaskResult = Result<Option<OutboundKind>, CoreError>;

fn on_off(state: bool) -> &'static str {
    if state { "enabled" } else { "disabled" }
}

async fn take_snapshot(cam: &Camera, resize: bool) -> TaskResult {
    let snapshot = cam.take_snapshot(resize).await?;
    Ok(Some(OutboundKind::Snapshot {
        img: snapshot.img,
        taken_at: snapshot.taken_at,
        resized: snapshot.resized,
        counter: snapshot.counter,
    }))
}

async fn configure_alarm(cam: &Camera, state: bool) -> TaskResult {
    let services = cam.services();
    if state {
        services.start(ServiceType::Alarm, ALARM_SERVICE_NAME).await?;
    } else {
        services.stop(ServiceType::Alarm, ALARM_SERVICE_NAME).await?;
    }
    Ok(Some(OutboundKind::AlarmConfigured {
        state,
        text: format!("Alarm on {} {}", cam.description(), on_off(state)),
    }))
}

async fn configure_detection(cam: &Camera, detection: Detection, state: bool) -> TaskResult {
    let text = cam.alarm().trigger_switch(detection, state).await?;
    Ok(Some(OutboundKind::DetectionConfigured {
        detection,
        state,
        text,
    }))
}

async fn configure_stream(cam: &Camera, stream: StreamKind, state: bool) -> TaskResult {
    cam.configure_stream(stream, state).await?;
    Ok(Some(OutboundKind::StreamConfigured {
        stream,
        state,
        text: format!(
            "{stream} stream on {} {}",
            cam.description(),
            if state { "started" } else { "stopped" }
        ),
    }))
}

async fn configure_ircut(cam: &Camera, filter: IrcutFilter) -> TaskResult {
    cam.api().set_ircut_filter(filter).await.map_err(|e| {
        CoreError::runtime(format!(
            "Failed to set IR-cut filter on {}: {}",
            cam.description(),
            CoreError::from(e)
        ))
    })?;
    Ok(Some(OutboundKind::IrcutConfigured {
        filter,
        text: format!("IR-cut filter on {} set to {filter}", cam.description()),
    }))
}

async fn camera_status(cam: &Camera) -> String {
    let alarm = cam.alarm();
    let detections: Vec<String> = cam
        .config()
        .alert
        .enabled_detections()
        .iter()
        .map(ToString::to_string)
        .collect();

    let mut lines = vec![
        format!("{} ({})", cam.description(), cam.id()),
        format!("Alarm: {} (alerts: {})", alarm.state(), alarm.alert_count()),
        format!(
            "Detections: {}",
            if detections.is_empty() {
                "none".to_owned()
            } else {
                detections.join(", ")
            }
        ),
    ];
    for service in cam.services().get_all() {
        if service.service_type() == ServiceType::Stream {
            lines.push(format!("Stream {}: {}", service.name(), service.state()));
        }
    }
    lines.push(format!(
        "Video recording: {}",
        if cam.recorder().is_recording() { "in progress" } else { "idle" }
    ));
    lines.join("\n")
}
