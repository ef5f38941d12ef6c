// ── Video-gif recorder ──
//
// Records a short clip from the camera with ffmpeg and queues it for
// delivery. Clips can start a few seconds in the past by reading the
// camera's playback track instead of the live stream.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{TimeDelta, Utc};
use hikbot_api::{ClientConfig, Detection};
use tracing::{error, info};

use crate::config::{CameraConfig, VideoGifConfig};
use crate::error::CoreError;
use crate::events::{MessageRef, OutboundEvent, OutboundKind};
use crate::ffmpeg;
use crate::queue::ResultQueue;

/// What asked for a recording, and so where the result goes.
#[derive(Debug, Clone, Copy)]
pub enum RecordTrigger {
    /// A user command; the clip answers the message.
    Command(MessageRef),
    /// An alert; the clip is broadcast.
    Alert(Detection),
}

/// One-at-a-time clip recorder for a camera.
pub struct VideoGifRecorder {
    cam_id: String,
    cam_description: String,
    api: ClientConfig,
    rtsp_port: u16,
    config: VideoGifConfig,
    queue: ResultQueue,
    recording: AtomicBool,
}

/// Clears the recording flag when the recording task ends.
struct RecordingGuard<'a>(&'a AtomicBool);

impl Drop for RecordingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl VideoGifRecorder {
    pub fn new(cam: &CameraConfig, queue: ResultQueue) -> Self {
        Self {
            cam_id: cam.id.clone(),
            cam_description: cam.description.clone(),
            api: cam.api.clone(),
            rtsp_port: cam.rtsp_port,
            config: cam.video_gif.clone(),
            queue,
            recording: AtomicBool::new(false),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Start recording in the background.
    ///
    /// Fails right away when a recording is already running.
    pub fn start_recording(self: &Arc<Self>, rewind: bool, trigger: RecordTrigger) -> Result<(), CoreError> {
        if self
            .recording
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CoreError::runtime(format!(
                "Video on {} is already being recorded, try again later",
                self.cam_description
            )));
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = RecordingGuard(&this.recording);
            this.finish(rewind, trigger).await;
        });
        Ok(())
    }

    async fn finish(&self, rewind: bool, trigger: RecordTrigger) {
        let (message, detection) = match trigger {
            RecordTrigger::Command(message) => (Some(message), None),
            RecordTrigger::Alert(detection) => (None, Some(detection)),
        };

        let kind = match self.record(rewind).await {
            Ok(path) => OutboundKind::VideoGif { path, detection },
            Err(e) => {
                error!(cam = %self.cam_id, task = "videogif", error = %e, "video recording failed");
                if message.is_none() {
                    return;
                }
                OutboundKind::SendText {
                    text: format!("Failed to record video on {}: {e}", self.cam_description),
                }
            }
        };

        self.queue.put(OutboundEvent {
            cam_id: self.cam_id.clone(),
            cam_description: self.cam_description.clone(),
            message,
            kind,
        });
    }

    async fn record(&self, rewind: bool) -> Result<PathBuf, CoreError> {
        let now = Utc::now();
        let input = if rewind {
            let back = TimeDelta::from_std(self.config.rewind_time)
                .map_err(|e| CoreError::config(format!("invalid rewind time: {e}")))?;
            ffmpeg::playback_url(&self.api, self.rtsp_port, self.config.channel, now - back)?
        } else {
            ffmpeg::live_url(&self.api, self.rtsp_port, self.config.channel)?
        };

        let path = self.config.tmp_storage.join(format!(
            "{}-{}.mp4",
            self.cam_id,
            now.format("%Y%m%d-%H%M%S%.3f")
        ));
        let command = ffmpeg::record_command(
            &input,
            self.config.record_time,
            &self.config.loglevel,
            &path.to_string_lossy(),
        );

        info!(cam = %self.cam_id, rewind, path = %path.display(), "recording video");
        ffmpeg::run_to_completion(&command, self.config.timeout).await?;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(CoreError::Subprocess {
                message: format!("ffmpeg produced no file at {}", path.display()),
            });
        }
        Ok(path)
    }
}
