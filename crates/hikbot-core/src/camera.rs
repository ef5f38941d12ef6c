// ── Cameras ──
//
// A `Camera` bundles one camera's config, API client, services and
// recorder. `CameraHub` is the fixed set of cameras built at startup.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Local};
use hikbot_api::CameraApi;
use tracing::info;

use crate::config::{CameraConfig, StreamKind};
use crate::error::CoreError;
use crate::ffmpeg;
use crate::notifier::AlarmNotifier;
use crate::queue::ResultQueue;
use crate::services::{AlarmService, Service, ServiceManager, ServiceType, StreamService};
use crate::videogif::VideoGifRecorder;

/// A picture taken on request.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub img: Bytes,
    pub taken_at: DateTime<Local>,
    pub resized: bool,
    /// Per-camera snapshot number.
    pub counter: u64,
}

pub struct Camera {
    config: CameraConfig,
    api: Arc<dyn CameraApi>,
    services: ServiceManager,
    alarm: Arc<AlarmService>,
    streams: Vec<StreamService>,
    recorder: Arc<VideoGifRecorder>,
    snapshot_counter: AtomicU64,
}

impl Camera {
    /// Build a camera and register its alarm and stream services.
    pub fn new(
        config: CameraConfig,
        api: Arc<dyn CameraApi>,
        queue: &ResultQueue,
    ) -> Result<Arc<Self>, CoreError> {
        let recorder = Arc::new(VideoGifRecorder::new(&config, queue.clone()));
        let notifier = Arc::new(AlarmNotifier::new(
            &config,
            Arc::clone(&api),
            queue.clone(),
            Arc::clone(&recorder),
        ));
        let alarm = Arc::new(AlarmService::new(&config, Arc::clone(&api), Arc::clone(&notifier)));

        let streams = config
            .livestreams
            .iter()
            .map(|stream| {
                let command = ffmpeg::stream_command(&config, stream)?;
                Ok(StreamService::new(
                    config.id.clone(),
                    stream,
                    command,
                    Some(Arc::clone(&notifier)),
                ))
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        let services = ServiceManager::new(config.id.clone());
        services.register(std::iter::once(Arc::clone(&alarm) as Arc<dyn Service>))?;
        services.register(
            streams
                .iter()
                .map(|s| Arc::new(s.clone()) as Arc<dyn Service>),
        )?;

        info!(
            cam = %config.id,
            streams = streams.len(),
            "camera ready"
        );
        Ok(Arc::new(Self {
            config,
            api,
            services,
            alarm,
            streams,
            recorder,
            snapshot_counter: AtomicU64::new(0),
        }))
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn description(&self) -> &str {
        &self.config.description
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<dyn CameraApi> {
        &self.api
    }

    pub fn services(&self) -> &ServiceManager {
        &self.services
    }

    pub fn alarm(&self) -> &Arc<AlarmService> {
        &self.alarm
    }

    pub fn stream(&self, kind: StreamKind) -> Option<&StreamService> {
        self.streams.iter().find(|s| s.kind() == kind)
    }

    pub fn recorder(&self) -> &Arc<VideoGifRecorder> {
        &self.recorder
    }

    /// Take a snapshot, resized to the configured resolution when `resize`.
    pub async fn take_snapshot(&self, resize: bool) -> Result<Snapshot, CoreError> {
        let snapshot = &self.config.snapshot;
        let img = self
            .api
            .take_snapshot(snapshot.channel, resize.then_some(snapshot.resize))
            .await?;
        let counter = self.snapshot_counter.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Snapshot {
            img,
            taken_at: Local::now(),
            resized: resize,
            counter,
        })
    }

    /// Start or stop a stream service by kind.
    pub async fn configure_stream(&self, kind: StreamKind, state: bool) -> Result<(), CoreError> {
        let name: &'static str = kind.into();
        if state {
            self.services.start(ServiceType::Stream, name).await
        } else {
            self.services.stop(ServiceType::Stream, name).await
        }
    }
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera")
            .field("id", &self.config.id)
            .field("description", &self.config.description)
            .finish_non_exhaustive()
    }
}

/// All configured cameras, in configuration order.
#[derive(Debug, Default)]
pub struct CameraHub {
    cameras: Vec<Arc<Camera>>,
}

impl CameraHub {
    pub fn new(cameras: Vec<Arc<Camera>>) -> Result<Self, CoreError> {
        for (i, cam) in cameras.iter().enumerate() {
            if cameras[..i].iter().any(|other| other.id() == cam.id()) {
                return Err(CoreError::config(format!("duplicate camera id '{}'", cam.id())));
            }
        }
        Ok(Self { cameras })
    }

    pub fn get(&self, id: &str) -> Result<&Arc<Camera>, CoreError> {
        self.cameras
            .iter()
            .find(|cam| cam.id() == id)
            .ok_or_else(|| CoreError::CameraNotFound { id: id.to_owned() })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Camera>> {
        self.cameras.iter()
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// Start every camera's services that are enabled in config.
    pub async fn start_services(&self) {
        for cam in &self.cameras {
            cam.services().start_all(true).await;
        }
    }

    pub async fn stop_services(&self) {
        for cam in &self.cameras {
            cam.services().stop_all().await;
        }
    }
}
