//! Camera service engine for hikbot.
//!
//! Everything between the Telegram front-end and the camera API lives
//! here:
//!
//! - **[`Camera`] / [`CameraHub`]**: per-camera config, API client and
//!   registered services, built once at startup.
//! - **Services** ([`services`]): the [`AlarmService`] watching the
//!   camera's alert stream and one [`StreamService`] per configured
//!   livestream, all driven through a per-camera [`ServiceManager`].
//! - **Events** ([`events`]): [`InboundEvent`]s parsed from chat
//!   commands, handled by the [`InboundEventDispatcher`]; results land
//!   on the [`ResultQueue`] as [`OutboundEvent`]s and are delivered by
//!   the [`ResultWorkerManager`] through an [`OutboundEventDispatcher`].
//! - **[`Messenger`]**: the outbound chat transport seam.

pub mod camera;
pub mod config;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod events;
pub(crate) mod ffmpeg;
pub mod messenger;
pub mod notifier;
pub mod queue;
pub mod services;
pub mod videogif;
pub mod worker;

#[cfg(test)]
mod testutil;

// ── Primary re-exports ──────────────────────────────────────────────
pub use camera::{Camera, CameraHub, Snapshot};
pub use config::{
    AlertConfig, CameraConfig, DetectionConfig, EncoderConfig, RestartPeriod, SnapshotConfig,
    StreamConfig, StreamKind, StreamOutput, VideoGifConfig, VideoSource,
};
pub use detector::ChunkDetector;
pub use dispatch::{InboundEventDispatcher, OutboundEventDispatcher};
pub use error::CoreError;
pub use events::{InboundEvent, InboundKind, MessageRef, OutboundEvent, OutboundKind};
pub use messenger::{ChatAction, Messenger, Recipient, VideoUpload};
pub use notifier::AlarmNotifier;
pub use queue::ResultQueue;
pub use services::{
    AlarmService, Service, ServiceManager, ServiceState, ServiceType, StreamService,
};
pub use videogif::VideoGifRecorder;
pub use worker::ResultWorkerManager;
