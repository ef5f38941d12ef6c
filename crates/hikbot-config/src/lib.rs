//! Configuration for the hikbot binary.
//!
//! TOML file + `HIKBOT_*` environment overrides, validated and translated
//! into `hikbot_core::CameraConfig` values. Secrets stay plain strings in
//! the TOML structs and become `SecretString` on translation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use hikbot_api::{AuthScheme, ClientConfig, Resolution};
use hikbot_core::{
    AlertConfig, CameraConfig, DetectionConfig, EncoderConfig, RestartPeriod, SnapshotConfig,
    StreamConfig, StreamKind, StreamOutput, VideoGifConfig, VideoSource,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const ENV_PREFIX: &str = "HIKBOT_";
const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";
/// YouTube drops ingest connections after 12 hours.
const DEFAULT_RESTART_PERIOD: i64 = 39_600;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Size of the outbound delivery worker pool.
    pub result_workers: usize,
    pub telegram: TelegramSection,
    pub cameras: Vec<CameraSection>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            result_workers: hikbot_core::worker::DEFAULT_WORKERS,
            telegram: TelegramSection::default(),
            cameras: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelegramSection {
    /// Bot token (plaintext, or set `HIKBOT_TELEGRAM__TOKEN`).
    pub token: String,
    pub api_url: String,
    /// Users whose commands are accepted.
    pub allowed_user_ids: Vec<i64>,
    /// Chats receiving alert broadcasts.
    pub alert_user_ids: Vec<i64>,
    /// Long-poll timeout for `getUpdates`, seconds.
    pub poll_timeout: u64,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: DEFAULT_TELEGRAM_API.into(),
            allowed_user_ids: Vec::new(),
            alert_user_ids: Vec::new(),
            poll_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraSection {
    pub id: String,
    pub description: String,
    pub api: ApiSection,
    pub snapshot: SnapshotSection,
    pub alert: AlertSection,
    pub video_gif: VideoGifSection,
    pub livestream: LivestreamSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiSection {
    /// Camera address, with or without scheme (`192.168.1.64`).
    pub host: String,
    pub username: String,
    pub password: String,
    /// `digest` (default) or `basic`.
    pub auth: AuthScheme,
    /// Request timeout, seconds.
    pub timeout: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    /// Read timeout between alert stream chunks, seconds.
    pub stream_timeout: u64,
    pub rtsp_port: u16,
    /// Accept self-signed certificates.
    pub insecure: bool,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: "admin".into(),
            password: String::new(),
            auth: AuthScheme::Digest,
            timeout: 10,
            retries: 2,
            retry_delay_ms: 500,
            stream_timeout: 300,
            rtsp_port: 554,
            insecure: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SnapshotSection {
    pub channel: u32,
    pub resize_width: u32,
    pub resize_height: u32,
}

impl Default for SnapshotSection {
    fn default() -> Self {
        let resize = Resolution::default();
        Self {
            channel: 101,
            resize_width: resize.width,
            resize_height: resize.height,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertSection {
    pub enabled: bool,
    /// Minimum seconds between two notifications.
    pub delay: u64,
    pub motion: DetectionSection,
    pub line: DetectionSection,
    pub intrusion: DetectionSection,
}

impl Default for AlertSection {
    fn default() -> Self {
        Self {
            enabled: false,
            delay: 15,
            motion: DetectionSection::default(),
            line: DetectionSection::default(),
            intrusion: DetectionSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct DetectionSection {
    pub enabled: bool,
    pub send_text: bool,
    pub sendpic: bool,
    pub fullpic: bool,
    pub send_videogif: bool,
    pub rewind: bool,
}

impl From<&DetectionSection> for DetectionConfig {
    fn from(s: &DetectionSection) -> Self {
        Self {
            enabled: s.enabled,
            send_text: s.send_text,
            sendpic: s.sendpic,
            fullpic: s.fullpic,
            send_videogif: s.send_videogif,
            rewind: s.rewind,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VideoGifSection {
    pub channel: u32,
    pub record_time: u64,
    pub rewind_time: u64,
    pub tmp_storage: Option<PathBuf>,
    pub loglevel: String,
    pub timeout: u64,
}

impl Default for VideoGifSection {
    fn default() -> Self {
        Self {
            channel: 101,
            record_time: 5,
            rewind_time: 10,
            tmp_storage: None,
            loglevel: "error".into(),
            timeout: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LivestreamSection {
    pub youtube: Option<StreamSection>,
    pub telegram: Option<StreamSection>,
    pub icecast: Option<StreamSection>,
    pub srs: Option<StreamSection>,
    pub dvr: Option<StreamSection>,
}

impl LivestreamSection {
    fn sections(&self) -> impl Iterator<Item = (StreamKind, &StreamSection)> {
        [
            (StreamKind::Youtube, &self.youtube),
            (StreamKind::Telegram, &self.telegram),
            (StreamKind::Icecast, &self.icecast),
            (StreamKind::Srs, &self.srs),
            (StreamKind::Dvr, &self.dvr),
        ]
        .into_iter()
        .filter_map(|(kind, section)| section.as_ref().map(|s| (kind, s)))
    }
}

/// One livestream. Output fields only apply to the kinds that use them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamSection {
    pub enabled: bool,
    pub channel: u32,
    /// Seconds between forced restarts, `-1` for never. Defaults per kind.
    pub restart_period: Option<i64>,
    /// Seconds to wait between stop and start on a forced restart.
    pub restart_pause: u64,
    pub loglevel: String,
    /// Pull video from this SRS URL instead of the camera.
    pub source_url: Option<String>,
    pub encoder: EncoderSection,
    pub url: Option<String>,
    pub key: Option<String>,
    pub ice_name: Option<String>,
    pub content_type: Option<String>,
    pub format: Option<String>,
    pub dir: Option<PathBuf>,
    pub segment_time: Option<u64>,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: 101,
            restart_period: None,
            restart_pause: 2,
            loglevel: "error".into(),
            source_url: None,
            encoder: EncoderSection::default(),
            url: None,
            key: None,
            ice_name: None,
            content_type: None,
            format: None,
            dir: None,
            segment_time: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EncoderSection {
    pub video_codec: String,
    pub preset: Option<String>,
    pub video_bitrate_kbps: Option<u32>,
    pub framerate: Option<u32>,
    pub audio: bool,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
}

impl Default for EncoderSection {
    fn default() -> Self {
        let encoder = EncoderConfig::default();
        Self {
            video_codec: encoder.video_codec,
            preset: encoder.preset,
            video_bitrate_kbps: encoder.video_bitrate_kbps,
            framerate: encoder.framerate,
            audio: encoder.audio,
            audio_codec: encoder.audio_codec,
            audio_bitrate_kbps: encoder.audio_bitrate_kbps,
        }
    }
}

impl From<&EncoderSection> for EncoderConfig {
    fn from(s: &EncoderSection) -> Self {
        Self {
            video_codec: s.video_codec.clone(),
            preset: s.preset.clone(),
            video_bitrate_kbps: s.video_bitrate_kbps,
            framerate: s.framerate,
            audio: s.audio,
            audio_codec: s.audio_codec.clone(),
            audio_bitrate_kbps: s.audio_bitrate_kbps,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "hikbot", "hikbot").map_or_else(
        || PathBuf::from("hikbot.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Layered provider: defaults, then the file, then the environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load the raw config from `path` plus environment overrides.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(figment(path).extract()?)
}

/// Write `cfg` as TOML, creating parent directories.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

// ── Validation / translation ────────────────────────────────────────

/// Validated runtime settings.
#[derive(Debug)]
pub struct Settings {
    pub token: SecretString,
    pub api_url: Url,
    pub allowed_user_ids: Vec<i64>,
    pub alert_user_ids: Vec<i64>,
    pub poll_timeout: Duration,
    pub result_workers: usize,
    pub cameras: Vec<CameraConfig>,
}

impl Config {
    /// Validate and translate into runtime settings.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let telegram = &self.telegram;
        if telegram.token.trim().is_empty() {
            return Err(invalid("telegram.token", "must be set"));
        }
        let api_url = Url::parse(&telegram.api_url)
            .map_err(|e| invalid("telegram.api_url", format!("invalid URL: {e}")))?;
        if telegram.allowed_user_ids.is_empty() {
            return Err(invalid("telegram.allowed_user_ids", "at least one user is required"));
        }
        if self.result_workers == 0 {
            return Err(invalid("result_workers", "must be at least 1"));
        }
        if self.cameras.is_empty() {
            return Err(invalid("cameras", "at least one camera is required"));
        }

        let mut seen = HashSet::new();
        let cameras = self
            .cameras
            .iter()
            .map(|cam| {
                if !seen.insert(cam.id.as_str()) {
                    return Err(invalid(
                        format!("cameras[{}].id", cam.id),
                        "duplicate camera id",
                    ));
                }
                cam.resolve()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Settings {
            token: SecretString::from(telegram.token.clone()),
            api_url,
            allowed_user_ids: telegram.allowed_user_ids.clone(),
            alert_user_ids: telegram.alert_user_ids.clone(),
            poll_timeout: Duration::from_secs(telegram.poll_timeout),
            result_workers: self.result_workers,
            cameras,
        })
    }
}

impl CameraSection {
    fn resolve(&self) -> Result<CameraConfig, ConfigError> {
        if self.id.is_empty()
            || !self
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(invalid(
                format!("cameras[{}].id", self.id),
                "must be non-empty and contain only letters, digits and '_'",
            ));
        }
        let field = |name: &str| format!("cameras[{}].{name}", self.id);

        let api = &self.api;
        let host = parse_host(&api.host).ok_or_else(|| {
            invalid(field("api.host"), format!("invalid camera address '{}'", api.host))
        })?;
        let mut client = ClientConfig::new(host, api.username.clone(), SecretString::from(api.password.clone()));
        client.auth = api.auth;
        client.timeout = Duration::from_secs(api.timeout);
        client.retries = api.retries;
        client.retry_delay = Duration::from_millis(api.retry_delay_ms);
        client.accept_invalid_certs = api.insecure;

        if api.stream_timeout == 0 {
            return Err(invalid(field("api.stream_timeout"), "must be positive"));
        }

        let alert = &self.alert;
        let video_gif = &self.video_gif;
        if video_gif.record_time == 0 {
            return Err(invalid(field("video_gif.record_time"), "must be positive"));
        }

        let livestreams = self
            .livestream
            .sections()
            .map(|(kind, section)| section.resolve(kind, &field(&format!("livestream.{kind}"))))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CameraConfig {
            id: self.id.clone(),
            description: if self.description.is_empty() {
                self.id.clone()
            } else {
                self.description.clone()
            },
            api: client,
            rtsp_port: api.rtsp_port,
            stream_timeout: Duration::from_secs(api.stream_timeout),
            snapshot: SnapshotConfig {
                channel: self.snapshot.channel,
                resize: Resolution {
                    width: self.snapshot.resize_width,
                    height: self.snapshot.resize_height,
                },
            },
            alert: AlertConfig {
                enabled: alert.enabled,
                delay: Duration::from_secs(alert.delay),
                motion: (&alert.motion).into(),
                line: (&alert.line).into(),
                intrusion: (&alert.intrusion).into(),
            },
            video_gif: VideoGifConfig {
                channel: video_gif.channel,
                record_time: Duration::from_secs(video_gif.record_time),
                rewind_time: Duration::from_secs(video_gif.rewind_time),
                tmp_storage: video_gif
                    .tmp_storage
                    .clone()
                    .unwrap_or_else(std::env::temp_dir),
                loglevel: video_gif.loglevel.clone(),
                timeout: Duration::from_secs(video_gif.timeout),
            },
            livestreams,
        })
    }
}

impl StreamSection {
    fn resolve(&self, kind: StreamKind, prefix: &str) -> Result<StreamConfig, ConfigError> {
        let field = |name: &str| format!("{prefix}.{name}");
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| invalid(field(name), format!("required for {kind} streams")))
        };

        let period = self.restart_period.unwrap_or(match kind {
            StreamKind::Srs | StreamKind::Dvr => -1,
            _ => DEFAULT_RESTART_PERIOD,
        });
        let restart_period = RestartPeriod::from_secs(period).ok_or_else(|| {
            invalid(
                field("restart_period"),
                format!("expected -1 or a positive number of seconds, got {period}"),
            )
        })?;

        let output = match kind {
            StreamKind::Youtube => StreamOutput::Youtube {
                url: self
                    .url
                    .clone()
                    .unwrap_or_else(|| "rtmp://a.rtmp.youtube.com/live2".into()),
                key: SecretString::from(required(&self.key, "key")?),
            },
            StreamKind::Telegram => StreamOutput::Telegram {
                url: required(&self.url, "url")?,
                key: SecretString::from(required(&self.key, "key")?),
            },
            StreamKind::Icecast => StreamOutput::Icecast {
                url: SecretString::from(required(&self.url, "url")?),
                ice_name: self.ice_name.clone().unwrap_or_else(|| "hikbot".into()),
                content_type: self
                    .content_type
                    .clone()
                    .unwrap_or_else(|| "audio/mpeg".into()),
                format: self.format.clone().unwrap_or_else(|| "mp3".into()),
            },
            StreamKind::Srs => StreamOutput::Srs {
                url: required(&self.url, "url")?,
            },
            StreamKind::Dvr => StreamOutput::Dvr {
                dir: self
                    .dir
                    .clone()
                    .ok_or_else(|| invalid(field("dir"), "required for dvr streams"))?,
                segment_time: Duration::from_secs(self.segment_time.unwrap_or(600)),
            },
        };

        Ok(StreamConfig {
            enabled: self.enabled,
            channel: self.channel,
            restart_period,
            restart_pause: Duration::from_secs(self.restart_pause),
            source: match &self.source_url {
                Some(url) => VideoSource::Srs { url: url.clone() },
                None => VideoSource::Camera,
            },
            encoder: (&self.encoder).into(),
            output,
            loglevel: self.loglevel.clone(),
        })
    }
}

/// Accept `host`, `host:port` or a full URL.
fn parse_host(host: &str) -> Option<Url> {
    let host = host.trim();
    if host.is_empty() {
        return None;
    }
    let url = if host.contains("://") {
        Url::parse(host)
    } else {
        Url::parse(&format!("http://{host}"))
    };
    url.ok().filter(|u| u.host_str().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_without_scheme_gets_http() {
        let url = parse_host("192.168.1.64").expect("host");
        assert_eq!(url.as_str(), "http://192.168.1.64/");
        let url = parse_host("https://cam.local:8443").expect("host");
        assert_eq!(url.port(), Some(8443));
        assert!(parse_host("  ").is_none());
    }

    #[test]
    fn restart_period_defaults_per_kind() {
        let section = StreamSection {
            url: Some("rtmp://srs.local/live".into()),
            ..StreamSection::default()
        };
        let srs = section.resolve(StreamKind::Srs, "s").expect("srs");
        assert_eq!(srs.restart_period, RestartPeriod::Never);

        let section = StreamSection {
            key: Some("abcd".into()),
            ..StreamSection::default()
        };
        let yt = section.resolve(StreamKind::Youtube, "s").expect("youtube");
        assert_eq!(
            yt.restart_period,
            RestartPeriod::Every(Duration::from_secs(39_600))
        );
    }

    #[test]
    fn srs_source_url() {
        let section = StreamSection {
            url: Some("icecast://source:pw@radio.local:8000/cam".into()),
            source_url: Some("rtmp://srs.local/live/cam_1".into()),
            ..StreamSection::default()
        };
        let stream = section.resolve(StreamKind::Icecast, "s").expect("icecast");
        assert!(matches!(stream.source, VideoSource::Srs { ref url } if url.ends_with("cam_1")));
        assert_eq!(stream.output.kind(), StreamKind::Icecast);
    }
}
