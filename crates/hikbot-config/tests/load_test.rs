#![allow(clippy::unwrap_used)]

use std::io::Write;
use std::time::Duration;

use hikbot_api::AuthScheme;
use hikbot_config::{Config, ConfigError, load_config, save_config};
use hikbot_core::{RestartPeriod, StreamKind, StreamOutput};
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

const FULL: &str = r#"
result_workers = 2

[telegram]
token = "123:abc"
allowed_user_ids = [1, 2]
alert_user_ids = [1]

[[cameras]]
id = "cam_1"
description = "Front door"

[cameras.api]
host = "192.168.1.64"
username = "admin"
password = "hunter2"
rtsp_port = 10554

[cameras.alert]
enabled = true
delay = 30

[cameras.alert.line]
enabled = true
send_text = true
sendpic = true

[cameras.livestream.youtube]
enabled = true
key = "yt-key"
restart_period = 3600

[cameras.livestream.dvr]
dir = "/var/lib/hikbot/dvr"
segment_time = 300

[[cameras]]
id = "garage"

[cameras.api]
host = "https://10.0.0.5:8443"
password = "pw"
auth = "basic"
"#;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn validation_field(err: ConfigError) -> String {
    match err {
        ConfigError::Validation { field, .. } => field,
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn full_config_resolves() {
    let file = write_config(FULL);
    let settings = load_config(file.path()).unwrap().resolve().unwrap();

    assert_eq!(settings.token.expose_secret(), "123:abc");
    assert_eq!(settings.allowed_user_ids, vec![1, 2]);
    assert_eq!(settings.alert_user_ids, vec![1]);
    assert_eq!(settings.result_workers, 2);
    assert_eq!(settings.poll_timeout, Duration::from_secs(30));
    assert_eq!(settings.cameras.len(), 2);

    let cam = &settings.cameras[0];
    assert_eq!(cam.api.host.as_str(), "http://192.168.1.64/");
    assert_eq!(cam.api.password.expose_secret(), "hunter2");
    assert_eq!(cam.api.auth, AuthScheme::Digest);
    assert_eq!(cam.rtsp_port, 10554);
    assert_eq!(cam.stream_timeout, Duration::from_secs(300));
    assert!(cam.alert.enabled);
    assert_eq!(cam.alert.delay, Duration::from_secs(30));
    assert!(cam.alert.line.sendpic);
    assert!(!cam.alert.motion.enabled);

    let kinds: Vec<_> = cam.livestreams.iter().map(|s| s.output.kind()).collect();
    assert_eq!(kinds, vec![StreamKind::Youtube, StreamKind::Dvr]);
    assert_eq!(
        cam.livestreams[0].restart_period,
        RestartPeriod::Every(Duration::from_secs(3600))
    );
    assert_eq!(cam.livestreams[1].restart_period, RestartPeriod::Never);
    match &cam.livestreams[1].output {
        StreamOutput::Dvr { segment_time, .. } => {
            assert_eq!(*segment_time, Duration::from_secs(300));
        }
        other => panic!("unexpected output {other:?}"),
    }

    let garage = &settings.cameras[1];
    assert_eq!(garage.description, "garage");
    assert_eq!(garage.api.host.port(), Some(8443));
    assert_eq!(garage.api.auth, AuthScheme::Basic);
    assert!(garage.livestreams.is_empty());
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }));
}

#[test]
fn missing_token_names_field() {
    let file = write_config(&FULL.replace("token = \"123:abc\"", ""));
    let err = load_config(file.path()).unwrap().resolve().unwrap_err();
    assert_eq!(validation_field(err), "telegram.token");
}

#[test]
fn duplicate_camera_rejected() {
    let file = write_config(&FULL.replace("id = \"garage\"", "id = \"cam_1\""));
    let err = load_config(file.path()).unwrap().resolve().unwrap_err();
    assert_eq!(validation_field(err), "cameras[cam_1].id");
}

#[test]
fn bad_restart_period_names_stream() {
    let file = write_config(&FULL.replace("restart_period = 3600", "restart_period = 0"));
    let err = load_config(file.path()).unwrap().resolve().unwrap_err();
    assert_eq!(
        validation_field(err),
        "cameras[cam_1].livestream.youtube.restart_period"
    );
}

#[test]
fn stream_without_key_rejected() {
    let file = write_config(&FULL.replace("key = \"yt-key\"", ""));
    let err = load_config(file.path()).unwrap().resolve().unwrap_err();
    assert_eq!(validation_field(err), "cameras[cam_1].livestream.youtube.key");
}

#[test]
fn invalid_camera_id_rejected() {
    let file = write_config(&FULL.replace("id = \"garage\"", "id = \"back yard\""));
    let err = load_config(file.path()).unwrap().resolve().unwrap_err();
    assert_eq!(validation_field(err), "cameras[back yard].id");
}

#[test]
fn saved_defaults_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    save_config(&Config::default(), &path).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.result_workers, 4);
    assert_eq!(config.telegram.api_url, "https://api.telegram.org");
    assert!(config.cameras.is_empty());
}
