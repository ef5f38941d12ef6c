#![allow(clippy::unwrap_used)]

// Kept in its own test binary: `HIKBOT_*` variables set here must not
// leak into the file-only tests.

use hikbot_config::load_config;
use secrecy::ExposeSecret;

const CONFIG: &str = r#"
[telegram]
token = "from-file"
allowed_user_ids = [1]

[[cameras]]
id = "cam_1"

[cameras.api]
host = "192.168.1.64"
password = "pw"
"#;

#[test]
fn env_overrides_file() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("hikbot.toml", CONFIG)?;
        jail.set_env("HIKBOT_TELEGRAM__TOKEN", "from-env");
        jail.set_env("HIKBOT_RESULT_WORKERS", "8");

        let config = load_config(std::path::Path::new("hikbot.toml")).map_err(|e| e.to_string())?;
        let settings = config.resolve().map_err(|e| e.to_string())?;
        assert_eq!(settings.token.expose_secret(), "from-env");
        assert_eq!(settings.result_workers, 8);
        Ok(())
    });
}

