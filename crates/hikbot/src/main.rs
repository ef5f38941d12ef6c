mod bot;
mod cli;
mod commands;
mod error;
mod telegram;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use hikbot_api::{CameraApi, HikvisionClient};
use hikbot_config::{ApiSection, CameraSection, Config, LivestreamSection, Settings, StreamSection};
use hikbot_core::{
    Camera, CameraHub, CoreError, InboundEventDispatcher, Messenger, OutboundEventDispatcher,
    RestartPeriod, ResultQueue, ResultWorkerManager,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::bot::Bot;
use crate::cli::{Cli, Command, InitConfigArgs};
use crate::error::BotError;
use crate::telegram::TelegramClient;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), BotError> {
    let path = cli
        .global
        .config
        .clone()
        .unwrap_or_else(hikbot_config::config_path);

    match cli.command {
        Command::Run => serve(load_settings(&path)?).await,
        Command::CheckConfig => {
            let settings = load_settings(&path)?;
            print_summary(&path, &settings);
            Ok(())
        }
        Command::InitConfig(args) => init_config(&path, &args),
    }
}

fn load_settings(path: &Path) -> Result<Settings, BotError> {
    info!(path = %path.display(), "loading config");
    Ok(hikbot_config::load_config(path)?.resolve()?)
}

// ── run ──────────────────────────────────────────────────────────────

async fn serve(settings: Settings) -> Result<(), BotError> {
    let queue = ResultQueue::new();
    let cameras = settings
        .cameras
        .into_iter()
        .map(|config| {
            let api: Arc<dyn CameraApi> = Arc::new(HikvisionClient::new(config.api.clone())?);
            Camera::new(config, api, &queue)
        })
        .collect::<Result<Vec<_>, CoreError>>()?;
    let hub = Arc::new(CameraHub::new(cameras)?);

    let telegram = Arc::new(
        TelegramClient::new(settings.api_url, settings.token, settings.poll_timeout).map_err(
            |e| BotError::Telegram {
                message: e.to_string(),
            },
        )?,
    );
    let me = telegram.get_me().await.map_err(|e| BotError::Telegram {
        message: e.to_string(),
    })?;
    info!(
        bot = me.username.as_deref().unwrap_or("?"),
        cameras = hub.len(),
        "connected to Telegram"
    );

    let outbound = Arc::new(OutboundEventDispatcher::new(
        Arc::clone(&telegram) as Arc<dyn Messenger>,
        settings.alert_user_ids,
    ));
    let workers_cancel = CancellationToken::new();
    let workers = ResultWorkerManager::new(queue.clone(), outbound, settings.result_workers)
        .start(&workers_cancel);

    hub.start_services().await;

    let poll_cancel = CancellationToken::new();
    let bot = Bot::new(
        Arc::clone(&hub),
        telegram,
        Arc::new(InboundEventDispatcher::new(queue)),
        settings.allowed_user_ids,
    );
    let poller = tokio::spawn(bot.poll(poll_cancel.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    poll_cancel.cancel();
    if let Err(e) = poller.await {
        warn!(error = %e, "update poller panicked");
    }
    hub.stop_services().await;

    workers_cancel.cancel();
    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "result worker panicked");
        }
    }
    Ok(())
}

// ── check-config ─────────────────────────────────────────────────────

fn print_summary(path: &Path, settings: &Settings) {
    println!("Config OK: {}", path.display());
    println!(
        "Allowed users: {}, alert recipients: {}, result workers: {}",
        settings.allowed_user_ids.len(),
        settings.alert_user_ids.len(),
        settings.result_workers
    );
    for cam in &settings.cameras {
        let detections: Vec<_> = cam
            .alert
            .enabled_detections()
            .iter()
            .map(|d| d.label())
            .collect();
        println!();
        println!("{} ({})", cam.id, cam.description);
        println!("  host:   {}", cam.api.host);
        println!(
            "  alert:  {} [{}], delay {}",
            if cam.alert.enabled { "on" } else { "off" },
            detections.join(", "),
            humantime::format_duration(cam.alert.delay)
        );
        for stream in &cam.livestreams {
            let restart = match stream.restart_period {
                RestartPeriod::Never => "never restarts".to_owned(),
                RestartPeriod::Every(period) => {
                    format!("restarts every {}", humantime::format_duration(period))
                }
            };
            println!(
                "  stream: {} ({}, {restart})",
                stream.output.kind(),
                if stream.enabled { "enabled" } else { "disabled" }
            );
        }
    }
}

// ── init-config ──────────────────────────────────────────────────────

fn init_config(path: &Path, args: &InitConfigArgs) -> Result<(), BotError> {
    if path.exists() && !args.force {
        return Err(BotError::ConfigExists {
            path: path.display().to_string(),
        });
    }

    let mut config = Config::default();
    config.telegram.token = "123456:replace-me".into();
    config.telegram.allowed_user_ids = vec![0];
    config.cameras.push(CameraSection {
        id: "cam_1".into(),
        description: "Front door".into(),
        api: ApiSection {
            host: "192.168.1.64".into(),
            password: "replace-me".into(),
            ..ApiSection::default()
        },
        livestream: LivestreamSection {
            srs: Some(StreamSection {
                url: Some("rtmp://localhost/live".into()),
                ..StreamSection::default()
            }),
            ..LivestreamSection::default()
        },
        ..CameraSection::default()
    });

    hikbot_config::save_config(&config, path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
