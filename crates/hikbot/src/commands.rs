//! Chat command parsing.
//!
//! Camera commands are `/<action>_<camera id>`, e.g. `/getpic_cam_1` or
//! `/alert_on_garage`. A `@botname` suffix is ignored.

use hikbot_api::{Detection, IrcutFilter};
use hikbot_core::{Camera, CameraHub, InboundKind, StreamKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// `/start` or `/help`.
    Help,
    ListCams,
    Camera { cam_id: String, kind: InboundKind },
}

/// Action prefixes, each followed by `_<camera id>`.
const CAMERA_COMMANDS: &[(&str, InboundKind)] = &[
    ("getpic", InboundKind::TakeSnapshot { resize: true }),
    ("getfullpic", InboundKind::TakeSnapshot { resize: false }),
    ("getvideo", InboundKind::RecordVideoGif { rewind: false }),
    ("getvideor", InboundKind::RecordVideoGif { rewind: true }),
    ("alert_on", InboundKind::ConfigureAlarm { state: true }),
    ("alert_off", InboundKind::ConfigureAlarm { state: false }),
    ("md_on", detection(Detection::Motion, true)),
    ("md_off", detection(Detection::Motion, false)),
    ("ld_on", detection(Detection::Line, true)),
    ("ld_off", detection(Detection::Line, false)),
    ("intr_on", detection(Detection::Intrusion, true)),
    ("intr_off", detection(Detection::Intrusion, false)),
    ("yt_on", stream(StreamKind::Youtube, true)),
    ("yt_off", stream(StreamKind::Youtube, false)),
    ("tg_on", stream(StreamKind::Telegram, true)),
    ("tg_off", stream(StreamKind::Telegram, false)),
    ("icecast_on", stream(StreamKind::Icecast, true)),
    ("icecast_off", stream(StreamKind::Icecast, false)),
    ("srs_on", stream(StreamKind::Srs, true)),
    ("srs_off", stream(StreamKind::Srs, false)),
    ("dvr_on", stream(StreamKind::Dvr, true)),
    ("dvr_off", stream(StreamKind::Dvr, false)),
    ("ircut_day", ircut(IrcutFilter::Day)),
    ("ircut_night", ircut(IrcutFilter::Night)),
    ("ircut_auto", ircut(IrcutFilter::Auto)),
    ("status", InboundKind::CameraStatus),
];

const fn detection(detection: Detection, state: bool) -> InboundKind {
    InboundKind::ConfigureDetection { detection, state }
}

const fn stream(stream: StreamKind, state: bool) -> InboundKind {
    InboundKind::ConfigureStream { stream, state }
}

const fn ircut(filter: IrcutFilter) -> InboundKind {
    InboundKind::ConfigureIrcutFilter { filter }
}

/// Parse a message text. Returns `None` for anything that is not a command.
pub fn parse(text: &str) -> Option<BotCommand> {
    let word = text.split_whitespace().next()?.strip_prefix('/')?;
    let name = word.split_once('@').map_or(word, |(name, _)| name);

    match name {
        "start" | "help" => return Some(BotCommand::Help),
        "list_cams" => return Some(BotCommand::ListCams),
        _ => {}
    }

    CAMERA_COMMANDS.iter().find_map(|&(prefix, kind)| {
        let cam_id = name.strip_prefix(prefix)?.strip_prefix('_')?;
        (!cam_id.is_empty()).then(|| BotCommand::Camera {
            cam_id: cam_id.to_owned(),
            kind,
        })
    })
}

/// The `/list_cams` reply.
pub fn camera_list(hub: &CameraHub) -> String {
    let mut out = format!("{} camera(s):", hub.len());
    for cam in hub.iter() {
        out.push_str("\n\n");
        out.push_str(&camera_help(cam));
    }
    out
}

fn camera_help(cam: &Camera) -> String {
    let id = cam.id();
    let mut lines = vec![
        format!("{} ({id})", cam.description()),
        format!("/getpic_{id} /getfullpic_{id} /status_{id}"),
        format!("/getvideo_{id} /getvideor_{id}"),
        format!("/alert_on_{id} /alert_off_{id}"),
        format!("/md_on_{id} /ld_on_{id} /intr_on_{id}"),
        format!("/ircut_day_{id} /ircut_night_{id} /ircut_auto_{id}"),
    ];
    let streams: Vec<String> = CAMERA_COMMANDS
        .iter()
        .filter_map(|&(prefix, kind)| match kind {
            InboundKind::ConfigureStream { stream, state: true } if cam.stream(stream).is_some() => {
                Some(format!("/{prefix}_{id}"))
            }
            _ => None,
        })
        .collect();
    if !streams.is_empty() {
        lines.push(streams.join(" "));
    }
    lines.join("\n")
}

pub const HELP: &str = "Hikvision camera bot.\n\
    /list_cams lists cameras and their commands.\n\
    Commands take the form /<action>_<camera id>, e.g. /getpic_cam_1.";
