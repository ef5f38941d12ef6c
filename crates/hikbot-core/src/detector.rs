// ── Alert chunk detector ──
//
// Maps one line of the camera alert stream to a detection kind. Lines
// without an `<eventType>` tag are noise. A tag naming an event that is
// not in the detection table is an error the caller logs and skips.

use std::sync::LazyLock;

use hikbot_api::Detection;
use regex::Regex;

use crate::error::CoreError;

static EVENT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<eventType>(?P<event>[^<]+)<").expect("event type pattern should compile")
});

/// Stateless alert-stream line parser.
pub struct ChunkDetector;

impl ChunkDetector {
    /// Detect the event carried by `chunk`.
    ///
    /// Returns `Ok(None)` for lines that carry no event.
    pub fn detect(chunk: &str) -> Result<Option<Detection>, CoreError> {
        let Some(caps) = EVENT_TYPE.captures(chunk) else {
            return Ok(None);
        };
        let event = caps["event"].trim();
        Detection::from_event_name(event)
            .map(Some)
            .ok_or_else(|| CoreError::UnknownDetection {
                event: event.to_owned(),
            })
    }
}
