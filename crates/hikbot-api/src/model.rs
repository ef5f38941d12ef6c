// ── ISAPI domain types ──
//
// Detection kinds, IR-cut filter modes and snapshot resolutions. Each
// detection kind carries the static table that ties together the alert
// stream event name, the ISAPI endpoint, the XML root element and the
// label shown to users.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// A camera-side detection trigger.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Detection {
    Motion,
    Line,
    Intrusion,
}

impl Detection {
    /// Event name as it appears inside `<eventType>` in the alert stream.
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Motion => "VMD",
            Self::Line => "linedetection",
            Self::Intrusion => "fielddetection",
        }
    }

    /// Reverse lookup of [`event_name`](Self::event_name).
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "VMD" => Some(Self::Motion),
            "linedetection" => Some(Self::Line),
            "fielddetection" => Some(Self::Intrusion),
            _ => None,
        }
    }

    /// ISAPI resource path holding the trigger configuration.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Motion => "ISAPI/System/Video/inputs/channels/1/motionDetection",
            Self::Line => "ISAPI/Smart/LineDetection/1",
            Self::Intrusion => "ISAPI/Smart/FieldDetection/1",
        }
    }

    /// Root element name of the trigger's XML document.
    pub fn xml_method(self) -> &'static str {
        match self {
            Self::Motion => "MotionDetection",
            Self::Line => "LineDetection",
            Self::Intrusion => "FieldDetection",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Motion => "Motion Detection",
            Self::Line => "Line Crossing Detection",
            Self::Intrusion => "Intrusion Detection",
        }
    }
}

/// Day/night IR-cut filter mode.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IrcutFilter {
    Day,
    Night,
    Auto,
}

/// Requested snapshot resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}
