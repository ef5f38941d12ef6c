// ── Bot events ──
//
// Inbound events are user requests already parsed into typed actions.
// Outbound events are results waiting to be rendered to chat. Both are
// immutable once built.

pub mod inbound;
pub mod outbound;

pub use inbound::{InboundEvent, InboundKind};
pub use outbound::{OutboundEvent, OutboundKind};

/// The chat message an event answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
    pub user_id: i64,
}
