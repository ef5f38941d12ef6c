// ── Event dispatch ──
//
// Static routing from event kind to handler: inbound commands run
// against a camera and queue their result, outbound results are
// rendered through the messenger.

pub mod inbound;
pub mod outbound;

pub use inbound::InboundEventDispatcher;
pub use outbound::OutboundEventDispatcher;
