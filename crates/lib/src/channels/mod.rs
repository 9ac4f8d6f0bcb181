//! Communication channels (e.g. Kernelius Forge).
//!
//! Each channel turns platform events into [`InboundMessage`]s for the host queue and exposes
//! outbound actions (send, react) the host can call.

mod inbound;
pub mod kernelius;

pub use inbound::{ChatType, InboundMessage};
pub use kernelius::KerneliusChannel;
