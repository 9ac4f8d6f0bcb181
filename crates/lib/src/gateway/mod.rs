//! Gateway: HTTP surface for the Kernelius channel.
//!
//! Single port serves the Forge webhook route(s), the `/actions` endpoint for outbound actions,
//! and a health probe at `/`. Accepted webhook messages are handed to the host through an mpsc
//! sender supplied by the caller.

mod protocol;
mod server;

pub use protocol::{ActionRequest, ActionResponse};
pub use server::{run_gateway, ChannelStatus};
