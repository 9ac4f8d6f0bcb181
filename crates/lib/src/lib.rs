//! Kernelius core library: config, the Kernelius Forge channel, and the webhook/action gateway
//! used by the CLI.

pub mod channels;
pub mod config;
pub mod gateway;
