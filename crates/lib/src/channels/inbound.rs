//! Inbound message from a channel: handed to the host queue for routing.

use serde::Serialize;

/// Chat classification. The Forge bridge only produces multi-party conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Channel,
}

/// A normalized message from a channel to be routed by the host.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Envelope id, unique per delivery (not the Forge resource id).
    pub id: String,
    pub channel_id: String,
    pub account_id: String,
    /// Stable thread id, e.g. `repo:acme/widgets:issue:3`.
    pub conversation_id: String,
    pub sender_name: String,
    pub text: String,
    /// Unix ms.
    pub timestamp: i64,
    pub chat_type: ChatType,
    /// Resource-addressing id used later for reactions, e.g. `issue_comment:17`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}
