//! Kernelius Forge channel: Forge webhooks in, issue/PR comments and reactions out.
//!
//! Inbound deliveries go through [`inbound::handle_webhook`]; outbound `send`/`react` actions go
//! through [`KerneliusChannel`], which resolves the account from the injected config and calls the
//! Forge REST API once per action.

mod account;
mod actions;
mod error;
mod inbound;
mod outbound;
mod payload;
mod signature;
mod target;

pub use account::{
    default_account_id, delete_account, describe_account, is_configured, list_account_ids,
    resolve_account, resolve_webhook_path, set_account_enabled, AccountDescription,
    ResolvedAccount, DEFAULT_ACCOUNT_ID, DEFAULT_API_URL, DEFAULT_WEBHOOK_PATH,
};
pub use actions::{extract_tool_send, handle_action, ToolSend};
pub use error::KerneliusError;
pub use inbound::{handle_webhook, map_event, StatusSink, WebhookContext, WebhookOutcome};
pub use outbound::{ForgeClient, ReactionResult, SentMessage};
pub use payload::{
    ForgeComment, ForgeEvent, ForgeIssue, ForgePullRequest, ForgeRepository, ForgeSender,
    ForgeSubject, ForgeWebhookPayload, FORGE_SOURCE,
};
pub use signature::{
    compute_signature, format_signature_header, verify_signature, SignatureError,
    SIGNATURE_HEADER,
};
pub use target::{ConversationTarget, MessageKind, MessageRef, ResourceKind};

use crate::channels::inbound::ChatType;
use crate::config::Config;
use serde::Serialize;
use std::sync::Arc;

/// Channel id used in config (`channels.kernelius`) and on inbound messages.
pub const CHANNEL_ID: &str = "kernelius";

/// Display metadata for the host's channel list.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelMeta {
    pub id: &'static str,
    pub name: &'static str,
    pub emoji: &'static str,
    pub description: &'static str,
}

/// What the channel supports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCapabilities {
    pub chat_types: Vec<ChatType>,
    pub reactions: bool,
    pub threads: bool,
    pub media: bool,
    pub native_commands: bool,
}

/// Outbound side of the channel. Holds the config it resolves accounts from; no global state.
#[derive(Clone)]
pub struct KerneliusChannel {
    config: Arc<Config>,
    client: reqwest::Client,
}

impl KerneliusChannel {
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: Arc<Config>, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn meta() -> ChannelMeta {
        ChannelMeta {
            id: CHANNEL_ID,
            name: "Kernelius Forge",
            emoji: "🔥",
            description: "Git platform for human-agent collaboration",
        }
    }

    pub fn capabilities() -> ChannelCapabilities {
        ChannelCapabilities {
            chat_types: vec![ChatType::Channel],
            reactions: true,
            threads: true,
            media: false,
            native_commands: false,
        }
    }

    /// Config paths whose change requires the channel to be reloaded.
    pub fn config_prefixes() -> &'static [&'static str] {
        &["channels.kernelius"]
    }

    pub fn list_actions() -> &'static [&'static str] {
        &["send", "react"]
    }

    pub fn resolve_account(&self, account_id: Option<&str>) -> ResolvedAccount {
        resolve_account(&self.config, account_id)
    }

    /// Forge client for an account; fails before any network use when the account has no API key.
    fn client_for(&self, account_id: Option<&str>) -> Result<ForgeClient, KerneliusError> {
        let account = self.resolve_account(account_id);
        let api_key = account.api_key().ok_or_else(|| KerneliusError::NotConfigured {
            account_id: account.account_id.clone(),
        })?;
        Ok(ForgeClient::new(self.client.clone(), &account.api_url, api_key))
    }

    /// Post `message` as a comment on the issue or PR addressed by `to` (`repo:owner/name:issue:42`).
    pub async fn send(
        &self,
        to: &str,
        message: &str,
        account_id: Option<&str>,
    ) -> Result<SentMessage, KerneliusError> {
        let client = self.client_for(account_id)?;
        let target: ConversationTarget = to.parse()?;
        client.create_comment(&target, message).await
    }

    /// React with `emoji` to the resource addressed by `message_id` (`issue_comment:17`, `pr:3`, ...).
    pub async fn react(
        &self,
        message_id: &str,
        emoji: &str,
        account_id: Option<&str>,
    ) -> Result<ReactionResult, KerneliusError> {
        let client = self.client_for(account_id)?;
        let message: MessageRef = message_id.parse()?;
        client.add_reaction(&message, emoji).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KerneliusConfig;

    #[tokio::test]
    async fn send_without_api_key_is_not_configured() {
        let channel = KerneliusChannel::new(Arc::new(Config::default()));
        match channel.send("repo:a/b:issue:1", "hi", None).await {
            Err(KerneliusError::NotConfigured { account_id }) => {
                assert_eq!(account_id, DEFAULT_ACCOUNT_ID)
            }
            other => panic!("expected NotConfigured, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_inputs_fail_before_network() {
        let mut config = Config::default();
        config.channels.kernelius = Some(KerneliusConfig {
            api_key: Some("k".to_string()),
            api_url: Some("http://127.0.0.1:9".to_string()),
            ..Default::default()
        });
        let channel = KerneliusChannel::new(Arc::new(config));
        assert!(matches!(
            channel.send("acme/widgets#1", "hi", None).await,
            Err(KerneliusError::MalformedTarget(_))
        ));
        assert!(matches!(
            channel.react("comment:1", "+1", None).await,
            Err(KerneliusError::UnknownMessageIdFormat(_))
        ));
    }

    #[test]
    fn reloads_on_own_config_section() {
        assert_eq!(KerneliusChannel::config_prefixes(), ["channels.kernelius"]);
        assert_eq!(KerneliusChannel::list_actions(), ["send", "react"]);
        assert_eq!(KerneliusChannel::meta().id, CHANNEL_ID);
    }

    #[test]
    fn capabilities_are_channel_only() {
        let caps = serde_json::to_value(KerneliusChannel::capabilities()).unwrap();
        assert_eq!(caps["chatTypes"], serde_json::json!(["channel"]));
        assert_eq!(caps["reactions"], true);
        assert_eq!(caps["media"], false);
    }
}
