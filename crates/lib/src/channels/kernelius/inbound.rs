//! Webhook ingestion: verify, parse, validate and map one Forge delivery to an inbound message.
//!
//! Every delivery produces exactly one HTTP response ([`WebhookOutcome`]) and at most one
//! [`InboundMessage`]. Enqueueing the message is the caller's job.

use crate::channels::inbound::{ChatType, InboundMessage};
use crate::channels::kernelius::account::ResolvedAccount;
use crate::channels::kernelius::payload::{
    ForgeEvent, ForgeSubject, ForgeWebhookPayload, FORGE_SOURCE,
};
use crate::channels::kernelius::signature::{verify_signature, SignatureError};
use crate::channels::kernelius::target::{ConversationTarget, MessageKind, MessageRef, ResourceKind};
use crate::channels::kernelius::CHANNEL_ID;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde_json::json;

/// Receives channel activity timestamps (e.g. for a status page). Must not block.
pub trait StatusSink: Send + Sync {
    fn record_inbound(&self, at_ms: i64);
}

/// Per-request inputs of the pipeline.
pub struct WebhookContext<'a> {
    pub account: &'a ResolvedAccount,
    pub status_sink: Option<&'a dyn StatusSink>,
}

/// HTTP response to send plus the mapped message, if any.
#[derive(Debug)]
pub struct WebhookOutcome {
    pub status: StatusCode,
    pub body: serde_json::Value,
    pub message: Option<InboundMessage>,
}

impl WebhookOutcome {
    fn reject(status: StatusCode, error: &str) -> Self {
        Self {
            status,
            body: json!({ "error": error }),
            message: None,
        }
    }

    fn accepted(event: &str, message: InboundMessage) -> Self {
        Self {
            status: StatusCode::OK,
            body: json!({ "success": true, "event": event }),
            message: Some(message),
        }
    }

    /// Response for a failure outside the pipeline (e.g. the host queue is gone).
    pub fn internal_error() -> Self {
        Self::reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

/// Run the pipeline over a raw request body and the `X-Forge-Signature` header value.
pub fn handle_webhook(
    ctx: &WebhookContext<'_>,
    signature: Option<&str>,
    body: &[u8],
) -> WebhookOutcome {
    let account_id = ctx.account.account_id.as_str();
    if let Err(e) = verify_signature(body, signature, ctx.account.webhook_secret.as_deref()) {
        log::warn!("kernelius webhook [{}]: {}", account_id, e);
        return match e {
            SignatureError::Missing => WebhookOutcome::reject(
                StatusCode::UNAUTHORIZED,
                "Missing X-Forge-Signature header",
            ),
            SignatureError::Invalid => {
                WebhookOutcome::reject(StatusCode::UNAUTHORIZED, "Invalid signature")
            }
        };
    }

    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("kernelius webhook [{}]: invalid json: {}", account_id, e);
            return WebhookOutcome::reject(StatusCode::BAD_REQUEST, "Invalid JSON payload");
        }
    };

    if value.get("source").and_then(|s| s.as_str()) != Some(FORGE_SOURCE) {
        log::warn!("kernelius webhook [{}]: rejected delivery with invalid source", account_id);
        return WebhookOutcome::reject(StatusCode::BAD_REQUEST, "Invalid source");
    }

    let received_at = Utc::now();
    if let Some(sink) = ctx.status_sink {
        sink.record_inbound(received_at.timestamp_millis());
    }

    let payload: ForgeWebhookPayload = match serde_json::from_value(value) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("kernelius webhook [{}]: unusable payload: {}", account_id, e);
            return WebhookOutcome::reject(StatusCode::BAD_REQUEST, "Could not process event");
        }
    };
    let event = ForgeEvent::from(payload);
    match map_event(&event, account_id, received_at) {
        Some(message) => {
            log::info!(
                "kernelius webhook [{}]: {} on {}",
                account_id,
                event.name,
                message.conversation_id
            );
            WebhookOutcome::accepted(&event.name, message)
        }
        None => WebhookOutcome::reject(StatusCode::BAD_REQUEST, "Could not process event"),
    }
}

/// Map a Forge event to a host message. Returns `None` when the event has no usable content.
pub fn map_event(
    event: &ForgeEvent,
    account_id: &str,
    received_at: DateTime<Utc>,
) -> Option<InboundMessage> {
    let full_name = event.repository.full_name.trim();
    if full_name.is_empty() {
        return None;
    }
    let user = event.sender.username.as_str();
    let name = event.name.as_str();
    let comment = event.comment.as_ref();

    let (conversation_id, text, message_id) = match &event.subject {
        ForgeSubject::Issue(issue) => {
            let n = issue.number;
            let issue_ref = || MessageRef::new(MessageKind::Issue, issue.id.as_str());
            let (text, message_ref) = match (name, comment) {
                ("issue.created", _) => (
                    format!(
                        "**New Issue #{}**: {}\n\n{}",
                        n,
                        issue.title,
                        issue.body.as_deref().unwrap_or("")
                    ),
                    issue_ref(),
                ),
                ("issue.commented", Some(c)) => (
                    format!("**Comment on Issue #{}** by @{}:\n\n{}", n, user, c.body),
                    MessageRef::new(MessageKind::IssueComment, c.id.as_str()),
                ),
                ("issue.closed", _) => (format!("**Issue #{} closed** by @{}", n, user), issue_ref()),
                ("issue.reopened", _) => {
                    (format!("**Issue #{} reopened** by @{}", n, user), issue_ref())
                }
                ("issue.updated", _) => (
                    format!("**Issue #{} updated** by @{}: {}", n, user, issue.title),
                    issue_ref(),
                ),
                _ => (format!("Issue #{} event: {}", n, name), issue_ref()),
            };
            (
                ConversationTarget::conversation_id(full_name, ResourceKind::Issue, n),
                text,
                Some(message_ref),
            )
        }
        ForgeSubject::PullRequest(pr) => {
            let n = pr.number;
            let pr_ref = || MessageRef::new(MessageKind::PullRequest, pr.id.as_str());
            let (text, message_ref) = match (name, comment) {
                ("pr.created", _) => (
                    format!(
                        "**New Pull Request #{}**: {}\n\n{}",
                        n,
                        pr.title,
                        pr.body.as_deref().unwrap_or("")
                    ),
                    pr_ref(),
                ),
                ("pr.review_requested", _) => (
                    format!(
                        "**Review Requested on PR #{}** by @{}: {}\n\nPlease review this pull request.",
                        n, user, pr.title
                    ),
                    pr_ref(),
                ),
                ("pr.reviewed", _) => (format!("**PR #{} reviewed** by @{}", n, user), pr_ref()),
                ("pr.merged", _) => (format!("**PR #{} merged** by @{}", n, user), pr_ref()),
                ("pr.closed", _) => (format!("**PR #{} closed** by @{}", n, user), pr_ref()),
                ("pr.reopened", _) => (format!("**PR #{} reopened** by @{}", n, user), pr_ref()),
                ("pr.commented", Some(c)) => (
                    format!("**Comment on PR #{}** by @{}:\n\n{}", n, user, c.body),
                    MessageRef::new(MessageKind::PullRequestComment, c.id.as_str()),
                ),
                _ => (format!("Pull Request #{} event: {}", n, name), pr_ref()),
            };
            (
                ConversationTarget::conversation_id(full_name, ResourceKind::PullRequest, n),
                text,
                Some(message_ref),
            )
        }
        ForgeSubject::Repository => (
            ConversationTarget::repository_conversation(full_name),
            format!("Repository event: {}", name),
            None,
        ),
    };

    Some(InboundMessage {
        id: uuid::Uuid::new_v4().to_string(),
        channel_id: CHANNEL_ID.to_string(),
        account_id: account_id.to_string(),
        conversation_id,
        sender_name: user.to_string(),
        text,
        timestamp: event_timestamp(event.timestamp.as_deref(), received_at),
        chat_type: ChatType::Channel,
        message_id: message_id.map(|m| m.to_string()),
    })
}

/// Event time in Unix ms; receipt time when the payload's ISO timestamp is missing or unparsable.
fn event_timestamp(timestamp: Option<&str>, received_at: DateTime<Utc>) -> i64 {
    match timestamp.map(DateTime::parse_from_rfc3339) {
        Some(Ok(t)) => t.timestamp_millis(),
        Some(Err(e)) => {
            log::debug!("kernelius webhook: unparsable timestamp, using receipt time: {}", e);
            received_at.timestamp_millis()
        }
        None => received_at.timestamp_millis(),
    }
}
