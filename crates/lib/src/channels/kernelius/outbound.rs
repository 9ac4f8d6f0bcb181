//! Forge REST client: comment creation and reactions only.

use crate::channels::kernelius::error::KerneliusError;
use crate::channels::kernelius::target::{ConversationTarget, MessageKind, MessageRef, ResourceKind};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Result of posting a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of adding a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReactionResult {
    pub added: bool,
}

#[derive(Debug, Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentResponse {
    id: serde_json::Value,
    created_at: String,
}

#[derive(Debug, Serialize)]
struct ReactionRequest<'a> {
    emoji: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReactionResponse {
    #[serde(default)]
    added: bool,
}

/// Client for one account's Forge API. Single attempt per call; no retries.
#[derive(Clone)]
pub struct ForgeClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ForgeClient {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        }
    }

    /// Path segments of the comments collection for an issue or pull request.
    pub fn comments_segments(target: &ConversationTarget) -> Vec<String> {
        let collection = match target.kind {
            ResourceKind::Issue => "issues",
            ResourceKind::PullRequest => "pulls",
        };
        vec![
            "api".to_string(),
            "repositories".to_string(),
            target.owner.clone(),
            target.repo.clone(),
            collection.to_string(),
            target.number.to_string(),
            "comments".to_string(),
        ]
    }

    /// Path segments of the reactions collection for the resource a message id refers to.
    pub fn reactions_segments(message: &MessageRef) -> Vec<String> {
        let resource: &[&str] = match message.kind {
            MessageKind::IssueComment => &["issues", "comments"],
            MessageKind::PullRequestComment => &["pulls", "comments"],
            MessageKind::Issue => &["issues"],
            MessageKind::PullRequest => &["pulls"],
        };
        let mut segments = vec!["api".to_string()];
        segments.extend(resource.iter().map(|s| s.to_string()));
        segments.push(message.id.clone());
        segments.push("reactions".to_string());
        segments
    }

    /// Absolute URL under the account's API base. Each segment is percent-encoded on its own, so
    /// `/`, `?`, `#` and `..` inside an owner, repo or id stay inside that segment.
    fn endpoint(&self, segments: &[String]) -> Result<Url, KerneliusError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| KerneliusError::InvalidApiUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| KerneliusError::InvalidApiUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// POST a comment on an issue or pull request.
    pub async fn create_comment(
        &self,
        target: &ConversationTarget,
        body: &str,
    ) -> Result<SentMessage, KerneliusError> {
        let url = self.endpoint(&Self::comments_segments(target))?;
        let res = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&CommentRequest { body })
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(upstream_error(res).await);
        }
        let data: CommentResponse = res.json().await?;
        let message_id = match data.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(KerneliusError::InvalidResponse(format!(
                    "comment id is not a string or number: {}",
                    other
                )))
            }
        };
        let timestamp = DateTime::parse_from_rfc3339(&data.created_at)
            .map_err(|e| {
                KerneliusError::InvalidResponse(format!("createdAt {:?}: {}", data.created_at, e))
            })?
            .with_timezone(&Utc);
        log::debug!("kernelius: posted comment {} on {}", message_id, target);
        Ok(SentMessage {
            message_id,
            timestamp,
        })
    }

    /// POST a reaction on an issue, pull request or comment.
    pub async fn add_reaction(
        &self,
        message: &MessageRef,
        emoji: &str,
    ) -> Result<ReactionResult, KerneliusError> {
        let url = self.endpoint(&Self::reactions_segments(message))?;
        let res = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&ReactionRequest { emoji })
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(upstream_error(res).await);
        }
        let data: ReactionResponse = res.json().await?;
        log::debug!("kernelius: reaction {} on {} added={}", emoji, message, data.added);
        Ok(ReactionResult { added: data.added })
    }
}

async fn upstream_error(res: reqwest::Response) -> KerneliusError {
    let status = res.status().as_u16();
    let body = match res.text().await {
        Ok(body) => body,
        Err(e) => {
            log::debug!("kernelius: reading forge error body failed: {}", e);
            String::new()
        }
    };
    log::warn!("kernelius: forge api returned {}: {}", status, body);
    KerneliusError::Upstream { status, body }
}
