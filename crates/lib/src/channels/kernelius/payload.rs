//! Forge webhook payload: the raw wire shape and the typed event built from it.

use serde::{Deserialize, Deserializer};

/// Value the `source` field must carry for a delivery to be accepted.
pub const FORGE_SOURCE: &str = "forge";

/// Raw webhook body as posted by the Forge.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeWebhookPayload {
    pub source: String,
    pub event: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub repository: ForgeRepository,
    pub sender: ForgeSender,
    #[serde(default)]
    pub issue: Option<ForgeIssue>,
    #[serde(default)]
    pub pull_request: Option<ForgePullRequest>,
    #[serde(default)]
    pub comment: Option<ForgeComment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeRepository {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub visibility: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgeSender {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgeIssue {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgePullRequest {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub base_branch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgeComment {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub body: String,
}

/// Forge ids are documented as strings but some deployments send numbers.
fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(serde_json::Number),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

/// What an event is about. Selected once from which sub-object the payload carries.
#[derive(Debug, Clone)]
pub enum ForgeSubject {
    Issue(ForgeIssue),
    PullRequest(ForgePullRequest),
    Repository,
}

/// Typed webhook event.
#[derive(Debug, Clone)]
pub struct ForgeEvent {
    /// Dot-namespaced event name, e.g. `issue.created`.
    pub name: String,
    pub timestamp: Option<String>,
    pub repository: ForgeRepository,
    pub sender: ForgeSender,
    pub subject: ForgeSubject,
    pub comment: Option<ForgeComment>,
}

impl From<ForgeWebhookPayload> for ForgeEvent {
    fn from(p: ForgeWebhookPayload) -> Self {
        let subject = match (p.issue, p.pull_request) {
            (Some(issue), _) => ForgeSubject::Issue(issue),
            (None, Some(pr)) => ForgeSubject::PullRequest(pr),
            (None, None) => ForgeSubject::Repository,
        };
        Self {
            name: p.event,
            timestamp: p.timestamp,
            repository: p.repository,
            sender: p.sender,
            subject,
            comment: p.comment,
        }
    }
}
