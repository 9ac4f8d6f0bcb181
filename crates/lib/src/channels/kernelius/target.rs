//! Compact string identifiers for Forge resources.
//!
//! Conversation targets (`repo:owner/name:issue:42`, `repo:owner/name:pr:10`) address the thread a
//! comment is posted to. Message ids (`issue:<id>`, `pr:<id>`, `issue_comment:<id>`,
//! `pr_comment:<id>`) address the resource a reaction is attached to. Both travel through untyped
//! string fields on the host side and are only encoded/decoded here.

use crate::channels::kernelius::error::KerneliusError;
use std::fmt;
use std::str::FromStr;

const REPO_PREFIX: &str = "repo:";

/// Issue or pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Issue,
    PullRequest,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Issue => "issue",
            ResourceKind::PullRequest => "pr",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "issue" => Some(ResourceKind::Issue),
            "pr" => Some(ResourceKind::PullRequest),
            _ => None,
        }
    }
}

/// A Forge thread (issue or PR) a message can be posted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationTarget {
    pub owner: String,
    pub repo: String,
    pub kind: ResourceKind,
    pub number: u64,
}

impl ConversationTarget {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, kind: ResourceKind, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            kind,
            number,
        }
    }

    /// Conversation id for a thread given the repository's `owner/name` form.
    pub fn conversation_id(full_name: &str, kind: ResourceKind, number: u64) -> String {
        format!("{}{}:{}:{}", REPO_PREFIX, full_name, kind.as_str(), number)
    }

    /// Conversation id for repository-level events with no issue or PR context.
    pub fn repository_conversation(full_name: &str) -> String {
        format!("{}{}", REPO_PREFIX, full_name)
    }
}

impl fmt::Display for ConversationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}/{}:{}:{}",
            REPO_PREFIX,
            self.owner,
            self.repo,
            self.kind.as_str(),
            self.number
        )
    }
}

impl FromStr for ConversationTarget {
    type Err = KerneliusError;

    /// Accepts exactly `repo:<owner>/<name>:<issue|pr>:<digits>`; owner excludes `/`, name excludes `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || KerneliusError::MalformedTarget(s.to_string());
        let rest = s.strip_prefix(REPO_PREFIX).ok_or_else(malformed)?;
        let (owner, rest) = rest.split_once('/').ok_or_else(malformed)?;
        let (repo, rest) = rest.split_once(':').ok_or_else(malformed)?;
        let (kind, number) = rest.split_once(':').ok_or_else(malformed)?;
        if owner.is_empty() || repo.is_empty() {
            return Err(malformed());
        }
        let kind = ResourceKind::parse(kind).ok_or_else(malformed)?;
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let number = number.parse::<u64>().map_err(|_| malformed())?;
        Ok(Self::new(owner, repo, kind, number))
    }
}

/// Which Forge resource a message id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Issue,
    PullRequest,
    IssueComment,
    PullRequestComment,
}

impl MessageKind {
    /// Prefixes in match order: the comment forms must be tried before their shorter siblings.
    const PREFIXES: [(&'static str, MessageKind); 4] = [
        ("issue_comment:", MessageKind::IssueComment),
        ("pr_comment:", MessageKind::PullRequestComment),
        ("issue:", MessageKind::Issue),
        ("pr:", MessageKind::PullRequest),
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            MessageKind::Issue => "issue:",
            MessageKind::PullRequest => "pr:",
            MessageKind::IssueComment => "issue_comment:",
            MessageKind::PullRequestComment => "pr_comment:",
        }
    }
}

/// Typed message id: resource kind plus the Forge's opaque id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub kind: MessageKind,
    pub id: String,
}

impl MessageRef {
    pub fn new(kind: MessageKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.id)
    }
}

impl FromStr for MessageRef {
    type Err = KerneliusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::PREFIXES
            .iter()
            .find_map(|(prefix, kind)| {
                s.strip_prefix(prefix)
                    .filter(|id| !id.is_empty())
                    .map(|id| MessageRef::new(*kind, id))
            })
            .ok_or_else(|| KerneliusError::UnknownMessageIdFormat(s.to_string()))
    }
}
