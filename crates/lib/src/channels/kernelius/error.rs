//! Errors surfaced by the Kernelius channel to its caller.

/// Failure of an outbound action or a codec decode. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum KerneliusError {
    #[error("Kernelius API key not configured for account {account_id}")]
    NotConfigured { account_id: String },
    #[error(
        "invalid Kernelius target format: {0}. expected repo:owner/name:issue:42 or repo:owner/name:pr:10"
    )]
    MalformedTarget(String),
    #[error("unknown Kernelius message id format: {0}")]
    UnknownMessageIdFormat(String),
    #[error("forge api error: {status} {body}")]
    Upstream { status: u16, body: String },
    #[error("forge request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected forge response: {0}")]
    InvalidResponse(String),
    #[error("invalid Kernelius API url: {0}")]
    InvalidApiUrl(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("missing required parameters: {0}")]
    MissingParams(&'static str),
}

impl KerneliusError {
    /// True for errors caused by caller input (bad target, message id, action or params).
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            Self::MalformedTarget(_)
                | Self::UnknownMessageIdFormat(_)
                | Self::UnknownAction(_)
                | Self::MissingParams(_)
        )
    }
}
