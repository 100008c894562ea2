//! Resumable session

use crate::protocol::ReadyPayload;

/// A gateway session that can be resumed on a new connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session identifier from READY
    pub id: String,
    /// Gateway URL to resume on, from READY
    pub resume_url: Option<String>,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>, resume_url: Option<String>) -> Self {
        Self {
            id: id.into(),
            resume_url,
        }
    }

    /// URL to connect to for a resume, falling back to `default_url`
    #[must_use]
    pub fn resume_url_or<'a>(&'a self, default_url: &'a str) -> &'a str {
        self.resume_url.as_deref().unwrap_or(default_url)
    }
}

impl From<&ReadyPayload> for Session {
    fn from(ready: &ReadyPayload) -> Self {
        Self::new(ready.session_id.clone(), ready.resume_gateway_url.clone())
    }
}
