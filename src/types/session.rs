//! Clone session lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::viewport::Viewport;

/// Lifecycle status of a clone session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Analyzing,
    Generating,
    Refining,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Legal state-machine transitions. Anything not listed is rejected;
    /// `Failed` is terminal.
    pub fn can_transition(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Analyzing)
                | (Analyzing, Generating)
                | (Generating, Completed)
                | (Completed, Refining)
                | (Refining, Completed)
                | (Pending, Failed)
                | (Analyzing, Failed)
                | (Generating, Failed)
                | (Refining, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// One appended entry in a session's progress log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStep {
    pub step_name: String,
    pub status: SessionStatus,
    pub progress_percentage: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Token accounting reported by the generative collaborator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A generated HTML replica. Immutable; refinement supersedes rather than
/// mutates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlArtifact {
    pub html_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<String>,
    /// Component-presence similarity in [0, 100].
    pub similarity_score: f32,
    pub generation_time_ms: u64,
    pub tokens_used: TokenUsage,
}

/// Parameters of one clone request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneRequest {
    pub url: String,
    #[serde(default = "Viewport::default")]
    pub viewport: Viewport,
    /// Maximum DOM extraction depth.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Whether to download and localize discovered assets.
    #[serde(default = "default_true")]
    pub download_assets: bool,
}

fn default_max_depth() -> u32 {
    6
}

fn default_true() -> bool {
    true
}

impl CloneRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            viewport: Viewport::default(),
            max_depth: default_max_depth(),
            download_assets: true,
        }
    }
}

/// The persistent record of one replication request's lifecycle.
///
/// Mutated only by the session store under the single-writer discipline;
/// callers receive cloned snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneSession {
    pub session_id: String,
    pub status: SessionStatus,
    pub request: CloneRequest,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub progress: Vec<ProgressStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<HtmlArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub refinement_iterations: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CloneSession {
    pub fn new(session_id: String, request: CloneRequest) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            status: SessionStatus::Pending,
            request,
            progress: Vec::new(),
            result: None,
            error_message: None,
            refinement_iterations: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_cannot_jump_to_generating() {
        assert!(!SessionStatus::Pending.can_transition(SessionStatus::Generating));
        assert!(SessionStatus::Pending.can_transition(SessionStatus::Analyzing));
    }

    #[test]
    fn failed_is_terminal() {
        use SessionStatus::*;
        for next in [Pending, Analyzing, Generating, Refining, Completed, Failed] {
            assert!(!Failed.can_transition(next), "Failed -> {next:?} must be illegal");
        }
    }

    #[test]
    fn refinement_only_from_completed() {
        assert!(SessionStatus::Completed.can_transition(SessionStatus::Refining));
        assert!(!SessionStatus::Generating.can_transition(SessionStatus::Refining));
        assert!(!SessionStatus::Pending.can_transition(SessionStatus::Refining));
    }

    #[test]
    fn new_session_starts_pending_without_result() {
        let session = CloneSession::new("s1".into(), CloneRequest::new("https://example.com"));
        assert_eq!(session.status, SessionStatus::Pending);
        assert!(session.result.is_none());
        assert!(session.error_message.is_none());
        assert_eq!(session.refinement_iterations, 0);
    }
}
