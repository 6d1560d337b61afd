use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum CloneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Session error{id}: {message}", id = .session_id.as_deref().map(|s| format!(" ({s})")).unwrap_or_default())]
    Session {
        session_id: Option<String>,
        message: String,
    },

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Detection invariant violated: {0}")]
    Detection(String),

    #[error("Provider error ({provider}): {message}")]
    Provider {
        provider: String,
        message: String,
        transient: bool,
    },

    #[error("Budget error: {0}")]
    Budget(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CloneError {
    pub fn validation(message: impl Into<String>) -> Self {
        CloneError::Validation(message.into())
    }

    pub fn session(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        CloneError::Session {
            session_id: Some(session_id.into()),
            message: message.into(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        CloneError::Extraction(message.into())
    }

    pub fn provider_transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        CloneError::Provider {
            provider: provider.into(),
            message: message.into(),
            transient: true,
        }
    }

    pub fn provider_terminal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        CloneError::Provider {
            provider: provider.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// True when the failure is worth another attempt under the retry policy.
    pub fn is_transient(&self) -> bool {
        match self {
            CloneError::Provider { transient, .. } => *transient,
            CloneError::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            CloneError::Io(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check file paths/permissions.",
            ),
            CloneError::Network(e) => ErrorPayload::new(
                ErrorCategory::Network,
                e.to_string(),
                "Check connectivity/proxy/VPN and retry.",
            ),
            CloneError::InvalidUrl(e) => ErrorPayload::new(
                ErrorCategory::Validation,
                e.to_string(),
                "Verify URL/format (e.g., https://example.com).",
            ),
            CloneError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check JSON/serialization inputs; run with --verbose for details.",
            ),
            CloneError::Image(e) => ErrorPayload::new(
                ErrorCategory::Extraction,
                e.to_string(),
                "Verify the captured screenshot is a readable PNG.",
            ),
            CloneError::Validation(msg) => ErrorPayload::new(
                ErrorCategory::Validation,
                msg.to_string(),
                "Check the request parameters and the session's current status.",
            ),
            CloneError::Session { message, .. } => ErrorPayload::new(
                ErrorCategory::Session,
                message.to_string(),
                "Verify the session id; list sessions to see what exists.",
            ),
            CloneError::Extraction(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("node") && lower.contains("not found") {
                    ErrorPayload::new(
                        ErrorCategory::Extraction,
                        msg.to_string(),
                        "Install Node.js and ensure the node binary is on PATH.",
                    )
                } else if lower.contains("playwright") {
                    ErrorPayload::new(
                        ErrorCategory::Extraction,
                        msg.to_string(),
                        "Install Playwright (`npm install playwright` and `npx playwright install chromium`).",
                    )
                } else if lower.contains("timed out") || lower.contains("timeout") {
                    ErrorPayload::new(
                        ErrorCategory::Extraction,
                        msg.to_string(),
                        "Try increasing the render timeout or ensure the page loads without blocking.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Extraction,
                        msg.to_string(),
                        "Verify the URL is reachable from this machine and renders in a browser.",
                    )
                }
            }
            CloneError::Detection(msg) => ErrorPayload::new(
                ErrorCategory::Detection,
                msg.to_string(),
                "This is an internal invariant failure; file an issue with the snapshot.",
            ),
            CloneError::Provider {
                message, transient, ..
            } => {
                let remediation = if *transient {
                    "Transient provider failure; retry later or raise max retries."
                } else {
                    "Set ANTHROPIC_API_KEY and verify the configured model name."
                };
                ErrorPayload::new(ErrorCategory::Provider, message.to_string(), remediation)
            }
            CloneError::Budget(msg) => ErrorPayload::new(
                ErrorCategory::Budget,
                msg.to_string(),
                "Raise the context budget or lower the response reserve in config.",
            ),
            CloneError::Config(msg) => ErrorPayload::new(
                ErrorCategory::Config,
                msg.to_string(),
                "Check flags/paths (e.g., --viewport WIDTHxHEIGHT) and required env vars.",
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloneError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Validation,
    Session,
    Extraction,
    Detection,
    Provider,
    Budget,
    Network,
    Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_terminal_payload_mentions_api_key() {
        let err = CloneError::provider_terminal("anthropic", "authentication failed");
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Provider);
        let remediation = payload.remediation.unwrap_or_default();
        assert!(
            remediation.contains("ANTHROPIC_API_KEY"),
            "expected API key remediation, got: {remediation}"
        );
    }

    #[test]
    fn provider_transient_payload_suggests_retry() {
        let err = CloneError::provider_transient("anthropic", "rate limited");
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(remediation.to_ascii_lowercase().contains("retry"));
    }

    #[test]
    fn extraction_payload_includes_node_install_hint() {
        let err = CloneError::extraction("'node' was not found on PATH");
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.to_ascii_lowercase().contains("node"),
            "expected node install/path remediation, got: {remediation}"
        );
    }

    #[test]
    fn extraction_payload_includes_timeout_hint() {
        let err = CloneError::extraction("Render helper timed out after 45s");
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(remediation.to_ascii_lowercase().contains("timeout"));
    }

    #[test]
    fn session_error_display_includes_id() {
        let err = CloneError::session("abc-123", "not found");
        assert_eq!(format!("{}", err), "Session error (abc-123): not found");
    }

    #[test]
    fn transient_classification() {
        assert!(CloneError::provider_transient("anthropic", "timeout").is_transient());
        assert!(!CloneError::provider_terminal("anthropic", "bad key").is_transient());
        assert!(!CloneError::Validation("bad input".into()).is_transient());
    }
}
