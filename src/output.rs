use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ErrorPayload;
use crate::types::{DetectedComponent, SessionStatus, Viewport};

/// Schema version for output payloads.
pub const SITECLONE_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SitecloneOutput {
    Clone(CloneOutput),
    Detect(DetectOutput),
    Error(ErrorOutput),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneOutput {
    pub version: String,
    pub url: String,
    pub viewport: Viewport,
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    pub refinement_iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub progress: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectOutput {
    pub version: String,
    pub url: String,
    pub viewport: Viewport,
    pub total_components: usize,
    pub detection_time_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<DetectedComponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    pub error: ErrorPayload,
}

impl ErrorOutput {
    pub fn new(error: ErrorPayload) -> Self {
        Self {
            version: SITECLONE_OUTPUT_VERSION.to_string(),
            error,
        }
    }
}
