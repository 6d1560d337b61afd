//! Detected UI component types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::dom::BoundingBox;

/// Closed set of detectable UI component types.
///
/// `Unknown` exists for downstream consumers that need a catch-all; the
/// detector itself never emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Button,
    Card,
    Navbar,
    Form,
    Input,
    Image,
    Unknown,
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentType::Button => "button",
            ComponentType::Card => "card",
            ComponentType::Navbar => "navbar",
            ComponentType::Form => "form",
            ComponentType::Input => "input",
            ComponentType::Image => "image",
            ComponentType::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// A classified group of DOM elements representing one UI pattern.
///
/// Member elements are referenced by structural path, not copied; every
/// element belongs to at most one component across a detection result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedComponent {
    pub component_type: ComponentType,
    /// Structural paths of member elements, in document order.
    pub member_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Union of member bounding boxes, when members were rendered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    /// Free-form metadata (e.g. link_count, has_logo).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Result of one detection pass over a snapshot. Read-only once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub session_id: String,
    pub components: Vec<DetectedComponent>,
    /// Always equals `components.len()`.
    pub total_components: usize,
    pub detection_time_ms: u64,
}

impl DetectionResult {
    pub fn new(session_id: String, components: Vec<DetectedComponent>, elapsed_ms: u64) -> Self {
        let total_components = components.len();
        Self {
            session_id,
            components,
            total_components,
            detection_time_ms: elapsed_ms,
        }
    }

    /// Per-type counts, used by the summarized prompt tier.
    pub fn counts_by_type(&self) -> HashMap<ComponentType, usize> {
        let mut counts = HashMap::new();
        for component in &self.components {
            *counts.entry(component.component_type).or_insert(0) += 1;
        }
        counts
    }
}
