//! Component-presence similarity scoring.
//!
//! A rough structural score: for each detected component type, check
//! whether the generated HTML contains a plausible counterpart. The raw
//! percentage is clamped to [60, 95]; an empty detection scores a flat 75.

use std::collections::HashMap;

use crate::types::{ComponentType, DetectionResult};

/// Score used when nothing was detected to compare against.
const NO_COMPONENTS_SCORE: f32 = 75.0;
const MIN_SCORE: f32 = 60.0;
const MAX_SCORE: f32 = 95.0;

/// Similarity of generated HTML to the detected component set, in [0, 100].
pub fn similarity_score(detection: &DetectionResult, generated_html: &str) -> f32 {
    if detection.components.is_empty() {
        return NO_COMPONENTS_SCORE;
    }

    let lower = generated_html.to_ascii_lowercase();
    let mut score = 0.0f32;

    for component in &detection.components {
        score += match component.component_type {
            ComponentType::Navbar if lower.contains("<nav") || lower.contains("navbar") => 1.0,
            ComponentType::Form if lower.contains("<form") => 1.0,
            ComponentType::Button if lower.contains("<button") => 1.0,
            ComponentType::Input if lower.contains("<input") => 1.0,
            ComponentType::Image if lower.contains("<img") || lower.contains("<svg") => 1.0,
            // Cards rarely map to one tag; accept a class-based hint.
            ComponentType::Card if lower.contains("card") || lower.contains("class=") => 0.8,
            _ => 0.0,
        };
    }

    let percentage = score / detection.components.len() as f32 * 100.0;
    percentage.clamp(MIN_SCORE, MAX_SCORE)
}

/// How many components of each type found a counterpart in the HTML.
pub fn replicated_counts(
    detection: &DetectionResult,
    generated_html: &str,
) -> HashMap<ComponentType, usize> {
    let lower = generated_html.to_ascii_lowercase();
    let mut replicated = HashMap::new();

    for component in &detection.components {
        let present = match component.component_type {
            ComponentType::Navbar => lower.contains("<nav") || lower.contains("navbar"),
            ComponentType::Form => lower.contains("<form"),
            ComponentType::Button => lower.contains("<button"),
            ComponentType::Input => lower.contains("<input"),
            ComponentType::Image => lower.contains("<img") || lower.contains("<svg"),
            ComponentType::Card => lower.contains("card"),
            ComponentType::Unknown => false,
        };
        if present {
            *replicated.entry(component.component_type).or_insert(0) += 1;
        }
    }

    replicated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DetectedComponent;
    use std::collections::HashMap as Map;

    fn detection(types: &[ComponentType]) -> DetectionResult {
        let components = types
            .iter()
            .enumerate()
            .map(|(i, ty)| DetectedComponent {
                component_type: *ty,
                member_paths: vec![format!("/html/body/div[{}]", i + 1)],
                label: None,
                bounding_box: None,
                metadata: Map::new(),
            })
            .collect();
        DetectionResult::new("s1".into(), components, 0)
    }

    #[test]
    fn empty_detection_gets_default_score() {
        let result = detection(&[]);
        assert_eq!(similarity_score(&result, "<html></html>"), 75.0);
    }

    #[test]
    fn all_components_present_caps_at_95() {
        let result = detection(&[ComponentType::Navbar, ComponentType::Button]);
        let html = "<nav></nav><button>Go</button>";
        assert_eq!(similarity_score(&result, html), 95.0);
    }

    #[test]
    fn nothing_present_floors_at_60() {
        let result = detection(&[ComponentType::Form, ComponentType::Input]);
        assert_eq!(similarity_score(&result, "<p>empty</p>"), 60.0);
    }

    #[test]
    fn replicated_counts_tracks_each_type() {
        let result = detection(&[
            ComponentType::Navbar,
            ComponentType::Form,
            ComponentType::Card,
        ]);
        let html = "<nav class=\"navbar\"></nav><form></form><div>plain</div>";
        let counts = replicated_counts(&result, html);
        assert_eq!(counts.get(&ComponentType::Navbar), Some(&1));
        assert_eq!(counts.get(&ComponentType::Form), Some(&1));
        assert_eq!(counts.get(&ComponentType::Card), None);
    }
}
