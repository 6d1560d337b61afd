//! Prompt construction tiered to fit the model's context window.
//!
//! Tier selection is a strictly ordered fallback chain: the richest tier
//! whose estimated cost fits the ceiling wins, and a request never moves
//! back up to a richer tier once a cheaper one has been selected.

use serde::{Deserialize, Serialize};

use crate::error::{CloneError, Result};
use crate::types::{DetectionResult, DomElement, DomSnapshot};

/// Token-cost estimation, isolated so the character-ratio approximation
/// can be swapped for a provider-accurate tokenizer without touching
/// tier-selection logic.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Approximates token cost with a fixed character-to-token ratio.
pub struct CharRatioEstimator {
    pub chars_per_token: f32,
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self { chars_per_token: 4.0 }
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        (text.len() as f32 / self.chars_per_token).ceil() as usize
    }
}

/// Prompt-construction strategy, in decreasing order of richness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTier {
    Full,
    Summarized,
    StructureFallback,
    Minimal,
}

/// The selected tier with its assembled prompt and estimated cost.
#[derive(Debug, Clone)]
pub struct PromptPlan {
    pub tier: PromptTier,
    pub prompt: String,
    pub estimated_tokens: usize,
}

/// Caps applied to the summarized tier's structural sample.
const SUMMARY_MAX_DEPTH: usize = 3;
const SUMMARY_MAX_CHILDREN: usize = 4;
const SUMMARY_MAX_KEY_ELEMENTS: usize = 20;

/// Styles worth forwarding to the model for direct assembly.
const PROMPT_STYLE_PROPERTIES: &[&str] = &[
    "display",
    "flex-direction",
    "background-color",
    "color",
    "font-family",
    "font-size",
    "padding",
    "margin",
    "border-width",
    "box-shadow",
];

pub struct BudgetManager {
    estimator: Box<dyn TokenEstimator>,
    /// Model context window, in tokens.
    context_budget: usize,
    /// Tokens held back for the model's response.
    response_reserve: usize,
}

impl BudgetManager {
    pub fn new(context_budget: usize, response_reserve: usize) -> Self {
        Self {
            estimator: Box::new(CharRatioEstimator::default()),
            context_budget,
            response_reserve,
        }
    }

    pub fn with_estimator(mut self, estimator: Box<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Hard prompt ceiling: context budget minus the response reserve.
    pub fn ceiling(&self) -> usize {
        self.context_budget.saturating_sub(self.response_reserve)
    }

    /// Select the richest tier that fits and assemble its prompt.
    pub fn plan(&self, detection: &DetectionResult, snapshot: &DomSnapshot) -> Result<PromptPlan> {
        let ceiling = self.ceiling();
        let has_structure = !detection.components.is_empty();

        if has_structure {
            let full = build_full_prompt(detection, snapshot);
            let cost = self.estimator.estimate(&full);
            if cost <= ceiling {
                return self.finalize(PromptTier::Full, full);
            }

            let summarized = build_summary_prompt(detection, snapshot);
            let cost = self.estimator.estimate(&summarized);
            if cost <= ceiling {
                return self.finalize(PromptTier::Summarized, summarized);
            }
        }

        let fallback = build_structure_fallback_prompt(snapshot);
        self.finalize(PromptTier::StructureFallback, fallback)
    }

    /// Safety check on the assembled prompt: downgrade to the fixed
    /// minimal template when it still exceeds the ceiling. The minimal
    /// template itself fitting is an invariant; its violation is reported
    /// rather than sent to the provider.
    fn finalize(&self, tier: PromptTier, prompt: String) -> Result<PromptPlan> {
        let estimated_tokens = self.estimator.estimate(&prompt);
        if estimated_tokens <= self.ceiling() {
            return Ok(PromptPlan {
                tier,
                prompt,
                estimated_tokens,
            });
        }

        let prompt = minimal_prompt();
        let estimated_tokens = self.estimator.estimate(&prompt);
        if estimated_tokens > self.ceiling() {
            return Err(CloneError::Budget(format!(
                "minimal prompt still estimated at {} tokens against a {} ceiling",
                estimated_tokens,
                self.ceiling()
            )));
        }
        Ok(PromptPlan {
            tier: PromptTier::Minimal,
            prompt,
            estimated_tokens,
        })
    }
}

const PROMPT_HEADER: &str = "You are an expert web developer tasked with creating a visually \
similar HTML replica of a website.";

const PROMPT_REQUIREMENTS: &str = "\
REQUIREMENTS:
1. Generate complete, valid HTML5 with embedded CSS
2. Preserve the component structure and hierarchy described above
3. Use semantic HTML elements that match the component types
4. Create responsive design with modern CSS (flexbox/grid where appropriate)
5. Ensure all interactive elements (buttons, forms, links) are functional
6. Include proper meta tags and document structure

OUTPUT FORMAT:
Respond with the HTML inside a ```html fenced block. If additional CSS is \
needed beyond embedded styles, provide it in a ```css block after the HTML.";

fn page_header(snapshot: &DomSnapshot) -> String {
    let title = snapshot.meta.title.as_deref().unwrap_or("Cloned Website");
    let description = snapshot.meta.description.as_deref().unwrap_or("");
    format!(
        "{PROMPT_HEADER}\n\nORIGINAL WEBSITE: {}\n\nPAGE ANALYSIS:\n- Title: {}\n- Description: {}\n- Total Elements: {}\n",
        snapshot.url,
        title,
        description,
        snapshot.elements.len()
    )
}

fn describe_element(element: &DomElement) -> String {
    let mut line = format!("<{}", element.tag_name);
    if let Some(id) = &element.element_id {
        line.push_str(&format!(" id=\"{}\"", id));
    }
    if !element.class_names.is_empty() {
        line.push_str(&format!(" class=\"{}\"", element.class_names.join(" ")));
    }
    line.push('>');
    if let Some(text) = &element.text_content {
        let mut text = text.clone();
        if text.len() > 80 {
            text.truncate(80);
            text.push('…');
        }
        line.push_str(&format!(" {:?}", text));
    }
    let styles: Vec<String> = PROMPT_STYLE_PROPERTIES
        .iter()
        .filter_map(|prop| element.style(prop).map(|v| format!("{}: {}", prop, v)))
        .collect();
    if !styles.is_empty() {
        line.push_str(&format!(" [{}]", styles.join("; ")));
    }
    line
}

/// Full tier: the complete per-component structure for direct assembly.
fn build_full_prompt(detection: &DetectionResult, snapshot: &DomSnapshot) -> String {
    let mut prompt = page_header(snapshot);
    prompt.push_str(&format!(
        "\nDETECTED COMPONENTS ({} total):\n",
        detection.total_components
    ));

    for component in &detection.components {
        let label = component
            .label
            .as_deref()
            .map(|l| format!(" \"{}\"", l))
            .unwrap_or_default();
        prompt.push_str(&format!(
            "\n## {}{} ({} elements)\n",
            component.component_type.to_string().to_uppercase(),
            label,
            component.member_paths.len()
        ));
        for path in &component.member_paths {
            if let Some(element) = snapshot.element_by_path(path) {
                prompt.push_str(&format!("  {}\n", describe_element(element)));
            }
        }
        for (key, value) in &component.metadata {
            prompt.push_str(&format!("  ({}: {})\n", key.replace('_', " "), value));
        }
    }

    prompt.push('\n');
    prompt.push_str(PROMPT_REQUIREMENTS);
    prompt
}

/// Depth of a structural path, in segments.
fn path_depth(path: &str) -> usize {
    path.chars().filter(|&c| c == '/').count()
}

/// Summarized tier: per-type counts plus a depth- and breadth-bounded
/// sample of key elements.
fn build_summary_prompt(detection: &DetectionResult, snapshot: &DomSnapshot) -> String {
    let mut prompt = page_header(snapshot);

    let counts = detection.counts_by_type();
    let mut breakdown: Vec<String> = counts
        .iter()
        .map(|(ty, count)| format!("{} {}(s)", count, ty))
        .collect();
    breakdown.sort();
    prompt.push_str(&format!(
        "\nCOMPONENT BREAKDOWN: {}\n\nKEY ELEMENTS:\n",
        breakdown.join(", ")
    ));

    let mut per_parent: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    let mut total = 0usize;
    for element in &snapshot.elements {
        if total >= SUMMARY_MAX_KEY_ELEMENTS {
            break;
        }
        if path_depth(&element.path) > SUMMARY_MAX_DEPTH {
            continue;
        }
        let parent = element.parent_path().unwrap_or("");
        let siblings = per_parent.entry(parent).or_insert(0);
        if *siblings >= SUMMARY_MAX_CHILDREN {
            continue;
        }
        *siblings += 1;
        total += 1;
        let indent = "  ".repeat(path_depth(&element.path).saturating_sub(1));
        prompt.push_str(&format!("{}{}\n", indent, describe_element(element)));
    }

    prompt.push('\n');
    prompt.push_str(PROMPT_REQUIREMENTS);
    prompt
}

/// Structure fallback: page metadata only, plus generic layout guidance.
fn build_structure_fallback_prompt(snapshot: &DomSnapshot) -> String {
    let title = snapshot.meta.title.as_deref().unwrap_or("Cloned Website");
    format!(
        "{PROMPT_HEADER}\n\nORIGINAL WEBSITE: {}\nPAGE TITLE: {}\n\nNo reliable \
structural analysis is available. Create a clean, modern single-page layout \
with a header, a main content area, and a footer that plausibly matches a \
page with this title.\n\n{}",
        snapshot.url, title, PROMPT_REQUIREMENTS
    )
}

/// Minimal tier: a fixed short template, independent of page content.
pub fn minimal_prompt() -> String {
    "Generate a complete, valid HTML5 page with embedded CSS: a simple, clean \
single-page layout with a header, main section, and footer. Respond with the \
HTML inside a ```html fenced block."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComponentType, DetectedComponent, PageMeta};
    use std::collections::HashMap;

    fn snapshot_with_elements(count: usize) -> DomSnapshot {
        let elements = (0..count)
            .map(|i| DomElement {
                tag_name: "div".into(),
                element_id: None,
                class_names: vec!["filler".into()],
                computed_styles: HashMap::new(),
                attributes: HashMap::new(),
                text_content: Some("lorem ipsum dolor sit amet".into()),
                children_count: 0,
                path: format!("/html/body/div[{}]", i + 1),
                bounding_box: None,
                is_visible: true,
            })
            .collect();
        DomSnapshot {
            url: "https://example.com".into(),
            meta: PageMeta {
                title: Some("Example".into()),
                ..PageMeta::default()
            },
            elements,
            assets: vec![],
        }
    }

    fn detection_for(snapshot: &DomSnapshot) -> DetectionResult {
        let components = snapshot
            .elements
            .iter()
            .map(|el| DetectedComponent {
                component_type: ComponentType::Card,
                member_paths: vec![el.path.clone()],
                label: None,
                bounding_box: None,
                metadata: HashMap::new(),
            })
            .collect();
        DetectionResult::new("s1".into(), components, 0)
    }

    /// Estimator that reports a fixed huge cost for any non-minimal text.
    struct HugeEstimator;
    impl TokenEstimator for HugeEstimator {
        fn estimate(&self, text: &str) -> usize {
            if text.len() < 400 {
                10
            } else {
                2_000_000
            }
        }
    }

    #[test]
    fn char_ratio_estimator_rounds_up() {
        let est = CharRatioEstimator::default();
        assert_eq!(est.estimate(""), 0);
        assert_eq!(est.estimate("abcd"), 1);
        assert_eq!(est.estimate("abcde"), 2);
    }

    #[test]
    fn small_page_selects_full_tier() {
        let snapshot = snapshot_with_elements(3);
        let detection = detection_for(&snapshot);
        let manager = BudgetManager::new(200_000, 20_000);

        let plan = manager.plan(&detection, &snapshot).unwrap();
        assert_eq!(plan.tier, PromptTier::Full);
        assert!(plan.prompt.contains("DETECTED COMPONENTS"));
    }

    #[test]
    fn oversized_blueprint_never_selects_full() {
        // 2M estimated tokens against a 180k ceiling.
        let snapshot = snapshot_with_elements(50);
        let detection = detection_for(&snapshot);
        let manager =
            BudgetManager::new(200_000, 20_000).with_estimator(Box::new(HugeEstimator));

        let plan = manager.plan(&detection, &snapshot).unwrap();
        assert_ne!(plan.tier, PromptTier::Full);
    }

    #[test]
    fn empty_detection_uses_structure_fallback() {
        let snapshot = snapshot_with_elements(2);
        let detection = DetectionResult::new("s1".into(), vec![], 0);
        let manager = BudgetManager::new(200_000, 20_000);

        let plan = manager.plan(&detection, &snapshot).unwrap();
        assert_eq!(plan.tier, PromptTier::StructureFallback);
        assert!(plan.prompt.contains("Example"));
    }

    #[test]
    fn minimal_prompt_is_independent_of_snapshot_size() {
        let small = snapshot_with_elements(1);
        let large = snapshot_with_elements(500);
        let manager = BudgetManager::new(100, 10).with_estimator(Box::new(HugeEstimator));

        let plan_small = manager.plan(&detection_for(&small), &small).unwrap();
        let plan_large = manager.plan(&detection_for(&large), &large).unwrap();

        assert_eq!(plan_small.tier, PromptTier::Minimal);
        assert_eq!(plan_large.tier, PromptTier::Minimal);
        assert_eq!(plan_small.prompt, plan_large.prompt);
    }

    #[test]
    fn unreachable_minimal_ceiling_is_a_budget_error() {
        struct CeilingBuster;
        impl TokenEstimator for CeilingBuster {
            fn estimate(&self, _text: &str) -> usize {
                usize::MAX
            }
        }

        let snapshot = snapshot_with_elements(1);
        let manager = BudgetManager::new(100, 50).with_estimator(Box::new(CeilingBuster));

        let err = manager
            .plan(&detection_for(&snapshot), &snapshot)
            .unwrap_err();
        assert!(matches!(err, CloneError::Budget(_)));
    }

    #[test]
    fn summary_sample_respects_caps() {
        let snapshot = snapshot_with_elements(200);
        let detection = detection_for(&snapshot);
        let prompt = build_summary_prompt(&detection, &snapshot);

        let sampled = prompt
            .lines()
            .filter(|line| line.trim_start().starts_with('<'))
            .count();
        assert!(sampled <= SUMMARY_MAX_KEY_ELEMENTS);
    }

    #[test]
    fn ceiling_subtracts_reserve() {
        let manager = BudgetManager::new(200_000, 20_000);
        assert_eq!(manager.ceiling(), 180_000);
    }
}
