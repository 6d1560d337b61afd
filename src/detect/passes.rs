//! The individual detection passes, in their priority order: containers
//! (navbar, form) first, then atomic patterns (button, input, card).

use std::collections::HashMap;

use serde_json::json;

use crate::types::{ComponentType, DomElement};

use super::{ComponentClaim, DetectContext, DetectionPass};

const NAV_NAME_KEYWORDS: &[&str] = &["nav", "menu", "header"];
const BUTTON_CLASS_KEYWORDS: &[&str] = &["btn", "button"];
const NON_TEXT_INPUT_TYPES: &[&str] = &["submit", "button", "reset", "hidden"];

/// Navigation bars: semantic `<nav>`, or containers with nav-like naming,
/// at least two anchor children, and a horizontal layout.
pub struct NavbarPass;

impl DetectionPass for NavbarPass {
    fn component_type(&self) -> ComponentType {
        ComponentType::Navbar
    }

    fn qualify(&self, element: &DomElement, ctx: &DetectContext) -> Option<ComponentClaim> {
        let children = ctx.children_of(&element.path);
        let anchor_count = children.iter().filter(|c| c.tag_name == "a").count();

        let qualifies = if element.tag_name == "nav" {
            true
        } else {
            has_nav_naming(element) && anchor_count >= 2 && is_horizontal(element, children)
        };
        if !qualifies {
            return None;
        }

        let mut member_paths = vec![element.path.clone()];
        member_paths.extend(children.iter().map(|c| c.path.clone()));

        let has_logo = children.iter().any(|c| {
            c.tag_name == "img"
                || c.tag_name == "svg"
                || c.class_names.iter().any(|n| n.to_ascii_lowercase().contains("logo"))
        });

        let mut metadata = HashMap::new();
        metadata.insert("link_count".to_string(), json!(anchor_count));
        metadata.insert("has_logo".to_string(), json!(has_logo));

        Some(ComponentClaim {
            member_paths,
            label: None,
            metadata,
        })
    }
}

/// Forms: semantic `<form>`, or containers with enough input-like children
/// to read as a form (>=2 inputs with a submit control, or >=3 inputs).
pub struct FormPass;

impl DetectionPass for FormPass {
    fn component_type(&self) -> ComponentType {
        ComponentType::Form
    }

    fn qualify(&self, element: &DomElement, ctx: &DetectContext) -> Option<ComponentClaim> {
        let children = ctx.children_of(&element.path);
        let input_count = children.iter().filter(|c| is_input_like(c)).count();
        let has_submit = children.iter().any(|c| is_submit_like(c));

        let qualifies = element.tag_name == "form"
            || (input_count >= 2 && (has_submit || input_count >= 3));
        if !qualifies {
            return None;
        }

        let mut member_paths = vec![element.path.clone()];
        member_paths.extend(children.iter().map(|c| c.path.clone()));

        let mut metadata = HashMap::new();
        metadata.insert("input_count".to_string(), json!(input_count));
        metadata.insert("has_submit".to_string(), json!(has_submit));

        Some(ComponentClaim {
            member_paths,
            label: None,
            metadata,
        })
    }
}

/// Buttons: `<button>`, submit-type `<input>`, or anchors with a
/// button-like role or class keyword.
pub struct ButtonPass;

impl DetectionPass for ButtonPass {
    fn component_type(&self) -> ComponentType {
        ComponentType::Button
    }

    fn qualify(&self, element: &DomElement, _ctx: &DetectContext) -> Option<ComponentClaim> {
        let tag = element.tag_name.as_str();
        let input_type = element.attribute("type").unwrap_or_default();

        let qualifies = match tag {
            "button" => true,
            "input" => matches!(input_type, "submit" | "button" | "reset"),
            "a" => {
                element
                    .attribute("role")
                    .map(|r| r.contains("button"))
                    .unwrap_or(false)
                    || has_button_class(element)
            }
            _ => false,
        };
        if !qualifies {
            return None;
        }

        let label = element
            .text_content
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| element.attribute("value").map(str::to_string));

        Some(ComponentClaim::single(element).with_label(label))
    }
}

/// Text-entry controls: input/textarea/select, excluding the button-like
/// and hidden input types.
pub struct InputPass;

impl DetectionPass for InputPass {
    fn component_type(&self) -> ComponentType {
        ComponentType::Input
    }

    fn qualify(&self, element: &DomElement, _ctx: &DetectContext) -> Option<ComponentClaim> {
        let qualifies = match element.tag_name.as_str() {
            "textarea" | "select" => true,
            "input" => {
                let input_type = element.attribute("type").unwrap_or("text");
                !NON_TEXT_INPUT_TYPES.contains(&input_type)
            }
            _ => false,
        };
        if !qualifies {
            return None;
        }

        let label = element
            .attribute("placeholder")
            .or_else(|| element.attribute("aria-label"))
            .map(str::to_string);

        let mut metadata = HashMap::new();
        if element.tag_name == "input" {
            let input_type = element.attribute("type").unwrap_or("text");
            metadata.insert("input_type".to_string(), json!(input_type));
        }

        let mut claim = ComponentClaim::single(element).with_label(label);
        claim.metadata = metadata;
        Some(claim)
    }
}

/// Card-like containers: an explicit "card" class, or elevation styling
/// (shadow/border plus padding) on a generic container.
pub struct CardPass;

impl DetectionPass for CardPass {
    fn component_type(&self) -> ComponentType {
        ComponentType::Card
    }

    fn qualify(&self, element: &DomElement, _ctx: &DetectContext) -> Option<ComponentClaim> {
        if !matches!(element.tag_name.as_str(), "div" | "section" | "article") {
            return None;
        }

        if has_card_class(element) {
            return Some(ComponentClaim::single(element));
        }

        let styles = CardStyles::of(element);
        let by_shadow = styles.has_shadow && styles.has_padding;
        let by_border = styles.has_border && styles.has_padding && element.children_count > 1;
        if by_shadow || by_border {
            return Some(ComponentClaim::single(element));
        }

        None
    }
}

/// Style signals relevant to card detection, read from computed styles
/// first and falling back to the inline style text when none were captured.
struct CardStyles {
    has_shadow: bool,
    has_border: bool,
    has_padding: bool,
}

impl CardStyles {
    fn of(element: &DomElement) -> Self {
        if !element.computed_styles.is_empty() {
            let has_shadow = element
                .style("box-shadow")
                .map(|v| v != "none")
                .unwrap_or(false);
            let has_border = element
                .style("border-width")
                .map(|v| !v.starts_with('0'))
                .unwrap_or(false);
            let has_padding = element
                .style("padding")
                .map(|v| !v.starts_with('0'))
                .unwrap_or(false);
            return Self {
                has_shadow,
                has_border,
                has_padding,
            };
        }

        let inline = element
            .attribute("style")
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        Self {
            has_shadow: inline.contains("box-shadow"),
            has_border: inline.contains("border"),
            has_padding: inline.contains("padding"),
        }
    }
}

fn has_nav_naming(element: &DomElement) -> bool {
    let mut names: Vec<String> = element
        .class_names
        .iter()
        .map(|n| n.to_ascii_lowercase())
        .collect();
    if let Some(id) = &element.element_id {
        names.push(id.to_ascii_lowercase());
    }
    if let Some(role) = element.attribute("role") {
        names.push(role.to_ascii_lowercase());
    }
    names
        .iter()
        .any(|name| NAV_NAME_KEYWORDS.iter().any(|kw| name.contains(kw)))
}

fn is_horizontal(element: &DomElement, children: &[&DomElement]) -> bool {
    let display = element.style("display").unwrap_or_default();
    if display.contains("flex") {
        let direction = element.style("flex-direction").unwrap_or("row");
        if !direction.starts_with("column") {
            return true;
        }
    }
    children
        .iter()
        .any(|c| matches!(c.style("float"), Some("left") | Some("right")))
}

fn is_input_like(element: &DomElement) -> bool {
    match element.tag_name.as_str() {
        "textarea" | "select" => true,
        "input" => {
            let input_type = element.attribute("type").unwrap_or("text");
            !matches!(input_type, "submit" | "button" | "reset")
        }
        _ => false,
    }
}

fn is_submit_like(element: &DomElement) -> bool {
    element.tag_name == "button"
        || (element.tag_name == "input"
            && matches!(element.attribute("type"), Some("submit")))
}

fn has_button_class(element: &DomElement) -> bool {
    element.class_names.iter().any(|name| {
        let lower = name.to_ascii_lowercase();
        BUTTON_CLASS_KEYWORDS.iter().any(|kw| lower.contains(kw))
    })
}

fn has_card_class(element: &DomElement) -> bool {
    element
        .class_names
        .iter()
        .any(|name| name.to_ascii_lowercase().contains("card"))
}
