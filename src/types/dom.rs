//! DOM snapshot types for browser-captured pages.
//!
//! These types represent the structural capture the renderer hands back:
//! a flattened, document-ordered element list plus page metadata and
//! discovered asset references. A snapshot is immutable once built.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rectangle bounds for an element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Smallest box covering both inputs.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = (self.x + self.width).max(other.x + other.width);
        let y1 = (self.y + self.height).max(other.y + other.height);
        BoundingBox {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }
}

/// A single captured DOM element.
///
/// `path` is a structural identifier derived from document order
/// (xpath-like, e.g. `/html/body/div[2]/a[1]`); it is unique within a
/// snapshot and the parent path is obtained by dropping the last segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomElement {
    /// Lowercase HTML tag name (e.g. "div", "a", "button").
    pub tag_name: String,
    /// The element's id attribute, if present.
    pub element_id: Option<String>,
    /// Class list in source order; may contain repeats.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub class_names: Vec<String>,
    /// Sparse map of computed style properties.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub computed_styles: HashMap<String, String>,
    /// Raw HTML attributes.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
    /// Trimmed text content, if any.
    pub text_content: Option<String>,
    /// Number of element children.
    pub children_count: u32,
    /// Structural path, unique within the snapshot.
    pub path: String,
    /// Layout box, when the element was rendered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    /// Whether the element was visible at capture time.
    pub is_visible: bool,
}

impl DomElement {
    /// Parent path, obtained by dropping the last path segment.
    /// The document root has no parent.
    pub fn parent_path(&self) -> Option<&str> {
        let idx = self.path.rfind('/')?;
        if idx == 0 {
            None
        } else {
            Some(&self.path[..idx])
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn style(&self, property: &str) -> Option<&str> {
        self.computed_styles.get(property).map(String::as_str)
    }
}

/// Page-level metadata captured alongside the element list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    /// The viewport meta tag content, if declared.
    pub viewport: Option<String>,
}

/// Kind of a discovered asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Svg,
    Font,
    Background,
}

/// Reference to an external or inline asset discovered during extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReference {
    /// Absolute URL, or a data: URL for inline content.
    pub url: String,
    pub kind: AssetKind,
    /// Where the asset was used (e.g. "img", "css-background", "logo").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usage_context: Vec<String>,
}

/// Immutable structural capture of a rendered page.
///
/// Owned exclusively by the pipeline run that requested it; never mutated
/// after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSnapshot {
    pub url: String,
    pub meta: PageMeta,
    /// Elements in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<DomElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<AssetReference>,
}

impl DomSnapshot {
    pub fn element_by_path(&self, path: &str) -> Option<&DomElement> {
        self.elements.iter().find(|el| el.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_path_drops_last_segment() {
        let el = DomElement {
            tag_name: "a".into(),
            element_id: None,
            class_names: vec![],
            computed_styles: HashMap::new(),
            attributes: HashMap::new(),
            text_content: None,
            children_count: 0,
            path: "/html/body/nav[1]/a[2]".into(),
            bounding_box: None,
            is_visible: true,
        };
        assert_eq!(el.parent_path(), Some("/html/body/nav[1]"));
    }

    #[test]
    fn root_has_no_parent() {
        let el = DomElement {
            tag_name: "html".into(),
            element_id: None,
            class_names: vec![],
            computed_styles: HashMap::new(),
            attributes: HashMap::new(),
            text_content: None,
            children_count: 2,
            path: "/html".into(),
            bounding_box: None,
            is_visible: true,
        };
        assert_eq!(el.parent_path(), None);
    }

    #[test]
    fn bounding_box_union_covers_both() {
        let a = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
        };
        let b = BoundingBox {
            x: 5.0,
            y: 20.0,
            width: 10.0,
            height: 5.0,
        };
        let u = a.union(&b);
        assert_eq!(u.x, 0.0);
        assert_eq!(u.y, 0.0);
        assert_eq!(u.width, 15.0);
        assert_eq!(u.height, 25.0);
    }
}
