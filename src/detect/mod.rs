//! Rule-based UI component detection over a DOM snapshot.
//!
//! Detection runs a fixed, priority-ordered list of passes — container
//! patterns (navbar, form) before atomic ones (button, input, card) — so
//! containers claim their descendants before those descendants can be
//! independently misclassified. A processed set guarantees every element
//! belongs to at most one detected component.
//!
//! Detection is deterministic for a given snapshot: elements are examined
//! in document order, passes in the order returned by [`default_passes`],
//! and the first qualifying rule within a pass wins.

mod passes;


use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::types::{BoundingBox, ComponentType, DetectedComponent, DetectionResult, DomElement, DomSnapshot};

pub use passes::{ButtonPass, CardPass, FormPass, InputPass, NavbarPass};

/// Shared lookup structures for one detection run.
pub struct DetectContext<'a> {
    pub snapshot: &'a DomSnapshot,
    /// Parent path -> immediate children, derived from structural paths.
    children: HashMap<&'a str, Vec<&'a DomElement>>,
}

impl<'a> DetectContext<'a> {
    fn new(snapshot: &'a DomSnapshot) -> Self {
        let mut children: HashMap<&'a str, Vec<&'a DomElement>> = HashMap::new();
        for element in &snapshot.elements {
            if let Some(parent) = element.parent_path() {
                children.entry(parent).or_default().push(element);
            }
        }
        Self { snapshot, children }
    }

    /// Immediate children of the element at `path`, in document order.
    pub fn children_of(&self, path: &str) -> &[&'a DomElement] {
        self.children.get(path).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A successful qualification: the elements the component claims.
///
/// `member_paths` lists the matched element first, followed by any
/// direct children a container pattern spans.
pub struct ComponentClaim {
    pub member_paths: Vec<String>,
    pub label: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ComponentClaim {
    pub fn single(element: &DomElement) -> Self {
        Self {
            member_paths: vec![element.path.clone()],
            label: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }
}

/// One detection pass over unclaimed elements.
pub trait DetectionPass {
    fn component_type(&self) -> ComponentType;

    /// Examine a single unclaimed element and return a claim when it
    /// qualifies. Must be pure: no randomness, no external calls.
    fn qualify(&self, element: &DomElement, ctx: &DetectContext) -> Option<ComponentClaim>;
}

/// The default pass list in priority order. Reordering detection is a
/// change here, not a rewrite of the runner.
pub fn default_passes() -> Vec<Box<dyn DetectionPass>> {
    vec![
        Box::new(NavbarPass),
        Box::new(FormPass),
        Box::new(ButtonPass),
        Box::new(InputPass),
        Box::new(CardPass),
    ]
}

/// Analyzes a DOM snapshot to detect and classify UI components.
pub struct ComponentDetector<'a> {
    snapshot: &'a DomSnapshot,
    passes: Vec<Box<dyn DetectionPass>>,
}

impl<'a> ComponentDetector<'a> {
    pub fn new(snapshot: &'a DomSnapshot) -> Self {
        Self {
            snapshot,
            passes: default_passes(),
        }
    }

    pub fn with_passes(snapshot: &'a DomSnapshot, passes: Vec<Box<dyn DetectionPass>>) -> Self {
        Self { snapshot, passes }
    }

    /// Run all passes and assemble the detection result.
    pub fn detect(&self, session_id: &str) -> DetectionResult {
        let start = Instant::now();
        let ctx = DetectContext::new(self.snapshot);

        let mut processed: HashSet<&str> = HashSet::new();
        let mut components = Vec::new();

        for pass in &self.passes {
            for element in &self.snapshot.elements {
                if processed.contains(element.path.as_str()) {
                    continue;
                }
                let Some(claim) = pass.qualify(element, &ctx) else {
                    continue;
                };

                // Children spanned by a container may already belong to an
                // earlier claim; they stay with their first owner.
                let member_paths: Vec<String> = claim
                    .member_paths
                    .into_iter()
                    .filter(|path| !processed.contains(path.as_str()))
                    .collect();
                if member_paths.is_empty() {
                    continue;
                }

                for path in &member_paths {
                    if let Some(el) = self.snapshot.element_by_path(path) {
                        processed.insert(el.path.as_str());
                    }
                }

                let bounding_box = self.aggregate_box(&member_paths);
                components.push(DetectedComponent {
                    component_type: pass.component_type(),
                    member_paths,
                    label: claim.label,
                    bounding_box,
                    metadata: claim.metadata,
                });
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        DetectionResult::new(session_id.to_string(), components, elapsed_ms)
    }

    fn aggregate_box(&self, member_paths: &[String]) -> Option<BoundingBox> {
        let mut combined: Option<BoundingBox> = None;
        for path in member_paths {
            let bbox = self
                .snapshot
                .element_by_path(path)
                .and_then(|el| el.bounding_box);
            if let Some(bbox) = bbox {
                combined = Some(match combined {
                    Some(existing) => existing.union(&bbox),
                    None => bbox,
                });
            }
        }
        combined
    }
}
