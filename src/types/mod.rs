//! Core data types for the replication pipeline.

mod components;
mod dom;
mod session;

pub use components::{ComponentType, DetectedComponent, DetectionResult};
pub use dom::{AssetKind, AssetReference, BoundingBox, DomElement, DomSnapshot, PageMeta};
pub use session::{
    CloneRequest, CloneSession, HtmlArtifact, ProgressStep, SessionStatus, TokenUsage,
};

pub use crate::viewport::Viewport;
