//! Site Replication Pipeline (siteclone) Library
//!
//! A library for cloning live web pages into generated HTML replicas: a
//! rendering collaborator produces a structural snapshot, a rule-based
//! detector classifies UI components, and a generative-language
//! collaborator is prompted (within a token budget) to emit HTML that
//! reproduces the page, optionally refined against a visual diff.
//!
//! # Module Overview
//!
//! - [`render`] - Rendering collaborator (DOM extraction, screenshots)
//! - [`detect`] - Rule-based UI component detection
//! - [`budget`] - Tiered prompt construction within a token ceiling
//! - [`retry`] - Bounded-retry wrapper around the generative collaborator
//! - [`refine`] - Visual-feedback refinement cycle
//! - [`session`] - Session store with single-writer discipline
//! - [`pipeline`] - The clone service and staged pipeline
//! - [`provider`] - Generative-language collaborator client
//! - [`assets`] - Bounded-pool asset download and path rewriting
//! - [`types`] - Core data types
//! - [`config`] - Configuration file support
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use siteclone_lib::{
//!     AnthropicClient, CloneRequest, CloneService, Config, PlaywrightRenderer,
//!     RendererOptions,
//! };
//!
//! # async fn example() -> siteclone_lib::Result<()> {
//! let renderer = Arc::new(PlaywrightRenderer::new(RendererOptions::default()));
//! let provider = Arc::new(AnthropicClient::from_env()?);
//! let service = CloneService::new(renderer, provider, Config::default());
//!
//! let session = service.run_clone(CloneRequest::new("https://example.com")).await?;
//! println!("{:?}", session.status);
//! # Ok(())
//! # }
//! ```

pub mod assets;
pub mod budget;
pub mod config;
pub mod detect;
pub mod error;
pub mod html;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod refine;
pub mod render;
pub mod retry;
pub mod scoring;
pub mod session;
pub mod types;
pub mod viewport;

pub use assets::{build_asset_map, rewrite_asset_paths, AssetDownload, AssetDownloader};
pub use budget::{
    minimal_prompt, BudgetManager, CharRatioEstimator, PromptPlan, PromptTier, TokenEstimator,
};
pub use config::{BudgetConfig, Config, RetryConfig, Timeouts, WorkerConfig};
pub use detect::{default_passes, ComponentDetector, DetectionPass};
pub use error::{CloneError, ErrorPayload, Result};
pub use html::{ensure_document_shell, parse_model_response, ParsedResponse};
pub use pipeline::CloneService;
pub use progress::ProgressCallback;
pub use provider::{AnthropicClient, Completion, LanguageModel};
pub use refine::run_refinement_cycle;
pub use render::{
    ExtractOptions, PlaywrightRenderer, Renderer, RendererOptions, ScreenshotTarget,
    DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_PROCESS_TIMEOUT,
};
pub use retry::{RetryController, RetryPolicy};
pub use scoring::{replicated_counts, similarity_score};
pub use session::{DeleteOutcome, RunGuard, SessionStore};
pub use types::{
    AssetKind, AssetReference, BoundingBox, CloneRequest, CloneSession, ComponentType,
    DetectedComponent, DetectionResult, DomElement, DomSnapshot, HtmlArtifact, PageMeta,
    ProgressStep, SessionStatus, TokenUsage,
};
pub use viewport::Viewport;
