//! The replication pipeline and its service surface.
//!
//! One [`CloneService`] owns the session store and the collaborator
//! handles. Each accepted clone request runs as a single task holding the
//! session's run-owner token; within a run the stages execute strictly in
//! sequence (extract -> detect -> budget -> generate -> refine) and any
//! uncaught stage failure moves the session to `Failed` with the
//! triggering message recorded verbatim.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::assets::{build_asset_map, rewrite_asset_paths, AssetDownloader};
use crate::budget::BudgetManager;
use crate::config::Config;
use crate::detect::ComponentDetector;
use crate::error::{CloneError, Result};
use crate::provider::LanguageModel;
use crate::refine::run_refinement_cycle;
use crate::render::{ExtractOptions, Renderer, ScreenshotTarget};
use crate::retry::RetryController;
use crate::session::{DeleteOutcome, SessionStore};
use crate::types::{CloneRequest, CloneSession, HtmlArtifact, SessionStatus};

/// Top-level service: session lifecycle plus the staged pipeline.
#[derive(Clone)]
pub struct CloneService {
    store: SessionStore,
    renderer: Arc<dyn Renderer>,
    retry: Arc<RetryController>,
    config: Arc<Config>,
}

impl CloneService {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        provider: Arc<dyn LanguageModel>,
        config: Config,
    ) -> Self {
        let retry = Arc::new(RetryController::new(provider, config.retry.clone().into()));
        Self {
            store: SessionStore::new(),
            renderer,
            retry,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Accept a clone request: create the session and start its pipeline
    /// run in the background. Returns the new session id.
    pub fn create_session(&self, request: CloneRequest) -> Result<String> {
        validate_request(&request)?;
        let session = self.store.create(request);
        let session_id = session.session_id.clone();

        let service = self.clone();
        let run_id = session_id.clone();
        tokio::spawn(async move {
            service.run_pipeline(&run_id).await;
        });

        Ok(session_id)
    }

    /// Run one clone request to completion inline and return the final
    /// session snapshot (used by the CLI front end).
    pub async fn run_clone(&self, request: CloneRequest) -> Result<CloneSession> {
        validate_request(&request)?;
        let session = self.store.create(request);
        let session_id = session.session_id.clone();
        self.run_pipeline(&session_id).await;
        self.store.get(&session_id)
    }

    /// Read-only snapshot of a session.
    pub fn get_session(&self, session_id: &str) -> Result<CloneSession> {
        self.store.get(session_id)
    }

    pub fn list_sessions(&self) -> Vec<CloneSession> {
        self.store.list()
    }

    /// Delete a session; an in-flight run defers the deletion until it
    /// finishes.
    pub fn delete_session(&self, session_id: &str) -> Result<DeleteOutcome> {
        self.store.delete(session_id)
    }

    /// Accept a refinement request for a completed session and run one
    /// refinement cycle in the background.
    pub fn request_refinement(&self, session_id: &str, feedback: Option<String>) -> Result<()> {
        let session = self.store.get(session_id)?;
        if session.status != SessionStatus::Completed {
            return Err(CloneError::validation(format!(
                "Can only refine completed clones (session is {:?})",
                session.status
            )));
        }

        let guard = self.store.begin_run(session_id)?;
        let service = self.clone();
        let run_id = session_id.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            let empty = HashMap::new();
            if let Err(err) = service
                .refine_stages(&run_id, feedback.as_deref(), &empty)
                .await
            {
                warn!(session_id = %run_id, error = %err, "refinement run failed");
                service.store.fail(&run_id, err.to_string());
            }
        });

        Ok(())
    }

    /// Run one refinement cycle inline for a completed session (CLI use).
    pub async fn run_refinement(
        &self,
        session_id: &str,
        feedback: Option<&str>,
    ) -> Result<CloneSession> {
        let session = self.store.get(session_id)?;
        if session.status != SessionStatus::Completed {
            return Err(CloneError::validation(format!(
                "Can only refine completed clones (session is {:?})",
                session.status
            )));
        }

        let _guard = self.store.begin_run(session_id)?;
        let empty = HashMap::new();
        if let Err(err) = self.refine_stages(session_id, feedback, &empty).await {
            self.store.fail(session_id, err.to_string());
        }
        self.store.get(session_id)
    }

    /// Execute one session's pipeline run, funnelling any stage failure
    /// into the session record.
    async fn run_pipeline(&self, session_id: &str) {
        let _guard = match self.store.begin_run(session_id) {
            Ok(guard) => guard,
            Err(err) => {
                warn!(session_id, error = %err, "could not acquire run ownership");
                self.store.fail(session_id, err.to_string());
                return;
            }
        };

        if let Err(err) = self.execute_stages(session_id).await {
            warn!(session_id, error = %err, "pipeline run failed");
            self.store.fail(session_id, err.to_string());
        }
    }

    async fn execute_stages(&self, session_id: &str) -> Result<()> {
        let request = self.store.get(session_id)?.request;

        // Stage 1: blueprint extraction.
        self.store.transition(
            session_id,
            SessionStatus::Analyzing,
            "Blueprint Extraction",
            10.0,
            "Analyzing page structure",
        )?;

        let snapshot = self
            .renderer
            .extract(
                &request.url,
                ExtractOptions {
                    wait_for_load: true,
                    include_styles: true,
                    max_depth: request.max_depth,
                },
            )
            .await?;
        info!(
            session_id,
            elements = snapshot.elements.len(),
            assets = snapshot.assets.len(),
            "extraction complete"
        );

        // Stage 2: component detection (synchronous, deterministic).
        let detection = ComponentDetector::new(&snapshot).detect(session_id);
        info!(
            session_id,
            components = detection.total_components,
            elapsed_ms = detection.detection_time_ms,
            "component detection complete"
        );

        // Stage 3: asset download through the bounded pool.
        let asset_map = if request.download_assets && !snapshot.assets.is_empty() {
            let downloader = AssetDownloader::new(
                self.config.asset_dir.join(session_id),
                self.config.workers.asset_pool,
            )?;
            let downloads = downloader.download_all(&snapshot.assets).await;
            let succeeded = downloads.iter().filter(|d| d.succeeded()).count();
            info!(
                session_id,
                succeeded,
                failed = downloads.len() - succeeded,
                "asset downloads finished"
            );
            build_asset_map(&downloads)
        } else {
            HashMap::new()
        };

        // Stage 4: budgeted prompt construction and generation.
        self.store.transition(
            session_id,
            SessionStatus::Generating,
            "HTML Assembly",
            40.0,
            format!(
                "Generating HTML from {} detected components",
                detection.total_components
            ),
        )?;

        let budget = BudgetManager::new(
            self.config.budget.context_budget,
            self.config.budget.response_reserve,
        );
        let plan = budget.plan(&detection, &snapshot)?;
        info!(
            session_id,
            tier = ?plan.tier,
            estimated_tokens = plan.estimated_tokens,
            "prompt plan selected"
        );

        let artifact = self
            .retry
            .generate(
                &plan.prompt,
                self.config.budget.max_output_tokens,
                Some(&detection),
            )
            .await?;

        let artifact = localize_assets(artifact, &asset_map);
        let similarity = artifact.similarity_score;
        self.store.complete(
            session_id,
            artifact,
            format!("Clone completed ({similarity:.1}% similarity)"),
        )?;

        // Stage 5: one inline visual refinement pass, when enabled.
        if self.config.refine_on_clone {
            self.refine_stages(session_id, None, &asset_map).await?;
        }

        Ok(())
    }

    /// One refinement cycle: screenshot pair, visual comparison, and a
    /// corrected artifact. The session must currently be `Completed`.
    async fn refine_stages(
        &self,
        session_id: &str,
        feedback: Option<&str>,
        asset_map: &HashMap<String, PathBuf>,
    ) -> Result<()> {
        let session = self.store.get(session_id)?;
        let request = session.request;
        let prior = session.result.ok_or_else(|| {
            CloneError::validation("Cannot refine a session without an HTML artifact")
        })?;

        self.store.transition(
            session_id,
            SessionStatus::Refining,
            "Visual Comparison",
            60.0,
            "Capturing screenshots for comparison",
        )?;

        let (original_png, generated_png) = tokio::try_join!(
            self.renderer.screenshot(
                ScreenshotTarget::Url(request.url.clone()),
                request.viewport
            ),
            self.renderer.screenshot(
                ScreenshotTarget::Html(prior.html_content.clone()),
                request.viewport
            ),
        )?;

        self.store.record_progress(
            session_id,
            "AI Quality Analysis",
            75.0,
            "Analyzing visual differences",
        )?;

        let revised = run_refinement_cycle(
            &self.retry,
            &prior,
            &original_png,
            &generated_png,
            asset_map,
            feedback,
            self.config.budget.max_output_tokens,
        )
        .await?;

        self.store.record_progress(
            session_id,
            "Final Refinement",
            90.0,
            "Applying visual feedback",
        )?;

        let revised = localize_assets(revised, asset_map);
        let similarity = revised.similarity_score;
        self.store.increment_refinement(session_id)?;
        self.store.complete(
            session_id,
            revised,
            format!("Refinement applied ({similarity:.1}% similarity)"),
        )?;
        Ok(())
    }
}

/// Rewrite generated HTML against the asset map and record which assets
/// the artifact references.
fn localize_assets(artifact: HtmlArtifact, asset_map: &HashMap<String, PathBuf>) -> HtmlArtifact {
    if asset_map.is_empty() {
        return artifact;
    }
    let html_content = rewrite_asset_paths(&artifact.html_content, asset_map);
    let mut assets: Vec<String> = asset_map.keys().cloned().collect();
    assets.sort();
    HtmlArtifact {
        html_content,
        assets,
        ..artifact
    }
}

fn validate_request(request: &CloneRequest) -> Result<()> {
    let url = Url::parse(&request.url)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CloneError::validation(format!(
            "Unsupported URL scheme '{}': only http and https can be cloned",
            url.scheme()
        )));
    }
    if request.max_depth == 0 {
        return Err(CloneError::validation("max_depth must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_validation_rejects_bad_schemes() {
        let request = CloneRequest::new("ftp://example.com");
        assert!(matches!(
            validate_request(&request),
            Err(CloneError::Validation(_))
        ));

        let request = CloneRequest::new("not a url");
        assert!(matches!(
            validate_request(&request),
            Err(CloneError::InvalidUrl(_))
        ));

        let request = CloneRequest::new("https://example.com");
        assert!(validate_request(&request).is_ok());
    }

    #[test]
    fn zero_depth_is_rejected() {
        let mut request = CloneRequest::new("https://example.com");
        request.max_depth = 0;
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn localize_assets_rewrites_and_records() {
        let artifact = HtmlArtifact {
            html_content: "<img src=\"https://a.com/x.png\">".into(),
            css_content: None,
            assets: vec![],
            similarity_score: 80.0,
            generation_time_ms: 1,
            tokens_used: crate::types::TokenUsage::default(),
        };
        let mut map = HashMap::new();
        map.insert(
            "https://a.com/x.png".to_string(),
            PathBuf::from("assets/asset-0.png"),
        );

        let localized = localize_assets(artifact, &map);
        assert!(localized.html_content.contains("assets/asset-0.png"));
        assert_eq!(localized.assets, vec!["https://a.com/x.png"]);
    }
}
