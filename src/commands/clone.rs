use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use siteclone_lib::output::{CloneOutput, SitecloneOutput, SITECLONE_OUTPUT_VERSION};
use siteclone_lib::{
    AnthropicClient, CloneRequest, CloneService, Config, PlaywrightRenderer, RendererOptions,
    SessionStatus, Viewport,
};

use crate::cli::OutputFormat;
use crate::formatting::{render_error, write_output};

/// Run the clone command end to end.
#[allow(clippy::too_many_arguments)]
pub async fn run_clone(
    config_path: Option<PathBuf>,
    verbose: bool,
    url: String,
    viewport: Viewport,
    max_depth: u32,
    no_assets: bool,
    no_refine: bool,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> ExitCode {
    let mut config = match Config::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, None),
    };
    config.viewport = viewport;
    if no_refine {
        config.refine_on_clone = false;
    }

    let provider = match AnthropicClient::from_env_with_timeout(config.timeouts.provider) {
        Ok(client) => client,
        Err(err) => return render_error(err, format, None),
    };

    let mut renderer = PlaywrightRenderer::new(RendererOptions {
        navigation_timeout: config.timeouts.navigation,
        process_timeout: config.timeouts.process,
        max_concurrent: config.workers.render_pool,
        ..RendererOptions::default()
    });
    if verbose {
        eprintln!("Cloning {url} at {viewport}…");
        renderer = renderer.with_progress(Arc::new(|line: &str| eprintln!("{line}")));
    }

    let service = CloneService::new(Arc::new(renderer), Arc::new(provider), config);

    let mut request = CloneRequest::new(url.clone());
    request.viewport = viewport;
    request.max_depth = max_depth;
    request.download_assets = !no_assets;

    let session = match service.run_clone(request).await {
        Ok(session) => session,
        Err(err) => return render_error(err, format, None),
    };

    let mut output_path = None;
    if let (Some(path), Some(result)) = (output.as_ref(), session.result.as_ref()) {
        if let Err(err) = std::fs::write(path, &result.html_content) {
            eprintln!("Failed to write HTML output: {err}");
        } else {
            output_path = Some(path.clone());
        }
    }

    let body = SitecloneOutput::Clone(CloneOutput {
        version: SITECLONE_OUTPUT_VERSION.to_string(),
        url,
        viewport,
        session_id: session.session_id.clone(),
        status: session.status,
        similarity: session.result.as_ref().map(|r| r.similarity_score),
        refinement_iterations: session.refinement_iterations,
        output_path,
        error_message: session.error_message.clone(),
        progress: session
            .progress
            .iter()
            .map(|step| step.step_name.clone())
            .collect(),
    });

    if let Err(err) = write_output(&body, format, None) {
        eprintln!("Failed to write output: {err}");
        return ExitCode::from(2);
    }

    if session.status == SessionStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
