use std::path::PathBuf;
use std::process::ExitCode;

use siteclone_lib::output::{DetectOutput, SitecloneOutput, SITECLONE_OUTPUT_VERSION};
use siteclone_lib::{
    ComponentDetector, Config, ExtractOptions, PlaywrightRenderer, Renderer, RendererOptions,
    Viewport,
};

use crate::cli::OutputFormat;
use crate::formatting::{render_error, write_output};

/// Run the detect command: extract the page and print its components.
pub async fn run_detect(
    config_path: Option<PathBuf>,
    verbose: bool,
    url: String,
    viewport: Viewport,
    max_depth: u32,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> ExitCode {
    let config = match Config::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, output),
    };

    let mut renderer = PlaywrightRenderer::new(RendererOptions {
        navigation_timeout: config.timeouts.navigation,
        process_timeout: config.timeouts.process,
        max_concurrent: config.workers.render_pool,
        ..RendererOptions::default()
    });
    if verbose {
        renderer = renderer.with_progress(std::sync::Arc::new(|line: &str| eprintln!("{line}")));
    }

    let snapshot = match renderer
        .extract(
            &url,
            ExtractOptions {
                wait_for_load: true,
                include_styles: true,
                max_depth,
            },
        )
        .await
    {
        Ok(snapshot) => snapshot,
        Err(err) => return render_error(err, format, output),
    };

    let detection = ComponentDetector::new(&snapshot).detect("detect-cli");

    let body = SitecloneOutput::Detect(DetectOutput {
        version: SITECLONE_OUTPUT_VERSION.to_string(),
        url,
        viewport,
        total_components: detection.total_components,
        detection_time_ms: detection.detection_time_ms,
        components: detection.components,
    });

    if let Err(err) = write_output(&body, format, output) {
        eprintln!("Failed to write output: {err}");
        return ExitCode::from(2);
    }

    ExitCode::SUCCESS
}
