use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use siteclone_lib::output::{ErrorOutput, SitecloneOutput};
use siteclone_lib::CloneError;

use crate::cli::OutputFormat;

/// Write output in the requested format.
pub fn write_output(
    body: &SitecloneOutput,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(body, output.as_deref())?,
    };
    Ok(())
}

/// Render an error and return the appropriate exit code.
pub fn render_error(err: CloneError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let payload = SitecloneOutput::Error(ErrorOutput::new(err.to_payload()));

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"mode\":\"error\"}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    // Exit code 2 is reserved for fatal errors; a failed clone uses 1.
    ExitCode::from(2)
}

fn write_json_output(
    body: &SitecloneOutput,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    match output {
        Some(path) => std::fs::write(path, content)?,
        None => println!("{content}"),
    }
    Ok(())
}

fn write_pretty_output(
    body: &SitecloneOutput,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = render_pretty(body);
    match output {
        Some(path) => std::fs::write(path, content)?,
        None => print!("{content}"),
    }
    Ok(())
}

fn render_pretty(body: &SitecloneOutput) -> String {
    let mut out = String::new();
    match body {
        SitecloneOutput::Clone(clone) => {
            let _ = writeln!(out, "Clone of {}", clone.url);
            let _ = writeln!(out, "  session:    {}", clone.session_id);
            let _ = writeln!(out, "  status:     {:?}", clone.status);
            if let Some(similarity) = clone.similarity {
                let _ = writeln!(out, "  similarity: {similarity:.1}%");
            }
            let _ = writeln!(out, "  refinements: {}", clone.refinement_iterations);
            if let Some(path) = &clone.output_path {
                let _ = writeln!(out, "  written to: {}", path.display());
            }
            if let Some(error) = &clone.error_message {
                let _ = writeln!(out, "  error:      {error}");
            }
            if !clone.progress.is_empty() {
                let _ = writeln!(out, "  steps:");
                for step in &clone.progress {
                    let _ = writeln!(out, "    - {step}");
                }
            }
        }
        SitecloneOutput::Detect(detect) => {
            let _ = writeln!(
                out,
                "Detected {} component(s) on {} ({} ms)",
                detect.total_components, detect.url, detect.detection_time_ms
            );
            for component in &detect.components {
                let label = component
                    .label
                    .as_deref()
                    .map(|l| format!(" \"{l}\""))
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "  - {}{} ({} element(s))",
                    component.component_type,
                    label,
                    component.member_paths.len()
                );
            }
        }
        SitecloneOutput::Error(error) => {
            let _ = writeln!(out, "Error ({:?}): {}", error.error.category, error.error.message);
            if let Some(remediation) = &error.error.remediation {
                let _ = writeln!(out, "  hint: {remediation}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteclone_lib::error::{ErrorCategory, ErrorPayload};

    #[test]
    fn pretty_error_includes_hint() {
        let body = SitecloneOutput::Error(ErrorOutput::new(ErrorPayload::new(
            ErrorCategory::Provider,
            "rate limited".into(),
            "retry later",
        )));
        let rendered = render_pretty(&body);
        assert!(rendered.contains("rate limited"));
        assert!(rendered.contains("hint: retry later"));
    }
}
