//! Visual-feedback refinement: compare screenshots of the original page
//! and the generated replica, distill a bounded list of concrete
//! discrepancies, and prompt for a corrected document.
//!
//! One invocation produces exactly one revised artifact; iterating to
//! convergence is the caller's decision.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;

use image::ImageFormat;

use crate::error::Result;
use crate::retry::RetryController;
use crate::types::HtmlArtifact;

/// Cap on the discrepancy list fed back into the model.
pub const MAX_DISCREPANCIES: usize = 10;

/// Screenshots wider than this are downscaled before the vision call.
const MAX_VISION_WIDTH: u32 = 1600;

/// Instruction for the two-image comparison call.
pub fn comparison_instruction(extra_feedback: Option<&str>) -> String {
    let mut instruction = format!(
        "The first image is a screenshot of the original web page; the second \
is a screenshot of a generated HTML replica. List up to {MAX_DISCREPANCIES} \
concrete visual differences between them, most important first, one per line \
starting with \"- \". Focus on layout, spacing, colors, typography, and \
missing or misplaced elements. Do not suggest new features."
    );
    if let Some(feedback) = extra_feedback {
        let feedback = feedback.trim();
        if !feedback.is_empty() {
            instruction.push_str("\n\nThe requester also noted: ");
            instruction.push_str(feedback);
        }
    }
    instruction
}

/// Extract a bounded discrepancy list from the model's comparison text.
pub fn parse_discrepancies(analysis: &str) -> Vec<String> {
    let mut items: Vec<String> = analysis
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let stripped = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
                .or_else(|| {
                    trimmed
                        .split_once(". ")
                        .filter(|(n, _)| n.chars().all(|c| c.is_ascii_digit()) && !n.is_empty())
                        .map(|(_, rest)| rest)
                })?;
            let stripped = stripped.trim();
            (!stripped.is_empty()).then(|| stripped.to_string())
        })
        .collect();

    // A model that ignored the bullet format still gets its lines used.
    if items.is_empty() {
        items = analysis
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
    }

    items.truncate(MAX_DISCREPANCIES);
    items
}

/// Build the correction prompt: prior HTML, the discrepancy list, and the
/// asset map when one exists.
pub fn build_refinement_prompt(
    prior_html: &str,
    discrepancies: &[String],
    asset_map: &HashMap<String, PathBuf>,
) -> String {
    let mut prompt = String::from(
        "You previously generated the HTML document below as a replica of a web \
page. A visual comparison against the original found these discrepancies:\n\n",
    );
    for item in discrepancies {
        prompt.push_str("- ");
        prompt.push_str(item);
        prompt.push('\n');
    }

    if !asset_map.is_empty() {
        prompt.push_str("\nLocal asset paths that must be referenced as-is:\n");
        let mut entries: Vec<_> = asset_map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (original, local) in entries {
            prompt.push_str(&format!("- {} -> {}\n", original, local.display()));
        }
    }

    prompt.push_str(
        "\nCorrect the document to address the discrepancies. Do not add features \
or content that the original page does not have. Respond with the complete \
corrected HTML inside a ```html fenced block.\n\nCURRENT HTML:\n```html\n",
    );
    prompt.push_str(prior_html);
    prompt.push_str("\n```\n");
    prompt
}

/// Downscale an oversized screenshot and normalize it to PNG before
/// sending it to the vision endpoint.
pub fn prepare_for_vision(png: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(png)?;
    let normalized = if decoded.width() > MAX_VISION_WIDTH {
        let height = decoded.height();
        decoded.thumbnail(MAX_VISION_WIDTH, height)
    } else {
        decoded
    };
    let mut out = Vec::new();
    normalized.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

/// Run one comparison + correction cycle against an existing artifact.
///
/// `original_png` and `generated_png` are screenshots of the source page
/// and the rendered artifact. The returned artifact supersedes the prior
/// one; the caller owns session-state bookkeeping.
pub async fn run_refinement_cycle(
    retry: &RetryController,
    prior: &HtmlArtifact,
    original_png: &[u8],
    generated_png: &[u8],
    asset_map: &HashMap<String, PathBuf>,
    extra_feedback: Option<&str>,
    max_output: u32,
) -> Result<HtmlArtifact> {
    let original = prepare_for_vision(original_png)?;
    let generated = prepare_for_vision(generated_png)?;

    let instruction = comparison_instruction(extra_feedback);
    let analysis = retry
        .compare_images(&original, &generated, &instruction)
        .await?;
    let discrepancies = parse_discrepancies(&analysis);

    let prompt = build_refinement_prompt(&prior.html_content, &discrepancies, asset_map);
    let mut revised = retry.generate(&prompt, max_output, None).await?;
    revised.assets = prior.assets.clone();
    Ok(revised)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrepancy_parsing_strips_bullets_and_caps() {
        let analysis = (1..=15)
            .map(|i| format!("- issue number {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let items = parse_discrepancies(&analysis);
        assert_eq!(items.len(), MAX_DISCREPANCIES);
        assert_eq!(items[0], "issue number 1");
    }

    #[test]
    fn discrepancy_parsing_accepts_numbered_lists() {
        let analysis = "1. header color is wrong\n2. missing footer links";
        let items = parse_discrepancies(analysis);
        assert_eq!(
            items,
            vec!["header color is wrong", "missing footer links"]
        );
    }

    #[test]
    fn unformatted_analysis_still_yields_lines() {
        let analysis = "the hero image is missing\nthe nav is centered instead of left";
        let items = parse_discrepancies(analysis);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn refinement_prompt_embeds_html_and_asset_map() {
        let mut asset_map = HashMap::new();
        asset_map.insert(
            "https://a.com/logo.png".to_string(),
            PathBuf::from("assets/asset-0.png"),
        );
        let prompt = build_refinement_prompt(
            "<html><body>old</body></html>",
            &["logo missing".to_string()],
            &asset_map,
        );
        assert!(prompt.contains("- logo missing"));
        assert!(prompt.contains("assets/asset-0.png"));
        assert!(prompt.contains("<html><body>old</body></html>"));
        assert!(prompt.contains("Do not add features"));
    }

    #[test]
    fn comparison_instruction_appends_caller_feedback() {
        let instruction = comparison_instruction(Some("the footer is the priority"));
        assert!(instruction.contains("the footer is the priority"));
        assert!(comparison_instruction(None).contains("visual differences"));
    }

    #[test]
    fn vision_preparation_downscales_wide_screenshots() {
        let wide = image::RgbaImage::from_pixel(3200, 200, image::Rgba([10, 20, 30, 255]));
        let mut png = Vec::new();
        wide.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let prepared = prepare_for_vision(&png).unwrap();
        let reloaded = image::load_from_memory(&prepared).unwrap();
        assert!(reloaded.width() <= MAX_VISION_WIDTH);
    }

    #[test]
    fn vision_preparation_keeps_small_screenshots() {
        let small = image::RgbaImage::from_pixel(400, 300, image::Rgba([0, 0, 0, 255]));
        let mut png = Vec::new();
        small
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let prepared = prepare_for_vision(&png).unwrap();
        let reloaded = image::load_from_memory(&prepared).unwrap();
        assert_eq!(reloaded.width(), 400);
        assert_eq!(reloaded.height(), 300);
    }
}
