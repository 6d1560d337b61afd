//! Parsing of generative-model responses into HTML documents.
//!
//! The extraction chain prefers a fenced ```html block, then any fenced
//! block that looks like HTML, then a raw `<!DOCTYPE…>…</html>` scan, and
//! finally treats the entire response as HTML text. Whatever is extracted
//! is post-processed into a well-formed document shell.

/// HTML plus an optional separate CSS block parsed from one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub html: String,
    pub css: Option<String>,
}

/// Extract an HTML document (and trailing CSS block, if any) from a raw
/// model response.
pub fn parse_model_response(response: &str) -> ParsedResponse {
    let html = extract_html_document(response);
    let css = extract_fenced_block(response, "css").map(|s| s.trim().to_string());
    ParsedResponse { html, css }
}

fn extract_html_document(response: &str) -> String {
    if let Some(block) = extract_fenced_block(response, "html") {
        return block.trim().to_string();
    }

    if let Some(block) = extract_fenced_block(response, "") {
        let trimmed = block.trim();
        if looks_like_html(trimmed) {
            return trimmed.to_string();
        }
    }

    if let Some(raw) = scan_raw_document(response) {
        return raw;
    }

    response.trim().to_string()
}

/// Find a fenced block with the given tag; an empty tag matches a bare
/// ``` fence.
fn extract_fenced_block(text: &str, tag: &str) -> Option<String> {
    let fence = format!("```{}", tag);
    let mut search_from = 0;
    loop {
        let start = text[search_from..].find(&fence)? + search_from;
        let after_fence = start + fence.len();
        // A bare ``` search must not match ```html / ```css openers.
        let rest = &text[after_fence..];
        let line_end = rest.find('\n')?;
        let info = rest[..line_end].trim();
        if tag.is_empty() && !info.is_empty() {
            search_from = after_fence;
            continue;
        }
        let body_start = after_fence + line_end + 1;
        let body = &text[body_start..];
        let end = body.find("```")?;
        return Some(body[..end].to_string());
    }
}

fn scan_raw_document(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let start = lower.find("<!doctype")?;
    let end_tag = "</html>";
    let end = lower.rfind(end_tag)?;
    if end < start {
        return None;
    }
    Some(text[start..end + end_tag.len()].to_string())
}

/// Heuristic check that a block of text is an HTML document or fragment.
pub fn looks_like_html(text: &str) -> bool {
    let lower = text.trim_start().to_ascii_lowercase();
    lower.starts_with("<!doctype")
        || lower.starts_with("<html")
        || (lower.starts_with('<') && lower.contains("</"))
}

/// Guarantee a well-formed document shell around the given HTML: inject
/// the doctype/html/body wrapping when missing and close unterminated
/// `<body>`/`<html>` tags.
pub fn ensure_document_shell(html: &str) -> String {
    let trimmed = html.trim();
    let lower = trimmed.to_ascii_lowercase();

    let mut document = String::new();
    if !lower.starts_with("<!doctype") {
        document.push_str("<!DOCTYPE html>\n");
    }

    let has_html_open = lower.contains("<html");
    let has_body_open = lower.contains("<body");

    if !has_html_open {
        document.push_str("<html>\n");
    }
    if !has_body_open {
        document.push_str("<body>\n");
    }

    document.push_str(trimmed);

    if !lower.contains("</body>") {
        document.push_str("\n</body>");
    }
    if !lower.contains("</html>") {
        document.push_str("\n</html>");
    }

    document
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_fenced_html_block() {
        let response = "Here you go:\n```html\n<!DOCTYPE html>\n<html><body>hi</body></html>\n```\nEnjoy!";
        let parsed = parse_model_response(response);
        assert!(parsed.html.starts_with("<!DOCTYPE html>"));
        assert!(parsed.html.ends_with("</html>"));
        assert!(parsed.css.is_none());
    }

    #[test]
    fn extracts_trailing_css_block() {
        let response =
            "```html\n<html><body>x</body></html>\n```\n```css\nbody { margin: 0; }\n```";
        let parsed = parse_model_response(response);
        assert_eq!(parsed.css.as_deref(), Some("body { margin: 0; }"));
    }

    #[test]
    fn falls_back_to_generic_fence_when_html_like() {
        let response = "```\n<html><body>generic</body></html>\n```";
        let parsed = parse_model_response(response);
        assert!(parsed.html.contains("generic"));
    }

    #[test]
    fn generic_fence_with_non_html_is_ignored() {
        let response = "```\nfn main() {}\n```\n<!DOCTYPE html><html><body>raw</body></html>";
        let parsed = parse_model_response(response);
        assert!(parsed.html.starts_with("<!DOCTYPE html>"));
        assert!(parsed.html.contains("raw"));
    }

    #[test]
    fn raw_doctype_scan_trims_surrounding_prose() {
        let response = "Sure! <!DOCTYPE html><html><body>page</body></html> Hope that helps.";
        let parsed = parse_model_response(response);
        assert!(parsed.html.starts_with("<!DOCTYPE html>"));
        assert!(parsed.html.ends_with("</html>"));
    }

    #[test]
    fn whole_response_used_as_last_resort() {
        let response = "<div>just a fragment</div>";
        let parsed = parse_model_response(response);
        assert_eq!(parsed.html, response);
    }

    #[test]
    fn shell_wraps_bare_fragment() {
        let shell = ensure_document_shell("<div>hello</div>");
        assert!(shell.starts_with("<!DOCTYPE html>"));
        assert!(shell.contains("<html>"));
        assert!(shell.contains("<body>"));
        assert!(shell.ends_with("</html>"));
    }

    #[test]
    fn shell_closes_unterminated_body_and_html() {
        let shell = ensure_document_shell("<!DOCTYPE html>\n<html><body><p>x</p>");
        assert!(shell.ends_with("</body>\n</html>"));
        // The doctype is not duplicated.
        assert_eq!(shell.matches("<!DOCTYPE").count(), 1);
    }

    #[test]
    fn shell_leaves_complete_document_untouched() {
        let complete = "<!DOCTYPE html>\n<html><body>done</body></html>";
        assert_eq!(ensure_document_shell(complete), complete);
    }

    #[test]
    fn plain_text_through_shell_is_well_formed() {
        // Arbitrary non-HTML text still comes out as a document.
        let shell = ensure_document_shell("Generate a complete, valid HTML5 page.");
        assert!(shell.starts_with("<!DOCTYPE html>"));
        assert!(shell.ends_with("</html>"));
    }

    #[test]
    fn looks_like_html_accepts_fragments_and_documents() {
        assert!(looks_like_html("<!DOCTYPE html><html></html>"));
        assert!(looks_like_html("<html lang=\"en\">"));
        assert!(looks_like_html("<div><span>x</span></div>"));
        assert!(!looks_like_html("fn main() {}"));
        assert!(!looks_like_html("plain text"));
    }
}
