use siteclone_lib::error::ErrorCategory;
use siteclone_lib::CloneError;

#[test]
fn config_error_display_includes_message() {
    let err = CloneError::Config("missing viewport".to_string());

    assert_eq!(format!("{}", err), "Configuration error: missing viewport");
}

#[test]
fn io_error_display_wraps_source() {
    let io_err = std::io::Error::other("disk full");
    let err: CloneError = io_err.into();
    let rendered = format!("{}", err);

    assert!(rendered.starts_with("IO error: "));
    assert!(rendered.contains("disk full"));
}

#[test]
fn validation_error_display() {
    let err = CloneError::validation("Can only refine completed clones");
    assert_eq!(
        format!("{}", err),
        "Validation error: Can only refine completed clones"
    );
}

#[test]
fn provider_error_display_includes_provider_name() {
    let err = CloneError::provider_transient("anthropic", "overloaded");
    assert_eq!(format!("{}", err), "Provider error (anthropic): overloaded");
}

#[test]
fn extraction_error_display() {
    let err = CloneError::extraction("Render helper timed out after 60s");
    assert_eq!(
        format!("{}", err),
        "Extraction failed: Render helper timed out after 60s"
    );
}

#[test]
fn session_error_without_id_omits_parenthetical() {
    let err = CloneError::Session {
        session_id: None,
        message: "store unavailable".into(),
    };
    assert_eq!(format!("{}", err), "Session error: store unavailable");
}

#[test]
fn payload_categories_match_taxonomy() {
    let cases: Vec<(CloneError, ErrorCategory)> = vec![
        (
            CloneError::validation("bad input"),
            ErrorCategory::Validation,
        ),
        (
            CloneError::session("s1", "not found"),
            ErrorCategory::Session,
        ),
        (
            CloneError::extraction("render failed"),
            ErrorCategory::Extraction,
        ),
        (
            CloneError::Detection("claim index out of sync".into()),
            ErrorCategory::Detection,
        ),
        (
            CloneError::provider_transient("anthropic", "overloaded"),
            ErrorCategory::Provider,
        ),
        (
            CloneError::Budget("prompt exceeds ceiling".into()),
            ErrorCategory::Budget,
        ),
        (
            CloneError::Config("bad flag".into()),
            ErrorCategory::Config,
        ),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_payload().category, expected, "for {err}");
    }
}

#[test]
fn payloads_always_carry_remediation() {
    let errors = [
        CloneError::validation("x"),
        CloneError::extraction("x"),
        CloneError::provider_terminal("anthropic", "x"),
        CloneError::Budget("x".into()),
    ];
    for err in errors {
        assert!(err.to_payload().remediation.is_some(), "for {err}");
    }
}
