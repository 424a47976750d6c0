use virial_core::errors::{ErrorInfo, VirialError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("molecules", "3")
        .with_context("reason", "example")
}

#[test]
fn configuration_error_surface() {
    let err = VirialError::Configuration(sample_info("C001", "steps not a multiple of 1000"));
    assert_eq!(err.info().code, "C001");
    assert!(err.info().context.contains_key("molecules"));
    assert!(!err.is_degenerate());
}

#[test]
fn degenerate_error_surface() {
    let err = VirialError::DegenerateSampling(sample_info("D001", "no overlap"));
    assert_eq!(err.info().code, "D001");
    assert!(err.is_degenerate());
}

#[test]
fn checkpoint_error_surface() {
    let err = VirialError::Checkpoint(sample_info("K001", "unwritable"));
    assert_eq!(err.info().code, "K001");
    assert!(err.info().context.contains_key("reason"));
}

#[test]
fn interrupted_error_surface() {
    let err = VirialError::Interrupted(sample_info("S001", "stopped before sampling"));
    assert_eq!(err.info().code, "S001");
    assert!(err.is_interrupted());
    assert!(!err.is_degenerate());
    assert_eq!(
        err.to_string(),
        "interrupted: stopped before sampling (code: S001) | context: [molecules=3, reason=example]"
    );
}

#[test]
fn display_renders_context_and_hint() {
    let err = VirialError::Configuration(
        ErrorInfo::new("bad-steps", "step budget rejected")
            .with_context("steps", "1500")
            .with_hint("use a multiple of 1000"),
    );
    let rendered = err.to_string();
    assert_eq!(
        rendered,
        "configuration error: step budget rejected (code: bad-steps) | context: [steps=1500] | hint: use a multiple of 1000"
    );
}

#[test]
fn errors_round_trip_through_json() {
    let err = VirialError::degenerate("zero-overlap", "ensembles never overlap");
    let json = serde_json::to_string(&err).expect("serialize");
    assert!(json.contains("\"family\":\"DegenerateSampling\""));
    let decoded: VirialError = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(decoded, err);
}
