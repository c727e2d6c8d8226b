//! Tests for the miette diagnostic wrapper.

use miette::Diagnostic;

use crate::error::{ReaderDiagnostic, ReaderError, Stage};

#[test]
fn failure_diagnostic_names_the_playback_outcome() {
    let diagnostic =
        ReaderDiagnostic::from_failure(ReaderError::auth("530 Login incorrect"), Stage::Open, 0);
    assert_eq!(diagnostic.to_string(), "could not start playback of this item [Open]");
    assert!(diagnostic.help().is_some());
    assert!(std::error::Error::source(&diagnostic).is_some());
}

#[test]
fn protocol_errors_carry_no_help() {
    let diagnostic = ReaderDiagnostic::from(ReaderError::protocol("unexpected reply"));
    assert!(diagnostic.help().is_none());
    let report: miette::Report = ReaderError::not_found("ftp://nas/a.mkv").into();
    assert!(report.to_string().contains("resource not found"));
}
