//! Tests for best-effort teardown and its report.

use crate::error::{ErrorKind, ReaderError};
use crate::io::Teardown;

#[test]
fn every_step_runs_after_a_failure() {
    let mut ran = Vec::new();
    let mut teardown = Teardown::new("smb://nas/media/a.mkv");
    teardown
        .step("close file", || {
            ran.push("file");
            Err(ReaderError::connection("socket gone"))
        })
        .step("disconnect share", || {
            ran.push("share");
            Ok(())
        })
        .step("logoff", || {
            ran.push("logoff");
            Err(ReaderError::protocol("STATUS_USER_SESSION_DELETED"))
        });
    let report = teardown.finish();

    assert_eq!(ran, ["file", "share", "logoff"]);
    assert_eq!(report.steps, ["close file", "disconnect share", "logoff"]);
    assert_eq!(report.len(), 2);
    assert_eq!(report.failures[0].step, "close file");
    assert_eq!(report.failures[1].error.kind(), ErrorKind::Protocol);
    assert!(!report.is_clean());

    let text = report.to_string();
    assert!(text.contains("recorded 2 failure(s)"));
    assert!(text.contains("#1: [close file]"));
}

#[test]
fn benign_peer_closure_is_not_a_failure() {
    let mut teardown = Teardown::new("ftp://nas/a.mkv");
    teardown.step("logout", || {
        Err(ReaderError::PeerClosedBenignly {
            context: "FTP control connection".into(),
        })
    });
    let report = teardown.finish();

    assert!(report.is_clean());
    assert!(report.is_empty());
    assert_eq!(report.benign, ["logout"]);
}
