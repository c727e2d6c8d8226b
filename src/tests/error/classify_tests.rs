//! Tests for error kinds and playback failure classification.

use std::io;

use crate::error::{ErrorKind, PlaybackFailure, ReaderError, Stage};
use crate::io::ReaderState;

#[test]
fn kind_looks_through_read_wrapper() {
    let err = ReaderError::auth("bad password").at_read("ftp://nas/a.mkv", 4096);
    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(err.to_string().contains("offset 4096"));

    // Wrapping twice keeps the first position.
    let again = err.at_read("ftp://nas/a.mkv", 9999);
    assert!(again.to_string().contains("offset 4096"));
}

#[test]
fn closure_style_io_errors_are_benign() {
    for kind in [
        io::ErrorKind::ConnectionReset,
        io::ErrorKind::BrokenPipe,
        io::ErrorKind::UnexpectedEof,
    ] {
        let err = ReaderError::from_io("control", io::Error::new(kind, "gone"));
        assert!(err.is_peer_closed(), "{kind:?}");
    }

    let err = ReaderError::from_io("control", io::Error::new(io::ErrorKind::TimedOut, "slow"));
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[test]
fn peer_closure_outside_teardown_is_a_connection_failure() {
    let err = ReaderError::PeerClosedBenignly {
        context: "data stream".into(),
    }
    .into_failure();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.to_string().contains("peer closed data stream"));

    let untouched = ReaderError::not_found("nfs://h:/e:/f").into_failure();
    assert_eq!(untouched.kind(), ErrorKind::NotFound);
}

#[test]
fn playback_failure_depends_on_stage_and_progress() {
    assert_eq!(
        PlaybackFailure::classify(Stage::Open, 0),
        PlaybackFailure::CouldNotStart
    );
    assert_eq!(
        PlaybackFailure::classify(Stage::Read, 0),
        PlaybackFailure::CouldNotStart
    );
    assert_eq!(
        PlaybackFailure::classify(Stage::Read, 1),
        PlaybackFailure::Interrupted
    );
    assert_eq!(PlaybackFailure::Interrupted.to_string(), "playback interrupted");
}

#[test]
fn invalid_state_message_names_operation_and_state() {
    let err = ReaderError::InvalidState {
        operation: "read",
        state: ReaderState::Closed,
    };
    assert_eq!(err.to_string(), "cannot read while reader is closed");
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}
