//! Tests for declared-length computation and byte accounting.

use crate::error::{ErrorKind, ReaderError};
use crate::io::{ByteAccounting, declared_length};

#[test]
fn requested_length_is_capped_by_what_remains() {
    assert_eq!(declared_length(100, Some(400), Some(1000)).unwrap(), Some(400));
    assert_eq!(declared_length(900, Some(400), Some(1000)).unwrap(), Some(100));
    assert_eq!(declared_length(100, None, Some(1000)).unwrap(), Some(900));
}

#[test]
fn start_at_end_declares_zero() {
    assert_eq!(declared_length(1000, None, Some(1000)).unwrap(), Some(0));
    assert_eq!(declared_length(0, Some(0), Some(1000)).unwrap(), Some(0));
}

#[test]
fn start_past_end_is_a_range_error() {
    let err = declared_length(1001, None, Some(1000)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);
    assert!(matches!(
        err,
        ReaderError::Range {
            start: 1001,
            size: 1000,
            ..
        }
    ));
}

#[test]
fn unknown_size_passes_length_through() {
    assert_eq!(declared_length(5, Some(10), None).unwrap(), Some(10));
    assert_eq!(declared_length(5, None, None).unwrap(), None);
}

#[test]
fn overflowing_range_is_rejected() {
    let err = declared_length(u64::MAX, Some(2), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);
}

#[test]
fn accounting_clamps_and_completes() {
    let mut acc = ByteAccounting::new(Some(250));
    assert_eq!(acc.clamp(100), 100);
    acc.record(100);
    acc.record(100);
    assert_eq!(acc.remaining(), Some(50));
    assert_eq!(acc.clamp(100), 50);
    acc.record(50);
    assert!(acc.is_complete());
    assert_eq!(acc.clamp(100), 0);
}

#[test]
fn premature_end_reports_expected_and_delivered() {
    let mut acc = ByteAccounting::new(Some(400));
    acc.record(300);
    match acc.premature_end() {
        ReaderError::UnexpectedEndOfStream {
            expected,
            delivered,
        } => {
            assert_eq!(expected, 400);
            assert_eq!(delivered, 300);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_length_never_completes() {
    let mut acc = ByteAccounting::new(None);
    acc.record(1 << 20);
    assert_eq!(acc.remaining(), None);
    assert!(!acc.is_complete());
    assert_eq!(acc.clamp(4096), 4096);
}
