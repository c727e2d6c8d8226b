//! Tests for `ByteRange` and `UriArg` parsing.

use crate::cli::{ByteRange, RangeParseError, UriArg};
use crate::error::ErrorKind;

#[test]
fn closed_range() {
    let range: ByteRange = "100-499".parse().expect("range");
    assert_eq!(range, ByteRange { start: 100, end: Some(499) });
    assert_eq!(range.length(), Some(400));
}

#[test]
fn open_ended_and_bare_start() {
    let open: ByteRange = "1024-".parse().expect("range");
    assert_eq!(open, ByteRange { start: 1024, end: None });
    assert_eq!(open.length(), None);

    let bare: ByteRange = " 7 ".parse().expect("range");
    assert_eq!(bare, ByteRange { start: 7, end: None });
}

#[test]
fn malformed_and_reversed_ranges() {
    assert!(matches!(
        "abc".parse::<ByteRange>(),
        Err(RangeParseError::Syntax(_))
    ));
    assert!(matches!(
        "-5".parse::<ByteRange>(),
        Err(RangeParseError::Syntax(_))
    ));
    assert_eq!(
        "10-5".parse::<ByteRange>(),
        Err(RangeParseError::Reversed { start: 10, end: 5 })
    );
}

#[test]
fn range_becomes_a_descriptor() {
    let uri: UriArg = "ftp://nas/a.mkv".parse().expect("uri");
    let range: ByteRange = "100-499".parse().expect("range");
    let descriptor = range.to_descriptor(uri.into_inner());
    assert_eq!(descriptor.start_offset, 100);
    assert_eq!(descriptor.length, Some(400));

    let whole = ByteRange::default().to_descriptor(descriptor.uri.clone());
    assert_eq!(whole.start_offset, 0);
    assert_eq!(whole.length, None);
}

#[test]
fn uri_arg_requires_a_scheme() {
    let err = "nas/a.mkv".parse::<UriArg>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidUri);
}
