use crate::cli::{ByteRange, UriArg};
use sarge::ArgumentType;

#[test]
fn uri_arg_from_value() {
    let parsed = <UriArg as ArgumentType>::from_value(Some("nfs://nas:/export:/a.mkv"))
        .expect("some")
        .expect("ok");
    assert_eq!(parsed.0.as_str(), "nfs://nas:/export:/a.mkv");

    assert!(<UriArg as ArgumentType>::from_value(None).is_none());
    assert!(
        <UriArg as ArgumentType>::from_value(Some("no-scheme"))
            .expect("some")
            .is_err()
    );
}

#[test]
fn byte_range_from_value_defaults_to_whole_resource() {
    let bare = <ByteRange as ArgumentType>::from_value(None)
        .expect("some")
        .expect("ok");
    assert_eq!(bare, ByteRange::default());
    assert_eq!(<ByteRange as ArgumentType>::default_value(), Some(ByteRange::default()));

    let range = <ByteRange as ArgumentType>::from_value(Some("4096-"))
        .expect("some")
        .expect("ok");
    assert_eq!(range.start, 4096);
}
