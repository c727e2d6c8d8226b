use sarge::ArgumentType;

use crate::cli::{ByteRange, RangeParseError, UriArg};
use crate::error::ReaderError;

impl ArgumentType for UriArg {
    type Error = ReaderError;

    const REPEATABLE: bool = false;

    fn from_value(val: Option<&str>) -> sarge::ArgResult<Self> {
        val.map(str::parse)
    }
}

impl ArgumentType for ByteRange {
    type Error = RangeParseError;

    const REPEATABLE: bool = false;

    fn from_value(val: Option<&str>) -> sarge::ArgResult<Self> {
        // A bare `--range` means the whole resource.
        Some(val.map_or(Ok(ByteRange::default()), str::parse))
    }

    fn default_value() -> Option<Self> {
        Some(ByteRange::default())
    }
}
