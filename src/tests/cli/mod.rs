//! CLI argument type tests.

mod parse_tests;
#[cfg(feature = "sarge")]
mod sarge_tests;
