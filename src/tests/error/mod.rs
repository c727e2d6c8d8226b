//! Error module tests.

mod classify_tests;
mod teardown_tests;
#[cfg(feature = "miette")]
mod miette_tests;
