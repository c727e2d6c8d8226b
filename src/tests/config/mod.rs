//! Config module tests.

mod descriptor_tests;
mod locator_tests;
mod settings_tests;
