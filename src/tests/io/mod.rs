//! Reader contract and state machine tests.

mod accounting_tests;
mod memory_tests;
mod state_tests;
mod stream_tests;
