//! Internal unit tests, grouped by the module they exercise.

mod cli;
mod config;
mod error;
mod io;
mod protocol;
mod registry;
