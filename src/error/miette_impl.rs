//! Miette integration for pretty error reporting.

use miette::{Diagnostic, Severity};
use thiserror::Error;

use super::{ErrorKind, PlaybackFailure, ReaderError, Stage};

/// A diagnostic wrapper for reader errors compatible with miette.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct ReaderDiagnostic {
    /// The error message
    pub message: String,

    #[source]
    /// The underlying error source
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,

    #[help]
    /// Help text for the user
    pub help: Option<String>,

    #[diagnostic(severity)]
    /// Severity level
    pub severity: Severity,
}

impl ReaderDiagnostic {
    /// Build a diagnostic for a failure at `stage` after `bytes_delivered` bytes.
    pub fn from_failure(error: ReaderError, stage: Stage, bytes_delivered: u64) -> Self {
        let failure = PlaybackFailure::classify(stage, bytes_delivered);
        let help = help_for(error.kind()).map(str::to_string);
        ReaderDiagnostic {
            message: format!("{failure} [{stage}]"),
            source: Some(Box::new(error)),
            help,
            severity: Severity::Error,
        }
    }
}

impl From<ReaderError> for ReaderDiagnostic {
    fn from(e: ReaderError) -> Self {
        let help = help_for(e.kind()).map(str::to_string);
        ReaderDiagnostic {
            message: e.to_string(),
            source: None,
            help,
            severity: Severity::Error,
        }
    }
}

impl From<ReaderError> for miette::Report {
    fn from(e: ReaderError) -> Self {
        miette::Report::new(ReaderDiagnostic::from(e))
    }
}

fn help_for(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::Auth => Some("Check the user name and password embedded in the URI"),
        ErrorKind::NotFound => Some("Check that the path exists on the server"),
        ErrorKind::Range => Some("The requested start offset lies beyond the end of the file"),
        ErrorKind::Connection => Some("Check that the server is reachable and the port is open"),
        ErrorKind::InvalidUri => {
            Some("Expected ftp://, nfs://host:/export:/path, smb:// or http(s):// URIs")
        }
        ErrorKind::Config => Some("Check the configuration file syntax and extension"),
        _ => None,
    }
}
