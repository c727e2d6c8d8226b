//! Transfer observer callbacks for buffering and UI telemetry.

use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use crate::config::ResourceUri;

/// Receives lifecycle and byte-count events from readers.
///
/// Purely observational: nothing an observer does changes reader behavior.
/// Callbacks run on the reader's calling thread and should return quickly.
pub trait TransferObserver: Send + Sync + Debug {
    fn on_transfer_initializing(&self, _uri: &ResourceUri) {}

    fn on_transfer_start(&self, _uri: &ResourceUri, _declared_length: Option<u64>) {}

    fn on_bytes_transferred(&self, _uri: &ResourceUri, _bytes: usize) {}

    fn on_transfer_end(&self, _uri: &ResourceUri) {}
}

/// An event captured by `RecordingObserver`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    Initializing(String),
    Started(String, Option<u64>),
    Bytes(usize),
    Ended(String),
}

/// Observer that records every event, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<TransferEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far.
    pub fn events(&self) -> Vec<TransferEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Total bytes reported through `on_bytes_transferred`.
    pub fn total_bytes(&self) -> u64 {
        self.events()
            .iter()
            .map(|e| match e {
                TransferEvent::Bytes(n) => *n as u64,
                _ => 0,
            })
            .sum()
    }

    fn push(&self, event: TransferEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl TransferObserver for RecordingObserver {
    fn on_transfer_initializing(&self, uri: &ResourceUri) {
        self.push(TransferEvent::Initializing(uri.to_string()));
    }

    fn on_transfer_start(&self, uri: &ResourceUri, declared_length: Option<u64>) {
        self.push(TransferEvent::Started(uri.to_string(), declared_length));
    }

    fn on_bytes_transferred(&self, _uri: &ResourceUri, bytes: usize) {
        self.push(TransferEvent::Bytes(bytes));
    }

    fn on_transfer_end(&self, uri: &ResourceUri) {
        self.push(TransferEvent::Ended(uri.to_string()));
    }
}
