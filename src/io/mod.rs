//! The reader contract and the machinery shared by every protocol reader.
//!
//! This module provides:
//! - `RemoteReader` / `ReaderFactory`: The contract the host engine drives
//! - `SessionCell` / `Session`: State machine and exclusive session ownership
//! - `ByteAccounting` / `ThroughputMeter`: Per-open byte bookkeeping
//! - `Teardown`: Best-effort sequential cleanup
//! - `TransferObserver`: Telemetry callbacks
//! - In-memory implementations and a `std::io::Read` adapter for hosts and tests

mod accounting;
mod cleanup;
mod memory;
mod observer;
mod reader;
mod state;
mod stream;

pub use accounting::{ByteAccounting, ThroughputMeter, declared_length};
pub use cleanup::Teardown;
pub use memory::{InMemoryReader, InMemoryReaderFactory};
pub use observer::{RecordingObserver, TransferEvent, TransferObserver};
pub use reader::{ReadOutcome, ReaderFactory, RemoteReader};
pub use state::{ReaderState, Session, SessionCell};
pub use stream::ReaderStream;
