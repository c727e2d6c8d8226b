//! Byte accounting and throughput sampling for one open session.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{ReaderError, ReaderResult};

/// Compute the declared readable length of a range against the remote size.
///
/// With a known `size`, a `start` beyond it is a `Range` error rather than a
/// clamped length. With an unknown size the requested length is taken as-is.
pub fn declared_length(start: u64, length: Option<u64>, size: Option<u64>) -> ReaderResult<Option<u64>> {
    let range_error = || ReaderError::Range {
        start,
        length,
        size: size.unwrap_or(0),
    };

    if let Some(len) = length {
        start.checked_add(len).ok_or_else(range_error)?;
    }

    match size {
        Some(size) => {
            let available = size.checked_sub(start).ok_or_else(range_error)?;
            Ok(Some(length.map_or(available, |len| len.min(available))))
        }
        None => Ok(length),
    }
}

/// Tracks delivered bytes against the declared length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteAccounting {
    declared: Option<u64>,
    delivered: u64,
}

impl ByteAccounting {
    pub fn new(declared: Option<u64>) -> Self {
        Self {
            declared,
            delivered: 0,
        }
    }

    pub fn declared(&self) -> Option<u64> {
        self.declared
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Bytes still owed, `None` when the declared length is unknown.
    pub fn remaining(&self) -> Option<u64> {
        self.declared.map(|d| d.saturating_sub(self.delivered))
    }

    /// Whether the declared length has been fully delivered.
    pub fn is_complete(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Cap a request so it never exceeds the remaining bytes.
    pub fn clamp(&self, requested: usize) -> usize {
        match self.remaining() {
            Some(remaining) => usize::try_from(remaining).map_or(requested, |r| r.min(requested)),
            None => requested,
        }
    }

    pub fn record(&mut self, n: usize) {
        self.delivered = self.delivered.saturating_add(n as u64);
    }

    /// Error for a transport that ran dry before the declared length.
    pub fn premature_end(&self) -> ReaderError {
        ReaderError::UnexpectedEndOfStream {
            expected: self.declared.unwrap_or(self.delivered),
            delivered: self.delivered,
        }
    }
}

/// Diagnostic throughput sample, reset every `interval`.
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    interval: Duration,
    window_start: Instant,
    bytes_in_window: u64,
}

impl ThroughputMeter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            window_start: Instant::now(),
            bytes_in_window: 0,
        }
    }

    /// Count `n` bytes and log a sample once the window has elapsed.
    pub fn record(&mut self, n: usize, uri: &str) {
        self.bytes_in_window += n as u64;
        if self.window_start.elapsed() >= self.interval {
            self.log_sample(uri, "throughput");
        }
    }

    /// Log the last partial window.
    pub fn finish(&mut self, uri: &str) {
        self.log_sample(uri, "final throughput");
    }

    pub fn bytes_in_window(&self) -> u64 {
        self.bytes_in_window
    }

    fn log_sample(&mut self, uri: &str, label: &'static str) {
        let elapsed = self.window_start.elapsed();
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        let kib_per_sec = self.bytes_in_window as f64 / 1024.0 / secs;
        debug!(
            uri,
            bytes = self.bytes_in_window,
            elapsed_ms = elapsed.as_millis() as u64,
            kib_per_sec = format!("{kib_per_sec:.1}"),
            "{label}"
        );
        self.window_start = Instant::now();
        self.bytes_in_window = 0;
    }
}
