//! In-memory SMB server for tests and host-side development.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::session::{SmbConnection, SmbFile, SmbSession, SmbShare, SmbTransport};
use crate::config::{Credentials, ReaderConfig};
use crate::error::{ReaderError, ReaderResult};

/// Calls observed by an `InMemorySmbServer`, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmbEvent {
    Connected { host: String, port: u16 },
    Authenticated { username: String },
    ShareConnected { share: String },
    FileOpened { path: String },
    /// `requested` bytes asked for, `skipped` actually skipped.
    Skipped { requested: u64, skipped: u64 },
    FileClosed,
    ShareDisconnected,
    LoggedOff,
    ConnectionClosed,
}

#[derive(Debug, Default)]
struct State {
    files: HashMap<(String, String), Arc<Vec<u8>>>,
    account: Option<(String, String)>,
    max_skip: Option<u64>,
    skip_stalls_at: Option<u64>,
    truncate_to: Option<usize>,
    failing_step: Option<&'static str>,
    events: Vec<SmbEvent>,
}

/// Serves files from memory through the `SmbTransport` seam.
#[derive(Debug, Clone, Default)]
pub struct InMemorySmbServer {
    state: Arc<Mutex<State>>,
}

impl InMemorySmbServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state(self, f: impl FnOnce(&mut State)) -> Self {
        f(&mut self.lock());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: SmbEvent) {
        self.lock().events.push(event);
    }

    fn fail_if(&self, step: &'static str) -> ReaderResult<()> {
        if self.lock().failing_step == Some(step) {
            return Err(ReaderError::connection(format!("simulated {step} failure")));
        }
        Ok(())
    }

    pub fn with_file(self, share: &str, path: &str, data: Vec<u8>) -> Self {
        let key = (share.to_string(), path.trim_matches('/').to_string());
        self.with_state(|s| {
            s.files.insert(key, Arc::new(data));
        })
    }

    /// Require these credentials; anonymous and other users are rejected.
    pub fn with_account(self, username: &str, password: &str) -> Self {
        let account = (username.to_string(), password.to_string());
        self.with_state(|s| s.account = Some(account))
    }

    /// Skip at most `max_skip` bytes per call.
    pub fn with_max_skip(self, max_skip: u64) -> Self {
        self.with_state(|s| s.max_skip = Some(max_skip.max(1)))
    }

    /// Skips return 0 once the file position reaches `offset`.
    pub fn with_skip_stall_at(self, offset: u64) -> Self {
        self.with_state(|s| s.skip_stalls_at = Some(offset))
    }

    /// File streams end after `len` bytes whatever the reported size.
    pub fn with_truncated_stream(self, len: usize) -> Self {
        self.with_state(|s| s.truncate_to = Some(len))
    }

    /// Make one teardown step fail: `file`, `share`, `session` or `connection`.
    pub fn with_failing_teardown(self, step: &'static str) -> Self {
        self.with_state(|s| s.failing_step = Some(step))
    }

    pub fn events(&self) -> Vec<SmbEvent> {
        self.lock().events.clone()
    }

    /// Total bytes skipped across all skip calls.
    pub fn total_skipped(&self) -> u64 {
        self.lock()
            .events
            .iter()
            .map(|e| match e {
                SmbEvent::Skipped { skipped, .. } => *skipped,
                _ => 0,
            })
            .sum()
    }
}

impl SmbTransport for InMemorySmbServer {
    fn connect(&self, host: &str, port: u16, _config: &ReaderConfig) -> ReaderResult<Box<dyn SmbConnection>> {
        self.record(SmbEvent::Connected {
            host: host.to_string(),
            port,
        });
        Ok(Box::new(MemoryConnection(self.clone())))
    }
}

struct MemoryConnection(InMemorySmbServer);

impl SmbConnection for MemoryConnection {
    fn authenticate(&mut self, credentials: &Credentials) -> ReaderResult<Box<dyn SmbSession>> {
        let accepted = match &self.0.lock().account {
            None => true,
            Some((user, password)) => {
                credentials.username == *user
                    && credentials.password.as_deref().unwrap_or("") == password
            }
        };
        if !accepted {
            return Err(ReaderError::auth(format!(
                "logon failure for '{}'",
                credentials.username
            )));
        }
        self.0.record(SmbEvent::Authenticated {
            username: credentials.username.clone(),
        });
        Ok(Box::new(MemorySession(self.0.clone())))
    }

    fn close(self: Box<Self>) -> ReaderResult<()> {
        self.0.record(SmbEvent::ConnectionClosed);
        self.0.fail_if("connection")
    }
}

struct MemorySession(InMemorySmbServer);

impl SmbSession for MemorySession {
    fn connect_share(&mut self, share: &str) -> ReaderResult<Box<dyn SmbShare>> {
        let exists = self.0.lock().files.keys().any(|(s, _)| s == share);
        if !exists {
            return Err(ReaderError::not_found(share));
        }
        self.0.record(SmbEvent::ShareConnected {
            share: share.to_string(),
        });
        Ok(Box::new(MemoryShare {
            server: self.0.clone(),
            share: share.to_string(),
        }))
    }

    fn logoff(self: Box<Self>) -> ReaderResult<()> {
        self.0.record(SmbEvent::LoggedOff);
        self.0.fail_if("session")
    }
}

struct MemoryShare {
    server: InMemorySmbServer,
    share: String,
}

impl MemoryShare {
    fn file(&self, path: &str) -> ReaderResult<Arc<Vec<u8>>> {
        let key = (self.share.clone(), path.trim_matches('/').to_string());
        self.server
            .lock()
            .files
            .get(&key)
            .cloned()
            .ok_or_else(|| ReaderError::not_found(path))
    }
}

impl SmbShare for MemoryShare {
    fn file_size(&mut self, path: &str) -> ReaderResult<u64> {
        self.file(path).map(|d| d.len() as u64)
    }

    fn open_file(&mut self, path: &str) -> ReaderResult<Box<dyn SmbFile>> {
        let data = self.file(path)?;
        let end = self.server.lock().truncate_to.map_or(data.len(), |t| t.min(data.len()));
        self.server.record(SmbEvent::FileOpened {
            path: path.to_string(),
        });
        Ok(Box::new(MemoryFile {
            server: self.server.clone(),
            data,
            end,
            position: 0,
        }))
    }

    fn disconnect(self: Box<Self>) -> ReaderResult<()> {
        self.server.record(SmbEvent::ShareDisconnected);
        self.server.fail_if("share")
    }
}

struct MemoryFile {
    server: InMemorySmbServer,
    data: Arc<Vec<u8>>,
    end: usize,
    position: usize,
}

impl SmbFile for MemoryFile {
    fn skip(&mut self, n: u64) -> ReaderResult<u64> {
        let (max_skip, stall_at) = {
            let state = self.server.lock();
            (state.max_skip, state.skip_stalls_at)
        };
        let stalled = stall_at.is_some_and(|at| self.position as u64 >= at);
        let available = (self.end - self.position) as u64;
        let skipped = if stalled {
            0
        } else {
            n.min(max_skip.unwrap_or(u64::MAX)).min(available)
        };
        self.position += skipped as usize;
        self.server.record(SmbEvent::Skipped {
            requested: n,
            skipped,
        });
        Ok(skipped)
    }

    fn read(&mut self, buf: &mut [u8]) -> ReaderResult<usize> {
        let n = buf.len().min(self.end - self.position);
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn close(self: Box<Self>) -> ReaderResult<()> {
        self.server.record(SmbEvent::FileClosed);
        self.server.fail_if("file")
    }
}
