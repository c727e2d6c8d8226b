//! In-memory NFS server for tests and host-side development.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::transport::{FileAttributes, FileHandle, FileKind, NfsConnector, NfsTransport};
use crate::config::ReaderConfig;
use crate::error::{ReaderError, ReaderResult};

#[derive(Debug, Default)]
struct Exports {
    /// export → (path within export → contents)
    files: HashMap<String, HashMap<String, Arc<Vec<u8>>>>,
}

/// Serves files from memory through the `NfsConnector` seam.
///
/// Every `read_at` is logged as `(offset, requested)`, so tests can check
/// that seeking never reads the bytes in front of the start offset.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNfsServer {
    exports: Arc<Mutex<Exports>>,
    reads: Arc<Mutex<Vec<(u64, usize)>>>,
    max_read: Option<usize>,
}

impl InMemoryNfsServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file at `path` (leading `/` optional) within `export`.
    pub fn with_file(self, export: &str, path: &str, data: Vec<u8>) -> Self {
        self.exports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .files
            .entry(export.to_string())
            .or_default()
            .insert(path.trim_matches('/').to_string(), Arc::new(data));
        self
    }

    /// Cap the bytes returned per read, like a server's `rtmax`.
    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = Some(max_read.max(1));
        self
    }

    /// `(offset, requested)` of every read served so far.
    pub fn reads(&self) -> Vec<(u64, usize)> {
        self.reads.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl NfsConnector for InMemoryNfsServer {
    fn connect(&self, _host: &str, _config: &ReaderConfig) -> ReaderResult<Box<dyn NfsTransport>> {
        Ok(Box::new(self.clone()))
    }
}

// Handles are "export\0path" so they round-trip without a lookup table.
fn encode(export: &str, path: &str) -> FileHandle {
    FileHandle(format!("{export}\0{path}").into_bytes())
}

fn decode(handle: &FileHandle) -> ReaderResult<(String, String)> {
    let text = String::from_utf8(handle.0.clone())
        .map_err(|_| ReaderError::protocol("stale file handle"))?;
    text.split_once('\0')
        .map(|(e, p)| (e.to_string(), p.to_string()))
        .ok_or_else(|| ReaderError::protocol("stale file handle"))
}

impl InMemoryNfsServer {
    fn attributes(&self, export: &str, path: &str) -> Option<FileAttributes> {
        let exports = self.exports.lock().unwrap_or_else(PoisonError::into_inner);
        let files = exports.files.get(export)?;
        if let Some(data) = files.get(path) {
            return Some(FileAttributes {
                kind: FileKind::Regular,
                size: data.len() as u64,
            });
        }
        let prefix = format!("{path}/");
        (path.is_empty() || files.keys().any(|k| k.starts_with(&prefix))).then_some(FileAttributes {
            kind: FileKind::Directory,
            size: 0,
        })
    }
}

impl NfsTransport for InMemoryNfsServer {
    fn mount(&mut self, export: &str) -> ReaderResult<FileHandle> {
        let exports = self.exports.lock().unwrap_or_else(PoisonError::into_inner);
        if exports.files.contains_key(export) {
            Ok(encode(export, ""))
        } else {
            Err(ReaderError::not_found(export))
        }
    }

    fn lookup(
        &mut self,
        dir: &FileHandle,
        name: &str,
    ) -> ReaderResult<(FileHandle, Option<FileAttributes>)> {
        let (export, dir_path) = decode(dir)?;
        let path = if dir_path.is_empty() {
            name.to_string()
        } else {
            format!("{dir_path}/{name}")
        };
        let attrs = self
            .attributes(&export, &path)
            .ok_or_else(|| ReaderError::not_found(name))?;
        Ok((encode(&export, &path), Some(attrs)))
    }

    fn getattr(&mut self, handle: &FileHandle) -> ReaderResult<FileAttributes> {
        let (export, path) = decode(handle)?;
        self.attributes(&export, &path)
            .ok_or_else(|| ReaderError::not_found(path))
    }

    fn read_at(&mut self, handle: &FileHandle, offset: u64, buf: &mut [u8]) -> ReaderResult<usize> {
        let (export, path) = decode(handle)?;
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((offset, buf.len()));

        let data = {
            let exports = self.exports.lock().unwrap_or_else(PoisonError::into_inner);
            exports
                .files
                .get(&export)
                .and_then(|f| f.get(&path))
                .cloned()
                .ok_or_else(|| ReaderError::not_found(path.clone()))?
        };
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let n = buf
            .len()
            .min(self.max_read.unwrap_or(usize::MAX))
            .min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
}
