//! NFSv3 over ONC-RPC: portmapper lookup, MOUNT v3 and the NFS procedures a reader uses.

use std::net::TcpStream;

use tracing::debug;

use super::rpc::{Credential, RpcClient};
use super::transport::{FileAttributes, FileHandle, FileKind, NfsConnector, NfsTransport};
use super::xdr::{XdrReader, XdrWriter};
use crate::config::ReaderConfig;
use crate::error::{ReaderError, ReaderResult};
use crate::protocol::connect_tcp;

const PMAP_PROGRAM: u32 = 100_000;
const PMAP_VERSION: u32 = 2;
const PMAP_GETPORT: u32 = 3;
const IPPROTO_TCP: u32 = 6;

const MOUNT_PROGRAM: u32 = 100_005;
const MOUNT_VERSION: u32 = 3;
const MOUNT_MNT: u32 = 1;

const NFS_PROGRAM: u32 = 100_003;
const NFS_VERSION: u32 = 3;
const NFS_GETATTR: u32 = 1;
const NFS_LOOKUP: u32 = 3;
const NFS_READ: u32 = 6;
const NFS_DEFAULT_PORT: u16 = 2049;

const FHSIZE3: usize = 64;

/// Map a non-zero `nfsstat3`/`mountstat3` to an error.
fn status_error(what: &str, status: u32, target: &str) -> ReaderError {
    match status {
        2 => ReaderError::not_found(target),
        1 | 13 => ReaderError::auth(format!("{what} of {target} denied (status {status})")),
        20 => ReaderError::protocol(format!("{target} is not a directory")),
        _ => ReaderError::protocol(format!("{what} of {target} failed with status {status}")),
    }
}

/// Decode an `fattr3`.
fn fattr3(r: &mut XdrReader<'_>) -> ReaderResult<FileAttributes> {
    let kind = match r.get_u32()? {
        1 => FileKind::Regular,
        2 => FileKind::Directory,
        _ => FileKind::Other,
    };
    r.skip(16)?; // mode, nlink, uid, gid
    let size = r.get_u64()?;
    r.skip(56)?; // used, rdev, fsid, fileid, atime, mtime, ctime
    Ok(FileAttributes { kind, size })
}

/// Decode a `post_op_attr`.
fn post_op_attr(r: &mut XdrReader<'_>) -> ReaderResult<Option<FileAttributes>> {
    if r.get_bool()? { fattr3(r).map(Some) } else { Ok(None) }
}

fn file_handle(r: &mut XdrReader<'_>) -> ReaderResult<FileHandle> {
    Ok(FileHandle(r.get_opaque(FHSIZE3)?.to_vec()))
}

/// The default connector: real NFSv3 servers over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcNfsConnector;

impl NfsConnector for RpcNfsConnector {
    fn connect(&self, host: &str, config: &ReaderConfig) -> ReaderResult<Box<dyn NfsTransport>> {
        RpcNfsTransport::connect(host, config).map(|t| Box::new(t) as Box<dyn NfsTransport>)
    }
}

/// One NFS program connection plus what is needed to reach MOUNT.
#[derive(Debug)]
pub struct RpcNfsTransport {
    host: String,
    config: ReaderConfig,
    nfs: RpcClient,
}

impl RpcNfsTransport {
    pub fn connect(host: &str, config: &ReaderConfig) -> ReaderResult<Self> {
        let port = match config.nfs.nfs_port {
            Some(port) => port,
            None => lookup_port(host, config, NFS_PROGRAM, NFS_VERSION)?.unwrap_or(NFS_DEFAULT_PORT),
        };
        debug!(host, port, "connecting to NFS");
        let nfs = RpcClient::new(open_stream(host, port, config)?, unix_credential(config));
        Ok(Self {
            host: host.to_string(),
            config: config.clone(),
            nfs,
        })
    }
}

fn unix_credential(config: &ReaderConfig) -> Credential {
    Credential::Unix {
        machine_name: config.nfs.machine_name.clone(),
        uid: config.nfs.uid,
        gid: config.nfs.gid,
    }
}

fn open_stream(host: &str, port: u16, config: &ReaderConfig) -> ReaderResult<TcpStream> {
    connect_tcp(host, port, config.connect_timeout(), config.socket_timeout())
}

/// Ask the portmapper where `program` listens; `None` when unregistered.
fn lookup_port(host: &str, config: &ReaderConfig, program: u32, version: u32) -> ReaderResult<Option<u16>> {
    let stream = open_stream(host, config.nfs.portmapper_port, config)?;
    let mut client = RpcClient::new(stream, Credential::None);
    let mut args = XdrWriter::new();
    args.put_u32(program)
        .put_u32(version)
        .put_u32(IPPROTO_TCP)
        .put_u32(0);
    let reply = client.call(PMAP_PROGRAM, PMAP_VERSION, PMAP_GETPORT, &args.into_bytes())?;
    let port = XdrReader::new(&reply).get_u32()?;
    debug!(host, program, port, "portmapper lookup");
    match port {
        0 => Ok(None),
        p => u16::try_from(p)
            .map(Some)
            .map_err(|_| ReaderError::protocol(format!("portmapper returned invalid port {p}"))),
    }
}

impl NfsTransport for RpcNfsTransport {
    fn mount(&mut self, export: &str) -> ReaderResult<FileHandle> {
        let port = match self.config.nfs.mount_port {
            Some(port) => port,
            None => lookup_port(&self.host, &self.config, MOUNT_PROGRAM, MOUNT_VERSION)?
                .ok_or_else(|| ReaderError::protocol(format!("no MOUNT service on {}", self.host)))?,
        };
        // MOUNT is only needed for MNT itself; the connection is dropped after.
        let stream = open_stream(&self.host, port, &self.config)?;
        let mut mount = RpcClient::new(stream, unix_credential(&self.config));
        let mut args = XdrWriter::new();
        args.put_string(export);
        let reply = mount.call(MOUNT_PROGRAM, MOUNT_VERSION, MOUNT_MNT, &args.into_bytes())?;

        let mut r = XdrReader::new(&reply);
        match r.get_u32()? {
            0 => {
                let handle = file_handle(&mut r)?;
                debug!(host = %self.host, export, "mounted");
                Ok(handle)
            }
            status => Err(status_error("mount", status, export)),
        }
    }

    fn lookup(
        &mut self,
        dir: &FileHandle,
        name: &str,
    ) -> ReaderResult<(FileHandle, Option<FileAttributes>)> {
        let mut args = XdrWriter::new();
        args.put_opaque(&dir.0).put_string(name);
        let reply = self.nfs.call(NFS_PROGRAM, NFS_VERSION, NFS_LOOKUP, &args.into_bytes())?;

        let mut r = XdrReader::new(&reply);
        match r.get_u32()? {
            0 => {
                let handle = file_handle(&mut r)?;
                let attrs = post_op_attr(&mut r)?;
                Ok((handle, attrs))
            }
            status => Err(status_error("lookup", status, name)),
        }
    }

    fn getattr(&mut self, handle: &FileHandle) -> ReaderResult<FileAttributes> {
        let mut args = XdrWriter::new();
        args.put_opaque(&handle.0);
        let reply = self.nfs.call(NFS_PROGRAM, NFS_VERSION, NFS_GETATTR, &args.into_bytes())?;

        let mut r = XdrReader::new(&reply);
        match r.get_u32()? {
            0 => fattr3(&mut r),
            status => Err(status_error("getattr", status, &format!("{handle:?}"))),
        }
    }

    fn read_at(&mut self, handle: &FileHandle, offset: u64, buf: &mut [u8]) -> ReaderResult<usize> {
        let count = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let mut args = XdrWriter::new();
        args.put_opaque(&handle.0).put_u64(offset).put_u32(count);
        let reply = self.nfs.call(NFS_PROGRAM, NFS_VERSION, NFS_READ, &args.into_bytes())?;

        let mut r = XdrReader::new(&reply);
        match r.get_u32()? {
            0 => {
                post_op_attr(&mut r)?;
                r.get_u32()?; // count, repeated by the opaque length
                r.get_bool()?; // eof, implied by a short or empty read
                let data = r.get_opaque(buf.len())?;
                buf[..data.len()].copy_from_slice(data);
                Ok(data.len())
            }
            status => Err(status_error("read", status, &format!("{handle:?}"))),
        }
    }

    fn interrupt_handle(&self) -> Option<TcpStream> {
        self.nfs.interrupt_handle()
    }
}
