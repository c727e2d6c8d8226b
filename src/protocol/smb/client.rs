//! Native SMB2 client (dialects 2.0.2 and 2.1) over direct TCP.
//!
//! One TCP connection is shared by every layer of the stack; requests are
//! strictly sequential. Sessions authenticate with NTLMv2 and sign their
//! traffic when the server requires it.

use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, trace};

use super::ntlm::{self, Challenge, Identity};
use super::session::{SmbConnection, SmbFile, SmbSession, SmbShare, SmbTransport};
use super::wire::{self, FileId, RequestHeader, Response};
use crate::config::{Credentials, ReaderConfig};
use crate::error::{ReaderError, ReaderResult};
use crate::protocol::connect_tcp;

/// Largest single READ, whatever the server allows.
const MAX_READ: u32 = 64 * 1024;
/// Seconds between 1601-01-01 and the Unix epoch.
const FILETIME_EPOCH_OFFSET: u64 = 11_644_473_600;

fn command_name(command: u16) -> &'static str {
    match command {
        wire::NEGOTIATE => "NEGOTIATE",
        wire::SESSION_SETUP => "SESSION_SETUP",
        wire::LOGOFF => "LOGOFF",
        wire::TREE_CONNECT => "TREE_CONNECT",
        wire::TREE_DISCONNECT => "TREE_DISCONNECT",
        wire::CREATE => "CREATE",
        wire::CLOSE => "CLOSE",
        wire::READ => "READ",
        _ => "SMB2",
    }
}

fn filetime_now() -> u64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (since_epoch.as_secs() + FILETIME_EPOCH_OFFSET) * 10_000_000
        + u64::from(since_epoch.subsec_nanos() / 100)
}

/// Opens SMB2 connections over TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSmbTransport;

impl SmbTransport for NativeSmbTransport {
    fn connect(
        &self,
        host: &str,
        port: u16,
        config: &ReaderConfig,
    ) -> ReaderResult<Box<dyn SmbConnection>> {
        let stream = connect_tcp(host, port, config.connect_timeout(), config.socket_timeout())?;
        let mut channel = Channel {
            stream,
            host: host.to_string(),
            next_message_id: 0,
            max_read: MAX_READ,
            signing_required: false,
            signing_key: None,
        };
        channel.negotiate()?;
        Ok(Box::new(NativeConnection {
            channel: Arc::new(Mutex::new(channel)),
        }))
    }
}

/// The socket and the per-connection protocol state.
struct Channel {
    stream: TcpStream,
    host: String,
    next_message_id: u64,
    max_read: u32,
    signing_required: bool,
    /// Set once an authenticated session must sign.
    signing_key: Option<[u8; 16]>,
}

type SharedChannel = Arc<Mutex<Channel>>;

fn lock(channel: &SharedChannel) -> MutexGuard<'_, Channel> {
    channel.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Channel {
    /// Send one request and wait for its final response.
    fn call(
        &mut self,
        command: u16,
        tree_id: u32,
        session_id: u64,
        body: &[u8],
    ) -> ReaderResult<Response> {
        let name = command_name(command);
        let message_id = self.next_message_id;
        self.next_message_id += 1;

        let mut msg = wire::request(
            RequestHeader {
                command,
                message_id,
                tree_id,
                session_id,
            },
            body,
        );
        if let Some(key) = self.signing_key {
            wire::sign(&key, &mut msg)?;
        }
        trace!(command = name, message_id, "> SMB2 request");
        wire::write_frame(&mut self.stream, &msg)
            .map_err(|e| ReaderError::from_io(format!("sending SMB2 {name}"), e))?;

        loop {
            let raw = wire::read_frame(&mut self.stream)
                .map_err(|e| ReaderError::from_io(format!("awaiting SMB2 {name} response"), e))?;
            let resp = Response::parse(raw)?;
            if resp.flags & wire::FLAG_RESPONSE == 0 || resp.command != command {
                return Err(ReaderError::protocol(format!(
                    "unexpected SMB2 message in reply to {name}"
                )));
            }
            if resp.message_id != message_id {
                debug!(expected = message_id, got = resp.message_id, "discarding stray SMB2 response");
                continue;
            }
            if resp.is_interim() {
                trace!(command = name, "SMB2 request pending");
                continue;
            }
            trace!(command = name, status = format_args!("0x{:08x}", resp.status), "< SMB2 response");
            if let Some(key) = self.signing_key {
                if resp.flags & wire::FLAG_SIGNED != 0 && !resp.verify(&key)? {
                    return Err(ReaderError::protocol(format!("bad signature on SMB2 {name} response")));
                }
            }
            return Ok(resp);
        }
    }

    fn negotiate(&mut self) -> ReaderResult<()> {
        let resp = self.call(wire::NEGOTIATE, 0, 0, &wire::negotiate_request(rand::random()))?;
        if resp.status != wire::STATUS_SUCCESS {
            return Err(wire::status_error("NEGOTIATE", resp.status, &self.host));
        }
        let negotiated = wire::Negotiated::parse(&resp)?;
        if !matches!(negotiated.dialect, wire::DIALECT_202 | wire::DIALECT_210) {
            return Err(ReaderError::protocol(format!(
                "{} selected unsupported SMB dialect 0x{:04x}",
                self.host, negotiated.dialect
            )));
        }
        self.max_read = negotiated.max_read.clamp(1, MAX_READ);
        self.signing_required = negotiated.signing_required;
        debug!(
            host = %self.host,
            dialect = format_args!("0x{:04x}", negotiated.dialect),
            max_read = self.max_read,
            signing_required = self.signing_required,
            "SMB2 dialect negotiated"
        );
        Ok(())
    }
}

struct NativeConnection {
    channel: SharedChannel,
}

impl SmbConnection for NativeConnection {
    fn authenticate(&mut self, credentials: &Credentials) -> ReaderResult<Box<dyn SmbSession>> {
        let mut channel = lock(&self.channel);
        let negotiate = ntlm::negotiate_message();
        let resp = channel.call(
            wire::SESSION_SETUP,
            0,
            0,
            &wire::session_setup_request(&negotiate),
        )?;
        if resp.status != wire::STATUS_MORE_PROCESSING_REQUIRED {
            return Err(wire::status_error("SESSION_SETUP", resp.status, &channel.host));
        }
        let session_id = resp.session_id;
        let challenge = Challenge::parse(wire::session_setup_response(&resp)?.1)?;

        let identity = Identity {
            user: &credentials.username,
            password: credentials.password.as_deref().unwrap_or(""),
            domain: credentials.domain.as_deref().unwrap_or(""),
            workstation: "",
        };
        let auth = ntlm::authenticate(
            &negotiate,
            &challenge,
            identity,
            rand::random(),
            filetime_now(),
        )?;
        let resp = channel.call(
            wire::SESSION_SETUP,
            0,
            session_id,
            &wire::session_setup_request(&auth.message),
        )?;
        if resp.status != wire::STATUS_SUCCESS {
            return Err(wire::status_error("SESSION_SETUP", resp.status, &channel.host));
        }

        let (flags, _) = wire::session_setup_response(&resp)?;
        let unsigned = flags & (wire::SESSION_IS_GUEST | wire::SESSION_IS_NULL) != 0;
        if channel.signing_required {
            let key = match (auth.session_key, unsigned) {
                (Some(key), false) => key,
                _ => {
                    return Err(ReaderError::auth(format!(
                        "{} requires signing, which a guest or anonymous session cannot do",
                        channel.host
                    )))
                }
            };
            if resp.flags & wire::FLAG_SIGNED != 0 && !resp.verify(&key)? {
                return Err(ReaderError::auth("SMB2 session setup signature does not verify"));
            }
            channel.signing_key = Some(key);
        }
        debug!(
            host = %channel.host,
            user = %credentials.username,
            session_id,
            signed = channel.signing_key.is_some(),
            "SMB2 session established"
        );

        Ok(Box::new(NativeSession {
            channel: Arc::clone(&self.channel),
            session_id,
        }))
    }

    fn close(self: Box<Self>) -> ReaderResult<()> {
        lock(&self.channel)
            .stream
            .shutdown(Shutdown::Both)
            .map_err(|e| ReaderError::from_io("closing SMB2 connection", e))
    }

    fn interrupt_handle(&self) -> Option<TcpStream> {
        lock(&self.channel).stream.try_clone().ok()
    }
}

struct NativeSession {
    channel: SharedChannel,
    session_id: u64,
}

impl SmbSession for NativeSession {
    fn connect_share(&mut self, share: &str) -> ReaderResult<Box<dyn SmbShare>> {
        let mut channel = lock(&self.channel);
        let body = wire::tree_connect_request(&channel.host, share);
        let resp = channel.call(wire::TREE_CONNECT, 0, self.session_id, &body)?;
        if resp.status != wire::STATUS_SUCCESS {
            let unc = format!(r"\\{}\{share}", channel.host);
            return Err(wire::status_error("TREE_CONNECT", resp.status, &unc));
        }
        debug!(share, tree_id = resp.tree_id, "SMB2 tree connected");
        Ok(Box::new(NativeShare {
            channel: Arc::clone(&self.channel),
            session_id: self.session_id,
            tree_id: resp.tree_id,
            share: share.to_string(),
        }))
    }

    fn logoff(self: Box<Self>) -> ReaderResult<()> {
        let resp = lock(&self.channel).call(wire::LOGOFF, 0, self.session_id, &wire::empty_request())?;
        expect_success("LOGOFF", &resp)
    }
}

fn expect_success(command: &str, resp: &Response) -> ReaderResult<()> {
    match resp.status {
        wire::STATUS_SUCCESS => Ok(()),
        status => Err(ReaderError::protocol(format!(
            "{command} failed: status 0x{status:08x}"
        ))),
    }
}

struct NativeShare {
    channel: SharedChannel,
    session_id: u64,
    tree_id: u32,
    share: String,
}

impl NativeShare {
    fn create(&self, channel: &mut Channel, path: &str) -> ReaderResult<(FileId, u64)> {
        let resp = channel.call(wire::CREATE, self.tree_id, self.session_id, &wire::create_request(path))?;
        if resp.status != wire::STATUS_SUCCESS {
            let what = format!("{}/{path}", self.share);
            return Err(wire::status_error("CREATE", resp.status, &what));
        }
        wire::create_response(&resp)
    }
}

impl SmbShare for NativeShare {
    fn file_size(&mut self, path: &str) -> ReaderResult<u64> {
        let mut channel = lock(&self.channel);
        let (id, size) = self.create(&mut channel, path)?;
        let resp = channel.call(wire::CLOSE, self.tree_id, self.session_id, &wire::close_request(&id))?;
        expect_success("CLOSE", &resp)?;
        Ok(size)
    }

    fn open_file(&mut self, path: &str) -> ReaderResult<Box<dyn SmbFile>> {
        let mut channel = lock(&self.channel);
        let (id, size) = self.create(&mut channel, path)?;
        debug!(path, size, "SMB2 file opened");
        Ok(Box::new(NativeFile {
            channel: Arc::clone(&self.channel),
            session_id: self.session_id,
            tree_id: self.tree_id,
            id,
            offset: 0,
        }))
    }

    fn disconnect(self: Box<Self>) -> ReaderResult<()> {
        let resp = lock(&self.channel).call(
            wire::TREE_DISCONNECT,
            self.tree_id,
            self.session_id,
            &wire::empty_request(),
        )?;
        expect_success("TREE_DISCONNECT", &resp)
    }
}

/// An open file read sequentially from `offset`.
struct NativeFile {
    channel: SharedChannel,
    session_id: u64,
    tree_id: u32,
    id: FileId,
    offset: u64,
}

impl SmbFile for NativeFile {
    /// Forward skips are discarded reads, so reaching an offset costs as
    /// much as reading up to it.
    fn skip(&mut self, n: u64) -> ReaderResult<u64> {
        let max_read = lock(&self.channel).max_read;
        let mut scratch = vec![0u8; n.min(u64::from(max_read)) as usize];
        Ok(self.read(&mut scratch)? as u64)
    }

    fn read(&mut self, buf: &mut [u8]) -> ReaderResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut channel = lock(&self.channel);
        let len = buf.len().min(channel.max_read as usize);
        let body = wire::read_request(&self.id, self.offset, len as u32);
        let resp = channel.call(wire::READ, self.tree_id, self.session_id, &body)?;
        match resp.status {
            wire::STATUS_END_OF_FILE => Ok(0),
            wire::STATUS_SUCCESS => {
                let data = wire::read_response(&resp)?;
                let n = data.len().min(len);
                buf[..n].copy_from_slice(&data[..n]);
                self.offset += n as u64;
                Ok(n)
            }
            status => Err(ReaderError::protocol(format!(
                "READ at {} failed: status 0x{status:08x}",
                self.offset
            ))),
        }
    }

    fn close(self: Box<Self>) -> ReaderResult<()> {
        let resp = lock(&self.channel).call(
            wire::CLOSE,
            self.tree_id,
            self.session_id,
            &wire::close_request(&self.id),
        )?;
        expect_success("CLOSE", &resp)
    }
}
