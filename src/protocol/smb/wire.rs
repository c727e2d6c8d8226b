//! SMB2 message layout: direct-TCP framing, the 64-byte header, and the
//! request bodies the reader sends.

use std::io::{Read, Write};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{ReaderError, ReaderResult};

use super::ntlm::utf16le;

pub const HEADER_LEN: usize = 64;
const PROTOCOL_ID: [u8; 4] = [0xfe, b'S', b'M', b'B'];
/// Direct TCP frames carry a 24-bit length.
const MAX_FRAME: usize = 0x00ff_ffff;

pub const NEGOTIATE: u16 = 0x0000;
pub const SESSION_SETUP: u16 = 0x0001;
pub const LOGOFF: u16 = 0x0002;
pub const TREE_CONNECT: u16 = 0x0003;
pub const TREE_DISCONNECT: u16 = 0x0004;
pub const CREATE: u16 = 0x0005;
pub const CLOSE: u16 = 0x0006;
pub const READ: u16 = 0x0008;

pub const DIALECT_202: u16 = 0x0202;
pub const DIALECT_210: u16 = 0x0210;

pub const FLAG_RESPONSE: u32 = 0x0000_0001;
pub const FLAG_ASYNC: u32 = 0x0000_0002;
pub const FLAG_SIGNED: u32 = 0x0000_0008;

pub const SIGNING_ENABLED: u16 = 0x0001;
pub const SIGNING_REQUIRED: u16 = 0x0002;

pub const SESSION_IS_GUEST: u16 = 0x0001;
pub const SESSION_IS_NULL: u16 = 0x0002;

pub const STATUS_SUCCESS: u32 = 0x0000_0000;
pub const STATUS_PENDING: u32 = 0x0000_0103;
pub const STATUS_MORE_PROCESSING_REQUIRED: u32 = 0xc000_0016;
pub const STATUS_END_OF_FILE: u32 = 0xc000_0011;

/// Access for reading data and attributes plus SYNCHRONIZE.
const READ_ACCESS: u32 = 0x0012_0089;
const SHARE_ALL: u32 = 0x0000_0007;
const FILE_OPEN: u32 = 0x0000_0001;
const FILE_NON_DIRECTORY: u32 = 0x0000_0040;
const IMPERSONATION: u32 = 0x0000_0002;

pub type FileId = [u8; 16];

pub fn u16_at(buf: &[u8], at: usize) -> ReaderResult<u16> {
    buf.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| ReaderError::protocol("truncated SMB2 message"))
}

pub fn u32_at(buf: &[u8], at: usize) -> ReaderResult<u32> {
    buf.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| ReaderError::protocol("truncated SMB2 message"))
}

pub fn u64_at(buf: &[u8], at: usize) -> ReaderResult<u64> {
    buf.get(at..at + 8)
        .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .ok_or_else(|| ReaderError::protocol("truncated SMB2 message"))
}

/// Header fields the client fills in per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestHeader {
    pub command: u16,
    pub message_id: u64,
    pub tree_id: u32,
    pub session_id: u64,
}

/// Header plus `body`, ready for signing and framing.
pub fn request(header: RequestHeader, body: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(HEADER_LEN + body.len());
    msg.extend_from_slice(&PROTOCOL_ID);
    msg.extend_from_slice(&(HEADER_LEN as u16).to_le_bytes());
    msg.extend_from_slice(&0u16.to_le_bytes()); // credit charge, single-credit requests only
    msg.extend_from_slice(&0u32.to_le_bytes()); // status
    msg.extend_from_slice(&header.command.to_le_bytes());
    msg.extend_from_slice(&64u16.to_le_bytes()); // credits requested
    msg.extend_from_slice(&0u32.to_le_bytes()); // flags
    msg.extend_from_slice(&0u32.to_le_bytes()); // next command
    msg.extend_from_slice(&header.message_id.to_le_bytes());
    msg.extend_from_slice(&0u32.to_le_bytes()); // process id
    msg.extend_from_slice(&header.tree_id.to_le_bytes());
    msg.extend_from_slice(&header.session_id.to_le_bytes());
    msg.extend_from_slice(&[0u8; 16]); // signature
    msg.extend_from_slice(body);
    msg
}

/// HMAC-SHA256 signature of `msg` with its signature field zeroed.
pub fn signature(key: &[u8], msg: &[u8]) -> ReaderResult<[u8; 16]> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| ReaderError::protocol(format!("signing key: {e}")))?;
    mac.update(msg.get(..48).unwrap_or(msg));
    mac.update(&[0u8; 16]);
    mac.update(msg.get(HEADER_LEN..).unwrap_or(&[]));
    let mut out = [0u8; 16];
    out.copy_from_slice(&mac.finalize().into_bytes()[..16]);
    Ok(out)
}

/// Set the signed flag and write the signature into the header.
pub fn sign(key: &[u8], msg: &mut [u8]) -> ReaderResult<()> {
    if msg.len() < HEADER_LEN {
        return Err(ReaderError::protocol("SMB2 message shorter than its header"));
    }
    let flags = u32_at(msg, 16)? | FLAG_SIGNED;
    msg[16..20].copy_from_slice(&flags.to_le_bytes());
    let sig = signature(key, msg)?;
    msg[48..64].copy_from_slice(&sig);
    Ok(())
}

pub fn write_frame(stream: &mut impl Write, msg: &[u8]) -> std::io::Result<()> {
    if msg.len() > MAX_FRAME {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "SMB2 message too large for one frame",
        ));
    }
    let len = (msg.len() as u32).to_be_bytes();
    let mut frame = Vec::with_capacity(4 + msg.len());
    frame.extend_from_slice(&len);
    frame.extend_from_slice(msg);
    stream.write_all(&frame)?;
    stream.flush()
}

pub fn read_frame(stream: &mut impl Read) -> std::io::Result<Vec<u8>> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len)?;
    let len = u32::from_be_bytes([0, len[1], len[2], len[3]]) as usize;
    let mut msg = vec![0u8; len];
    stream.read_exact(&mut msg)?;
    Ok(msg)
}

/// A received message. Body offsets in SMB2 count from the header start,
/// so the whole message is kept.
#[derive(Debug, Clone)]
pub struct Response {
    pub command: u16,
    pub status: u32,
    pub flags: u32,
    pub message_id: u64,
    pub tree_id: u32,
    pub session_id: u64,
    pub raw: Vec<u8>,
}

impl Response {
    pub fn parse(raw: Vec<u8>) -> ReaderResult<Self> {
        if raw.len() < HEADER_LEN || raw[..4] != PROTOCOL_ID {
            return Err(ReaderError::protocol("not an SMB2 message"));
        }
        let flags = u32_at(&raw, 16)?;
        Ok(Self {
            command: u16_at(&raw, 12)?,
            status: u32_at(&raw, 8)?,
            flags,
            message_id: u64_at(&raw, 24)?,
            // Async responses carry an async id where the tree id would be.
            tree_id: if flags & FLAG_ASYNC == 0 { u32_at(&raw, 36)? } else { 0 },
            session_id: u64_at(&raw, 40)?,
            raw,
        })
    }

    pub fn body(&self) -> &[u8] {
        &self.raw[HEADER_LEN..]
    }

    pub fn is_interim(&self) -> bool {
        self.status == STATUS_PENDING && self.flags & FLAG_ASYNC != 0
    }

    /// `len` bytes at `offset` from the header start.
    pub fn slice(&self, offset: usize, len: usize) -> ReaderResult<&[u8]> {
        self.raw
            .get(offset..offset + len)
            .ok_or_else(|| ReaderError::protocol("SMB2 buffer out of bounds"))
    }

    pub fn verify(&self, key: &[u8]) -> ReaderResult<bool> {
        Ok(self.raw[48..64] == signature(key, &self.raw)?)
    }
}

pub fn negotiate_request(client_guid: [u8; 16]) -> Vec<u8> {
    let dialects = [DIALECT_202, DIALECT_210];
    let mut body = Vec::with_capacity(36 + 2 * dialects.len());
    body.extend_from_slice(&36u16.to_le_bytes());
    body.extend_from_slice(&(dialects.len() as u16).to_le_bytes());
    body.extend_from_slice(&SIGNING_ENABLED.to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes()); // capabilities
    body.extend_from_slice(&client_guid);
    body.extend_from_slice(&0u64.to_le_bytes()); // client start time
    for dialect in dialects {
        body.extend_from_slice(&dialect.to_le_bytes());
    }
    body
}

#[derive(Debug, Clone)]
pub struct Negotiated {
    pub dialect: u16,
    pub signing_required: bool,
    pub max_read: u32,
}

impl Negotiated {
    pub fn parse(resp: &Response) -> ReaderResult<Self> {
        let body = resp.body();
        Ok(Self {
            dialect: u16_at(body, 4)?,
            signing_required: u16_at(body, 2)? & SIGNING_REQUIRED != 0,
            max_read: u32_at(body, 32)?,
        })
    }
}

pub fn session_setup_request(token: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(24 + token.len());
    body.extend_from_slice(&25u16.to_le_bytes());
    body.push(0); // flags
    body.push(SIGNING_ENABLED as u8);
    body.extend_from_slice(&0u32.to_le_bytes()); // capabilities
    body.extend_from_slice(&0u32.to_le_bytes()); // channel
    body.extend_from_slice(&((HEADER_LEN + 24) as u16).to_le_bytes());
    body.extend_from_slice(&(token.len() as u16).to_le_bytes());
    body.extend_from_slice(&0u64.to_le_bytes()); // previous session
    body.extend_from_slice(token);
    body
}

/// Session flags and security blob of a `SESSION_SETUP` response.
pub fn session_setup_response(resp: &Response) -> ReaderResult<(u16, &[u8])> {
    let body = resp.body();
    let flags = u16_at(body, 2)?;
    let offset = usize::from(u16_at(body, 4)?);
    let len = usize::from(u16_at(body, 6)?);
    let token = if len == 0 { &[][..] } else { resp.slice(offset, len)? };
    Ok((flags, token))
}

pub fn tree_connect_request(host: &str, share: &str) -> Vec<u8> {
    let path = utf16le(&format!(r"\\{host}\{share}"));
    let mut body = Vec::with_capacity(8 + path.len());
    body.extend_from_slice(&9u16.to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes());
    body.extend_from_slice(&((HEADER_LEN + 8) as u16).to_le_bytes());
    body.extend_from_slice(&(path.len() as u16).to_le_bytes());
    body.extend_from_slice(&path);
    body
}

/// `CREATE` opening an existing file for reading. `path` uses `/` separators.
pub fn create_request(path: &str) -> Vec<u8> {
    let name = utf16le(&path.replace('/', "\\"));
    let mut body = Vec::with_capacity(56 + name.len().max(1));
    body.extend_from_slice(&57u16.to_le_bytes());
    body.push(0); // security flags
    body.push(0); // oplock level
    body.extend_from_slice(&IMPERSONATION.to_le_bytes());
    body.extend_from_slice(&[0u8; 16]); // create flags, reserved
    body.extend_from_slice(&READ_ACCESS.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes()); // file attributes
    body.extend_from_slice(&SHARE_ALL.to_le_bytes());
    body.extend_from_slice(&FILE_OPEN.to_le_bytes());
    body.extend_from_slice(&FILE_NON_DIRECTORY.to_le_bytes());
    body.extend_from_slice(&((HEADER_LEN + 56) as u16).to_le_bytes());
    body.extend_from_slice(&(name.len() as u16).to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes()); // contexts offset
    body.extend_from_slice(&0u32.to_le_bytes()); // contexts length
    if name.is_empty() {
        body.push(0);
    } else {
        body.extend_from_slice(&name);
    }
    body
}

/// File id and end-of-file position from a `CREATE` response.
pub fn create_response(resp: &Response) -> ReaderResult<(FileId, u64)> {
    let body = resp.body();
    let size = u64_at(body, 48)?;
    let mut id = [0u8; 16];
    id.copy_from_slice(
        body.get(64..80)
            .ok_or_else(|| ReaderError::protocol("truncated CREATE response"))?,
    );
    Ok((id, size))
}

pub fn close_request(file: &FileId) -> Vec<u8> {
    let mut body = Vec::with_capacity(24);
    body.extend_from_slice(&24u16.to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(file);
    body
}

pub fn read_request(file: &FileId, offset: u64, len: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(49);
    body.extend_from_slice(&49u16.to_le_bytes());
    body.push(0x50); // data offset hint
    body.push(0); // flags
    body.extend_from_slice(&len.to_le_bytes());
    body.extend_from_slice(&offset.to_le_bytes());
    body.extend_from_slice(file);
    body.extend_from_slice(&1u32.to_le_bytes()); // minimum count
    body.extend_from_slice(&0u32.to_le_bytes()); // channel
    body.extend_from_slice(&0u32.to_le_bytes()); // remaining
    body.extend_from_slice(&0u32.to_le_bytes()); // channel info
    body.push(0);
    body
}

/// Data carried by a `READ` response.
pub fn read_response(resp: &Response) -> ReaderResult<&[u8]> {
    let body = resp.body();
    let offset = usize::from(
        *body
            .get(2)
            .ok_or_else(|| ReaderError::protocol("truncated READ response"))?,
    );
    let len = u32_at(body, 4)? as usize;
    if len == 0 {
        return Ok(&[]);
    }
    resp.slice(offset, len)
}

/// Bodies of the four-byte requests (`LOGOFF`, `TREE_DISCONNECT`).
pub fn empty_request() -> Vec<u8> {
    let mut body = Vec::with_capacity(4);
    body.extend_from_slice(&4u16.to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes());
    body
}

/// Classify a failure status.
pub fn status_error(command: &str, status: u32, what: &str) -> ReaderError {
    match status {
        0xc000_006d | 0xc000_0022 | 0xc000_0072 | 0xc000_0071 | 0xc000_006e | 0xc000_006a
        | 0xc000_0064 => ReaderError::auth(format!("{command} rejected: status 0x{status:08x}")),
        0xc000_0034 | 0xc000_003a | 0xc000_000f | 0xc000_00cc => ReaderError::not_found(what),
        0xc000_00ba => ReaderError::protocol(format!("{what} is a directory")),
        _ => ReaderError::protocol(format!("{command} failed: status 0x{status:08x}")),
    }
}
