//! ONC-RPC v2 (RFC 5531) calls over TCP with record marking.

use std::io::{Read, Write};
use std::net::TcpStream;

use tracing::trace;

use super::xdr::{XdrReader, XdrWriter};
use crate::error::{ReaderError, ReaderResult};

const RPC_VERSION: u32 = 2;
const MSG_CALL: u32 = 0;
const MSG_REPLY: u32 = 1;
const MSG_ACCEPTED: u32 = 0;
const MSG_DENIED: u32 = 1;

const AUTH_NONE: u32 = 0;
const AUTH_UNIX: u32 = 1;

const LAST_FRAGMENT: u32 = 0x8000_0000;
/// Upper bound on one reply record; a READ reply carries at most a few MiB.
const MAX_RECORD: usize = 64 * 1024 * 1024;

/// Credential sent with every call.
#[derive(Debug, Clone)]
pub enum Credential {
    None,
    Unix {
        machine_name: String,
        uid: u32,
        gid: u32,
    },
}

impl Credential {
    fn encode(&self, w: &mut XdrWriter) {
        match self {
            Credential::None => {
                w.put_u32(AUTH_NONE).put_opaque(&[]);
            }
            Credential::Unix {
                machine_name,
                uid,
                gid,
            } => {
                let mut body = XdrWriter::new();
                body.put_u32(0) // stamp
                    .put_string(machine_name)
                    .put_u32(*uid)
                    .put_u32(*gid)
                    .put_u32(0); // no auxiliary gids
                w.put_u32(AUTH_UNIX).put_opaque(&body.into_bytes());
            }
        }
    }
}

/// One TCP connection to an RPC program.
#[derive(Debug)]
pub struct RpcClient {
    stream: TcpStream,
    credential: Credential,
    next_xid: u32,
}

impl RpcClient {
    pub fn new(stream: TcpStream, credential: Credential) -> Self {
        // Any start value works; vary it so replies to an earlier
        // connection are never mistaken for ours.
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(1, |d| d.subsec_nanos());
        Self {
            stream,
            credential,
            next_xid: seed,
        }
    }

    pub fn interrupt_handle(&self) -> Option<TcpStream> {
        self.stream.try_clone().ok()
    }

    /// Call `program.version.procedure` and return the procedure's result bytes.
    pub fn call(&mut self, program: u32, version: u32, procedure: u32, args: &[u8]) -> ReaderResult<Vec<u8>> {
        let xid = self.next_xid;
        self.next_xid = self.next_xid.wrapping_add(1);

        let mut w = XdrWriter::new();
        w.put_u32(xid)
            .put_u32(MSG_CALL)
            .put_u32(RPC_VERSION)
            .put_u32(program)
            .put_u32(version)
            .put_u32(procedure);
        self.credential.encode(&mut w);
        w.put_u32(AUTH_NONE).put_opaque(&[]);
        w.put_raw(args);
        trace!(xid, program, version, procedure, bytes = w.len(), "RPC call");
        self.send_record(&w.into_bytes())?;

        loop {
            let record = self.recv_record()?;
            let mut r = XdrReader::new(&record);
            let reply_xid = r.get_u32()?;
            if reply_xid != xid {
                trace!(expected = xid, got = reply_xid, "discarding stale RPC reply");
                continue;
            }
            if r.get_u32()? != MSG_REPLY {
                return Err(ReaderError::protocol("RPC message is not a reply"));
            }
            accept(&mut r, program, procedure)?;
            return Ok(r.remaining().to_vec());
        }
    }

    fn send_record(&mut self, payload: &[u8]) -> ReaderResult<()> {
        let header = LAST_FRAGMENT | payload.len() as u32;
        let mut record = Vec::with_capacity(payload.len() + 4);
        record.extend_from_slice(&header.to_be_bytes());
        record.extend_from_slice(payload);
        self.stream
            .write_all(&record)
            .map_err(|e| ReaderError::from_io("sending RPC call", e))
    }

    fn recv_record(&mut self) -> ReaderResult<Vec<u8>> {
        let mut record = Vec::new();
        loop {
            let mut header = [0u8; 4];
            self.read_exact(&mut header)?;
            let header = u32::from_be_bytes(header);
            let len = (header & !LAST_FRAGMENT) as usize;
            if record.len() + len > MAX_RECORD {
                return Err(ReaderError::protocol(format!(
                    "RPC record exceeds {MAX_RECORD} bytes"
                )));
            }
            let start = record.len();
            record.resize(start + len, 0);
            self.read_exact(&mut record[start..])?;
            if header & LAST_FRAGMENT != 0 {
                return Ok(record);
            }
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> ReaderResult<()> {
        self.stream
            .read_exact(buf)
            .map_err(|e| ReaderError::from_io("RPC connection", e))
    }
}

/// Check the reply header up to the start of the procedure results.
fn accept(r: &mut XdrReader<'_>, program: u32, procedure: u32) -> ReaderResult<()> {
    match r.get_u32()? {
        MSG_ACCEPTED => {
            r.get_u32()?; // verifier flavor
            r.get_opaque(400)?;
            match r.get_u32()? {
                0 => Ok(()),
                1 => Err(ReaderError::protocol(format!("RPC program {program} unavailable"))),
                2 => {
                    let low = r.get_u32()?;
                    let high = r.get_u32()?;
                    Err(ReaderError::protocol(format!(
                        "RPC program {program} supports versions {low}..={high} only"
                    )))
                }
                3 => Err(ReaderError::protocol(format!(
                    "RPC procedure {procedure} of program {program} unavailable"
                ))),
                4 => Err(ReaderError::protocol("RPC server could not decode arguments")),
                other => Err(ReaderError::protocol(format!("RPC call failed with accept status {other}"))),
            }
        }
        MSG_DENIED => match r.get_u32()? {
            0 => Err(ReaderError::protocol("RPC version mismatch")),
            _ => {
                let stat = r.get_u32().unwrap_or(0);
                Err(ReaderError::auth(format!("RPC credentials rejected (auth_stat {stat})")))
            }
        },
        other => Err(ReaderError::protocol(format!("invalid RPC reply status {other}"))),
    }
}
