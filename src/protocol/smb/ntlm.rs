//! NTLMv2 authentication (MS-NLMP) as carried in SMB2 `SESSION_SETUP`.
//!
//! Only the three-message exchange is implemented, without key exchange, so
//! the exported session key is the NTLMv2 session base key.

use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;

use crate::error::{ReaderError, ReaderResult};

type HmacMd5 = Hmac<Md5>;

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";
const NEGOTIATE: u32 = 1;
const CHALLENGE: u32 = 2;
const AUTHENTICATE: u32 = 3;

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_SIGN: u32 = 0x0000_0010;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ANONYMOUS: u32 = 0x0000_0800;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SESSION_SECURITY: u32 = 0x0008_0000;
const NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
const NEGOTIATE_VERSION: u32 = 0x0200_0000;
const NEGOTIATE_128: u32 = 0x2000_0000;
const NEGOTIATE_56: u32 = 0x8000_0000;

const CLIENT_FLAGS: u32 = NEGOTIATE_UNICODE
    | REQUEST_TARGET
    | NEGOTIATE_SIGN
    | NEGOTIATE_NTLM
    | NEGOTIATE_ALWAYS_SIGN
    | NEGOTIATE_EXTENDED_SESSION_SECURITY
    | NEGOTIATE_TARGET_INFO
    | NEGOTIATE_VERSION
    | NEGOTIATE_128
    | NEGOTIATE_56;

/// Windows 6.1 build 7601, NTLM revision 15.
const VERSION: [u8; 8] = [6, 1, 0xb1, 0x1d, 0, 0, 0, 15];

const AV_EOL: u16 = 0;
const AV_FLAGS: u16 = 6;
const AV_TIMESTAMP: u16 = 7;
const AV_FLAG_MIC_PRESENT: u32 = 0x2;

const MIC_OFFSET: usize = 72;
const AUTHENTICATE_HEADER: usize = 88;

pub fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

pub fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> ReaderResult<[u8; 16]> {
    let mut mac = HmacMd5::new_from_slice(key)
        .map_err(|e| ReaderError::protocol(format!("HMAC-MD5 key: {e}")))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// `NTOWFv2`: the NTLMv2 response key for `user` in `domain`.
pub fn ntowf_v2(user: &str, password: &str, domain: &str) -> ReaderResult<[u8; 16]> {
    let nt_hash = Md4::digest(utf16le(password));
    let identity = utf16le(&format!("{}{domain}", user.to_uppercase()));
    hmac_md5(&nt_hash, &[&identity])
}

fn u16_at(buf: &[u8], at: usize) -> ReaderResult<u16> {
    buf.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| ReaderError::protocol("truncated NTLM message"))
}

fn u32_at(buf: &[u8], at: usize) -> ReaderResult<u32> {
    buf.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| ReaderError::protocol("truncated NTLM message"))
}

/// Type 1 message.
pub fn negotiate_message() -> Vec<u8> {
    let mut msg = Vec::with_capacity(40);
    msg.extend_from_slice(SIGNATURE);
    msg.extend_from_slice(&NEGOTIATE.to_le_bytes());
    msg.extend_from_slice(&CLIENT_FLAGS.to_le_bytes());
    msg.extend_from_slice(&[0u8; 16]); // domain and workstation fields
    msg.extend_from_slice(&VERSION);
    msg
}

/// The server's type 2 message.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub flags: u32,
    pub server_challenge: [u8; 8],
    pub target_info: Vec<u8>,
    /// The message as received; part of the MIC input.
    pub raw: Vec<u8>,
}

impl Challenge {
    /// Parse a type 2 message, raw or wrapped in SPNEGO.
    pub fn parse(token: &[u8]) -> ReaderResult<Self> {
        let start = token
            .windows(SIGNATURE.len())
            .position(|w| w == SIGNATURE)
            .ok_or_else(|| ReaderError::protocol("no NTLMSSP challenge in security blob"))?;
        let msg = &token[start..];
        if u32_at(msg, 8)? != CHALLENGE {
            return Err(ReaderError::protocol("expected an NTLM challenge message"));
        }
        let flags = u32_at(msg, 20)?;
        let mut server_challenge = [0u8; 8];
        server_challenge.copy_from_slice(
            msg.get(24..32)
                .ok_or_else(|| ReaderError::protocol("truncated NTLM challenge"))?,
        );
        let info_len = usize::from(u16_at(msg, 40)?);
        let info_offset = u32_at(msg, 44)? as usize;
        let target_info = if info_len == 0 {
            Vec::new()
        } else {
            msg.get(info_offset..info_offset + info_len)
                .ok_or_else(|| ReaderError::protocol("NTLM target info out of bounds"))?
                .to_vec()
        };
        Ok(Self {
            flags,
            server_challenge,
            target_info,
            raw: msg.to_vec(),
        })
    }

    fn av_pairs(&self) -> Vec<(u16, &[u8])> {
        let mut pairs = Vec::new();
        let mut at = 0;
        while let (Some(id), Some(len)) = (
            self.target_info.get(at..at + 2),
            self.target_info.get(at + 2..at + 4),
        ) {
            let id = u16::from_le_bytes([id[0], id[1]]);
            let len = usize::from(u16::from_le_bytes([len[0], len[1]]));
            if id == AV_EOL {
                break;
            }
            let Some(value) = self.target_info.get(at + 4..at + 4 + len) else {
                break;
            };
            pairs.push((id, value));
            at += 4 + len;
        }
        pairs
    }

    /// Server time from `MsvAvTimestamp`, if sent.
    pub fn timestamp(&self) -> Option<u64> {
        self.av_pairs()
            .into_iter()
            .find(|(id, v)| *id == AV_TIMESTAMP && v.len() == 8)
            .map(|(_, v)| u64::from_le_bytes([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]]))
    }

    /// Target info echoed in the response, flagging that a MIC follows.
    fn response_target_info(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.target_info.len() + 8);
        let mut flagged = false;
        for (id, value) in self.av_pairs() {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&(value.len() as u16).to_le_bytes());
            if id == AV_FLAGS && value.len() == 4 {
                let flags = u32::from_le_bytes([value[0], value[1], value[2], value[3]]);
                out.extend_from_slice(&(flags | AV_FLAG_MIC_PRESENT).to_le_bytes());
                flagged = true;
            } else {
                out.extend_from_slice(value);
            }
        }
        if !flagged {
            out.extend_from_slice(&AV_FLAGS.to_le_bytes());
            out.extend_from_slice(&4u16.to_le_bytes());
            out.extend_from_slice(&AV_FLAG_MIC_PRESENT.to_le_bytes());
        }
        out.extend_from_slice(&[0u8; 4]); // MsvAvEOL
        out
    }
}

/// Who is authenticating; an empty user means anonymous.
#[derive(Clone, Copy)]
pub struct Identity<'a> {
    pub user: &'a str,
    pub password: &'a str,
    pub domain: &'a str,
    pub workstation: &'a str,
}

/// The type 3 message and the key that signs the session.
#[derive(Debug, Clone)]
pub struct Authentication {
    pub message: Vec<u8>,
    /// `None` for an anonymous logon.
    pub session_key: Option<[u8; 16]>,
}

/// `temp` from the NTLMv2 response computation.
fn client_blob(timestamp: u64, client_challenge: &[u8; 8], target_info: &[u8]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(32 + target_info.len());
    blob.extend_from_slice(&[1, 1, 0, 0, 0, 0, 0, 0]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(client_challenge);
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(target_info);
    blob.extend_from_slice(&[0u8; 4]);
    blob
}

/// `NTProofStr` and the session base key for one response blob.
pub fn nt_proof(
    response_key: &[u8; 16],
    server_challenge: &[u8; 8],
    blob: &[u8],
) -> ReaderResult<([u8; 16], [u8; 16])> {
    let proof = hmac_md5(response_key, &[server_challenge, blob])?;
    let session_key = hmac_md5(response_key, &[&proof])?;
    Ok((proof, session_key))
}

/// Build the type 3 message answering `challenge`.
///
/// `now` is the client time as a FILETIME, used when the server sends none.
pub fn authenticate(
    negotiate: &[u8],
    challenge: &Challenge,
    identity: Identity<'_>,
    client_challenge: [u8; 8],
    now: u64,
) -> ReaderResult<Authentication> {
    let mut flags = challenge.flags & CLIENT_FLAGS;
    let anonymous = identity.user.is_empty();

    let (lm, nt, session_key, with_mic) = if anonymous {
        flags |= NEGOTIATE_ANONYMOUS;
        (vec![0u8], Vec::new(), None, false)
    } else {
        let key = ntowf_v2(identity.user, identity.password, identity.domain)?;
        let server_time = challenge.timestamp();
        let target_info = match server_time {
            Some(_) => challenge.response_target_info(),
            None => challenge.target_info.clone(),
        };
        let blob = client_blob(server_time.unwrap_or(now), &client_challenge, &target_info);
        let (proof, session_key) = nt_proof(&key, &challenge.server_challenge, &blob)?;

        let mut nt = proof.to_vec();
        nt.extend_from_slice(&blob);
        let lm = match server_time {
            Some(_) => vec![0u8; 24],
            None => {
                let mut lm = hmac_md5(&key, &[&challenge.server_challenge, &client_challenge])?.to_vec();
                lm.extend_from_slice(&client_challenge);
                lm
            }
        };
        (lm, nt, Some(session_key), server_time.is_some())
    };

    let domain = utf16le(identity.domain);
    let user = utf16le(identity.user);
    let workstation = utf16le(identity.workstation);

    let mut msg = Vec::with_capacity(AUTHENTICATE_HEADER + lm.len() + nt.len() + 64);
    msg.extend_from_slice(SIGNATURE);
    msg.extend_from_slice(&AUTHENTICATE.to_le_bytes());
    msg.resize(AUTHENTICATE_HEADER, 0);

    let mut payload = Vec::new();
    let mut field = |msg: &mut Vec<u8>, at: usize, data: &[u8]| {
        let offset = (AUTHENTICATE_HEADER + payload.len()) as u32;
        msg[at..at + 2].copy_from_slice(&(data.len() as u16).to_le_bytes());
        msg[at + 2..at + 4].copy_from_slice(&(data.len() as u16).to_le_bytes());
        msg[at + 4..at + 8].copy_from_slice(&offset.to_le_bytes());
        payload.extend_from_slice(data);
    };
    field(&mut msg, 28, &domain);
    field(&mut msg, 36, &user);
    field(&mut msg, 44, &workstation);
    field(&mut msg, 12, &lm);
    field(&mut msg, 20, &nt);
    field(&mut msg, 52, &[]);
    msg[60..64].copy_from_slice(&flags.to_le_bytes());
    msg[64..72].copy_from_slice(&VERSION);
    msg.extend_from_slice(&payload);

    if let (true, Some(key)) = (with_mic, session_key) {
        let mic = hmac_md5(&key, &[negotiate, &challenge.raw, &msg])?;
        msg[MIC_OFFSET..MIC_OFFSET + 16].copy_from_slice(&mic);
    }

    Ok(Authentication {
        message: msg,
        session_key,
    })
}

/// Pieces of a type 3 message a server needs to verify it.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateFields {
    pub user: String,
    pub domain: String,
    pub nt_response: Vec<u8>,
}

#[cfg(test)]
impl AuthenticateFields {
    pub fn parse(msg: &[u8]) -> ReaderResult<Self> {
        let start = msg
            .windows(SIGNATURE.len())
            .position(|w| w == SIGNATURE)
            .ok_or_else(|| ReaderError::protocol("no NTLMSSP message"))?;
        let msg = &msg[start..];
        if u32_at(msg, 8)? != AUTHENTICATE {
            return Err(ReaderError::protocol("expected an NTLM authenticate message"));
        }
        let field = |at: usize| -> ReaderResult<&[u8]> {
            let len = usize::from(u16_at(msg, at)?);
            let offset = u32_at(msg, at + 4)? as usize;
            msg.get(offset..offset + len)
                .ok_or_else(|| ReaderError::protocol("NTLM field out of bounds"))
        };
        let text = |bytes: &[u8]| {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        };
        Ok(Self {
            user: text(field(36)?),
            domain: text(field(28)?),
            nt_response: field(20)?.to_vec(),
        })
    }
}
