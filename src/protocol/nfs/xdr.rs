//! XDR encoding (RFC 4506), the subset ONC-RPC and NFSv3 need.

use crate::error::{ReaderError, ReaderResult};

fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

#[derive(Debug, Default, Clone)]
pub struct XdrWriter {
    buf: Vec<u8>,
}

impl XdrWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Variable-length opaque: length, bytes, zero padding to 4.
    pub fn put_opaque(&mut self, data: &[u8]) -> &mut Self {
        self.put_u32(data.len() as u32);
        self.buf.extend_from_slice(data);
        self.buf.extend(std::iter::repeat_n(0, padding(data.len())));
        self
    }

    pub fn put_string(&mut self, s: &str) -> &mut Self {
        self.put_opaque(s.as_bytes())
    }

    pub fn put_raw(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug, Clone)]
pub struct XdrReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> XdrReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> ReaderResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                ReaderError::protocol(format!(
                    "truncated XDR data: need {n} bytes at {} of {}",
                    self.pos,
                    self.buf.len()
                ))
            })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn get_u32(&mut self) -> ReaderResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64(&mut self) -> ReaderResult<u64> {
        let hi = u64::from(self.get_u32()?);
        let lo = u64::from(self.get_u32()?);
        Ok(hi << 32 | lo)
    }

    pub fn get_bool(&mut self) -> ReaderResult<bool> {
        match self.get_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ReaderError::protocol(format!("invalid XDR bool {other}"))),
        }
    }

    /// Variable-length opaque of at most `max` bytes.
    pub fn get_opaque(&mut self, max: usize) -> ReaderResult<&'a [u8]> {
        let len = self.get_u32()? as usize;
        if len > max {
            return Err(ReaderError::protocol(format!(
                "XDR opaque of {len} bytes exceeds limit {max}"
            )));
        }
        let data = self.take(len)?;
        self.take(padding(len))?;
        Ok(data)
    }

    pub fn skip(&mut self, n: usize) -> ReaderResult<()> {
        self.take(n).map(|_| ())
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}
