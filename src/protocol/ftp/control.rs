//! FTP control connection.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{ReaderError, ReaderResult};
use crate::protocol::{connect_addr, connect_tcp, is_local_network};

use super::listing::{ListEntry, parse_listing};

/// A reply on the control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    /// Reply text without the code, lines joined with `\n`.
    pub text: String,
}

impl Reply {
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// Transient (4xx) or permanent (5xx) negative reply.
    pub fn is_negative(&self) -> bool {
        self.code >= 400
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.text)
    }
}

/// Parse the first line of a reply into its code and whether more lines follow.
pub(crate) fn parse_reply_head(line: &str) -> Option<(u16, bool, &str)> {
    let code = line.get(..3)?;
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code = code.parse().ok()?;
    match line.as_bytes().get(3) {
        Some(b'-') => Some((code, true, &line[4..])),
        Some(b' ') => Some((code, false, &line[4..])),
        None => Some((code, false, "")),
        _ => None,
    }
}

/// Extract the data address from a `227` reply, e.g. `Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
pub(crate) fn parse_pasv(text: &str) -> Option<SocketAddrV4Parts> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let numbers: Vec<u8> = text[start..]
        .split(|c: char| !(c.is_ascii_digit() || c == ','))
        .next()?
        .split(',')
        .map(|n| n.parse().ok())
        .collect::<Option<_>>()?;
    if numbers.len() != 6 {
        return None;
    }
    Some(SocketAddrV4Parts {
        ip: Ipv4Addr::new(numbers[0], numbers[1], numbers[2], numbers[3]),
        port: u16::from(numbers[4]) << 8 | u16::from(numbers[5]),
    })
}

/// Extract the port from a `229` reply, e.g. `Entering Extended Passive Mode (|||6446|)`.
pub(crate) fn parse_epsv(text: &str) -> Option<u16> {
    let start = text.find("|||")? + 3;
    let end = text[start..].find('|')? + start;
    text[start..end].parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SocketAddrV4Parts {
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// An authenticated-or-not FTP control connection.
#[derive(Debug)]
pub struct FtpControl {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    peer: SocketAddr,
    connect_timeout: Duration,
    socket_timeout: Duration,
}

impl FtpControl {
    /// Connect and consume the greeting.
    pub fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        socket_timeout: Duration,
    ) -> ReaderResult<Self> {
        let stream = connect_tcp(host, port, connect_timeout, socket_timeout)?;
        let peer = stream
            .peer_addr()
            .map_err(|e| ReaderError::connection_with("FTP control socket has no peer", e))?;
        let reader = stream
            .try_clone()
            .map_err(|e| ReaderError::connection_with("cannot clone FTP control socket", e))?;

        let mut control = Self {
            reader: BufReader::new(reader),
            writer: stream,
            peer,
            connect_timeout,
            socket_timeout,
        };

        let mut greeting = control.read_reply()?;
        while greeting.code == 120 {
            greeting = control.read_reply()?;
        }
        if greeting.code != 220 {
            return Err(ReaderError::connection(format!(
                "FTP server at {peer} refused the session: {greeting}"
            )));
        }
        debug!(%peer, "FTP control connection established");
        Ok(control)
    }

    /// Handle that can shut the control socket down from another thread.
    pub fn interrupt_handle(&self) -> Option<TcpStream> {
        self.writer.try_clone().ok()
    }

    fn read_line(&mut self) -> ReaderResult<String> {
        let mut buf = Vec::new();
        let n = self
            .reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| ReaderError::from_io("reading FTP reply", e))?;
        if n == 0 {
            return Err(ReaderError::PeerClosedBenignly {
                context: "FTP control connection".into(),
            });
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Read one complete, possibly multi-line, reply.
    pub fn read_reply(&mut self) -> ReaderResult<Reply> {
        let first = self.read_line()?;
        let (code, mut more, text) = parse_reply_head(&first)
            .ok_or_else(|| ReaderError::protocol(format!("malformed FTP reply: {first:?}")))?;
        let mut text = text.to_string();

        while more {
            let line = self.read_line()?;
            match parse_reply_head(&line) {
                Some((c, false, last)) if c == code => {
                    text.push('\n');
                    text.push_str(last);
                    more = false;
                }
                _ => {
                    text.push('\n');
                    text.push_str(line.trim_start());
                }
            }
        }

        trace!("< {code} {text}");
        Ok(Reply { code, text })
    }

    fn send(&mut self, command: &str) -> ReaderResult<()> {
        if command.starts_with("PASS ") {
            trace!("> PASS ****");
        } else {
            trace!("> {command}");
        }
        self.writer
            .write_all(format!("{command}\r\n").as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|e| ReaderError::from_io("sending FTP command", e))
    }

    /// Send a command and read its reply.
    pub fn command(&mut self, command: &str) -> ReaderResult<Reply> {
        self.send(command)?;
        self.read_reply()
    }

    pub fn login(&mut self, user: &str, password: &str) -> ReaderResult<()> {
        let reply = self.command(&format!("USER {user}"))?;
        let reply = match reply.code {
            230 => return Ok(()),
            331 | 332 => self.command(&format!("PASS {password}"))?,
            _ => reply,
        };
        match reply.code {
            230 | 202 => Ok(()),
            530 | 332 => Err(ReaderError::auth(format!("FTP login as {user} rejected: {reply}"))),
            _ if reply.is_negative() => {
                Err(ReaderError::auth(format!("FTP login as {user} failed: {reply}")))
            }
            _ => Err(ReaderError::protocol(format!("unexpected FTP login reply: {reply}"))),
        }
    }

    /// Switch to binary transfers.
    pub fn set_binary(&mut self) -> ReaderResult<()> {
        let reply = self.command("TYPE I")?;
        if reply.is_completion() {
            Ok(())
        } else {
            Err(ReaderError::protocol(format!("TYPE I refused: {reply}")))
        }
    }

    /// Ask for UTF-8 path names. Servers that refuse are used as they are.
    pub fn enable_utf8(&mut self) -> ReaderResult<()> {
        let reply = self.command("OPTS UTF8 ON")?;
        if !reply.is_completion() {
            debug!("server declined UTF-8 mode: {reply}");
        }
        Ok(())
    }

    fn passive_address(&mut self) -> ReaderResult<SocketAddr> {
        if self.peer.is_ipv6() {
            let reply = self.command("EPSV")?;
            if reply.code != 229 {
                return Err(ReaderError::protocol(format!("EPSV refused: {reply}")));
            }
            let port = parse_epsv(&reply.text)
                .ok_or_else(|| ReaderError::protocol(format!("malformed EPSV reply: {reply}")))?;
            return Ok(SocketAddr::new(self.peer.ip(), port));
        }

        let reply = self.command("PASV")?;
        if reply.code != 227 {
            return Err(ReaderError::protocol(format!("PASV refused: {reply}")));
        }
        let parts = parse_pasv(&reply.text)
            .ok_or_else(|| ReaderError::protocol(format!("malformed PASV reply: {reply}")))?;
        // Servers behind NAT often advertise an address the client cannot reach.
        let ip = if parts.ip.is_unspecified()
            || (is_local_network(IpAddr::V4(parts.ip)) && !is_local_network(self.peer.ip()))
        {
            self.peer.ip()
        } else {
            IpAddr::V4(parts.ip)
        };
        Ok(SocketAddr::new(ip, parts.port))
    }

    fn open_data(&mut self) -> ReaderResult<TcpStream> {
        let addr = self.passive_address()?;
        trace!(%addr, "opening FTP data connection");
        connect_addr(addr, self.connect_timeout, self.socket_timeout)
    }

    /// List `path` and parse the entries.
    pub fn list(&mut self, path: &str) -> ReaderResult<Vec<ListEntry>> {
        let mut data = self.open_data()?;
        let reply = self.command(&format!("LIST {path}"))?;
        match reply.code {
            125 | 150 => {}
            450 | 550 => return Err(ReaderError::not_found(path)),
            _ => return Err(ReaderError::protocol(format!("LIST refused: {reply}"))),
        }

        let mut raw = Vec::new();
        data.read_to_end(&mut raw)
            .map_err(|e| ReaderError::connection_with("reading FTP listing", e))?;
        drop(data);

        let done = self.read_reply()?;
        if !done.is_completion() {
            return Err(ReaderError::protocol(format!("LIST did not complete: {done}")));
        }
        Ok(parse_listing(&String::from_utf8_lossy(&raw)))
    }

    /// Set the restart offset for the next transfer.
    ///
    /// Only a negative reply is a failure; servers differ on whether they
    /// answer `350` or some other non-negative code.
    pub fn restart_at(&mut self, offset: u64) -> ReaderResult<()> {
        let reply = self.command(&format!("REST {offset}"))?;
        if reply.is_negative() {
            return Err(ReaderError::protocol(format!(
                "server cannot restart at {offset}: {reply}"
            )));
        }
        if !reply.is_intermediate() {
            debug!(offset, "REST answered with {reply}");
        }
        Ok(())
    }

    /// Start retrieving `path` and return the data stream.
    pub fn retrieve(&mut self, path: &str) -> ReaderResult<TcpStream> {
        let data = self.open_data()?;
        let reply = self.command(&format!("RETR {path}"))?;
        match reply.code {
            _ if reply.is_preliminary() => Ok(data),
            450 | 550 => Err(ReaderError::not_found(path)),
            530 => Err(ReaderError::auth(format!("RETR {path} not permitted: {reply}"))),
            _ => Err(ReaderError::protocol(format!("RETR refused: {reply}"))),
        }
    }

    /// Read the completion reply of the pending transfer.
    ///
    /// A `426`/`451` after the data stream was closed early still means the
    /// transfer is over.
    pub fn complete_pending(&mut self) -> ReaderResult<()> {
        let reply = self.read_reply()?;
        match reply.code {
            _ if reply.is_completion() => Ok(()),
            426 | 451 => {
                debug!("transfer ended early: {reply}");
                Ok(())
            }
            _ => Err(ReaderError::protocol(format!("transfer did not complete: {reply}"))),
        }
    }

    pub fn quit(&mut self) -> ReaderResult<()> {
        let reply = self.command("QUIT")?;
        if reply.is_negative() {
            return Err(ReaderError::protocol(format!("QUIT refused: {reply}")));
        }
        Ok(())
    }

    pub fn disconnect(&mut self) -> ReaderResult<()> {
        self.writer
            .shutdown(Shutdown::Both)
            .map_err(|e| ReaderError::from_io("disconnecting FTP control connection", e))
    }
}
