//! Protocol-specific readers.
//!
//! Each protocol module provides a `RemoteReader` implementation and the
//! `ReaderFactory` that builds it:
//! - `ftp`: native control/data connection client
//! - `nfs`: ONC-RPC NFSv3 client with an offset-addressed refill buffer
//! - `smb`: reader over a pluggable SMB session stack
//! - `webdav`: single ranged GET per open (feature `webdav`)

pub mod ftp;
pub mod nfs;
pub mod smb;
#[cfg(feature = "webdav")]
pub mod webdav;

use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{ReaderError, ReaderResult};

/// Connect to `host:port`, trying each resolved address in turn, and apply
/// the socket timeout to the new stream.
pub(crate) fn connect_tcp(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    socket_timeout: Duration,
) -> ReaderResult<TcpStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| ReaderError::connection_with(format!("cannot resolve {host}"), e))?;

    let mut last_error = None;
    for addr in addrs {
        match connect_addr(addr, connect_timeout, socket_timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error
        .unwrap_or_else(|| ReaderError::connection(format!("{host} resolved to no addresses"))))
}

pub(crate) fn connect_addr(
    addr: SocketAddr,
    connect_timeout: Duration,
    socket_timeout: Duration,
) -> ReaderResult<TcpStream> {
    let stream = TcpStream::connect_timeout(&addr, connect_timeout)
        .map_err(|e| ReaderError::connection_with(format!("cannot connect to {addr}"), e))?;
    stream
        .set_read_timeout(Some(socket_timeout))
        .and_then(|()| stream.set_write_timeout(Some(socket_timeout)))
        .and_then(|()| stream.set_nodelay(true))
        .map_err(|e| ReaderError::connection_with(format!("cannot configure socket to {addr}"), e))?;
    Ok(stream)
}

/// Private, link-local or loopback address.
pub(crate) fn is_local_network(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_loopback(),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_local_network(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                // fc00::/7 unique local
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 link-local
                || (first & 0xffc0) == 0xfe80
        }
    }
}
