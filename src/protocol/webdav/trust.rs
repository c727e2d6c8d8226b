//! Endpoint trust policy and the HTTP client built for it.

use std::net::{IpAddr, ToSocketAddrs};

use reqwest::blocking::Client;
use reqwest::redirect::Policy;

use crate::config::{ReaderConfig, TrustPolicy, WebDavLocation};
use crate::error::{ReaderError, ReaderResult};
use crate::protocol::is_local_network;

/// Reject endpoints the policy does not trust.
///
/// Under `PrivateNetworkOnly` every address the host resolves to must be
/// private, link-local or loopback.
pub fn check_endpoint(location: &WebDavLocation, policy: TrustPolicy) -> ReaderResult<()> {
    if policy == TrustPolicy::System {
        return Ok(());
    }

    let addrs: Vec<IpAddr> = match location.host.parse::<IpAddr>() {
        Ok(ip) => vec![ip],
        Err(_) => {
            let port = location.url.port_or_known_default().unwrap_or(80);
            (location.host.as_str(), port)
                .to_socket_addrs()
                .map_err(|e| ReaderError::connection_with(format!("cannot resolve {}", location.host), e))?
                .map(|a| a.ip())
                .collect()
        }
    };

    if addrs.is_empty() {
        return Err(ReaderError::connection(format!(
            "{} resolved to no addresses",
            location.host
        )));
    }
    if let Some(ip) = addrs.iter().find(|ip| !is_local_network(**ip)) {
        return Err(ReaderError::connection(format!(
            "endpoint {} ({ip}) is outside the trusted private network",
            location.host
        )));
    }
    Ok(())
}

/// Build the client shared by every reader of one factory.
///
/// Private-network endpoints commonly serve self-signed certificates, so
/// under `PrivateNetworkOnly` certificates are not validated and redirects,
/// which could leave the private network, are not followed.
pub fn build_client(config: &ReaderConfig) -> ReaderResult<Client> {
    let user_agent = config
        .webdav
        .user_agent
        .clone()
        .unwrap_or_else(|| concat!("remoteio/", env!("CARGO_PKG_VERSION")).to_string());

    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.socket_timeout())
        .user_agent(user_agent);
    if config.webdav.trust_policy == TrustPolicy::PrivateNetworkOnly {
        builder = builder
            .danger_accept_invalid_certs(true)
            .redirect(Policy::none());
    }
    builder
        .build()
        .map_err(|e| ReaderError::config("cannot build HTTP client", Some(Box::new(e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceUri;

    fn location(uri: &str) -> WebDavLocation {
        WebDavLocation::parse(&ResourceUri::parse(uri).unwrap()).unwrap()
    }

    #[test]
    fn private_addresses_are_trusted() {
        for uri in [
            "http://192.168.1.20/media/a.mkv",
            "https://10.0.0.5:8443/a.mkv",
            "http://127.0.0.1:8080/a.mkv",
            "http://[fe80::1]/a.mkv",
        ] {
            check_endpoint(&location(uri), TrustPolicy::PrivateNetworkOnly).unwrap();
        }
    }

    #[test]
    fn public_addresses_are_rejected_unless_system_trust() {
        let public = location("http://8.8.8.8/a.mkv");
        let err = check_endpoint(&public, TrustPolicy::PrivateNetworkOnly).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Connection);
        check_endpoint(&public, TrustPolicy::System).unwrap();
    }
}
