//! `opc.tcp://host:port/path` endpoint URLs.

use thiserror::Error;
use url::{Host, Url};

pub const SCHEME: &str = "opc.tcp";

/// Errors produced while parsing an endpoint URL.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid endpoint url: {0}")]
    Parse(#[from] url::ParseError),

    #[error("unsupported scheme '{0}', expected opc.tcp")]
    Scheme(String),

    #[error("endpoint url has no host")]
    MissingHost,

    #[error("endpoint url has no port")]
    MissingPort,
}

/// A parsed endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrl {
    url: Url,
    host: String,
    port: u16,
}

impl EndpointUrl {
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(input)?;
        if url.scheme() != SCHEME {
            return Err(EndpointError::Scheme(url.scheme().to_string()));
        }
        let host = match url.host() {
            Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(EndpointError::MissingHost),
        };
        let port = url.port().ok_or(EndpointError::MissingPort)?;
        Ok(Self { url, host, port })
    }

    /// Host part usable for binding (IPv6 without brackets).
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl std::fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_endpoint() {
        let ep = EndpointUrl::parse("opc.tcp://0.0.0.0:4840/freeopcua/server/").unwrap();
        assert_eq!(ep.host(), "0.0.0.0");
        assert_eq!(ep.port(), 4840);
        assert_eq!(ep.path(), "/freeopcua/server/");
    }

    #[test]
    fn parses_ipv6_host() {
        let ep = EndpointUrl::parse("opc.tcp://[::1]:4840").unwrap();
        assert_eq!(ep.host(), "::1");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(matches!(
            EndpointUrl::parse("http://localhost:4840/"),
            Err(EndpointError::Scheme(_))
        ));
    }

    #[test]
    fn requires_port() {
        assert!(matches!(
            EndpointUrl::parse("opc.tcp://localhost/"),
            Err(EndpointError::MissingPort)
        ));
    }
}
