use crate::error::UrlError;

use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "opc.tcp://";

const MIN_LEN: usize = 11;
const MAX_LEN: usize = 511;

/// A parsed `opc.tcp://host:port` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrl {
    host: String,
    port: u16,
}

impl EndpointUrl {
    /// Parses an endpoint URL.
    ///
    /// The URL must be ASCII, between 11 and 511 bytes long and start with
    /// `opc.tcp://`. The host runs up to the first `:` after the scheme;
    /// everything after it must be a decimal port in `1..=65535`.
    pub fn parse(url: &str) -> Result<Self, UrlError> {
        if !(MIN_LEN..=MAX_LEN).contains(&url.len()) {
            return Err(UrlError::InvalidLength(url.len()));
        }
        if !url.is_ascii() {
            return Err(UrlError::NotAscii);
        }

        let rest = url.strip_prefix(SCHEME).ok_or(UrlError::InvalidScheme)?;
        let (host, port) = rest.split_once(':').ok_or(UrlError::MissingPort)?;

        if host.is_empty() {
            return Err(UrlError::EmptyHost);
        }
        if port.is_empty() {
            return Err(UrlError::MissingPort);
        }

        Ok(Self {
            host: host.to_owned(),
            port: parse_port(port)?,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

fn parse_port(text: &str) -> Result<u16, UrlError> {
    let invalid = || UrlError::InvalidPort(text.to_owned());

    // `u16::from_str` would accept a leading `+`.
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    match text.parse::<u16>() {
        Ok(0) | Err(_) => Err(invalid()),
        Ok(port) => Ok(port),
    }
}

impl FromStr for EndpointUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}:{}", self.host, self.port)
    }
}
