use std::net::SocketAddr;

use thiserror::Error;

use crate::dns::ParseError;
use crate::dns::rcode::ResponseCode;
use crate::tkey::TkeyMode;
use crate::tsig::TsigError;

/// Failure of a TKEY exchange.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Invalid TKEY mode {0}")]
    InvalidMode(u16),

    #[error("Unsupported TKEY mode {0}")]
    UnsupportedMode(TkeyMode),

    #[error("Failed to encode TKEY query: {0}")]
    Encode(String),

    #[error("TSIG error: {0}")]
    Signing(#[from] TsigError),

    #[error("Failed to resolve {host}: {reason}")]
    ResolutionFailure { host: String, reason: String },

    #[error("{}", describe_attempts(.0))]
    TransportFailure(Vec<AttemptError>),

    #[error("DNS error: {0}")]
    ServerError(ResponseCode),

    #[error("Multiple TKEY responses")]
    MultipleTkeyAnswers,

    #[error("Received no TKEY response")]
    NoTkeyAnswer,

    #[error("Malformed TKEY response: {0}")]
    MalformedTkey(String),

    #[error("TKEY error: {0}")]
    TkeyProtocolError(ResponseCode),
}

fn describe_attempts(attempts: &[AttemptError]) -> String {
    let mut out = format!("{} address(es) failed:", attempts.len());
    for attempt in attempts {
        out.push_str(&format!("\n\t* {}", attempt));
    }
    out
}

/// One failed delivery attempt in the failover loop.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{address}: {cause}")]
pub struct AttemptError {
    pub address: SocketAddr,
    pub cause: TransportError,
}

/// Failure to obtain a usable reply from one address.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Timed out after {0} ms")]
    Timeout(u128),

    #[error("Message of {0} bytes does not fit TCP framing")]
    MessageTooLarge(usize),

    #[error("Failed to parse response: {0}")]
    Parse(#[from] ParseError),

    #[error("Response id {received} does not match query id {expected}")]
    IdMismatch { expected: u16, received: u16 },

    #[error("Reply is not a response")]
    NotAResponse,

    #[error("Failed to sign query: {0}")]
    Signing(TsigError),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Parse error: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
