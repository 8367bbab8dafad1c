//! RFC 2930 TKEY negotiation
//!
//! This module provides the pieces of a single TKEY exchange:
//! - Mode and record types with their RDATA encoding
//! - Query construction per mode
//! - Validation of the nameserver's reply

use serde::Serialize;

pub mod record;
pub mod request;
pub mod validate;

pub use record::TkeyRecord;
pub use request::ExchangeRequest;
pub use validate::{ExchangeResult, validate_response};

/// RFC 3645 algorithm name for GSS-TSIG.
pub const GSS_TSIG: &str = "gss-tsig.";

/// Whether `algorithm` names GSS-TSIG (ASCII case-insensitive).
pub fn is_gss_algorithm(algorithm: &str) -> bool {
    algorithm.eq_ignore_ascii_case(GSS_TSIG)
}

/// TKEY mode field values (RFC 2930 section 2.5). Zero is reserved.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TkeyMode {
    ServerAssigned,
    DiffieHellman,
    Gss,
    ResolverAssigned,
    Delete,
}

impl TkeyMode {
    pub fn value(&self) -> u16 {
        match self {
            TkeyMode::ServerAssigned => 1,
            TkeyMode::DiffieHellman => 2,
            TkeyMode::Gss => 3,
            TkeyMode::ResolverAssigned => 4,
            TkeyMode::Delete => 5,
        }
    }

    /// Parses either a mode number or one of the short names used on the
    /// command line.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Ok(value) = name.parse::<u16>() {
            return TkeyMode::try_from(value).ok();
        }
        match name.to_ascii_lowercase().as_str() {
            "server" | "server-assigned" => Some(TkeyMode::ServerAssigned),
            "dh" | "diffie-hellman" => Some(TkeyMode::DiffieHellman),
            "gss" | "gss-api" => Some(TkeyMode::Gss),
            "resolver" | "resolver-assigned" => Some(TkeyMode::ResolverAssigned),
            "delete" => Some(TkeyMode::Delete),
            _ => None,
        }
    }
}

impl TryFrom<u16> for TkeyMode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TkeyMode::ServerAssigned),
            2 => Ok(TkeyMode::DiffieHellman),
            3 => Ok(TkeyMode::Gss),
            4 => Ok(TkeyMode::ResolverAssigned),
            5 => Ok(TkeyMode::Delete),
            other => Err(other),
        }
    }
}

impl From<TkeyMode> for u16 {
    fn from(mode: TkeyMode) -> Self {
        mode.value()
    }
}

impl std::fmt::Display for TkeyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TkeyMode::ServerAssigned => "server-assigned",
            TkeyMode::DiffieHellman => "diffie-hellman",
            TkeyMode::Gss => "gss-api",
            TkeyMode::ResolverAssigned => "resolver-assigned",
            TkeyMode::Delete => "delete",
        };
        write!(f, "{} ({})", name, self.value())
    }
}
