//! Client-side RFC 2930 TKEY key negotiation over DNS/TCP, with optional
//! RFC 2845 TSIG signing of the query.

pub mod client;
pub mod config;
pub mod dns;
pub mod error;
pub mod lookup;
pub mod tkey;
pub mod transport;
pub mod tsig;

pub use client::{TkeyClient, exchange_tkey};
pub use config::ClientConfig;
pub use dns::DNSPacket;
pub use error::{ExchangeError, Result};
pub use tkey::{ExchangeRequest, ExchangeResult, TkeyMode, TkeyRecord};
