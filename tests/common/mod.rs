//! Common test utilities for TKEY exchange tests
//!
//! Scripted resolver and transport doubles plus reply builders.

#![allow(dead_code)] // These functions are used by various test files

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use tkey_exchange::{
    ClientConfig, DNSPacket, TkeyClient, TkeyRecord,
    dns::{
        enums::{DNSResourceClass, DNSResourceType},
        resource::DNSResource,
    },
    error::TransportError,
    lookup::HostResolver,
    transport::Transport,
};

pub const SECRET: &str = "c2VjcmV0LWtleS1tYXRlcmlhbA==";

/// Resolver returning a fixed answer and counting lookups.
pub struct MockResolver {
    answer: Result<Vec<IpAddr>, String>,
    pub lookups: Mutex<Vec<String>>,
}

impl MockResolver {
    pub fn with_addresses(addresses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(addresses.iter().map(|a| a.parse().unwrap()).collect()),
            lookups: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(reason.to_string()),
            lookups: Mutex::new(Vec::new()),
        })
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }
}

#[async_trait]
impl HostResolver for MockResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, String> {
        self.lookups.lock().unwrap().push(host.to_string());
        self.answer.clone()
    }
}

pub type Responder = Arc<dyn Fn(&DNSPacket) -> Vec<u8> + Send + Sync>;

/// What the mock transport does for one address.
#[derive(Clone)]
pub enum Outcome {
    Fail(TransportError),
    Reply(Responder),
}

impl Outcome {
    pub fn reply(f: impl Fn(&DNSPacket) -> Vec<u8> + Send + Sync + 'static) -> Self {
        Outcome::Reply(Arc::new(f))
    }

    pub fn packet(f: impl Fn(&DNSPacket) -> DNSPacket + Send + Sync + 'static) -> Self {
        Outcome::reply(move |query| f(query).serialize().unwrap())
    }

    pub fn io(reason: &str) -> Self {
        Outcome::Fail(TransportError::Io(reason.to_string()))
    }
}

/// Transport with scripted per-address outcomes that records every query.
#[derive(Default)]
pub struct MockTransport {
    outcomes: Mutex<HashMap<SocketAddr, Outcome>>,
    pub sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
}

impl MockTransport {
    pub fn new(outcomes: Vec<(&str, Outcome)>) -> Arc<Self> {
        let outcomes = outcomes
            .into_iter()
            .map(|(addr, outcome)| (addr.parse().unwrap(), outcome))
            .collect();
        Arc::new(Self {
            outcomes: Mutex::new(outcomes),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn contacted(&self) -> Vec<SocketAddr> {
        self.sent.lock().unwrap().iter().map(|(a, _)| *a).collect()
    }

    pub fn sent_packets(&self) -> Vec<DNSPacket> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, bytes)| DNSPacket::parse(bytes).unwrap())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn exchange(&self, addr: SocketAddr, query: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.sent.lock().unwrap().push((addr, query.to_vec()));
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get(&addr)
            .cloned()
            .unwrap_or_else(|| Outcome::io("connection refused"));

        match outcome {
            Outcome::Fail(e) => Err(e),
            Outcome::Reply(responder) => {
                let query = DNSPacket::parse(query).unwrap();
                Ok(responder(&query))
            }
        }
    }
}

pub fn client(resolver: Arc<MockResolver>, transport: Arc<MockTransport>) -> TkeyClient {
    TkeyClient::with_collaborators(ClientConfig::default(), resolver, transport)
}

/// Reply header for `query`: same id, QR set, question echoed.
pub fn reply_header(query: &DNSPacket) -> DNSPacket {
    let mut reply = DNSPacket::default();
    reply.header.id = query.header.id;
    reply.header.qr = true;
    reply.questions = query.questions.clone();
    reply
}

/// The TKEY record a cooperative server returns: the query's record with
/// the server's key data.
pub fn server_tkey(query: &DNSPacket, key: &[u8]) -> TkeyRecord {
    let sent = TkeyRecord::from_resource(&query.resources[0]).unwrap();
    TkeyRecord::new(&sent.name, &sent.algorithm, sent.mode, sent.inception, sent.expiration, key)
        .unwrap()
}

pub fn tkey_reply(query: &DNSPacket) -> DNSPacket {
    let mut reply = reply_header(query);
    reply
        .answers
        .push(server_tkey(query, &[0xFE, 0xED]).to_resource().unwrap());
    reply
}

pub fn txt_record(name: &str, text: &str) -> DNSResource {
    let mut rdata = vec![text.len() as u8];
    rdata.extend_from_slice(text.as_bytes());
    DNSResource::new(name, DNSResourceType::TXT, DNSResourceClass::IN, 60, rdata).unwrap()
}
