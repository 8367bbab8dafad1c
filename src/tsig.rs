//! TSIG (Transaction Signature) for TKEY queries
//!
//! Implements RFC 2845 signing of outgoing queries and verification of the
//! signed reply, plus the GSS-TSIG bypass used while a GSS context is
//! still being negotiated.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ring::hmac;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

use crate::dns::common::{name_from_labels, name_to_wire, parse_uncompressed_name, read_u16};
use crate::dns::enums::{DNSResourceClass, DNSResourceType};
use crate::dns::rcode::ResponseCode;
use crate::dns::resource::DNSResource;
use crate::dns::{ARCOUNT_OFFSET, DNSPacket, ParseError, last_additional_offset};
use crate::tkey::{ExchangeRequest, is_gss_algorithm};

/// Clock skew allowed on signed queries, in seconds.
pub const TSIG_FUDGE: u16 = 300;

/// TSIG algorithm types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsigAlgorithm {
    HmacSha1,
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl TsigAlgorithm {
    /// Get the algorithm name as used in DNS
    pub fn name(&self) -> &'static str {
        match self {
            TsigAlgorithm::HmacSha1 => "hmac-sha1.",
            TsigAlgorithm::HmacSha256 => "hmac-sha256.",
            TsigAlgorithm::HmacSha384 => "hmac-sha384.",
            TsigAlgorithm::HmacSha512 => "hmac-sha512.",
        }
    }

    fn hmac_algorithm(&self) -> hmac::Algorithm {
        match self {
            TsigAlgorithm::HmacSha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            TsigAlgorithm::HmacSha256 => hmac::HMAC_SHA256,
            TsigAlgorithm::HmacSha384 => hmac::HMAC_SHA384,
            TsigAlgorithm::HmacSha512 => hmac::HMAC_SHA512,
        }
    }

    /// Parse algorithm from name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().trim_end_matches('.') {
            "hmac-sha1" => Some(TsigAlgorithm::HmacSha1),
            "hmac-sha256" => Some(TsigAlgorithm::HmacSha256),
            "hmac-sha384" => Some(TsigAlgorithm::HmacSha384),
            "hmac-sha512" => Some(TsigAlgorithm::HmacSha512),
            _ => None,
        }
    }
}

/// A shared TSIG key.
#[derive(Clone)]
pub struct TsigKey {
    /// Key name (e.g., "update-key.example.com.")
    pub name: String,
    pub algorithm: TsigAlgorithm,
    secret: Vec<u8>,
}

impl TsigKey {
    pub fn new(name: &str, algorithm: TsigAlgorithm, secret: Vec<u8>) -> Self {
        Self {
            name: name.to_lowercase(),
            algorithm,
            secret,
        }
    }

    /// Builds a key from an algorithm name and a base64 secret, the form
    /// BIND key files use.
    pub fn from_base64(name: &str, algorithm: &str, secret: &str) -> TsigResult<Self> {
        let algorithm = TsigAlgorithm::from_name(algorithm)
            .ok_or_else(|| TsigError::UnknownAlgorithm(algorithm.to_string()))?;
        name_to_wire(name, false)?;
        let secret = BASE64
            .decode(secret.trim())
            .map_err(|e| TsigError::DecodeError(e.to_string()))?;
        Ok(Self::new(name, algorithm, secret))
    }

    fn hmac_key(&self) -> hmac::Key {
        hmac::Key::new(self.algorithm.hmac_algorithm(), &self.secret)
    }
}

impl std::fmt::Debug for TsigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TsigKey")
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl PartialEq for TsigKey {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.algorithm == other.algorithm && self.secret == other.secret
    }
}

/// TSIG verification result
pub type TsigResult<T> = Result<T, TsigError>;

/// TSIG-specific errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TsigError {
    #[error("Invalid TSIG format: {0}")]
    InvalidFormat(String),
    #[error("Unknown TSIG algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("TSIG signature verification failed")]
    VerificationFailed,
    #[error("TSIG time skew too large: {0} seconds")]
    TimeSkew(i64),
    #[error("TSIG key mismatch: response signed with {0}")]
    KeyMismatch(String),
    #[error("TSIG decode error: {0}")]
    DecodeError(String),
    #[error("Response to a signed query carries no TSIG")]
    Unsigned,
    #[error("Server rejected TSIG: {0}")]
    Rejected(ResponseCode),
}

impl From<ParseError> for TsigError {
    fn from(e: ParseError) -> Self {
        TsigError::InvalidFormat(e.to_string())
    }
}

/// How a single exchange signs its query and treats the reply's TSIG.
///
/// Built once per call from the request; never shared between calls.
#[derive(Debug, Clone, PartialEq)]
pub enum SigningContext {
    /// No TSIG attached, reply TSIG not checked.
    Unsigned,
    /// GSS-TSIG negotiation: nothing attached, and any TSIG on the reply is
    /// ignored because the GSS context is what the exchange establishes.
    GssBypass { key_name: String },
    /// Sign with a shared key and verify the reply with it.
    Tsig(TsigKey),
}

/// Wire bytes of one attempt plus the MAC the reply must chain from.
#[derive(Debug, Clone)]
pub struct SignedQuery {
    pub id: u16,
    pub bytes: Vec<u8>,
    pub mac: Option<Vec<u8>>,
}

impl SigningContext {
    pub fn for_request(request: &ExchangeRequest) -> TsigResult<Self> {
        if is_gss_algorithm(&request.algorithm) {
            debug!("GSS-TSIG exchange for {}: reply TSIG will not be verified", request.key_name);
            return Ok(SigningContext::GssBypass {
                key_name: request.key_name.clone(),
            });
        }

        match request.tsig_params() {
            Some((name, algorithm, secret)) => {
                let key = TsigKey::from_base64(name, algorithm, secret)?;
                debug!("Signing TKEY query with TSIG key {} ({})", key.name, key.algorithm.name());
                Ok(SigningContext::Tsig(key))
            }
            None => Ok(SigningContext::Unsigned),
        }
    }

    /// Encodes `packet` for sending, appending a fresh TSIG when keyed.
    pub fn sign(&self, packet: &DNSPacket) -> TsigResult<SignedQuery> {
        self.sign_at(packet, unix_time())
    }

    pub fn sign_at(&self, packet: &DNSPacket, now: u64) -> TsigResult<SignedQuery> {
        let mut bytes = packet.serialize()?;

        let key = match self {
            SigningContext::Tsig(key) => key,
            SigningContext::Unsigned | SigningContext::GssBypass { .. } => {
                return Ok(SignedQuery {
                    id: packet.header.id,
                    bytes,
                    mac: None,
                });
            }
        };

        let tsig = TsigData {
            algorithm: key.algorithm.name().to_string(),
            time_signed: now,
            fudge: TSIG_FUDGE,
            mac: Vec::new(),
            original_id: packet.header.id,
            error: 0,
            other: Vec::new(),
        };

        let mut ctx = hmac::Context::with_key(&key.hmac_key());
        ctx.update(&bytes);
        ctx.update(&tsig_variables(&key.name, &tsig)?);
        let mac = ctx.sign().as_ref().to_vec();

        let tsig_rr = DNSResource::new(
            &key.name,
            DNSResourceType::TSIG,
            DNSResourceClass::ANY,
            0,
            tsig.to_rdata_with_mac(&mac)?,
        )?;
        bytes.extend_from_slice(&tsig_rr.to_wire()?);
        bump_arcount(&mut bytes, 1)?;

        Ok(SignedQuery {
            id: packet.header.id,
            bytes,
            mac: Some(mac),
        })
    }

    /// Checks the TSIG on a reply to `query`.
    pub fn verify_response(&self, query: &SignedQuery, response: &[u8]) -> TsigResult<()> {
        self.verify_response_at(query, response, unix_time())
    }

    pub fn verify_response_at(
        &self,
        query: &SignedQuery,
        response: &[u8],
        now: u64,
    ) -> TsigResult<()> {
        let key = match self {
            SigningContext::Unsigned => return Ok(()),
            SigningContext::GssBypass { key_name } => {
                debug!("Skipping TSIG verification of GSS reply for {}", key_name);
                return Ok(());
            }
            SigningContext::Tsig(key) => key,
        };

        let (tsig_rr, tsig_offset) = find_tsig(response)?.ok_or(TsigError::Unsigned)?;
        let tsig = TsigData::parse(&tsig_rr.rdata)?;

        let signer = tsig_rr.name();
        if !signer.eq_ignore_ascii_case(&key.name) {
            return Err(TsigError::KeyMismatch(signer));
        }
        if TsigAlgorithm::from_name(&tsig.algorithm) != Some(key.algorithm) {
            return Err(TsigError::UnknownAlgorithm(tsig.algorithm));
        }
        if tsig.error != 0 {
            return Err(TsigError::Rejected(ResponseCode::from(tsig.error)));
        }

        let skew = now as i64 - tsig.time_signed as i64;
        if skew.abs() > tsig.fudge as i64 {
            warn!("TSIG time skew too large: {} seconds", skew);
            return Err(TsigError::TimeSkew(skew));
        }

        // RFC 2845 4.2: request MAC, then the reply as it was before the TSIG
        // was added (original id restored, ARCOUNT decremented).
        let mut data = Vec::with_capacity(response.len());
        if let Some(request_mac) = &query.mac {
            data.extend_from_slice(&(request_mac.len() as u16).to_be_bytes());
            data.extend_from_slice(request_mac);
        }
        let mut unsigned = response[..tsig_offset].to_vec();
        unsigned[..2].copy_from_slice(&tsig.original_id.to_be_bytes());
        bump_arcount(&mut unsigned, -1)?;
        data.extend_from_slice(&unsigned);
        data.extend_from_slice(&tsig_variables(&signer, &tsig)?);

        hmac::verify(&key.hmac_key(), &data, &tsig.mac).map_err(|_| {
            warn!("TSIG MAC verification failed for key {}", key.name);
            TsigError::VerificationFailed
        })?;

        debug!("TSIG verification successful for key: {}", key.name);
        Ok(())
    }
}

pub(crate) fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Locates a trailing TSIG record in a received message.
fn find_tsig(message: &[u8]) -> TsigResult<Option<(DNSResource, usize)>> {
    use crate::dns::common::PacketComponent;

    let Some(offset) = last_additional_offset(message)? else {
        return Ok(None);
    };
    let (record, _) = DNSResource::read_at(message, offset)?;
    if record.rtype != DNSResourceType::TSIG {
        return Ok(None);
    }
    Ok(Some((record, offset)))
}

fn bump_arcount(message: &mut [u8], delta: i32) -> TsigResult<()> {
    let current = read_u16(message, ARCOUNT_OFFSET)
        .ok_or_else(|| TsigError::InvalidFormat("message shorter than header".to_string()))?;
    let updated = u16::try_from(current as i32 + delta)
        .map_err(|_| TsigError::InvalidFormat(format!("ARCOUNT {} out of range", current)))?;
    message[ARCOUNT_OFFSET..ARCOUNT_OFFSET + 2].copy_from_slice(&updated.to_be_bytes());
    Ok(())
}

/// RFC 2845 3.4.2 TSIG variables, names in canonical wire form.
fn tsig_variables(key_name: &str, tsig: &TsigData) -> TsigResult<Vec<u8>> {
    let mut vars = name_to_wire(key_name, true)?;
    vars.extend_from_slice(&u16::from(DNSResourceClass::ANY).to_be_bytes());
    vars.extend_from_slice(&0u32.to_be_bytes());
    vars.extend_from_slice(&name_to_wire(&tsig.algorithm, true)?);
    vars.extend_from_slice(&tsig.time_signed.to_be_bytes()[2..]);
    vars.extend_from_slice(&tsig.fudge.to_be_bytes());
    vars.extend_from_slice(&tsig.error.to_be_bytes());
    vars.extend_from_slice(&(tsig.other.len() as u16).to_be_bytes());
    vars.extend_from_slice(&tsig.other);
    Ok(vars)
}

/// Parsed TSIG data
#[derive(Debug, Clone, PartialEq)]
struct TsigData {
    algorithm: String,
    time_signed: u64,
    fudge: u16,
    mac: Vec<u8>,
    original_id: u16,
    error: u16,
    other: Vec<u8>,
}

impl TsigData {
    fn parse(rdata: &[u8]) -> TsigResult<Self> {
        // Algorithm Name | Time Signed (48) | Fudge | MAC Size | MAC |
        // Original ID | Error | Other Len | Other Data
        let short = || TsigError::InvalidFormat("RDATA too short".to_string());

        let (labels, mut offset) = parse_uncompressed_name(rdata, 0)?;
        let time = rdata.get(offset..offset + 6).ok_or_else(short)?;
        let time_signed = u64::from_be_bytes([0, 0, time[0], time[1], time[2], time[3], time[4], time[5]]);
        offset += 6;

        let fudge = read_u16(rdata, offset).ok_or_else(short)?;
        let mac_size = read_u16(rdata, offset + 2).ok_or_else(short)? as usize;
        offset += 4;

        let mac = rdata.get(offset..offset + mac_size).ok_or_else(short)?.to_vec();
        offset += mac_size;

        let original_id = read_u16(rdata, offset).ok_or_else(short)?;
        let error = read_u16(rdata, offset + 2).ok_or_else(short)?;
        let other_len = read_u16(rdata, offset + 4).ok_or_else(short)? as usize;
        offset += 6;

        let other = rdata.get(offset..offset + other_len).ok_or_else(short)?.to_vec();

        Ok(TsigData {
            algorithm: name_from_labels(&labels),
            time_signed,
            fudge,
            mac,
            original_id,
            error,
            other,
        })
    }

    fn to_rdata_with_mac(&self, mac: &[u8]) -> TsigResult<Vec<u8>> {
        let mut rdata = name_to_wire(&self.algorithm, true)?;
        rdata.extend_from_slice(&self.time_signed.to_be_bytes()[2..]);
        rdata.extend_from_slice(&self.fudge.to_be_bytes());
        rdata.extend_from_slice(&(mac.len() as u16).to_be_bytes());
        rdata.extend_from_slice(mac);
        rdata.extend_from_slice(&self.original_id.to_be_bytes());
        rdata.extend_from_slice(&self.error.to_be_bytes());
        rdata.extend_from_slice(&(self.other.len() as u16).to_be_bytes());
        rdata.extend_from_slice(&self.other);
        Ok(rdata)
    }
}

/// MAC of the TSIG closing a signed query.
#[cfg(test)]
pub(crate) fn request_mac_for_test(query: &[u8]) -> Vec<u8> {
    let (record, _) = find_tsig(query).unwrap().unwrap();
    TsigData::parse(&record.rdata).unwrap().mac
}

/// Server side of RFC 2845 signing: appends a TSIG to `response` chained
/// from the query's MAC. Used to exercise verification.
#[cfg(test)]
pub(crate) fn sign_response_for_test(
    key: &TsigKey,
    request_mac: &[u8],
    response: &DNSPacket,
    now: u64,
    error: u16,
) -> Vec<u8> {
    let mut bytes = response.serialize().unwrap();
    let tsig = TsigData {
        algorithm: key.algorithm.name().to_string(),
        time_signed: now,
        fudge: TSIG_FUDGE,
        mac: Vec::new(),
        original_id: response.header.id,
        error,
        other: Vec::new(),
    };

    let mut ctx = hmac::Context::with_key(&key.hmac_key());
    ctx.update(&(request_mac.len() as u16).to_be_bytes());
    ctx.update(request_mac);
    ctx.update(&bytes);
    ctx.update(&tsig_variables(&key.name, &tsig).unwrap());
    let mac = if error == 0 { ctx.sign().as_ref().to_vec() } else { Vec::new() };

    let rr = DNSResource::new(
        &key.name,
        DNSResourceType::TSIG,
        DNSResourceClass::ANY,
        0,
        tsig.to_rdata_with_mac(&mac).unwrap(),
    )
    .unwrap();
    bytes.extend_from_slice(&rr.to_wire().unwrap());
    bump_arcount(&mut bytes, 1).unwrap();
    bytes
}
