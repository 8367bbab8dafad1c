use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use super::{TkeyMode, TkeyRecord};
use crate::dns::DNSPacket;
use crate::dns::enums::{DNSResourceClass, DNSResourceType};
use crate::dns::question::DNSQuestion;
use crate::dns::resource::DNSResource;
use crate::error::{ExchangeError, Result};

/// Everything needed for one TKEY exchange.
///
/// `mode` is the raw mode value so that out-of-range values can be
/// rejected when the query is built rather than being unrepresentable.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    /// Nameserver host name or address literal
    pub target_host: String,
    /// Name of the key being negotiated (owner of the TKEY record)
    pub key_name: String,
    /// TKEY algorithm, e.g. "gss-tsig."
    pub algorithm: String,
    pub mode: u16,
    /// Requested key lifetime in seconds
    pub lifetime: u32,
    /// Key exchange payload (e.g. a GSS token)
    pub key_material: Vec<u8>,
    /// Records appended after the TKEY record in the additional section
    pub extra_records: Vec<DNSResource>,
    pub tsig_key_name: Option<String>,
    pub tsig_algorithm: Option<String>,
    /// Base64 shared secret for `tsig_key_name`
    pub tsig_secret: Option<String>,
}

impl ExchangeRequest {
    pub fn new(
        target_host: impl Into<String>,
        key_name: impl Into<String>,
        algorithm: impl Into<String>,
        mode: impl Into<u16>,
    ) -> Self {
        Self {
            target_host: target_host.into(),
            key_name: key_name.into(),
            algorithm: algorithm.into(),
            mode: mode.into(),
            lifetime: 0,
            key_material: Vec::new(),
            extra_records: Vec::new(),
            tsig_key_name: None,
            tsig_algorithm: None,
            tsig_secret: None,
        }
    }

    pub fn with_lifetime(mut self, lifetime: u32) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_key_material(mut self, key_material: impl Into<Vec<u8>>) -> Self {
        self.key_material = key_material.into();
        self
    }

    pub fn with_extra_records(mut self, records: Vec<DNSResource>) -> Self {
        self.extra_records = records;
        self
    }

    pub fn with_tsig(
        mut self,
        key_name: impl Into<String>,
        algorithm: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        self.tsig_key_name = Some(key_name.into());
        self.tsig_algorithm = Some(algorithm.into());
        self.tsig_secret = Some(secret.into());
        self
    }

    /// TSIG key name, algorithm and secret, only when all three are set.
    pub fn tsig_params(&self) -> Option<(&str, &str, &str)> {
        match (&self.tsig_key_name, &self.tsig_algorithm, &self.tsig_secret) {
            (Some(name), Some(algorithm), Some(secret)) => {
                Some((name.as_str(), algorithm.as_str(), secret.as_str()))
            }
            _ => None,
        }
    }

    pub fn tkey_mode(&self) -> Result<TkeyMode> {
        TkeyMode::try_from(self.mode).map_err(ExchangeError::InvalidMode)
    }

    /// Builds the TKEY record for this request as of `now` (epoch seconds).
    ///
    /// Only Diffie-Hellman, GSS and delete carry defined timestamps;
    /// server- and resolver-assigned keying are refused here.
    pub fn tkey_record(&self, now: u32) -> Result<TkeyRecord> {
        let mode = self.tkey_mode()?;
        let (inception, expiration) = match mode {
            TkeyMode::DiffieHellman | TkeyMode::Gss => (now, now.wrapping_add(self.lifetime)),
            TkeyMode::Delete => (0, 0),
            TkeyMode::ServerAssigned | TkeyMode::ResolverAssigned => {
                return Err(ExchangeError::UnsupportedMode(mode));
            }
        };

        TkeyRecord::new(
            &self.key_name,
            &self.algorithm,
            mode.value(),
            inception,
            expiration,
            &self.key_material,
        )
        .map_err(|e| ExchangeError::Encode(e.to_string()))
    }

    /// Builds the query using the current time.
    pub fn build_query(&self) -> Result<DNSPacket> {
        self.build_query_at(unix_now())
    }

    pub fn build_query_at(&self, now: u32) -> Result<DNSPacket> {
        let tkey = self.tkey_record(now)?;
        let tkey_rr = tkey
            .to_resource()
            .map_err(|e| ExchangeError::Encode(e.to_string()))?;

        let mut packet = DNSPacket::default();
        packet.header.id = rand::random();
        packet.header.rd = false;
        packet.questions.push(DNSQuestion::new(
            &self.key_name,
            DNSResourceType::TKEY,
            DNSResourceClass::ANY,
        ));
        packet.resources.push(tkey_rr);
        packet.resources.extend(self.extra_records.iter().cloned());

        // Owner names are only length-checked when the message is encoded
        packet
            .serialize()
            .map_err(|e| ExchangeError::Encode(e.to_string()))?;

        debug!(
            "Built TKEY query id={} key={} mode={} inception={} expiration={} extra={}",
            packet.header.id,
            self.key_name,
            self.mode,
            tkey.inception,
            tkey.expiration,
            self.extra_records.len()
        );

        Ok(packet)
    }
}

/// Current time in epoch seconds, truncated to the 32 bits TKEY carries.
pub fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tkey::GSS_TSIG;

    fn request(mode: impl Into<u16>) -> ExchangeRequest {
        ExchangeRequest::new("ns.example.com", "tkey.example.com.", GSS_TSIG, mode)
            .with_lifetime(3600)
            .with_key_material(vec![0x01, 0x02, 0xAB])
    }

    #[test]
    fn test_gss_and_dh_timestamps_span_lifetime() {
        for mode in [TkeyMode::Gss, TkeyMode::DiffieHellman] {
            let record = request(mode).tkey_record(1_700_000_000).unwrap();
            assert_eq!(record.inception, 1_700_000_000);
            assert_eq!(record.expiration - record.inception, 3600);
            assert_eq!(record.mode, mode.value());
        }
    }

    #[test]
    fn test_build_query_uses_current_time() {
        let before = unix_now();
        let packet = request(TkeyMode::Gss).build_query().unwrap();
        let after = unix_now();

        let record = TkeyRecord::from_resource(&packet.resources[0]).unwrap();
        assert!(record.inception >= before && record.inception <= after);
        assert_eq!(record.expiration - record.inception, 3600);
    }

    #[test]
    fn test_delete_zeroes_timestamps() {
        let record = request(TkeyMode::Delete)
            .with_lifetime(86400)
            .tkey_record(1_700_000_000)
            .unwrap();
        assert_eq!(record.inception, 0);
        assert_eq!(record.expiration, 0);
    }

    #[test]
    fn test_assigned_modes_are_unsupported() {
        for mode in [TkeyMode::ServerAssigned, TkeyMode::ResolverAssigned] {
            match request(mode).build_query() {
                Err(ExchangeError::UnsupportedMode(m)) => assert_eq!(m, mode),
                other => panic!("Expected UnsupportedMode, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_out_of_range_mode_is_invalid() {
        for value in [0u16, 6, 42] {
            match request(value).build_query() {
                Err(ExchangeError::InvalidMode(v)) => assert_eq!(v, value),
                other => panic!("Expected InvalidMode, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_query_layout() {
        let extra = DNSResource::new(
            "extra.example.com.",
            DNSResourceType::TXT,
            DNSResourceClass::IN,
            30,
            b"\x03abc".to_vec(),
        )
        .unwrap();
        let packet = request(TkeyMode::Gss)
            .with_extra_records(vec![extra.clone()])
            .build_query_at(1000)
            .unwrap();

        assert!(!packet.header.rd);
        assert!(!packet.header.qr);
        assert_eq!(packet.questions.len(), 1);
        assert_eq!(packet.questions[0].qtype, DNSResourceType::TKEY);
        assert_eq!(packet.questions[0].qclass, DNSResourceClass::ANY);

        assert_eq!(packet.resources.len(), 2);
        let tkey = TkeyRecord::from_resource(&packet.resources[0]).unwrap();
        assert_eq!(tkey.name, "tkey.example.com.");
        assert_eq!(tkey.algorithm, GSS_TSIG);
        assert_eq!(tkey.key, "0102ab");
        assert_eq!(tkey.key_size, 3);
        assert_eq!(packet.resources[0].ttl, 0);
        assert_eq!(packet.resources[1], extra);
    }

    #[test]
    fn test_overlong_key_name_is_an_encode_error() {
        let key_name = format!("{}.example.com.", "a".repeat(64));
        let req = ExchangeRequest::new("ns.example.com", key_name, GSS_TSIG, TkeyMode::Gss);
        match req.build_query_at(1000) {
            Err(ExchangeError::Encode(reason)) => assert!(reason.contains("64")),
            other => panic!("Expected Encode, got {:?}", other),
        }
    }

    #[test]
    fn test_overlong_extra_record_owner_is_an_encode_error() {
        let mut extra = DNSResource::new("x.example.", DNSResourceType::TXT, DNSResourceClass::IN, 0, vec![0])
            .unwrap();
        extra.labels[0] = "b".repeat(70);
        let result = request(TkeyMode::Gss)
            .with_extra_records(vec![extra])
            .build_query_at(1000);
        assert!(matches!(result, Err(ExchangeError::Encode(_))));
    }

    #[test]
    fn test_partial_tsig_params_are_absent() {
        let mut req = request(TkeyMode::Gss);
        req.tsig_key_name = Some("k.".to_string());
        req.tsig_algorithm = Some("hmac-sha256.".to_string());
        assert!(req.tsig_params().is_none());

        let req = req.with_tsig("k.", "hmac-sha256.", "c2VjcmV0");
        assert_eq!(req.tsig_params(), Some(("k.", "hmac-sha256.", "c2VjcmV0")));
    }
}
