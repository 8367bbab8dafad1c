use serde::Serialize;

use crate::dns::ParseError;
use crate::dns::common::{name_from_labels, name_to_wire, parse_uncompressed_name, read_u16, read_u32};
use crate::dns::enums::{DNSResourceClass, DNSResourceType};
use crate::dns::rcode::ResponseCode;
use crate::dns::resource::DNSResource;

/// TKEY RDATA together with its owner name.
///
/// Key and other data are held hex-encoded, matching how the negotiated
/// key is handed on to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TkeyRecord {
    pub name: String,
    pub algorithm: String,
    pub mode: u16,
    pub inception: u32,
    pub expiration: u32,
    pub key_size: u16,
    pub key: String,
    pub error: u16,
    pub other_size: u16,
    pub other_data: String,
}

impl TkeyRecord {
    pub fn new(
        name: &str,
        algorithm: &str,
        mode: u16,
        inception: u32,
        expiration: u32,
        key_material: &[u8],
    ) -> Result<Self, ParseError> {
        let key_size = u16::try_from(key_material.len()).map_err(|_| {
            ParseError::InvalidRdata(format!("key of {} bytes", key_material.len()))
        })?;
        Ok(Self {
            name: name.to_string(),
            algorithm: algorithm.to_string(),
            mode,
            inception,
            expiration,
            key_size,
            key: hex::encode(key_material),
            error: 0,
            other_size: 0,
            other_data: String::new(),
        })
    }

    pub fn error_code(&self) -> ResponseCode {
        ResponseCode::from(self.error)
    }

    /// Raw key bytes.
    pub fn key_bytes(&self) -> Result<Vec<u8>, ParseError> {
        hex::decode(&self.key).map_err(|e| ParseError::InvalidRdata(format!("key data: {}", e)))
    }

    pub fn to_rdata(&self) -> Result<Vec<u8>, ParseError> {
        let key = self.key_bytes()?;
        if key.len() != self.key_size as usize {
            return Err(ParseError::InvalidRdata(format!(
                "key size {} does not match {} bytes of key data",
                self.key_size,
                key.len()
            )));
        }
        let other = hex::decode(&self.other_data)
            .map_err(|e| ParseError::InvalidRdata(format!("other data: {}", e)))?;
        let other_size = u16::try_from(other.len())
            .map_err(|_| ParseError::InvalidRdata(format!("other data of {} bytes", other.len())))?;

        let mut rdata = name_to_wire(&self.algorithm, false)?;
        rdata.extend_from_slice(&self.inception.to_be_bytes());
        rdata.extend_from_slice(&self.expiration.to_be_bytes());
        rdata.extend_from_slice(&self.mode.to_be_bytes());
        rdata.extend_from_slice(&self.error.to_be_bytes());
        rdata.extend_from_slice(&self.key_size.to_be_bytes());
        rdata.extend_from_slice(&key);
        rdata.extend_from_slice(&other_size.to_be_bytes());
        rdata.extend_from_slice(&other);
        Ok(rdata)
    }

    pub fn from_rdata(name: &str, rdata: &[u8]) -> Result<Self, ParseError> {
        let short = || ParseError::InvalidRdata("TKEY RDATA truncated".to_string());

        let (labels, offset) = parse_uncompressed_name(rdata, 0)?;
        let inception = read_u32(rdata, offset).ok_or_else(short)?;
        let expiration = read_u32(rdata, offset + 4).ok_or_else(short)?;
        let mode = read_u16(rdata, offset + 8).ok_or_else(short)?;
        let error = read_u16(rdata, offset + 10).ok_or_else(short)?;
        let key_size = read_u16(rdata, offset + 12).ok_or_else(short)?;

        let key_start = offset + 14;
        let key_end = key_start + key_size as usize;
        let key = rdata.get(key_start..key_end).ok_or_else(short)?;

        let other_size = read_u16(rdata, key_end).ok_or_else(short)?;
        let other_start = key_end + 2;
        let other_end = other_start + other_size as usize;
        let other = rdata.get(other_start..other_end).ok_or_else(short)?;

        if other_end != rdata.len() {
            return Err(ParseError::InvalidRdata(format!(
                "{} bytes after TKEY RDATA",
                rdata.len() - other_end
            )));
        }

        Ok(Self {
            name: name.to_string(),
            algorithm: name_from_labels(&labels),
            mode,
            inception,
            expiration,
            key_size,
            key: hex::encode(key),
            error,
            other_size,
            other_data: hex::encode(other),
        })
    }

    /// The record as it is placed in a message: class ANY, TTL 0.
    pub fn to_resource(&self) -> Result<DNSResource, ParseError> {
        DNSResource::new(
            &self.name,
            DNSResourceType::TKEY,
            DNSResourceClass::ANY,
            0,
            self.to_rdata()?,
        )
    }

    pub fn from_resource(resource: &DNSResource) -> Result<Self, ParseError> {
        if resource.rtype != DNSResourceType::TKEY {
            return Err(ParseError::InvalidRdata(format!(
                "expected TKEY, found {}",
                resource.rtype
            )));
        }
        Self::from_rdata(&resource.name(), &resource.rdata)
    }
}
