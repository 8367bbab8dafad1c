use bitstream_io::{BigEndian, BitWrite, BitWriter, Endianness};
use serde::Serialize;
use tracing::trace;

use super::{
    ParseError,
    common::{
        PacketComponent, labels_from_name, name_from_labels, name_to_wire, parse_domain_name,
        read_u16, read_u32,
    },
    enums::{DNSResourceClass, DNSResourceType},
};

/// A resource record with opaque RDATA.
///
/// Names embedded in the RDATA of the types listed in [`embedded_names`]
/// are stored uncompressed, so a record stays valid outside the message it
/// was read from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DNSResource {
    pub labels: Vec<String>,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    pub rdlength: u16,
    #[serde(serialize_with = "hex_bytes")]
    pub rdata: Vec<u8>,
}

fn hex_bytes<S: serde::Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

impl DNSResource {
    pub fn new(
        name: &str,
        rtype: DNSResourceType,
        rclass: DNSResourceClass,
        ttl: u32,
        rdata: Vec<u8>,
    ) -> Result<Self, ParseError> {
        let rdlength = u16::try_from(rdata.len())
            .map_err(|_| ParseError::InvalidRdata(format!("{} bytes of RDATA", rdata.len())))?;
        Ok(Self {
            labels: labels_from_name(name),
            rtype,
            rclass,
            ttl,
            rdlength,
            rdata,
        })
    }

    /// Owner name in presentation form.
    pub fn name(&self) -> String {
        name_from_labels(&self.labels)
    }

    /// Encodes this record on its own, without name compression.
    pub fn to_wire(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = Vec::with_capacity(self.rdata.len() + 32);
        {
            let mut writer = BitWriter::<_, BigEndian>::new(&mut buf);
            self.write(&mut writer)?;
        }
        Ok(buf)
    }
}

impl PacketComponent for DNSResource {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.rtype.into())?;
        writer.write_var::<u16>(16, self.rclass.into())?;
        writer.write_var::<u32>(32, self.ttl)?;
        writer.write_var::<u16>(16, self.rdata.len() as u16)?;
        writer.write_bytes(&self.rdata)?;
        Ok(())
    }

    fn read_at(buf: &[u8], offset: usize) -> Result<(Self, usize), ParseError> {
        let (labels, offset) = parse_domain_name(buf, offset)?;
        let fixed = |at: usize| read_u16(buf, offset + at).ok_or(ParseError::InvalidAnswerSection);
        let rtype = fixed(0)?;
        let rclass = fixed(2)?;
        let ttl = read_u32(buf, offset + 4).ok_or(ParseError::InvalidAnswerSection)?;
        let rdlength = fixed(8)?;

        let rdata_start = offset + 10;
        let rdata_end = rdata_start + rdlength as usize;
        if rdata_end > buf.len() {
            return Err(ParseError::InvalidAnswerSection);
        }

        let rtype = DNSResourceType::from(rtype);
        // RDATA whose names do not decode is kept verbatim for the consumer
        // of the record to reject
        let rdata = match expand_rdata(buf, rtype, rdata_start, rdata_end) {
            Ok(rdata) => rdata,
            Err(e) => {
                trace!("Keeping raw {} RDATA: {}", rtype, e);
                buf[rdata_start..rdata_end].to_vec()
            }
        };
        let rdlength = u16::try_from(rdata.len())
            .map_err(|_| ParseError::InvalidRdata(format!("{} bytes of RDATA", rdata.len())))?;

        let resource = DNSResource {
            labels,
            rtype,
            rclass: rclass.into(),
            ttl,
            rdlength,
            rdata,
        };
        Ok((resource, rdata_end))
    }
}

/// Layout of RDATA that embeds domain names: bytes of fixed fields ahead of
/// the names, then how many consecutive names follow.
fn embedded_names(rtype: DNSResourceType) -> Option<(usize, usize)> {
    match rtype {
        DNSResourceType::NS | DNSResourceType::CNAME | DNSResourceType::PTR => Some((0, 1)),
        DNSResourceType::MX => Some((2, 1)),
        DNSResourceType::SRV => Some((6, 1)),
        DNSResourceType::SOA => Some((0, 2)),
        // algorithm name leads the TKEY RDATA
        DNSResourceType::TKEY => Some((0, 1)),
        _ => None,
    }
}

/// Copies the RDATA at `start..end`, decompressing embedded names against
/// the whole message `buf`.
fn expand_rdata(
    buf: &[u8],
    rtype: DNSResourceType,
    start: usize,
    end: usize,
) -> Result<Vec<u8>, ParseError> {
    let raw = buf.get(start..end).ok_or(ParseError::InvalidAnswerSection)?;
    let Some((fixed, names)) = embedded_names(rtype) else {
        return Ok(raw.to_vec());
    };

    let truncated = || ParseError::InvalidRdata(format!("{} RDATA truncated", rtype));
    let mut rdata = raw.get(..fixed).ok_or_else(truncated)?.to_vec();
    let mut offset = start + fixed;
    for _ in 0..names {
        let (labels, next) = parse_domain_name(buf, offset)?;
        if next > end {
            return Err(truncated());
        }
        rdata.extend_from_slice(&name_to_wire(&name_from_labels(&labels), false)?);
        offset = next;
    }
    rdata.extend_from_slice(&buf[offset..end]);
    Ok(rdata)
}

/// RFC 3597 generic presentation: `owner ttl class type \# len hex`.
impl std::fmt::Display for DNSResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} \\# {} {}",
            self.name(),
            self.ttl,
            self.rclass,
            self.rtype,
            self.rdata.len(),
            hex::encode(&self.rdata)
        )
    }
}
