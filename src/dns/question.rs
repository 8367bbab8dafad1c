use bitstream_io::{BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::{PacketComponent, labels_from_name, parse_domain_name, read_u16},
    enums::{DNSResourceClass, DNSResourceType},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSQuestion {
    pub labels: Vec<String>,
    pub qtype: DNSResourceType,
    pub qclass: DNSResourceClass,
}

impl DNSQuestion {
    pub fn new(name: &str, qtype: DNSResourceType, qclass: DNSResourceClass) -> Self {
        Self {
            labels: labels_from_name(name),
            qtype,
            qclass,
        }
    }
}

impl PacketComponent for DNSQuestion {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.qtype.into())?;
        writer.write_var::<u16>(16, self.qclass.into())?;
        Ok(())
    }

    fn read_at(buf: &[u8], offset: usize) -> Result<(Self, usize), ParseError> {
        let (labels, offset) = parse_domain_name(buf, offset)?;
        let qtype = read_u16(buf, offset).ok_or(ParseError::InvalidQuestionSection)?;
        let qclass = read_u16(buf, offset + 2).ok_or(ParseError::InvalidQuestionSection)?;
        let question = DNSQuestion {
            labels,
            qtype: qtype.into(),
            qclass: qclass.into(),
        };
        Ok((question, offset + 4))
    }
}
