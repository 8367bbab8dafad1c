pub mod common;
pub mod enums;
pub mod header;
pub mod question;
pub mod rcode;
pub mod resource;

use bitstream_io::{BigEndian, BitWriter};
use common::PacketComponent;
use header::{DNSHeader, HEADER_LEN};
use question::DNSQuestion;
use rcode::ResponseCode;
use resource::DNSResource;
use thiserror::Error;
use tracing::trace;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub resources: Vec<DNSResource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid DNS header")]
    InvalidHeader,
    #[error("Invalid DNS label")]
    InvalidLabel,
    #[error("DNS label of {0} bytes exceeds 63")]
    LabelTooLong(usize),
    #[error("DNS name exceeds 255 bytes")]
    NameTooLong,
    #[error("Invalid question section")]
    InvalidQuestionSection,
    #[error("Invalid answer section")]
    InvalidAnswerSection,
    #[error("Invalid RDATA: {0}")]
    InvalidRdata(String),
    #[error("{0} trailing bytes after message")]
    TrailingData(usize),
    #[error("Invalid bit stream: {0}")]
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::InvalidBitStream(e.to_string())
    }
}

impl DNSPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        trace!("Parsing DNS packet, size: {} bytes", buf.len());
        let (header, mut offset) = DNSHeader::read_at(buf, 0)?;

        let mut packet = DNSPacket {
            header,
            ..Default::default()
        };

        for _ in 0..packet.header.qdcount {
            let (question, next) = DNSQuestion::read_at(buf, offset)?;
            packet.questions.push(question);
            offset = next;
        }

        let (answers, next) = read_section(buf, offset, packet.header.ancount)?;
        packet.answers = answers;
        let (authorities, next) = read_section(buf, next, packet.header.nscount)?;
        packet.authorities = authorities;
        let (resources, next) = read_section(buf, next, packet.header.arcount)?;
        packet.resources = resources;

        if next != buf.len() {
            return Err(ParseError::TrailingData(buf.len() - next));
        }

        Ok(packet)
    }

    /// Encodes the packet. Section counts are taken from the sections
    /// themselves, not from the header fields.
    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut header = self.header.clone();
        header.qdcount = count(self.questions.len())?;
        header.ancount = count(self.answers.len())?;
        header.nscount = count(self.authorities.len())?;
        header.arcount = count(self.resources.len())?;

        let mut buf = Vec::with_capacity(512);
        {
            let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);
            header.write(&mut writer)?;
            for question in &self.questions {
                question.write(&mut writer)?;
            }
            for record in self
                .answers
                .iter()
                .chain(&self.authorities)
                .chain(&self.resources)
            {
                record.write(&mut writer)?;
            }
        }

        Ok(buf)
    }

    pub fn response_code(&self) -> ResponseCode {
        ResponseCode::from(self.header.rcode)
    }
}

fn count(len: usize) -> Result<u16, ParseError> {
    u16::try_from(len).map_err(|_| ParseError::InvalidBitStream(format!("{} records in one section", len)))
}

fn read_section(
    buf: &[u8],
    mut offset: usize,
    records: u16,
) -> Result<(Vec<DNSResource>, usize), ParseError> {
    let mut section = Vec::with_capacity(records as usize);
    for _ in 0..records {
        let (record, next) = DNSResource::read_at(buf, offset)?;
        section.push(record);
        offset = next;
    }
    Ok((section, offset))
}

/// Byte offset at which the last additional record of `buf` starts.
///
/// TSIG is always the last record, and its MAC covers the message as it
/// was before the record was appended, so verification needs this split
/// point in the received bytes rather than a re-encoding.
pub fn last_additional_offset(buf: &[u8]) -> Result<Option<usize>, ParseError> {
    let (header, mut offset) = DNSHeader::read_at(buf, 0)?;
    if header.arcount == 0 {
        return Ok(None);
    }

    for _ in 0..header.qdcount {
        offset = DNSQuestion::read_at(buf, offset)?.1;
    }
    let preceding = header.ancount as usize + header.nscount as usize + header.arcount as usize - 1;
    for _ in 0..preceding {
        offset = DNSResource::read_at(buf, offset)?.1;
    }
    Ok(Some(offset))
}

/// Offset of ARCOUNT inside the header.
pub(crate) const ARCOUNT_OFFSET: usize = HEADER_LEN - 2;
