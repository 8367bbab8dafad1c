use bitstream_io::{BitWrite, BitWriter, Endianness};

use super::ParseError;

/// Maximum number of compression pointers followed while decoding one name.
const MAX_POINTER_JUMPS: usize = 16;

pub trait PacketComponent: Sized {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    /// Decodes the component starting at `offset` inside the complete
    /// message `buf` and returns it with the offset just past it.
    fn read_at(buf: &[u8], offset: usize) -> Result<(Self, usize), ParseError>;

    fn write_labels<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<(), ParseError> {
        validate_labels(labels)?;
        for label in labels.iter().filter(|l| !l.is_empty()) {
            writer.write_var::<u8>(8, label.len() as u8)?;
            writer.write_bytes(label.as_bytes())?;
        }
        writer.write_var::<u8>(8, 0)?;

        Ok(())
    }
}

/// Splits a presentation-format name into labels, terminated by the empty
/// root label.
pub fn labels_from_name(name: &str) -> Vec<String> {
    let mut labels: Vec<String> = name
        .split('.')
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect();
    labels.push(String::new());
    labels
}

/// Joins labels back into a fully qualified name ("." for the root).
pub fn name_from_labels(labels: &[String]) -> String {
    let joined = labels
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| l.as_str())
        .collect::<Vec<_>>()
        .join(".");
    format!("{}.", joined)
}

fn validate_labels(labels: &[String]) -> Result<(), ParseError> {
    let mut total = 1;
    for label in labels.iter().filter(|l| !l.is_empty()) {
        if label.len() > 63 {
            return Err(ParseError::LabelTooLong(label.len()));
        }
        total += label.len() + 1;
    }
    if total > 255 {
        return Err(ParseError::NameTooLong);
    }
    Ok(())
}

/// Uncompressed wire form of a name, optionally lowercased for the
/// canonical form RFC 2845 feeds into the MAC.
pub fn name_to_wire(name: &str, canonical: bool) -> Result<Vec<u8>, ParseError> {
    let labels = labels_from_name(name);
    validate_labels(&labels)?;

    let mut out = Vec::with_capacity(name.len() + 2);
    for label in labels.iter().filter(|l| !l.is_empty()) {
        out.push(label.len() as u8);
        if canonical {
            out.extend(label.bytes().map(|b| b.to_ascii_lowercase()));
        } else {
            out.extend_from_slice(label.as_bytes());
        }
    }
    out.push(0);
    Ok(out)
}

/// Decodes a possibly compressed name at `start`.
///
/// Returns the labels (with the trailing root label) and the offset just
/// past the name as it appears at `start`.
pub fn parse_domain_name(data: &[u8], start: usize) -> Result<(Vec<String>, usize), ParseError> {
    let mut labels = Vec::new();
    let mut offset = start;
    let mut resume_at = None;
    let mut jumps = 0;

    loop {
        let len = *data.get(offset).ok_or(ParseError::InvalidLabel)?;

        if (len & 0xC0) == 0xC0 {
            let low = *data.get(offset + 1).ok_or(ParseError::InvalidLabel)?;
            if resume_at.is_none() {
                resume_at = Some(offset + 2);
            }
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return Err(ParseError::InvalidLabel);
            }
            offset = u16::from_be_bytes([len & 0x3F, low]) as usize;
            continue;
        }

        if len == 0 {
            labels.push(String::new());
            return Ok((labels, resume_at.unwrap_or(offset + 1)));
        }

        if len > 63 {
            return Err(ParseError::InvalidLabel);
        }

        let label_start = offset + 1;
        let label_end = label_start + len as usize;
        let raw = data
            .get(label_start..label_end)
            .ok_or(ParseError::InvalidLabel)?;
        let label = String::from_utf8(raw.to_vec()).map_err(|_| ParseError::InvalidLabel)?;
        labels.push(label);
        offset = label_end;
    }
}

/// Decodes a name that must not contain compression pointers, as inside
/// TKEY and TSIG RDATA.
pub fn parse_uncompressed_name(
    data: &[u8],
    start: usize,
) -> Result<(Vec<String>, usize), ParseError> {
    let mut offset = start;
    loop {
        let len = *data.get(offset).ok_or(ParseError::InvalidLabel)?;
        if len == 0 {
            break;
        }
        if len > 63 {
            return Err(ParseError::InvalidLabel);
        }
        offset += 1 + len as usize;
    }
    parse_domain_name(data, start)
}

pub(crate) fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}
