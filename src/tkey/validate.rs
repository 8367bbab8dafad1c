use serde::Serialize;
use tracing::debug;

use super::TkeyRecord;
use crate::dns::DNSPacket;
use crate::dns::enums::DNSResourceType;
use crate::dns::resource::DNSResource;
use crate::error::{ExchangeError, Result};

/// Outcome of a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeResult {
    pub tkey: TkeyRecord,
    /// Non-TKEY answers, in the order the server sent them
    pub additional_records: Vec<DNSResource>,
}

/// Checks a TKEY reply and extracts its single TKEY answer.
///
/// RFC 2930 reports key establishment failures inside the TKEY record, so
/// a NOERROR reply can still fail on the embedded error field.
pub fn validate_response(response: &DNSPacket) -> Result<ExchangeResult> {
    let rcode = response.response_code();
    if !rcode.is_success() {
        return Err(ExchangeError::ServerError(rcode));
    }

    let mut tkey_answer = None;
    let mut additional_records = Vec::new();

    for answer in &response.answers {
        if answer.rtype == DNSResourceType::TKEY {
            if tkey_answer.is_some() {
                return Err(ExchangeError::MultipleTkeyAnswers);
            }
            tkey_answer = Some(answer);
        } else {
            additional_records.push(answer.clone());
        }
    }

    let tkey_answer = tkey_answer.ok_or(ExchangeError::NoTkeyAnswer)?;
    let tkey = TkeyRecord::from_resource(tkey_answer)
        .map_err(|e| ExchangeError::MalformedTkey(e.to_string()))?;

    let error = tkey.error_code();
    if !error.is_success() {
        return Err(ExchangeError::TkeyProtocolError(error));
    }

    debug!(
        "Validated TKEY answer for {} (mode={}, expiration={}, {} additional records)",
        tkey.name,
        tkey.mode,
        tkey.expiration,
        additional_records.len()
    );

    Ok(ExchangeResult {
        tkey,
        additional_records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::enums::DNSResourceClass;
    use crate::dns::rcode::ResponseCode;

    fn tkey_answer(error: u16) -> DNSResource {
        let mut record =
            TkeyRecord::new("k.example.", "gss-tsig.", 3, 100, 200, &[0xAB, 0xCD]).unwrap();
        record.error = error;
        record.to_resource().unwrap()
    }

    fn other_answer(ttl: u32) -> DNSResource {
        DNSResource::new(
            "k.example.",
            DNSResourceType::Other(65280),
            DNSResourceClass::IN,
            ttl,
            vec![1, 2, 3],
        )
        .unwrap()
    }

    fn response(rcode: u8, answers: Vec<DNSResource>) -> DNSPacket {
        let mut packet = DNSPacket::default();
        packet.header.qr = true;
        packet.header.rcode = rcode;
        packet.answers = answers;
        packet
    }

    #[test]
    fn test_single_tkey_answer_succeeds() {
        let result = validate_response(&response(
            0,
            vec![other_answer(1), tkey_answer(0), other_answer(2)],
        ))
        .unwrap();

        assert_eq!(result.tkey.key, "abcd");
        assert_eq!(result.tkey.key_size, 2);
        assert_eq!(result.additional_records, vec![other_answer(1), other_answer(2)]);
    }

    #[test]
    fn test_server_error_carries_rcode() {
        let err = validate_response(&response(5, vec![tkey_answer(0)])).unwrap_err();
        assert_eq!(err, ExchangeError::ServerError(ResponseCode::Refused));
        assert_eq!(err.to_string(), "DNS error: REFUSED (5)");
    }

    #[test]
    fn test_multiple_tkey_answers() {
        let err = validate_response(&response(0, vec![tkey_answer(0), tkey_answer(0)])).unwrap_err();
        assert_eq!(err, ExchangeError::MultipleTkeyAnswers);
    }

    #[test]
    fn test_missing_tkey_answer() {
        let err = validate_response(&response(0, vec![other_answer(1)])).unwrap_err();
        assert_eq!(err, ExchangeError::NoTkeyAnswer);
        let err = validate_response(&response(0, vec![])).unwrap_err();
        assert_eq!(err, ExchangeError::NoTkeyAnswer);
    }

    #[test]
    fn test_embedded_error_fails_despite_noerror() {
        let err = validate_response(&response(0, vec![tkey_answer(17)])).unwrap_err();
        assert_eq!(err, ExchangeError::TkeyProtocolError(ResponseCode::BadKey));
        assert_eq!(err.to_string(), "TKEY error: BADKEY (17)");
    }

    #[test]
    fn test_compressed_algorithm_name_is_accepted() {
        let mut bytes = vec![0x00, 0x01, 0x80, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
        // Question "gss-tsig." TKEY ANY at offset 12
        bytes.extend_from_slice(b"\x08gss-tsig\x00\x00\xf9\x00\xff");
        bytes.extend_from_slice(b"\x01k\x07example\x00\x00\xf9\x00\xff\x00\x00\x00\x00\x00\x13");
        // Algorithm name is a pointer back to the question name
        bytes.extend_from_slice(&[0xc0, 0x0c, 0, 0, 0, 10, 0, 0, 0, 20, 0, 3, 0, 0, 0, 1, 0xaa, 0, 0]);

        let packet = DNSPacket::parse(&bytes).unwrap();
        let result = validate_response(&packet).unwrap();
        assert_eq!(result.tkey.name, "k.example.");
        assert_eq!(result.tkey.algorithm, "gss-tsig.");
        assert_eq!(result.tkey.key, "aa");
        assert_eq!((result.tkey.inception, result.tkey.expiration), (10, 20));
    }

    #[test]
    fn test_undecodable_tkey_answer() {
        let mut broken = tkey_answer(0);
        broken.rdata.truncate(5);
        let err = validate_response(&response(0, vec![broken])).unwrap_err();
        assert!(matches!(err, ExchangeError::MalformedTkey(_)));
    }
}
