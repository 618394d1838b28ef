//! xDLMS Initiate-request/-response, the innermost payload of the
//! user-information block.
//!
//! Layout (A-XDR): service tag, optional fields as presence bytes, the
//! DLMS version, the conformance block (`5F 1F`, length 4, one unused-bits
//! byte, three bit-mask bytes) and the max PDU size. The response appends
//! the VAA name selector.

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult, Parser,
    bytes::streaming::take,
    error::{Error as NomError, ErrorKind},
    number::streaming::{be_u16, u8 as nom_u8},
};

use super::Conformance;

pub const INITIATE_REQUEST_TAG: u8 = 0x01;
pub const INITIATE_RESPONSE_TAG: u8 = 0x08;

const CONFORMANCE_BLOCK: [u8; 4] = [0x5f, 0x1f, 0x04, 0x00];

/// Client half of the xDLMS negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateRequest {
    pub dedicated_key: Option<Vec<u8>>,
    pub dlms_version: u8,
    pub proposed_conformance: Conformance,
    pub client_max_receive_pdu_size: u16,
}

impl InitiateRequest {
    pub fn new(conformance: Conformance, max_pdu_size: u16) -> Self {
        Self {
            dedicated_key: None,
            dlms_version: 6,
            proposed_conformance: conformance,
            client_max_receive_pdu_size: max_pdu_size,
        }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(INITIATE_REQUEST_TAG);
        match &self.dedicated_key {
            Some(key) => {
                buf.push(0x01);
                buf.push(key.len() as u8);
                buf.extend_from_slice(key);
            }
            None => buf.push(0x00),
        }
        // response-allowed and quality-of-service, both defaulted
        buf.push(0x00);
        buf.push(0x00);
        buf.push(self.dlms_version);
        buf.extend_from_slice(&CONFORMANCE_BLOCK);
        buf.extend_from_slice(&self.proposed_conformance.to_bytes());
        buf.extend_from_slice(&self.client_max_receive_pdu_size.to_be_bytes());
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, service_tag) = nom_u8(input)?;
        if service_tag != INITIATE_REQUEST_TAG {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, key_present) = nom_u8(input)?;
        let (input, dedicated_key) = if key_present != 0 {
            let (input, len) = nom_u8(input)?;
            let (input, key) = take(len as usize).parse(input)?;
            (input, Some(key.to_vec()))
        } else {
            (input, None)
        };
        let (input, _response_allowed) = nom_u8(input)?;
        let (input, qos_present) = nom_u8(input)?;
        let (input, _) = if qos_present != 0 { nom_u8(input)? } else { (input, 0) };
        let (input, dlms_version) = nom_u8(input)?;
        let (input, conformance) = parse_conformance_block(input)?;
        let (input, client_max_receive_pdu_size) = be_u16(input)?;
        Ok((
            input,
            Self {
                dedicated_key,
                dlms_version,
                proposed_conformance: conformance,
                client_max_receive_pdu_size,
            },
        ))
    }
}

impl fmt::Display for InitiateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InitiateRequest(v{}, conformance {}, max_pdu {})",
            self.dlms_version, self.proposed_conformance, self.client_max_receive_pdu_size
        )
    }
}

/// Server half: the negotiated parameters plus the VAA name selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateResponse {
    pub dlms_version: u8,
    pub negotiated_conformance: Conformance,
    pub server_max_receive_pdu_size: u16,
    pub vaa_name: u16,
}

impl InitiateResponse {
    pub fn new(conformance: Conformance, max_pdu_size: u16, vaa_name: u16) -> Self {
        Self {
            dlms_version: 6,
            negotiated_conformance: conformance,
            server_max_receive_pdu_size: max_pdu_size,
            vaa_name,
        }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(INITIATE_RESPONSE_TAG);
        // quality-of-service, defaulted
        buf.push(0x00);
        buf.push(self.dlms_version);
        buf.extend_from_slice(&CONFORMANCE_BLOCK);
        buf.extend_from_slice(&self.negotiated_conformance.to_bytes());
        buf.extend_from_slice(&self.server_max_receive_pdu_size.to_be_bytes());
        buf.extend_from_slice(&self.vaa_name.to_be_bytes());
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, service_tag) = nom_u8(input)?;
        if service_tag != INITIATE_RESPONSE_TAG {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, qos_present) = nom_u8(input)?;
        let (input, _) = if qos_present != 0 { nom_u8(input)? } else { (input, 0) };
        let (input, dlms_version) = nom_u8(input)?;
        let (input, conformance) = parse_conformance_block(input)?;
        let (input, server_max_receive_pdu_size) = be_u16(input)?;
        let (input, vaa_name) = be_u16(input)?;
        Ok((
            input,
            Self {
                dlms_version,
                negotiated_conformance: conformance,
                server_max_receive_pdu_size,
                vaa_name,
            },
        ))
    }
}

impl fmt::Display for InitiateResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InitiateResponse(v{}, conformance {}, max_pdu {}, vaa 0x{:04X})",
            self.dlms_version,
            self.negotiated_conformance,
            self.server_max_receive_pdu_size,
            self.vaa_name
        )
    }
}

fn parse_conformance_block(input: &[u8]) -> IResult<&[u8], Conformance> {
    let (input, header) = take(4usize).parse(input)?;
    if header[..2] != CONFORMANCE_BLOCK[..2] || header[2] != 0x04 {
        return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag)));
    }
    let (input, bytes) = take(3usize).parse(input)?;
    Ok((input, Conformance::from_bytes([bytes[0], bytes[1], bytes[2]])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_layout() {
        let request = InitiateRequest::new(Conformance::from_bits(0x001c_1c), 0xffff);
        let mut buf = Vec::new();
        request.encode_into(&mut buf);
        assert_eq!(
            buf,
            [0x01, 0x00, 0x00, 0x00, 0x06, 0x5f, 0x1f, 0x04, 0x00, 0x00, 0x1c, 0x1c, 0xff, 0xff]
        );
    }

    #[test]
    fn test_request_roundtrip_with_dedicated_key() {
        let mut request = InitiateRequest::new(Conformance::CLIENT_DEFAULT_LN, 1024);
        request.dedicated_key = Some(alloc::vec![0x11; 16]);

        let mut buf = Vec::new();
        request.encode_into(&mut buf);
        let (rest, parsed) = InitiateRequest::parse(&buf).unwrap();
        assert_eq!(rest, &[] as &[u8]);
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_response_roundtrip() {
        let response = InitiateResponse::new(Conformance::CLIENT_DEFAULT_LN, 0x0400, 0x0007);
        let mut buf = Vec::new();
        response.encode_into(&mut buf);
        assert_eq!(buf[0], INITIATE_RESPONSE_TAG);

        let (rest, parsed) = InitiateResponse::parse(&buf).unwrap();
        assert_eq!(rest, &[] as &[u8]);
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_bad_conformance_header() {
        // 0x5F 0x1F replaced by garbage
        let bytes = [0x08, 0x00, 0x06, 0x5f, 0x20, 0x04, 0x00, 0, 0, 0, 0x04, 0x00, 0x00, 0x07];
        assert!(matches!(InitiateResponse::parse(&bytes), Err(nom::Err::Failure(_))));
    }

    #[test]
    fn test_truncated_is_incomplete() {
        let response = InitiateResponse::new(Conformance::CLIENT_DEFAULT_LN, 0x0400, 0x0007);
        let mut buf = Vec::new();
        response.encode_into(&mut buf);
        assert!(matches!(
            InitiateResponse::parse(&buf[..buf.len() - 2]),
            Err(nom::Err::Incomplete(_))
        ));
    }
}
