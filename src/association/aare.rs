//! AARE (A-Associate Response) APDU.
//!
//! The server's verdict on an AARQ: result, diagnostic, optional
//! authentication counter-material, and the negotiated xDLMS
//! Initiate-response.

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
};

use super::{
    AARE_TAG, AARQ_TAG,
    aarq::{ACSE_REQUIREMENTS, parse_authentication_value, parse_mechanism},
    ber::{self, TAG_INTEGER, TAG_OBJECT_IDENTIFIER, TAG_OCTET_STRING},
    enums::{ApplicationContext, AssociationResult, MECHANISM_OID_PREFIX, SourceDiagnostic},
    initiate::InitiateResponse,
};
use crate::session::Authentication;

pub const TAG_APPLICATION_CONTEXT: u8 = 0xa1;
pub const TAG_RESULT: u8 = 0xa2;
pub const TAG_SOURCE_DIAGNOSTIC: u8 = 0xa3;
pub const TAG_RESPONDER_ACSE_REQUIREMENTS: u8 = 0x88;
pub const TAG_RESPONDER_MECHANISM_NAME: u8 = 0x89;
pub const TAG_RESPONDING_AUTHENTICATION: u8 = 0xaa;
pub const TAG_USER_INFORMATION: u8 = 0xbe;

/// Legacy devices echo the handshake under these outer tags; they are
/// tolerated on parse, never emitted.
const LEGACY_OUTER_TAGS: [u8; 3] = [AARQ_TAG, 0x80, 0x81];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AareApdu {
    /// `None` when the server answered with an OID outside the known set.
    pub application_context: Option<ApplicationContext>,
    pub result: AssociationResult,
    pub diagnostic: SourceDiagnostic,
    pub mechanism: Option<Authentication>,
    pub stoc_challenge: Option<Vec<u8>>,
    pub initiate: Option<InitiateResponse>,
}

impl AareApdu {
    /// Server-role encode.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ber::write_tlv(&mut buf, AARE_TAG, |buf| {
            if let Some(context) = self.application_context {
                ber::write_tlv(buf, TAG_APPLICATION_CONTEXT, |buf| {
                    ber::write_object_identifier(buf, context.oid_bytes());
                });
            }
            ber::write_tlv(buf, TAG_RESULT, |buf| {
                buf.push(TAG_INTEGER);
                buf.push(1);
                buf.push(self.result as u8);
            });
            ber::write_tlv(buf, TAG_SOURCE_DIAGNOSTIC, |buf| {
                // acse-service-user [1]
                ber::write_tlv(buf, 0xa1, |buf| {
                    buf.push(TAG_INTEGER);
                    buf.push(1);
                    buf.push(self.diagnostic as u8);
                });
            });
            if let Some(mechanism) = self.mechanism {
                buf.push(TAG_RESPONDER_ACSE_REQUIREMENTS);
                buf.push(ACSE_REQUIREMENTS.len() as u8);
                buf.extend_from_slice(&ACSE_REQUIREMENTS);

                buf.push(TAG_RESPONDER_MECHANISM_NAME);
                buf.push(7);
                buf.extend_from_slice(&MECHANISM_OID_PREFIX);
                buf.push(mechanism as u8);
            }
            if let Some(challenge) = &self.stoc_challenge {
                ber::write_tlv(buf, TAG_RESPONDING_AUTHENTICATION, |buf| {
                    buf.push(0x80);
                    buf.push(challenge.len() as u8);
                    buf.extend_from_slice(challenge);
                });
            }
            if let Some(initiate) = &self.initiate {
                ber::write_tlv(buf, TAG_USER_INFORMATION, |buf| {
                    ber::write_tlv(buf, TAG_OCTET_STRING, |buf| initiate.encode_into(buf));
                });
            }
        });
        buf
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (rest, (outer_tag, mut body)) = ber::parse_tlv(input)?;
        if outer_tag != AARE_TAG && !LEGACY_OUTER_TAGS.contains(&outer_tag) {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag)));
        }

        let mut apdu = AareApdu {
            application_context: None,
            result: AssociationResult::Accepted,
            diagnostic: SourceDiagnostic::None,
            mechanism: None,
            stoc_challenge: None,
            initiate: None,
        };

        while !body.is_empty() {
            let (next, (tag, content)) = ber::parse_tlv(body)?;
            match tag {
                TAG_APPLICATION_CONTEXT => {
                    let (_, oid) = ber::parse_expected(content, TAG_OBJECT_IDENTIFIER)?;
                    // unknown OIDs surface as a rejection, not a parse error
                    apdu.application_context = ApplicationContext::from_oid_bytes(oid);
                }
                TAG_RESULT => {
                    let value = parse_ber_integer(body, content)?;
                    apdu.result = AssociationResult::try_from(value)
                        .map_err(|_| nom::Err::Failure(NomError::new(body, ErrorKind::Verify)))?;
                }
                TAG_SOURCE_DIAGNOSTIC => {
                    // acse-service-user [1] or acse-service-provider [2]
                    let (_, (_, nested)) = ber::parse_tlv(content)?;
                    let value = parse_ber_integer(body, nested)?;
                    apdu.diagnostic = SourceDiagnostic::try_from(value)
                        .map_err(|_| nom::Err::Failure(NomError::new(body, ErrorKind::Verify)))?;
                }
                TAG_RESPONDER_ACSE_REQUIREMENTS | 0x8a => {}
                TAG_RESPONDER_MECHANISM_NAME | 0x8b => {
                    apdu.mechanism = Some(parse_mechanism(body, content)?);
                }
                TAG_RESPONDING_AUTHENTICATION => {
                    let (_, value) = parse_authentication_value(content)?;
                    apdu.stoc_challenge = Some(value.to_vec());
                }
                TAG_USER_INFORMATION => {
                    let (_, inner) = ber::parse_expected(content, TAG_OCTET_STRING)?;
                    let (_, response) = InitiateResponse::parse(inner)?;
                    apdu.initiate = Some(response);
                }
                _ => {}
            }
            body = next;
        }

        Ok((rest, apdu))
    }
}

impl fmt::Display for AareApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AARE({}, {})", self.result, self.diagnostic)
    }
}

fn parse_ber_integer<'a>(
    at: &'a [u8],
    content: &'a [u8],
) -> Result<u8, nom::Err<NomError<&'a [u8]>>> {
    match content {
        [TAG_INTEGER, 1, value] => Ok(*value),
        // some meters omit the integer wrapper
        [value] => Ok(*value),
        _ => Err(nom::Err::Failure(NomError::new(at, ErrorKind::Verify))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::{Conformance, VAA_NAME_LN};

    fn accepted() -> AareApdu {
        AareApdu {
            application_context: Some(ApplicationContext::LogicalName),
            result: AssociationResult::Accepted,
            diagnostic: SourceDiagnostic::None,
            mechanism: None,
            stoc_challenge: None,
            initiate: Some(InitiateResponse::new(
                Conformance::CLIENT_DEFAULT_LN,
                0x0400,
                VAA_NAME_LN,
            )),
        }
    }

    #[test]
    fn test_accepted_roundtrip() {
        let apdu = accepted();
        let encoded = apdu.encode();
        assert_eq!(encoded[0], AARE_TAG);

        let (rest, parsed) = AareApdu::parse(&encoded).unwrap();
        assert_eq!(rest, &[] as &[u8]);
        assert_eq!(parsed, apdu);
    }

    #[test]
    fn test_authentication_required_roundtrip() {
        let mut apdu = accepted();
        apdu.result = AssociationResult::RejectedPermanent;
        apdu.diagnostic = SourceDiagnostic::AuthenticationRequired;
        apdu.mechanism = Some(Authentication::HighGmac);
        apdu.stoc_challenge = Some(alloc::vec![0x51; 16]);
        apdu.initiate = None;

        let (_, parsed) = AareApdu::parse(&apdu.encode()).unwrap();
        assert_eq!(parsed, apdu);
    }

    #[test]
    fn test_legacy_outer_tag_tolerated() {
        let mut encoded = accepted().encode();
        for legacy in [0x60, 0x80, 0x81] {
            encoded[0] = legacy;
            assert!(AareApdu::parse(&encoded).is_ok(), "outer tag 0x{:02x}", legacy);
        }
        encoded[0] = 0x41;
        assert!(AareApdu::parse(&encoded).is_err());
    }

    #[test]
    fn test_bare_result_integer_tolerated() {
        // result TLV without the inner INTEGER wrapper
        let mut buf = Vec::new();
        ber::write_tlv(&mut buf, AARE_TAG, |buf| {
            buf.extend_from_slice(&[TAG_RESULT, 0x01, 0x01]);
        });
        let (_, parsed) = AareApdu::parse(&buf).unwrap();
        assert_eq!(parsed.result, AssociationResult::RejectedPermanent);
    }

    #[test]
    fn test_unknown_context_is_not_an_error() {
        let mut encoded = accepted().encode();
        let oid_at = encoded.windows(2).position(|w| w == [0x06, 0x07]).unwrap();
        encoded[oid_at + 8] = 0x77;
        let (_, parsed) = AareApdu::parse(&encoded).unwrap();
        assert_eq!(parsed.application_context, None);
    }

    #[test]
    fn test_truncated_is_incomplete() {
        let encoded = accepted().encode();
        assert!(matches!(
            AareApdu::parse(&encoded[..encoded.len() / 2]),
            Err(nom::Err::Incomplete(_))
        ));
    }
}
