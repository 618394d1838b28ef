//! AARQ (A-Associate Request) APDU.
//!
//! The client's half of the ACSE handshake: application context, optional
//! authentication fields, and the user-information block carrying the
//! xDLMS Initiate-request.

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
    number::streaming::u8 as nom_u8,
};

use super::{
    AARQ_TAG,
    ber::{self, TAG_OBJECT_IDENTIFIER, TAG_OCTET_STRING},
    enums::{ApplicationContext, MECHANISM_OID_PREFIX},
    initiate::InitiateRequest,
};
use crate::session::Authentication;

/// Tag numbers of the AARQ fields this engine reads and writes.
pub const TAG_APPLICATION_CONTEXT: u8 = 0xa1;
pub const TAG_SENDER_ACSE_REQUIREMENTS: u8 = 0x8a;
pub const TAG_MECHANISM_NAME: u8 = 0x8b;
pub const TAG_CALLING_AUTHENTICATION: u8 = 0xac;
pub const TAG_USER_INFORMATION: u8 = 0xbe;

/// The fixed sender-requirements bit string: authentication functional
/// unit requested, 7 unused bits.
pub const ACSE_REQUIREMENTS: [u8; 2] = [0x07, 0x80];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AarqApdu {
    pub application_context: ApplicationContext,
    pub mechanism: Authentication,
    /// Password for Low, client-to-server challenge for the High family.
    pub calling_authentication: Vec<u8>,
    pub initiate: InitiateRequest,
}

impl AarqApdu {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ber::write_tlv(&mut buf, AARQ_TAG, |buf| {
            ber::write_tlv(buf, TAG_APPLICATION_CONTEXT, |buf| {
                ber::write_object_identifier(buf, self.application_context.oid_bytes());
            });
            if self.mechanism != Authentication::None {
                buf.push(TAG_SENDER_ACSE_REQUIREMENTS);
                buf.push(ACSE_REQUIREMENTS.len() as u8);
                buf.extend_from_slice(&ACSE_REQUIREMENTS);

                buf.push(TAG_MECHANISM_NAME);
                buf.push(7);
                buf.extend_from_slice(&MECHANISM_OID_PREFIX);
                buf.push(self.mechanism as u8);

                ber::write_tlv(buf, TAG_CALLING_AUTHENTICATION, |buf| {
                    // GraphicString [0]
                    buf.push(0x80);
                    buf.push(self.calling_authentication.len() as u8);
                    buf.extend_from_slice(&self.calling_authentication);
                });
            }
            ber::write_tlv(buf, TAG_USER_INFORMATION, |buf| {
                ber::write_tlv(buf, TAG_OCTET_STRING, |buf| self.initiate.encode_into(buf));
            });
        });
        buf
    }

    /// Server-role parse. Unrecognized fields are skipped via their own
    /// length.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (rest, (outer_tag, mut body)) = ber::parse_tlv(input)?;
        if outer_tag != AARQ_TAG {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag)));
        }

        let mut application_context = None;
        let mut mechanism = Authentication::None;
        let mut calling_authentication = Vec::new();
        let mut initiate = None;

        while !body.is_empty() {
            let (next, (tag, content)) = ber::parse_tlv(body)?;
            match tag {
                TAG_APPLICATION_CONTEXT => {
                    let (_, oid) = ber::parse_expected(content, TAG_OBJECT_IDENTIFIER)?;
                    application_context = ApplicationContext::from_oid_bytes(oid);
                    if application_context.is_none() {
                        return Err(nom::Err::Failure(NomError::new(body, ErrorKind::Verify)));
                    }
                }
                TAG_MECHANISM_NAME => {
                    mechanism = parse_mechanism(body, content)?;
                }
                TAG_CALLING_AUTHENTICATION => {
                    let (_, value) = parse_authentication_value(content)?;
                    calling_authentication = value.to_vec();
                }
                TAG_USER_INFORMATION => {
                    let (_, inner) = ber::parse_expected(content, TAG_OCTET_STRING)?;
                    let (_, request) = InitiateRequest::parse(inner)?;
                    initiate = Some(request);
                }
                _ => {}
            }
            body = next;
        }

        let application_context =
            application_context.ok_or(nom::Err::Failure(NomError::new(input, ErrorKind::Verify)))?;
        let initiate =
            initiate.ok_or(nom::Err::Failure(NomError::new(input, ErrorKind::Verify)))?;
        Ok((rest, Self { application_context, mechanism, calling_authentication, initiate }))
    }
}

impl fmt::Display for AarqApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AARQ({:?}, {}, {})", self.application_context, self.mechanism, self.initiate)
    }
}

/// Mechanism-name content: implicit 7-byte OID (fixed prefix + mechanism
/// id).
pub(super) fn parse_mechanism<'a>(
    at: &'a [u8],
    content: &'a [u8],
) -> Result<Authentication, nom::Err<NomError<&'a [u8]>>> {
    let Some((&id, prefix)) = content.split_last() else {
        return Err(nom::Err::Failure(NomError::new(at, ErrorKind::Eof)));
    };
    if prefix != MECHANISM_OID_PREFIX {
        return Err(nom::Err::Failure(NomError::new(at, ErrorKind::Verify)));
    }
    Authentication::try_from(id)
        .map_err(|_| nom::Err::Failure(NomError::new(at, ErrorKind::Verify)))
}

/// Authentication-value content: a context-tagged GraphicString, or bare
/// bytes from lenient peers.
pub(super) fn parse_authentication_value(content: &[u8]) -> IResult<&[u8], &[u8]> {
    if content.first() == Some(&0x80) {
        let (inner, _) = nom_u8(content)?;
        let (inner, len) = nom_u8(inner)?;
        if inner.len() < len as usize {
            return Err(nom::Err::Incomplete(nom::Needed::new(len as usize - inner.len())));
        }
        Ok((&inner[len as usize..], &inner[..len as usize]))
    } else {
        Ok((&content[content.len()..], content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::Conformance;

    fn sample(mechanism: Authentication, secret: &[u8]) -> AarqApdu {
        AarqApdu {
            application_context: ApplicationContext::LogicalName,
            mechanism,
            calling_authentication: secret.to_vec(),
            initiate: InitiateRequest::new(Conformance::CLIENT_DEFAULT_LN, 0xffff),
        }
    }

    #[test]
    fn test_plain_aarq_has_no_auth_fields() {
        let encoded = sample(Authentication::None, b"").encode();
        assert_eq!(encoded[0], AARQ_TAG);
        assert!(!encoded.contains(&TAG_MECHANISM_NAME));

        let (_, parsed) = AarqApdu::parse(&encoded).unwrap();
        assert_eq!(parsed.mechanism, Authentication::None);
        assert!(parsed.calling_authentication.is_empty());
    }

    #[test]
    fn test_low_auth_roundtrip() {
        let apdu = sample(Authentication::Low, b"1234");
        let encoded = apdu.encode();

        // sender requirements precede the mechanism name
        let req_at = encoded
            .windows(4)
            .position(|w| w == [TAG_SENDER_ACSE_REQUIREMENTS, 0x02, 0x07, 0x80])
            .unwrap();
        assert_eq!(encoded[req_at + 4], TAG_MECHANISM_NAME);

        let (_, parsed) = AarqApdu::parse(&encoded).unwrap();
        assert_eq!(parsed, apdu);
    }

    #[test]
    fn test_high_auth_carries_challenge() {
        let apdu = sample(Authentication::HighGmac, &[0xde, 0xad, 0xbe, 0xef]);
        let (_, parsed) = AarqApdu::parse(&apdu.encode()).unwrap();
        assert_eq!(parsed.mechanism, Authentication::HighGmac);
        assert_eq!(parsed.calling_authentication, [0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_unknown_context_oid_rejected() {
        let mut encoded = sample(Authentication::None, b"").encode();
        // flip the last OID byte to an undefined context
        let oid_at = encoded.windows(2).position(|w| w == [0x06, 0x07]).unwrap();
        encoded[oid_at + 8] = 0x09;
        assert!(AarqApdu::parse(&encoded).is_err());
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let apdu = sample(Authentication::None, b"");
        let encoded = apdu.encode();

        // splice an unrecognized TLV (calling-AP-title, 0xA6) into the body
        let mut spliced = Vec::from(&encoded[..2]);
        spliced.extend_from_slice(&[0xa6, 0x03, 0x01, 0x02, 0x03]);
        spliced.extend_from_slice(&encoded[2..]);
        spliced[1] += 5;

        let (_, parsed) = AarqApdu::parse(&spliced).unwrap();
        assert_eq!(parsed, apdu);
    }
}
