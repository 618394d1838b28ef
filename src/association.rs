//! AARQ/AARE association establishment.
//!
//! The entry points here drive a [`Session`]: [`encode_aarq`] turns the
//! session's proposal into the request APDU, [`parse_aare`] folds the
//! server's answer back into the session and reports a structured outcome.
//! The server-role inverses ([`parse_aarq`], [`encode_aare`]) exist for
//! meter-side use and for exercising the client against a real peer.
//!
//! A rejection is a normal protocol outcome, returned as
//! [`AssociationReply::Rejected`] rather than an error; only wire-level
//! breakage (truncation, broken TLV nesting, contradictory negotiated
//! parameters) comes back as [`Error`].

use alloc::vec::Vec;

pub mod aare;
pub mod aarq;
pub mod ber;
mod conformance;
mod enums;
pub mod initiate;

pub use self::{
    aare::AareApdu,
    aarq::AarqApdu,
    conformance::Conformance,
    enums::{ApplicationContext, AssociationResult, MECHANISM_OID_PREFIX, SourceDiagnostic},
    initiate::{InitiateRequest, InitiateResponse},
};
use crate::{
    Error,
    session::{Authentication, Session},
};

/// ACSE outer tag of an association request.
pub const AARQ_TAG: u8 = 0x60;
/// ACSE outer tag of an association response.
pub const AARE_TAG: u8 = 0x61;
/// The only DLMS version this engine speaks.
pub const DLMS_VERSION: u8 = 6;
/// VAA name selector confirmed by logical-name servers.
pub const VAA_NAME_LN: u16 = 0x0007;
/// VAA name selector confirmed by short-name servers.
pub const VAA_NAME_SN: u16 = 0xfa00;

const CHALLENGE_LEN: usize = 16;

/// Outcome of an association attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationReply {
    Accepted,
    /// The server declined; an expected protocol outcome, distinct from
    /// wire corruption.
    Rejected { result: AssociationResult, diagnostic: SourceDiagnostic },
}

/// Build the AARQ for the session's current proposal.
///
/// High-family mechanisms get a fresh client-to-server challenge unless the
/// session pinned a custom one.
pub fn encode_aarq(session: &mut Session) -> Result<Vec<u8>, Error> {
    if session.authentication.uses_challenges() {
        session.set_ctos_challenge(generate_challenge()?);
    }
    let calling_authentication = match session.authentication {
        Authentication::None => Vec::new(),
        Authentication::Low => session.password.clone(),
        _ => session.ctos_challenge().to_vec(),
    };
    let apdu = AarqApdu {
        application_context: context_for(session),
        mechanism: session.authentication,
        calling_authentication,
        initiate: InitiateRequest::new(session.conformance, session.max_receive_pdu_size),
    };
    Ok(apdu.encode())
}

/// Fold the server's AARE into the session.
///
/// On acceptance the negotiated conformance and PDU size are copied from
/// the Initiate-response; the proposal is never assumed to have survived
/// negotiation intact.
pub fn parse_aare(session: &mut Session, bytes: &[u8]) -> Result<AssociationReply, Error> {
    let (_, apdu) = AareApdu::parse(bytes).map_err(classify)?;

    if let Some(mechanism) = apdu.mechanism {
        session.authentication = mechanism;
    }
    if let Some(challenge) = apdu.stoc_challenge {
        session.set_stoc_challenge(challenge);
    }

    let context_ok = apdu
        .application_context
        .is_some_and(|c| c.uses_logical_name() == session.use_logical_name_referencing);
    if !context_ok {
        return Ok(AssociationReply::Rejected {
            result: AssociationResult::RejectedPermanent,
            diagnostic: SourceDiagnostic::ContextNameNotSupported,
        });
    }
    if apdu.result != AssociationResult::Accepted {
        return Ok(AssociationReply::Rejected { result: apdu.result, diagnostic: apdu.diagnostic });
    }

    let initiate = apdu.initiate.ok_or(Error::InvalidPdu)?;
    if initiate.dlms_version != DLMS_VERSION {
        return Err(Error::ProtocolMismatch);
    }
    if initiate.vaa_name != expected_vaa(session) {
        return Err(Error::ProtocolMismatch);
    }
    session.conformance = initiate.negotiated_conformance;
    session.max_receive_pdu_size = initiate.server_max_receive_pdu_size;
    Ok(AssociationReply::Accepted)
}

/// Server-role: fold a client's AARQ into the session.
pub fn parse_aarq(session: &mut Session, bytes: &[u8]) -> Result<AarqApdu, Error> {
    let (_, apdu) = AarqApdu::parse(bytes).map_err(classify)?;

    session.use_logical_name_referencing = apdu.application_context.uses_logical_name();
    session.authentication = apdu.mechanism;
    match apdu.mechanism {
        Authentication::None => {}
        Authentication::Low => session.password = apdu.calling_authentication.clone(),
        _ => session.set_ctos_challenge(apdu.calling_authentication.clone()),
    }
    session.conformance = session.conformance & apdu.initiate.proposed_conformance;
    session.max_receive_pdu_size =
        session.max_receive_pdu_size.min(apdu.initiate.client_max_receive_pdu_size);
    Ok(apdu)
}

/// Server-role: build the AARE for a verdict.
///
/// `AuthenticationRequired` additionally carries the mechanism and a fresh
/// server-to-client challenge.
pub fn encode_aare(
    session: &mut Session,
    result: AssociationResult,
    diagnostic: SourceDiagnostic,
) -> Result<Vec<u8>, Error> {
    let mut apdu = AareApdu {
        application_context: Some(context_for(session)),
        result,
        diagnostic,
        mechanism: None,
        stoc_challenge: None,
        initiate: None,
    };
    if diagnostic == SourceDiagnostic::AuthenticationRequired {
        session.set_stoc_challenge(generate_challenge()?);
        apdu.mechanism = Some(session.authentication);
        apdu.stoc_challenge = Some(session.stoc_challenge().to_vec());
    }
    if result == AssociationResult::Accepted {
        apdu.initiate = Some(InitiateResponse::new(
            session.conformance,
            session.max_receive_pdu_size,
            expected_vaa(session),
        ));
    }
    Ok(apdu.encode())
}

fn context_for(session: &Session) -> ApplicationContext {
    match (session.use_logical_name_referencing, session.authentication) {
        (true, Authentication::HighGmac) => ApplicationContext::LogicalNameCiphered,
        (false, Authentication::HighGmac) => ApplicationContext::ShortNameCiphered,
        (true, _) => ApplicationContext::LogicalName,
        (false, _) => ApplicationContext::ShortName,
    }
}

fn expected_vaa(session: &Session) -> u16 {
    if session.use_logical_name_referencing { VAA_NAME_LN } else { VAA_NAME_SN }
}

fn classify(err: nom::Err<nom::error::Error<&[u8]>>) -> Error {
    match err {
        nom::Err::Incomplete(_) => Error::TruncatedPdu,
        _ => Error::InvalidPdu,
    }
}

fn generate_challenge() -> Result<Vec<u8>, Error> {
    let mut challenge = alloc::vec![0u8; CHALLENGE_LEN];
    getrandom::getrandom(&mut challenge).map_err(|_| Error::RandomUnavailable)?;
    Ok(challenge)
}
