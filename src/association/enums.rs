//! Closed enumerations of the ACSE handshake fields.

use core::fmt;

use derive_try_from_primitive::TryFromPrimitive;

/// The association-result integer of an AARE (tag 0xA2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum AssociationResult {
    Accepted = 0,
    RejectedPermanent = 1,
    RejectedTransient = 2,
}

impl fmt::Display for AssociationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationResult::Accepted => "accepted".fmt(f),
            AssociationResult::RejectedPermanent => "rejected (permanent)".fmt(f),
            AssociationResult::RejectedTransient => "rejected (transient)".fmt(f),
        }
    }
}

/// The acse-service-user diagnostic nested inside tag 0xA3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum SourceDiagnostic {
    None = 0,
    NoReasonGiven = 1,
    ContextNameNotSupported = 2,
    CallingApTitleNotRecognized = 3,
    AuthenticationMechanismNameNotRecognized = 11,
    AuthenticationMechanismNameRequired = 12,
    AuthenticationFailure = 13,
    AuthenticationRequired = 14,
}

impl fmt::Display for SourceDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDiagnostic::None => "none".fmt(f),
            SourceDiagnostic::NoReasonGiven => "no reason given".fmt(f),
            SourceDiagnostic::ContextNameNotSupported => {
                "application context name not supported".fmt(f)
            }
            SourceDiagnostic::CallingApTitleNotRecognized => {
                "calling AP title not recognized".fmt(f)
            }
            SourceDiagnostic::AuthenticationMechanismNameNotRecognized => {
                "authentication mechanism name not recognized".fmt(f)
            }
            SourceDiagnostic::AuthenticationMechanismNameRequired => {
                "authentication mechanism name required".fmt(f)
            }
            SourceDiagnostic::AuthenticationFailure => "authentication failure".fmt(f),
            SourceDiagnostic::AuthenticationRequired => "authentication required".fmt(f),
        }
    }
}

/// The four fixed application-context OIDs: referencing kind crossed with
/// ciphering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationContext {
    LogicalName,
    ShortName,
    LogicalNameCiphered,
    ShortNameCiphered,
}

impl ApplicationContext {
    pub const fn oid_bytes(self) -> &'static [u8; 7] {
        match self {
            ApplicationContext::LogicalName => &[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01],
            ApplicationContext::ShortName => &[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x02],
            ApplicationContext::LogicalNameCiphered => {
                &[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x03]
            }
            ApplicationContext::ShortNameCiphered => &[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x04],
        }
    }

    pub fn from_oid_bytes(bytes: &[u8]) -> Option<Self> {
        [
            ApplicationContext::LogicalName,
            ApplicationContext::ShortName,
            ApplicationContext::LogicalNameCiphered,
            ApplicationContext::ShortNameCiphered,
        ]
        .into_iter()
        .find(|context| context.oid_bytes() == bytes)
    }

    pub const fn uses_logical_name(self) -> bool {
        matches!(
            self,
            ApplicationContext::LogicalName | ApplicationContext::LogicalNameCiphered
        )
    }

    pub const fn uses_ciphering(self) -> bool {
        matches!(
            self,
            ApplicationContext::LogicalNameCiphered | ApplicationContext::ShortNameCiphered
        )
    }
}

/// Fixed prefix of the mechanism-name OID; the final byte is the
/// [`Authentication`](crate::session::Authentication) mechanism id.
pub const MECHANISM_OID_PREFIX: [u8; 6] = [0x60, 0x85, 0x74, 0x05, 0x08, 0x02];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_oid_lookup() {
        for context in [
            ApplicationContext::LogicalName,
            ApplicationContext::ShortName,
            ApplicationContext::LogicalNameCiphered,
            ApplicationContext::ShortNameCiphered,
        ] {
            assert_eq!(ApplicationContext::from_oid_bytes(context.oid_bytes()), Some(context));
        }
        assert_eq!(
            ApplicationContext::from_oid_bytes(&[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x09]),
            None
        );
    }

    #[test]
    fn test_context_classification() {
        assert!(ApplicationContext::LogicalName.uses_logical_name());
        assert!(!ApplicationContext::LogicalName.uses_ciphering());
        assert!(ApplicationContext::ShortNameCiphered.uses_ciphering());
        assert!(!ApplicationContext::ShortNameCiphered.uses_logical_name());
    }

    #[test]
    fn test_result_and_diagnostic_mapping() {
        use core::convert::TryFrom;

        assert_eq!(AssociationResult::try_from(0), Ok(AssociationResult::Accepted));
        assert_eq!(AssociationResult::try_from(2), Ok(AssociationResult::RejectedTransient));
        assert!(AssociationResult::try_from(3).is_err());

        assert_eq!(SourceDiagnostic::try_from(14), Ok(SourceDiagnostic::AuthenticationRequired));
        assert!(SourceDiagnostic::try_from(9).is_err());
    }
}
