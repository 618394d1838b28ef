//! Conformance bits negotiated during association establishment.
//!
//! The client proposes its conformance in the Initiate-request; the server
//! answers with the negotiated set (bitwise AND of both sides). The value
//! travels as a 24-bit bit string, most significant byte first.

use core::fmt;

/// 24-bit service-conformance bitmask.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Conformance {
    bits: u32,
}

#[rustfmt::skip]
impl Conformance {
    pub const NONE: Self = Self { bits: 0 };

    pub const GENERAL_PROTECTION:              Self = Self { bits: 0x00_0001 };
    pub const GENERAL_BLOCK_TRANSFER:          Self = Self { bits: 0x00_0002 };
    pub const READ:                            Self = Self { bits: 0x00_0004 };
    pub const WRITE:                           Self = Self { bits: 0x00_0008 };
    pub const UNCONFIRMED_WRITE:               Self = Self { bits: 0x00_0010 };
    pub const PRIORITY_MGMT_SUPPORTED:         Self = Self { bits: 0x00_0040 };
    pub const ATTRIBUTE_0_WITH_GET:            Self = Self { bits: 0x00_0080 };
    pub const BLOCK_TRANSFER_WITH_GET_OR_READ: Self = Self { bits: 0x00_0100 };
    pub const BLOCK_TRANSFER_WITH_SET_OR_WRITE: Self = Self { bits: 0x00_0200 };
    pub const BLOCK_TRANSFER_WITH_ACTION:      Self = Self { bits: 0x00_0400 };
    pub const MULTIPLE_REFERENCES:             Self = Self { bits: 0x00_0800 };
    pub const INFORMATION_REPORT:              Self = Self { bits: 0x00_1000 };
    pub const DATA_NOTIFICATION:               Self = Self { bits: 0x00_2000 };
    pub const PARAMETERIZED_ACCESS:            Self = Self { bits: 0x00_4000 };
    pub const GET:                             Self = Self { bits: 0x00_8000 };
    pub const SET:                             Self = Self { bits: 0x01_0000 };
    pub const SELECTIVE_ACCESS:                Self = Self { bits: 0x02_0000 };
    pub const EVENT_NOTIFICATION:              Self = Self { bits: 0x04_0000 };
    pub const ACTION:                          Self = Self { bits: 0x08_0000 };
}

impl Conformance {
    /// Default proposal for a logical-name client.
    pub const CLIENT_DEFAULT_LN: Self = Self {
        bits: Self::GET.bits
            | Self::SET.bits
            | Self::ACTION.bits
            | Self::SELECTIVE_ACCESS.bits
            | Self::EVENT_NOTIFICATION.bits
            | Self::BLOCK_TRANSFER_WITH_GET_OR_READ.bits
            | Self::BLOCK_TRANSFER_WITH_SET_OR_WRITE.bits,
    };

    /// Default proposal for a short-name client.
    pub const CLIENT_DEFAULT_SN: Self = Self {
        bits: Self::READ.bits
            | Self::WRITE.bits
            | Self::INFORMATION_REPORT.bits
            | Self::MULTIPLE_REFERENCES.bits
            | Self::BLOCK_TRANSFER_WITH_GET_OR_READ.bits,
    };

    pub const fn from_bits(bits: u32) -> Self {
        Self { bits: bits & 0x00ff_ffff }
    }

    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// The 3-byte big-endian wire form.
    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self { bits: ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32 }
    }

    pub const fn to_bytes(self) -> [u8; 3] {
        [(self.bits >> 16) as u8, (self.bits >> 8) as u8, self.bits as u8]
    }

    pub const fn contains(self, other: Self) -> bool {
        (self.bits & other.bits) == other.bits
    }

    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }
}

impl core::ops::BitOr for Conformance {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self { bits: self.bits | rhs.bits }
    }
}

impl core::ops::BitOrAssign for Conformance {
    fn bitor_assign(&mut self, rhs: Self) {
        self.bits |= rhs.bits;
    }
}

/// Negotiation is the intersection of proposed and supported sets.
impl core::ops::BitAnd for Conformance {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self { bits: self.bits & rhs.bits }
    }
}

impl fmt::Debug for Conformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Conformance(0x{:06X})", self.bits)
    }
}

impl fmt::Display for Conformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}", self.bits)
    }
}
