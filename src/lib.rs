//! Application-layer protocol engine for DLMS/COSEM.
//!
//! DLMS/COSEM is the binary application protocol used to read and write
//! utility meters over serial or TCP links. This crate implements the three
//! protocol cores and nothing else:
//!
//! - [`data`] — the recursive A-XDR codec between a typed [`Value`] and its
//!   tagged wire representation, including the resumable decode needed when
//!   one application message spans several link frames.
//! - [`association`] — the AARQ/AARE handshake that negotiates addressing,
//!   authentication and capabilities for a [`Session`].
//! - [`client`] — the request/response/retry cycle that reassembles
//!   multi-frame and multi-block replies over a caller-supplied
//!   [`transport::Transport`].
//!
//! The COSEM object model (registers, clocks, profiles), concrete transport
//! drivers and configuration formats are deliberately out of scope; they sit
//! on top of the codec and transport seams exposed here.
//!
//! The crate is `no_std`-compatible (`alloc` required); the `std` feature
//! (default) enables the blocking client helpers.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use core::fmt;

pub mod association;
pub mod client;
pub mod data;
pub mod hdlc;
pub mod obis_code;
pub mod reply;
pub mod security;
pub mod session;
pub mod transport;

pub use crate::{
    association::{AssociationReply, Conformance},
    client::{ClientError, DlmsClient},
    data::{DataType, Decoded, Value},
    obis_code::ObisCode,
    reply::{DataAccessResult, MoreData, ReplyData},
    session::{Authentication, Session},
};

/// Errors produced by the wire codecs.
///
/// `Incomplete` is the internal "read more bytes" signal driving frame
/// reassembly; it is consumed by the client loop and normally never reaches
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// More bytes are required before a value or PDU can be decoded. The
    /// optional hint is the number of additional bytes known to be missing.
    Incomplete(Option<usize>),
    /// A data tag byte that is not a known [`DataType`].
    InvalidDataType(u8),
    /// Structurally valid framing around content that does not decode
    /// (non-decimal BCD nibbles, non-binary bit-string text, bad UTF-8).
    MalformedValue,
    /// A wire construct this engine does not implement (compact-array).
    Unsupported,
    /// An association PDU ended before its declared length.
    TruncatedPdu,
    /// An association PDU with an unknown outer tag or broken TLV nesting.
    InvalidPdu,
    /// Association parameters that contradict the negotiated session
    /// (DLMS version, VAA name).
    ProtocolMismatch,
    /// A link frame with a bad format field or frame check sequence.
    InvalidFrame,
    /// The platform randomness source failed while generating a challenge.
    RandomUnavailable,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Incomplete(Some(n)) => write!(f, "incomplete data, {} more bytes needed", n),
            Error::Incomplete(None) => write!(f, "incomplete data"),
            Error::InvalidDataType(tag) => write!(f, "invalid data type tag 0x{:02x}", tag),
            Error::MalformedValue => write!(f, "malformed value content"),
            Error::Unsupported => write!(f, "unsupported wire construct"),
            Error::TruncatedPdu => write!(f, "truncated association PDU"),
            Error::InvalidPdu => write!(f, "invalid association PDU"),
            Error::ProtocolMismatch => write!(f, "protocol parameter mismatch"),
            Error::InvalidFrame => write!(f, "invalid link frame"),
            Error::RandomUnavailable => write!(f, "randomness source unavailable"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl<I> From<nom::Err<nom::error::Error<I>>> for Error {
    fn from(err: nom::Err<nom::error::Error<I>>) -> Self {
        match err {
            nom::Err::Incomplete(nom::Needed::Size(n)) => Error::Incomplete(Some(n.get())),
            nom::Err::Incomplete(_) => Error::Incomplete(None),
            _ => Error::InvalidPdu,
        }
    }
}
