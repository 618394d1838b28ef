//! Minimal BER (definite-form) TLV helpers for the ACSE handshake.
//!
//! Only what AARQ/AARE need: single-byte tags, lengths up to 0xFFFF, and
//! the handful of universal types (OID, BIT STRING, OCTET STRING). Writers
//! append to a caller buffer and patch the length after the body is known.

use alloc::vec::Vec;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
    number::streaming::u8 as nom_u8,
};

pub const TAG_OBJECT_IDENTIFIER: u8 = 0x06;
pub const TAG_BIT_STRING: u8 = 0x03;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_INTEGER: u8 = 0x02;

/// Append a definite-form length.
pub fn write_length(buf: &mut Vec<u8>, length: usize) {
    if length <= 0x7f {
        buf.push(length as u8);
    } else if length <= 0xff {
        buf.push(0x81);
        buf.push(length as u8);
    } else {
        buf.push(0x82);
        buf.extend_from_slice(&(length as u16).to_be_bytes());
    }
}

/// Append a TLV whose body is produced by `body`; the length field is
/// patched in afterwards.
pub fn write_tlv(buf: &mut Vec<u8>, tag: u8, body: impl FnOnce(&mut Vec<u8>)) {
    buf.push(tag);
    let length_at = buf.len();
    buf.push(0);
    body(buf);
    let length = buf.len() - length_at - 1;
    if length <= 0x7f {
        buf[length_at] = length as u8;
    } else {
        // re-emit with a long-form length
        let body_bytes = buf.split_off(length_at + 1);
        buf.pop();
        write_length(buf, body_bytes.len());
        buf.extend_from_slice(&body_bytes);
    }
}

pub fn write_object_identifier(buf: &mut Vec<u8>, oid: &[u8]) {
    write_tlv(buf, TAG_OBJECT_IDENTIFIER, |buf| buf.extend_from_slice(oid));
}

/// BER bit string: one unused-bits byte, then the packed bits.
pub fn write_bit_string(buf: &mut Vec<u8>, bits: &[u8], unused_bits: u8) {
    write_tlv(buf, TAG_BIT_STRING, |buf| {
        buf.push(unused_bits);
        buf.extend_from_slice(bits);
    });
}

pub fn write_octet_string(buf: &mut Vec<u8>, octets: &[u8]) {
    write_tlv(buf, TAG_OCTET_STRING, |buf| buf.extend_from_slice(octets));
}

/// Parse a definite-form length.
pub fn parse_length(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, first) = nom_u8(input)?;
    if first & 0x80 == 0 {
        return Ok((input, first as usize));
    }
    let octets = (first & 0x7f) as usize;
    if octets == 0 || octets > 2 {
        return Err(nom::Err::Failure(NomError::new(input, ErrorKind::LengthValue)));
    }
    let mut length = 0usize;
    let mut input = input;
    for _ in 0..octets {
        let (rest, byte) = nom_u8(input)?;
        length = (length << 8) | byte as usize;
        input = rest;
    }
    Ok((input, length))
}

/// Parse one TLV, returning the tag and a borrowed content slice.
pub fn parse_tlv(input: &[u8]) -> IResult<&[u8], (u8, &[u8])> {
    let (input, tag) = nom_u8(input)?;
    let (input, length) = parse_length(input)?;
    if input.len() < length {
        return Err(nom::Err::Incomplete(nom::Needed::new(length - input.len())));
    }
    Ok((&input[length..], (tag, &input[..length])))
}

/// Parse a TLV expected to carry a specific tag.
pub fn parse_expected(input: &[u8], expected_tag: u8) -> IResult<&[u8], &[u8]> {
    let (rest, (tag, content)) = parse_tlv(input)?;
    if tag != expected_tag {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
    }
    Ok((rest, content))
}

/// Parse a BER bit string content into (bits, unused_bits).
pub fn parse_bit_string(input: &[u8]) -> IResult<&[u8], (&[u8], u8)> {
    let (rest, content) = parse_expected(input, TAG_BIT_STRING)?;
    let (bits, unused) = match content.split_first() {
        Some((&unused, bits)) => (bits, unused),
        None => return Err(nom::Err::Error(NomError::new(input, ErrorKind::Eof))),
    };
    Ok((rest, (bits, unused)))
}
