//! A-XDR codec between typed [`Value`]s and the tagged DLMS wire format.
//!
//! Every encoded value starts with a one-byte [`DataType`] tag followed by a
//! type-specific payload; the date/time family is the mandated exception and
//! travels under the octet-string tag. All length-prefixed payloads use the
//! variable-length [`encode_object_count`] prefix.
//!
//! Decoding is built on `nom` streaming parsers: a buffer that ends before
//! the declared payload yields [`Decoded::Incomplete`] without consuming
//! anything, so the caller can retry once the next link frame arrives.
//! Arrays and structures additionally support a resumable [`ArrayCursor`] so
//! elements already resolved are not re-parsed on the retry.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use core::convert::TryFrom;
use core::fmt;

use derive_try_from_primitive::TryFromPrimitive;
use nom::{
    IResult, Parser,
    bytes::streaming::take,
    error::{Error as NomError, ErrorKind},
    number::streaming::{
        be_f32, be_f64, be_i16, be_i32, be_i64, be_u16, be_u32, be_u64, i8 as nom_i8,
        u8 as nom_u8,
    },
};

use crate::Error;

mod datetime;

pub use self::datetime::{ClockStatus, Date, DateTime, Month, SkipFields, Time};

/// One-byte wire tags of the DLMS data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum DataType {
    Null = 0x00,
    Array = 0x01,
    Structure = 0x02,
    Bool = 0x03,
    BitString = 0x04,
    DoubleLong = 0x05,
    DoubleLongUnsigned = 0x06,
    OctetString = 0x09,
    VisibleString = 0x0a,
    Utf8String = 0x0c,
    Bcd = 0x0d,
    Integer = 0x0f,
    Long = 0x10,
    Unsigned = 0x11,
    LongUnsigned = 0x12,
    CompactArray = 0x13,
    Long64 = 0x14,
    Long64Unsigned = 0x15,
    Enum = 0x16,
    Float32 = 0x17,
    Float64 = 0x18,
    DateTime = 0x19,
    Date = 0x1a,
    Time = 0x1b,
}

/// Encode a variable-length count/length prefix.
///
/// One byte below 0x80, otherwise a marker byte (0x81/0x82/0x84) followed by
/// the value in 1, 2 or 4 big-endian bytes.
pub fn encode_object_count(count: usize, buf: &mut Vec<u8>) {
    if count < 0x80 {
        buf.push(count as u8);
    } else if count <= 0xff {
        buf.push(0x81);
        buf.push(count as u8);
    } else if count <= 0xffff {
        buf.push(0x82);
        buf.extend_from_slice(&(count as u16).to_be_bytes());
    } else {
        buf.push(0x84);
        buf.extend_from_slice(&(count as u32).to_be_bytes());
    }
}

/// Parse an [`encode_object_count`] prefix.
pub fn parse_object_count(input: &[u8]) -> IResult<&[u8], usize> {
    let (rest, first) = nom_u8(input)?;
    match first {
        n if n < 0x80 => Ok((rest, n as usize)),
        0x81 => {
            let (rest, n) = nom_u8(rest)?;
            Ok((rest, n as usize))
        }
        0x82 => {
            let (rest, n) = be_u16(rest)?;
            Ok((rest, n as usize))
        }
        0x84 => {
            let (rest, n) = be_u32(rest)?;
            Ok((rest, n as usize))
        }
        _ => Err(nom::Err::Failure(NomError::new(input, ErrorKind::LengthValue))),
    }
}

/// A bit string with an explicit bit count.
///
/// The first bit occupies the high bit of the first byte; trailing pad bits
/// of the last byte are zero.
#[derive(Clone, PartialEq, Eq)]
pub struct BitString {
    bit_count: usize,
    bytes: Vec<u8>,
}

impl BitString {
    pub fn new(bit_count: usize, bytes: Vec<u8>) -> Result<Self, Error> {
        if bytes.len() != bit_count.div_ceil(8) {
            return Err(Error::MalformedValue);
        }
        Ok(Self { bit_count, bytes })
    }

    /// Build from a '0'/'1' text such as `"10100"`.
    pub fn from_bit_text(text: &str) -> Result<Self, Error> {
        let mut bytes = alloc::vec![0u8; text.len().div_ceil(8)];
        for (i, c) in text.chars().enumerate() {
            match c {
                '1' => bytes[i / 8] |= 1 << (7 - (i % 8)),
                '0' => {}
                _ => return Err(Error::MalformedValue),
            }
        }
        Ok(Self { bit_count: text.len(), bytes })
    }

    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bit(&self, index: usize) -> bool {
        index < self.bit_count && (self.bytes[index / 8] & (1 << (7 - (index % 8)))) != 0
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.bit_count {
            if self.bit(i) { '1'.fmt(f)? } else { '0'.fmt(f)? }
        }
        Ok(())
    }
}

impl fmt::Debug for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitString(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for BitString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A decoded DLMS value.
///
/// Variant names follow the DLMS type names: `Integer` is `i8`, `Long` is
/// `i16`, `DoubleLong` is `i32` and the `Unsigned` family mirrors that.
/// `Raw` is an encode-only passthrough for pre-encoded payloads and is never
/// produced by decoding.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    BitString(BitString),
    Integer(i8),
    Long(i16),
    DoubleLong(i32),
    Long64(i64),
    Unsigned(u8),
    LongUnsigned(u16),
    DoubleLongUnsigned(u32),
    Long64Unsigned(u64),
    Float32(f32),
    Float64(f64),
    OctetString(Vec<u8>),
    VisibleString(String),
    Utf8String(String),
    Bcd(String),
    DateTime(DateTime),
    Date(Date),
    Time(Time),
    Array(Vec<Value>),
    Structure(Vec<Value>),
    Enum(u8),
    Raw(Vec<u8>),
}

/// Result of a single decode attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A full value was decoded from the first `consumed` bytes.
    Complete { value: Value, consumed: usize },
    /// More bytes are needed; nothing was consumed.
    Incomplete,
}

/// Resumable progress through a segmented array or structure decode.
///
/// The caller keeps appending received bytes to one growing buffer and
/// re-invokes [`Value::decode_with_cursor`] with the same cursor; elements
/// already resolved are kept here and never re-parsed.
#[derive(Debug, Clone, Default)]
pub struct ArrayCursor {
    kind: Option<DataType>,
    expected: usize,
    resolved: Vec<Value>,
    offset: usize,
}

impl ArrayCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements fully decoded so far.
    pub fn resolved(&self) -> usize {
        self.resolved.len()
    }

    /// Byte offset just past the last resolved element.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Value {
    /// Build an octet string from dotted-decimal text such as a logical
    /// name `"1.0.1.8.0.255"`: each component becomes one byte.
    pub fn octets_from_dotted(text: &str) -> Result<Self, Error> {
        let mut bytes = Vec::new();
        for part in text.split('.') {
            bytes.push(part.parse::<u8>().map_err(|_| Error::MalformedValue)?);
        }
        Ok(Value::OctetString(bytes))
    }

    /// The wire tag for this value, `None` for the `Raw` passthrough.
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::BitString(_) => DataType::BitString,
            Value::Integer(_) => DataType::Integer,
            Value::Long(_) => DataType::Long,
            Value::DoubleLong(_) => DataType::DoubleLong,
            Value::Long64(_) => DataType::Long64,
            Value::Unsigned(_) => DataType::Unsigned,
            Value::LongUnsigned(_) => DataType::LongUnsigned,
            Value::DoubleLongUnsigned(_) => DataType::DoubleLongUnsigned,
            Value::Long64Unsigned(_) => DataType::Long64Unsigned,
            Value::Float32(_) => DataType::Float32,
            Value::Float64(_) => DataType::Float64,
            Value::OctetString(_) => DataType::OctetString,
            Value::VisibleString(_) => DataType::VisibleString,
            Value::Utf8String(_) => DataType::Utf8String,
            Value::Bcd(_) => DataType::Bcd,
            Value::DateTime(_) => DataType::DateTime,
            Value::Date(_) => DataType::Date,
            Value::Time(_) => DataType::Time,
            Value::Array(_) => DataType::Array,
            Value::Structure(_) => DataType::Structure,
            Value::Enum(_) => DataType::Enum,
            Value::Raw(_) => return None,
        })
    }

    /// Display heuristic kept out of the wire contract: returns text for
    /// string values and for octet strings whose bytes are all printable
    /// ASCII.
    pub fn display_text(&self) -> Option<String> {
        match self {
            Value::VisibleString(s) | Value::Utf8String(s) => Some(s.clone()),
            Value::OctetString(bytes)
                if !bytes.is_empty()
                    && bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') =>
            {
                Some(String::from_utf8_lossy(bytes).into_owned())
            }
            _ => None,
        }
    }

    /// Encode to the tagged wire format.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            Value::Raw(bytes) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            // The date/time family travels under the octet-string tag.
            Value::DateTime(dt) => {
                buf.push(DataType::OctetString as u8);
                buf.push(12);
                dt.encode_into(buf);
                Ok(())
            }
            Value::Date(d) => {
                buf.push(DataType::OctetString as u8);
                buf.push(5);
                d.encode_into(buf);
                Ok(())
            }
            Value::Time(t) => {
                buf.push(DataType::OctetString as u8);
                buf.push(4);
                t.encode_into(buf);
                Ok(())
            }
            _ => {
                if let Some(data_type) = self.data_type() {
                    buf.push(data_type as u8);
                }
                self.encode_payload(buf)
            }
        }
    }

    fn encode_payload(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            Value::Null => {}
            Value::Bool(b) => buf.push(*b as u8),
            Value::Integer(n) => buf.push(*n as u8),
            Value::Unsigned(n) | Value::Enum(n) => buf.push(*n),
            Value::Long(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Value::LongUnsigned(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Value::DoubleLong(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Value::DoubleLongUnsigned(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Value::Long64(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Value::Long64Unsigned(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Value::Float32(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Value::Float64(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Value::OctetString(bytes) => {
                encode_object_count(bytes.len(), buf);
                buf.extend_from_slice(bytes);
            }
            Value::VisibleString(s) | Value::Utf8String(s) => {
                encode_object_count(s.len(), buf);
                buf.extend_from_slice(s.as_bytes());
            }
            Value::Bcd(digits) => encode_bcd(digits, buf)?,
            Value::BitString(bits) => {
                encode_object_count(bits.bit_count(), buf);
                buf.extend_from_slice(bits.bytes());
            }
            Value::Array(items) | Value::Structure(items) => {
                encode_object_count(items.len(), buf);
                for item in items {
                    item.encode_into(buf)?;
                }
            }
            Value::Raw(_) | Value::DateTime(_) | Value::Date(_) | Value::Time(_) => {
                return Err(Error::MalformedValue);
            }
        }
        Ok(())
    }

    /// Streaming parse: tag byte plus payload.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (rest, tag) = nom_u8(input)?;
        let data_type = DataType::try_from(tag)
            .map_err(|_| nom::Err::Failure(NomError::new(input, ErrorKind::Tag)))?;
        if data_type == DataType::CompactArray {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Not)));
        }
        Self::parse_payload(rest, data_type)
    }

    /// Parse a payload whose type is already known from context (resumed
    /// decode). Length-prefixed types treat the entire remaining buffer as
    /// payload; everything else parses its fixed-width form.
    pub fn parse_typed(input: &[u8], data_type: DataType) -> IResult<&[u8], Self> {
        match data_type {
            DataType::OctetString => {
                Ok((&input[input.len()..], Value::OctetString(input.to_vec())))
            }
            DataType::VisibleString | DataType::Utf8String => {
                let (_, text) = text_from_bytes(input, data_type)?;
                Ok((&input[input.len()..], text))
            }
            DataType::Bcd => {
                let digits = bcd_digits(input)
                    .map_err(|_| nom::Err::Failure(NomError::new(input, ErrorKind::Verify)))?;
                Ok((&input[input.len()..], Value::Bcd(digits)))
            }
            DataType::BitString => {
                let bits = BitString { bit_count: input.len() * 8, bytes: input.to_vec() };
                Ok((&input[input.len()..], Value::BitString(bits)))
            }
            _ => Self::parse_payload(input, data_type),
        }
    }

    fn parse_payload(input: &[u8], data_type: DataType) -> IResult<&[u8], Self> {
        Ok(match data_type {
            DataType::Null => (input, Value::Null),
            DataType::Bool => {
                let (input, b) = nom_u8(input)?;
                (input, Value::Bool(b != 0))
            }
            DataType::Integer => {
                let (input, n) = nom_i8(input)?;
                (input, Value::Integer(n))
            }
            DataType::Long => {
                let (input, n) = be_i16(input)?;
                (input, Value::Long(n))
            }
            DataType::DoubleLong => {
                let (input, n) = be_i32(input)?;
                (input, Value::DoubleLong(n))
            }
            DataType::Long64 => {
                let (input, n) = be_i64(input)?;
                (input, Value::Long64(n))
            }
            DataType::Unsigned => {
                let (input, n) = nom_u8(input)?;
                (input, Value::Unsigned(n))
            }
            DataType::LongUnsigned => {
                let (input, n) = be_u16(input)?;
                (input, Value::LongUnsigned(n))
            }
            DataType::DoubleLongUnsigned => {
                let (input, n) = be_u32(input)?;
                (input, Value::DoubleLongUnsigned(n))
            }
            DataType::Long64Unsigned => {
                let (input, n) = be_u64(input)?;
                (input, Value::Long64Unsigned(n))
            }
            DataType::Float32 => {
                let (input, n) = be_f32(input)?;
                (input, Value::Float32(n))
            }
            DataType::Float64 => {
                let (input, n) = be_f64(input)?;
                (input, Value::Float64(n))
            }
            DataType::Enum => {
                let (input, n) = nom_u8(input)?;
                (input, Value::Enum(n))
            }
            DataType::OctetString => {
                let (input, len) = parse_object_count(input)?;
                let (input, bytes) = take(len).parse(input)?;
                (input, Value::OctetString(bytes.to_vec()))
            }
            DataType::VisibleString | DataType::Utf8String => {
                let (input, len) = parse_object_count(input)?;
                let (input, bytes) = take(len).parse(input)?;
                let (_, text) = text_from_bytes(bytes, data_type)?;
                (input, text)
            }
            DataType::Bcd => {
                let (input, len) = parse_object_count(input)?;
                let (input, bytes) = take(len).parse(input)?;
                let digits = bcd_digits(bytes)
                    .map_err(|_| nom::Err::Failure(NomError::new(bytes, ErrorKind::Verify)))?;
                (input, Value::Bcd(digits))
            }
            DataType::BitString => {
                let (input, bit_count) = parse_object_count(input)?;
                let (input, bytes) = take(bit_count.div_ceil(8)).parse(input)?;
                (input, Value::BitString(BitString { bit_count, bytes: bytes.to_vec() }))
            }
            DataType::Array | DataType::Structure => {
                let (mut input, count) = parse_object_count(input)?;
                let mut items = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let (rest, item) = Self::parse(input)?;
                    items.push(item);
                    input = rest;
                }
                let value = if data_type == DataType::Array {
                    Value::Array(items)
                } else {
                    Value::Structure(items)
                };
                (input, value)
            }
            DataType::DateTime => {
                let (input, dt) = DateTime::parse(input)?;
                (input, Value::DateTime(dt))
            }
            DataType::Date => {
                let (input, d) = Date::parse(input)?;
                (input, Value::Date(d))
            }
            DataType::Time => {
                let (input, t) = Time::parse(input)?;
                (input, Value::Time(t))
            }
            DataType::CompactArray => {
                return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Not)));
            }
        })
    }

    /// Decode one value from the front of `input`.
    ///
    /// A too-short buffer is not an error: it yields
    /// [`Decoded::Incomplete`] with nothing consumed, the signal to read
    /// more bytes and retry.
    pub fn decode(input: &[u8]) -> Result<Decoded, Error> {
        map_parse(input, Self::parse(input))
    }

    /// [`Value::decode`] with a known type hint for resumed decodes.
    pub fn decode_typed(input: &[u8], data_type: DataType) -> Result<Decoded, Error> {
        if data_type == DataType::CompactArray {
            return Err(Error::Unsupported);
        }
        map_parse(input, Self::parse_typed(input, data_type))
    }

    /// Resumable decode for values that may span several link frames.
    ///
    /// The cursor records the elements of an array/structure already
    /// resolved and the byte offset of the end of the last one; after
    /// appending more bytes to the same buffer, re-invocation continues
    /// from that offset. Non-container values fall through to a plain
    /// [`Value::decode`].
    pub fn decode_with_cursor(input: &[u8], cursor: &mut ArrayCursor) -> Result<Decoded, Error> {
        if cursor.kind.is_none() {
            let Some(&tag) = input.first() else { return Ok(Decoded::Incomplete) };
            let data_type = DataType::try_from(tag).map_err(Error::InvalidDataType)?;
            if !matches!(data_type, DataType::Array | DataType::Structure) {
                return Self::decode(input);
            }
            let (rest, count) = match parse_object_count(&input[1..]) {
                Ok(parsed) => parsed,
                Err(nom::Err::Incomplete(_)) => return Ok(Decoded::Incomplete),
                Err(_) => return Err(Error::MalformedValue),
            };
            cursor.kind = Some(data_type);
            cursor.expected = count;
            cursor.offset = input.len() - rest.len();
        }

        while cursor.resolved.len() < cursor.expected {
            match Self::parse(&input[cursor.offset..]) {
                Ok((rest, item)) => {
                    cursor.offset = input.len() - rest.len();
                    cursor.resolved.push(item);
                }
                Err(nom::Err::Incomplete(_)) => return Ok(Decoded::Incomplete),
                Err(err) => return Err(classify_parse_error(err)),
            }
        }

        let items = core::mem::take(&mut cursor.resolved);
        let value = match cursor.kind {
            Some(DataType::Structure) => Value::Structure(items),
            _ => Value::Array(items),
        };
        Ok(Decoded::Complete { value, consumed: cursor.offset })
    }
}

fn map_parse(input: &[u8], parsed: IResult<&[u8], Value>) -> Result<Decoded, Error> {
    match parsed {
        Ok((rest, value)) => Ok(Decoded::Complete { value, consumed: input.len() - rest.len() }),
        Err(nom::Err::Incomplete(_)) => Ok(Decoded::Incomplete),
        Err(err) => Err(classify_parse_error(err)),
    }
}

fn classify_parse_error(err: nom::Err<NomError<&[u8]>>) -> Error {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => match e.code {
            ErrorKind::Tag => Error::InvalidDataType(e.input.first().copied().unwrap_or_default()),
            ErrorKind::Not => Error::Unsupported,
            _ => Error::MalformedValue,
        },
        nom::Err::Incomplete(_) => Error::Incomplete(None),
    }
}

fn text_from_bytes(bytes: &[u8], data_type: DataType) -> IResult<&[u8], Value> {
    let text = core::str::from_utf8(bytes)
        .map_err(|_| nom::Err::Failure(NomError::new(bytes, ErrorKind::Verify)))?;
    let value = if data_type == DataType::VisibleString {
        Value::VisibleString(text.to_string())
    } else {
        Value::Utf8String(text.to_string())
    };
    Ok((&bytes[bytes.len()..], value))
}

/// Nibble-pack a decimal digit string, left-zero-padding odd lengths:
/// `"123"` becomes `[0x01, 0x23]`.
fn encode_bcd(digits: &str, buf: &mut Vec<u8>) -> Result<(), Error> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::MalformedValue);
    }
    encode_object_count(digits.len().div_ceil(2), buf);
    let padded = digits.len() % 2 == 1;
    let mut nibbles = if padded { Some(0u8) } else { None }
        .into_iter()
        .chain(digits.bytes().map(|b| b - b'0'));
    while let (Some(hi), Some(lo)) = (nibbles.next(), nibbles.next()) {
        buf.push((hi << 4) | lo);
    }
    Ok(())
}

fn bcd_digits(bytes: &[u8]) -> Result<String, ()> {
    let mut digits = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        for nibble in [byte >> 4, byte & 0x0f] {
            if nibble > 9 {
                return Err(());
            }
            digits.push((b'0' + nibble) as char);
        }
    }
    Ok(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) {
        let encoded = value.encode().unwrap();
        match Value::decode(&encoded).unwrap() {
            Decoded::Complete { value: decoded, consumed } => {
                assert_eq!(consumed, encoded.len());
                assert_eq!(decoded, value);
            }
            Decoded::Incomplete => panic!("unexpected incomplete for {:?}", value),
        }
    }

    #[test]
    fn test_scalar_roundtrips() {
        roundtrip(Value::Null);
        roundtrip(Value::Bool(true));
        roundtrip(Value::Bool(false));
        roundtrip(Value::Integer(-42));
        roundtrip(Value::Long(-30000));
        roundtrip(Value::DoubleLong(i32::MIN));
        roundtrip(Value::Long64(i64::MAX));
        roundtrip(Value::Unsigned(255));
        roundtrip(Value::LongUnsigned(0xABCD));
        roundtrip(Value::DoubleLongUnsigned(0xDEAD_BEEF));
        roundtrip(Value::Long64Unsigned(u64::MAX));
        roundtrip(Value::Float32(42.5));
        roundtrip(Value::Float64(-1.25e10));
        roundtrip(Value::Enum(7));
        roundtrip(Value::OctetString(alloc::vec![1, 2, 3, 4, 5, 6]));
        roundtrip(Value::VisibleString("meter-01".to_string()));
        roundtrip(Value::Utf8String("kWh".to_string()));
        roundtrip(Value::Bcd("1234".to_string()));
        roundtrip(Value::BitString(BitString::from_bit_text("10100101").unwrap()));
    }

    #[test]
    fn test_container_roundtrips() {
        roundtrip(Value::Array(alloc::vec![Value::LongUnsigned(1), Value::LongUnsigned(2)]));
        roundtrip(Value::Structure(alloc::vec![
            Value::OctetString(alloc::vec![1, 0, 1, 8, 0, 255]),
            Value::DoubleLongUnsigned(123456),
            Value::Structure(alloc::vec![Value::Integer(0), Value::Enum(30)]),
        ]));
        roundtrip(Value::Array(alloc::vec![]));
    }

    #[test]
    fn test_object_count_boundaries() {
        for (count, expected) in [
            (0usize, alloc::vec![0x00]),
            (1, alloc::vec![0x01]),
            (0x7f, alloc::vec![0x7f]),
            (0x80, alloc::vec![0x81, 0x80]),
            (0xff, alloc::vec![0x81, 0xff]),
            (0x100, alloc::vec![0x82, 0x01, 0x00]),
            (0xffff, alloc::vec![0x82, 0xff, 0xff]),
            (0x10000, alloc::vec![0x84, 0x00, 0x01, 0x00, 0x00]),
        ] {
            let mut buf = Vec::new();
            encode_object_count(count, &mut buf);
            assert_eq!(buf, expected, "count {:#x}", count);

            let (rest, parsed) = parse_object_count(&buf).unwrap();
            assert_eq!(rest, &[] as &[u8]);
            assert_eq!(parsed, count);
        }
    }

    #[test]
    fn test_bcd_odd_length_padding() {
        let encoded = Value::Bcd("123".to_string()).encode().unwrap();
        assert_eq!(encoded, [0x0d, 0x02, 0x01, 0x23]);
    }

    #[test]
    fn test_bcd_rejects_non_digits() {
        assert_eq!(Value::Bcd("12a".to_string()).encode(), Err(Error::MalformedValue));
    }

    #[test]
    fn test_bcd_decode_rejects_high_nibbles() {
        assert_eq!(Value::decode(&[0x0d, 0x01, 0xab]), Err(Error::MalformedValue));
    }

    #[test]
    fn test_bit_string_packing() {
        // first bit lands in the high bit of the first byte
        let bits = BitString::from_bit_text("101").unwrap();
        assert_eq!(bits.bytes(), &[0b1010_0000]);
        assert_eq!(bits.bit_count(), 3);

        let encoded = Value::BitString(bits).encode().unwrap();
        assert_eq!(encoded, [0x04, 0x03, 0b1010_0000]);
    }

    #[test]
    fn test_bit_string_rejects_non_binary_text() {
        assert_eq!(BitString::from_bit_text("10x").err(), Some(Error::MalformedValue));
    }

    #[test]
    fn test_dotted_decimal_octet_string() {
        let value = Value::octets_from_dotted("1.2.3.4.5.6").unwrap();
        assert_eq!(value, Value::OctetString(alloc::vec![1, 2, 3, 4, 5, 6]));
        assert!(Value::octets_from_dotted("1.2.999").is_err());
    }

    #[test]
    fn test_datetime_encodes_as_octet_string() {
        let dt = DateTime::new(Date::new(2025, 1, 15), Time::new(12, 30, 0));
        let encoded = Value::DateTime(dt.clone()).encode().unwrap();
        assert_eq!(encoded[0], 0x09);
        assert_eq!(encoded[1], 12);
        assert_eq!(encoded.len(), 14);

        // round-trip needs the type hint, the tag alone says octet string
        match Value::decode_typed(&encoded[2..], DataType::DateTime).unwrap() {
            Decoded::Complete { value: Value::DateTime(parsed), consumed } => {
                assert_eq!(consumed, 12);
                assert_eq!(parsed, dt);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_date_and_time_wrapped_lengths() {
        let date = Value::Date(Date::new(2024, 2, 29)).encode().unwrap();
        assert_eq!(&date[..2], &[0x09, 5]);

        let time = Value::Time(Time::new(23, 59, 59)).encode().unwrap();
        assert_eq!(&time[..2], &[0x09, 4]);
    }

    #[test]
    fn test_raw_passthrough() {
        // a pre-encoded structure payload is emitted verbatim
        let pre_encoded = Value::Structure(alloc::vec![Value::Unsigned(1)]).encode().unwrap();
        let raw = Value::Raw(pre_encoded.clone()).encode().unwrap();
        assert_eq!(raw, pre_encoded);
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(Value::decode(&[0x07, 0x00]), Err(Error::InvalidDataType(0x07)));
    }

    #[test]
    fn test_compact_array_unsupported() {
        assert_eq!(Value::decode(&[0x13, 0x01, 0x00]), Err(Error::Unsupported));
    }

    #[test]
    fn test_partial_buffer_consumes_nothing() {
        let full = Value::OctetString(alloc::vec![1, 2, 3, 4, 5, 6, 7, 8]).encode().unwrap();

        // declared length exceeds the available bytes
        assert_eq!(Value::decode(&full[..5]).unwrap(), Decoded::Incomplete);

        // a later attempt on the full buffer matches the single-shot decode
        match Value::decode(&full).unwrap() {
            Decoded::Complete { consumed, value } => {
                assert_eq!(consumed, full.len());
                assert_eq!(value, Value::OctetString(alloc::vec![1, 2, 3, 4, 5, 6, 7, 8]));
            }
            Decoded::Incomplete => panic!("should be complete"),
        }
    }

    #[test]
    fn test_typed_resume_takes_whole_buffer() {
        let (rest, value) =
            Value::parse_typed(&[0xaa, 0xbb, 0xcc], DataType::OctetString).unwrap();
        assert_eq!(rest, &[] as &[u8]);
        assert_eq!(value, Value::OctetString(alloc::vec![0xaa, 0xbb, 0xcc]));
    }

    #[test]
    fn test_array_cursor_resume() {
        let element = |n: u16| {
            Value::Structure(alloc::vec![
                Value::LongUnsigned(n),
                Value::OctetString(alloc::vec![n as u8; 4]),
            ])
        };
        let full_value = Value::Array(alloc::vec![element(1), element(2), element(3)]);
        let full = full_value.encode().unwrap();

        // split inside the third element
        let split = full.len() - 3;
        let mut buffer = full[..split].to_vec();

        let mut cursor = ArrayCursor::new();
        assert_eq!(Value::decode_with_cursor(&buffer, &mut cursor).unwrap(), Decoded::Incomplete);
        assert_eq!(cursor.resolved(), 2);

        buffer.extend_from_slice(&full[split..]);
        match Value::decode_with_cursor(&buffer, &mut cursor).unwrap() {
            Decoded::Complete { value, consumed } => {
                assert_eq!(consumed, full.len());
                assert_eq!(value, full_value);
            }
            Decoded::Incomplete => panic!("should be complete"),
        }

        // matches the single-shot decode of the concatenation
        match Value::decode(&full).unwrap() {
            Decoded::Complete { value, .. } => assert_eq!(value, full_value),
            Decoded::Incomplete => panic!("should be complete"),
        }
    }

    #[test]
    fn test_array_cursor_header_split() {
        // even the element-count prefix may be missing at first
        let full = Value::Array(alloc::vec![Value::Unsigned(9); 0x90]).encode().unwrap();
        let mut cursor = ArrayCursor::new();
        assert_eq!(
            Value::decode_with_cursor(&full[..1], &mut cursor).unwrap(),
            Decoded::Incomplete
        );
        assert_eq!(cursor.resolved(), 0);

        match Value::decode_with_cursor(&full, &mut cursor).unwrap() {
            Decoded::Complete { value: Value::Array(items), .. } => assert_eq!(items.len(), 0x90),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cursor_passthrough_for_scalars() {
        let encoded = Value::LongUnsigned(513).encode().unwrap();
        let mut cursor = ArrayCursor::new();
        match Value::decode_with_cursor(&encoded, &mut cursor).unwrap() {
            Decoded::Complete { value, .. } => assert_eq!(value, Value::LongUnsigned(513)),
            Decoded::Incomplete => panic!("should be complete"),
        }
    }

    #[test]
    fn test_display_text_heuristic() {
        assert_eq!(
            Value::OctetString(b"ISK1030".to_vec()).display_text(),
            Some("ISK1030".to_string())
        );
        assert_eq!(Value::OctetString(alloc::vec![0x00, 0x41]).display_text(), None);
        assert_eq!(Value::OctetString(alloc::vec![]).display_text(), None);
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        assert_eq!(Value::decode(&[0x0c, 0x02, 0xff, 0xfe]), Err(Error::MalformedValue));
    }
}
