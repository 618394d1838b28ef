//! Reply assembly: the GET service subset, push notifications and the
//! accumulator that stitches block transfers back into one decoded value.
//!
//! Tags and layouts follow the Green Book GET service tables; the
//! canonical request example is `C0 01 C1 00 03 01 00 01 08 00 FF 02 00`
//! (read Register 1-0:1.8.0*255 attribute 2).

use alloc::vec::Vec;
use core::fmt;

use derive_try_from_primitive::TryFromPrimitive;
use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
    number::streaming::{be_u16, be_u32, u8 as nom_u8},
};

use crate::{
    Error,
    data::{Decoded, Value},
    obis_code::ObisCode,
    session::Session,
};

/// APDU command tags handled by the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum Command {
    DataNotification = 0x0f,
    GetRequest = 0xc0,
    EventNotification = 0xc2,
    GetResponse = 0xc4,
    ExceptionResponse = 0xd8,
}

impl Command {
    pub fn is_notification(self) -> bool {
        matches!(self, Self::DataNotification | Self::EventNotification)
    }
}

/// What, if anything, is still outstanding for the current reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoreData {
    #[default]
    None,
    /// The link layer signalled a segmented frame; pull the rest with a
    /// receiver-ready frame.
    Frame,
    /// The application layer is mid block transfer; pull the rest with
    /// GET-Request-Next.
    Block,
}

/// Data access error codes (Blue Book 4.1.8.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum DataAccessResult {
    Success = 0,
    HardwareFault = 1,
    TemporaryFailure = 2,
    ReadWriteDenied = 3,
    ObjectUndefined = 4,
    ObjectClassInconsistent = 9,
    ObjectUnavailable = 11,
    TypeUnmatched = 12,
    ScopeOfAccessViolated = 13,
    DataBlockUnavailable = 14,
    LongGetAborted = 15,
    NoLongGetInProgress = 16,
    LongSetAborted = 17,
    NoLongSetInProgress = 18,
    DataBlockNumberInvalid = 19,
    OtherReason = 250,
}

impl fmt::Display for DataAccessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// GET service requests the client can issue.
#[derive(Debug, Clone, PartialEq)]
pub enum GetRequest {
    /// GET-Request-Normal (choice 0x01): read one attribute.
    Normal {
        invoke_id: u8,
        class_id: u16,
        instance_id: ObisCode,
        attribute_id: i8,
    },
    /// GET-Request-Next (choice 0x02): pull the next block.
    Next { invoke_id: u8, block_number: u32 },
}

impl GetRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(Command::GetRequest as u8);
        match self {
            Self::Normal { invoke_id, class_id, instance_id, attribute_id } => {
                buf.push(0x01);
                buf.push(*invoke_id);
                buf.extend_from_slice(&class_id.to_be_bytes());
                instance_id.encode_into(&mut buf);
                buf.push(*attribute_id as u8);
                buf.push(0x00); // no selective access
            }
            Self::Next { invoke_id, block_number } => {
                buf.push(0x02);
                buf.push(*invoke_id);
                buf.extend_from_slice(&block_number.to_be_bytes());
            }
        }
        buf
    }

    /// The continuation request for the block the session expects next.
    pub fn next_block(session: &Session) -> Self {
        Self::Next {
            invoke_id: session.invoke_id_and_priority(),
            block_number: session.block_index(),
        }
    }
}

/// GET service responses the client can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum GetResponse {
    /// GET-Response-Normal (choice 0x01).
    Normal {
        invoke_id: u8,
        result: Result<Value, DataAccessResult>,
    },
    /// GET-Response-With-Datablock (choice 0x02). The data arrives raw;
    /// it only becomes a parseable value once all blocks are joined.
    WithDataBlock {
        invoke_id: u8,
        last_block: bool,
        block_number: u32,
        result: Result<Vec<u8>, DataAccessResult>,
    },
}

impl GetResponse {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != Command::GetResponse as u8 {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, choice) = nom_u8(input)?;
        match choice {
            0x01 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, result) = parse_data_result(input)?;
                Ok((input, Self::Normal { invoke_id, result }))
            }
            0x02 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, last_block) = nom_u8(input)?;
                let (input, block_number) = be_u32(input)?;
                let (input, result_choice) = nom_u8(input)?;
                let (input, result) = if result_choice == 0x00 {
                    let (input, len) = crate::data::parse_object_count(input)?;
                    if input.len() < len {
                        return Err(nom::Err::Incomplete(nom::Needed::new(len - input.len())));
                    }
                    (&input[len..], Ok(input[..len].to_vec()))
                } else {
                    let (input, code) = nom_u8(input)?;
                    (input, Err(access_result(input, code)?))
                };
                Ok((
                    input,
                    Self::WithDataBlock {
                        invoke_id,
                        last_block: last_block != 0x00,
                        block_number,
                        result,
                    },
                ))
            }
            _ => Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag))),
        }
    }
}

fn parse_data_result(input: &[u8]) -> IResult<&[u8], Result<Value, DataAccessResult>> {
    let (input, choice) = nom_u8(input)?;
    if choice == 0x00 {
        let (input, value) = Value::parse(input)?;
        Ok((input, Ok(value)))
    } else {
        let (input, code) = nom_u8(input)?;
        Ok((input, Err(access_result(input, code)?)))
    }
}

fn access_result(input: &[u8], code: u8) -> Result<DataAccessResult, nom::Err<NomError<&[u8]>>> {
    DataAccessResult::try_from(code)
        .map_err(|_| nom::Err::Failure(NomError::new(input, ErrorKind::Verify)))
}

/// An unsolicited push from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub command: Command,
    pub body: Value,
}

impl Notification {
    /// Parse an EventNotification-Request (0xC2): optional time, attribute
    /// descriptor, attribute value.
    pub fn parse_event(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != Command::EventNotification as u8 {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, time_present) = nom_u8(input)?;
        let input = if time_present != 0x00 {
            let (input, len) = nom_u8(input)?;
            let len = len as usize;
            if input.len() < len {
                return Err(nom::Err::Incomplete(nom::Needed::new(len - input.len())));
            }
            &input[len..]
        } else {
            input
        };
        let (input, _class_id) = be_u16(input)?;
        let (input, _instance_id) = ObisCode::parse(input)?;
        let (input, _attribute_id) = nom_u8(input)?;
        let (input, body) = Value::parse(input)?;
        Ok((input, Self { command: Command::EventNotification, body }))
    }

    /// Parse a DataNotification (0x0F): long invoke id, optional date-time
    /// octet string, notification body.
    pub fn parse_data(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != Command::DataNotification as u8 {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, _long_invoke_id) = be_u32(input)?;
        let (input, time_len) = nom_u8(input)?;
        let time_len = time_len as usize;
        if input.len() < time_len {
            return Err(nom::Err::Incomplete(nom::Needed::new(time_len - input.len())));
        }
        let input = &input[time_len..];
        let (input, body) = Value::parse(input)?;
        Ok((input, Self { command: Command::DataNotification, body }))
    }
}

/// Accumulated state of one solicited reply.
#[derive(Debug, Default)]
pub struct ReplyData {
    /// Raw block payloads joined in arrival order.
    buffer: Vec<u8>,
    pub more_data: MoreData,
    pub error: u8,
    pub command: Option<Command>,
    pub value: Option<Value>,
}

impl ReplyData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.more_data == MoreData::None && (self.value.is_some() || self.error != 0)
    }

    pub fn access_error(&self) -> Option<DataAccessResult> {
        if self.error == 0 {
            None
        } else {
            DataAccessResult::try_from(self.error).ok()
        }
    }

    /// Mark the reply as waiting for the rest of a segmented link frame.
    /// Cleared again by [`ingest`](Self::ingest) once the joined PDU has
    /// been folded in.
    pub fn note_segmented_frame(&mut self) {
        self.more_data = MoreData::Frame;
    }

    /// Fold one reassembled application PDU into the reply.
    ///
    /// Block numbers must match the session's block index exactly; an
    /// out-of-order block is a hard protocol error, not something to
    /// paper over.
    pub fn ingest(&mut self, session: &mut Session, pdu: &[u8]) -> Result<(), Error> {
        let tag = *pdu.first().ok_or(Error::TruncatedPdu)?;
        let command = Command::try_from(tag).map_err(|_| Error::InvalidPdu)?;
        self.command = Some(command);
        match command {
            Command::GetResponse => self.ingest_get_response(session, pdu),
            Command::ExceptionResponse => {
                // state-error, service-error
                let service_error = *pdu.get(2).ok_or(Error::TruncatedPdu)?;
                self.error = if service_error == 0 {
                    DataAccessResult::OtherReason as u8
                } else {
                    service_error
                };
                self.more_data = MoreData::None;
                Ok(())
            }
            Command::DataNotification | Command::EventNotification | Command::GetRequest => {
                Err(Error::InvalidPdu)
            }
        }
    }

    fn ingest_get_response(&mut self, session: &mut Session, pdu: &[u8]) -> Result<(), Error> {
        let (_, response) = GetResponse::parse(pdu)?;
        match response {
            GetResponse::Normal { result, .. } => {
                match result {
                    Ok(value) => {
                        self.value = Some(value);
                        self.error = 0;
                    }
                    Err(access) => self.error = access as u8,
                }
                self.more_data = MoreData::None;
                Ok(())
            }
            GetResponse::WithDataBlock { last_block, block_number, result, .. } => {
                if block_number != session.block_index() {
                    return Err(Error::InvalidPdu);
                }
                match result {
                    Ok(raw) => self.buffer.extend_from_slice(&raw),
                    Err(access) => {
                        self.error = access as u8;
                        self.more_data = MoreData::None;
                        return Ok(());
                    }
                }
                if last_block {
                    self.more_data = MoreData::None;
                    match Value::decode(&self.buffer)? {
                        Decoded::Complete { value, .. } => self.value = Some(value),
                        Decoded::Incomplete => return Err(Error::TruncatedPdu),
                    }
                } else {
                    session.advance_block_index();
                    self.more_data = MoreData::Block;
                }
                Ok(())
            }
        }
    }
}

/// Decode an unsolicited PDU, if that is what `pdu` holds.
pub fn parse_notification(pdu: &[u8]) -> Option<Notification> {
    match pdu.first() {
        Some(&tag) if tag == Command::EventNotification as u8 => {
            Notification::parse_event(pdu).ok().map(|(_, n)| n)
        }
        Some(&tag) if tag == Command::DataNotification as u8 => {
            Notification::parse_data(pdu).ok().map(|(_, n)| n)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_get_request_normal_green_book_example() {
        let request = GetRequest::Normal {
            invoke_id: 0xc1,
            class_id: 3,
            instance_id: ObisCode::new(1, 0, 1, 8, 0, 255),
            attribute_id: 2,
        };
        assert_eq!(
            request.encode(),
            vec![0xc0, 0x01, 0xc1, 0x00, 0x03, 0x01, 0x00, 0x01, 0x08, 0x00, 0xff, 0x02, 0x00]
        );
    }

    #[test]
    fn test_get_request_next_encode() {
        let request = GetRequest::Next { invoke_id: 0xc1, block_number: 2 };
        assert_eq!(request.encode(), vec![0xc0, 0x02, 0xc1, 0x00, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn test_get_response_normal_data() {
        let bytes = [0xc4, 0x01, 0xc1, 0x00, 0x06, 0x00, 0xbc, 0x61, 0x4e];
        let (rest, response) = GetResponse::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(
            response,
            GetResponse::Normal {
                invoke_id: 0xc1,
                result: Ok(Value::DoubleLongUnsigned(12_345_678)),
            }
        );
    }

    #[test]
    fn test_get_response_normal_error() {
        let bytes = [0xc4, 0x01, 0xc1, 0x01, 0x04];
        let (_, response) = GetResponse::parse(&bytes).unwrap();
        assert_eq!(
            response,
            GetResponse::Normal {
                invoke_id: 0xc1,
                result: Err(DataAccessResult::ObjectUndefined),
            }
        );
    }

    #[test]
    fn test_block_transfer_accumulates_and_decodes() {
        let mut session = Session::new_client(0x10, 0x01);
        let mut reply = ReplyData::new();

        // OctetString of 4 bytes split over two blocks
        let block1 = [0xc4, 0x02, 0xc1, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x03, 0x09, 0x04, 0xaa];
        reply.ingest(&mut session, &block1).unwrap();
        assert_eq!(reply.more_data, MoreData::Block);
        assert_eq!(session.block_index(), 2);
        assert!(reply.value.is_none());

        let block2 = [0xc4, 0x02, 0xc1, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x03, 0xbb, 0xcc, 0xdd];
        reply.ingest(&mut session, &block2).unwrap();
        assert_eq!(reply.more_data, MoreData::None);
        assert_eq!(reply.value, Some(Value::OctetString(vec![0xaa, 0xbb, 0xcc, 0xdd])));
        assert!(reply.is_complete());
    }

    #[test]
    fn test_block_number_mismatch_is_rejected() {
        let mut session = Session::new_client(0x10, 0x01);
        let mut reply = ReplyData::new();
        // claims block 2 while the session expects block 1
        let block = [0xc4, 0x02, 0xc1, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0xaa];
        assert_eq!(reply.ingest(&mut session, &block), Err(Error::InvalidPdu));
    }

    #[test]
    fn test_temporary_failure_sets_error() {
        let mut session = Session::new_client(0x10, 0x01);
        let mut reply = ReplyData::new();
        reply.ingest(&mut session, &[0xc4, 0x01, 0xc1, 0x01, 0x02]).unwrap();
        assert_eq!(reply.access_error(), Some(DataAccessResult::TemporaryFailure));
        assert!(reply.is_complete());
    }

    #[test]
    fn test_event_notification_parse() {
        // no time, class 1, 0-0:96.3.10*255, attribute 2, Bool(true)
        let bytes = [
            0xc2, 0x00, 0x00, 0x01, 0x00, 0x00, 0x60, 0x03, 0x0a, 0xff, 0x02, 0x03, 0x01,
        ];
        let notification = parse_notification(&bytes).unwrap();
        assert_eq!(notification.command, Command::EventNotification);
        assert_eq!(notification.body, Value::Bool(true));
    }

    #[test]
    fn test_data_notification_parse() {
        let bytes = [0x0f, 0x00, 0x00, 0x00, 0x01, 0x00, 0x11, 0x2a];
        let notification = parse_notification(&bytes).unwrap();
        assert_eq!(notification.command, Command::DataNotification);
        assert_eq!(notification.body, Value::Unsigned(42));
    }

    #[test]
    fn test_unsolicited_tag_is_not_a_reply() {
        let mut session = Session::new_client(0x10, 0x01);
        let mut reply = ReplyData::new();
        let bytes = [0x0f, 0x00, 0x00, 0x00, 0x01, 0x00, 0x11, 0x2a];
        assert_eq!(reply.ingest(&mut session, &bytes), Err(Error::InvalidPdu));
        assert!(parse_notification(&bytes).is_some());
    }

    #[test]
    fn test_segmented_frame_marks_reply_incomplete() {
        let mut session = Session::new_client(0x10, 0x01);
        let mut reply = ReplyData::new();
        reply.note_segmented_frame();
        assert_eq!(reply.more_data, MoreData::Frame);
        assert!(!reply.is_complete());

        reply.ingest(&mut session, &[0xc4, 0x01, 0xc1, 0x00, 0x11, 0x2a]).unwrap();
        assert_eq!(reply.more_data, MoreData::None);
        assert!(reply.is_complete());
    }

    #[test]
    fn test_exception_response() {
        let mut session = Session::new_client(0x10, 0x01);
        let mut reply = ReplyData::new();
        reply.ingest(&mut session, &[0xd8, 0x01, 0x03]).unwrap();
        assert_eq!(reply.error, 0x03);
        assert!(reply.is_complete());
    }
}
