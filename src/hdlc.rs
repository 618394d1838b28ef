//! HDLC frame-type-3 layer: just enough framing to carry the application
//! PDUs and to build the receiver-ready frames that pull in the remaining
//! segments of a multi-frame reply.
//!
//! One-byte addressing only; the wider 2/4-byte forms belong to the
//! transport drivers built on top of this crate.

use alloc::vec::Vec;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
};

use crate::{Error, session::Session};

/// Opening/closing flag byte.
pub const FLAG: u8 = 0x7e;
/// High nibble of the 16-bit frame format field (frame type 3).
pub const FORMAT_TYPE: u16 = 0xa000;
/// Segmentation bit of the format field: more frames follow.
pub const SEGMENTATION_BIT: u16 = 0x0800;

/// LLC header prefixed to command payloads.
pub const LLC_REQUEST: [u8; 3] = [0xe6, 0xe6, 0x00];
/// LLC header prefixed to response payloads.
pub const LLC_RESPONSE: [u8; 3] = [0xe6, 0xe7, 0x00];

/// One HDLC frame between flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub dest: u8,
    pub src: u8,
    pub control: u8,
    pub segmented: bool,
    pub information: Vec<u8>,
}

impl Frame {
    /// An information frame carrying `payload`, sequenced by the session.
    pub fn information(session: &mut Session, payload: &[u8]) -> Self {
        Self {
            dest: address_byte(session.server_address),
            src: address_byte(session.client_address),
            control: session.increase_send_sequence(),
            segmented: false,
            information: payload.to_vec(),
        }
    }

    /// The receiver-ready frame acknowledging the last segment and asking
    /// for the next one.
    pub fn receiver_ready(session: &mut Session) -> Self {
        Self {
            dest: address_byte(session.server_address),
            src: address_byte(session.client_address),
            control: (session.increase_receiver_sequence() | 0x01) & 0xf1,
            segmented: false,
            information: Vec::new(),
        }
    }

    /// The frame-format length field is 11 bits; information that would
    /// push the frame past 2047 bytes cannot be represented and must be
    /// segmented by the caller.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let header_len = 5; // format(2) + dest + src + control
        let mut frame_len = header_len + 2; // + HCS or closing FCS
        if !self.information.is_empty() {
            frame_len += self.information.len() + 2;
        }
        if frame_len > 0x07ff {
            return Err(Error::InvalidFrame);
        }
        let format = FORMAT_TYPE
            | if self.segmented { SEGMENTATION_BIT } else { 0 }
            | frame_len as u16;

        let mut buf = Vec::with_capacity(frame_len + 2);
        buf.push(FLAG);
        buf.extend_from_slice(&format.to_be_bytes());
        buf.push(self.dest);
        buf.push(self.src);
        buf.push(self.control);
        let hcs = fcs16(&buf[1..]);
        buf.extend_from_slice(&hcs.to_le_bytes());
        if !self.information.is_empty() {
            buf.extend_from_slice(&self.information);
            let fcs = fcs16(&buf[1..]);
            buf.extend_from_slice(&fcs.to_le_bytes());
        }
        buf.push(FLAG);
        Ok(buf)
    }

    /// Parse one frame from the front of `input`.
    ///
    /// A buffer that ends mid-frame yields `Incomplete`; a bad format type
    /// or checksum is a hard failure. The opening flag is optional: serial
    /// links both insert inter-frame flag fill and share a single flag
    /// between a closing and the next opening, so any leading flags are
    /// skipped and a frame may start directly with its format field.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let mut start = 0;
        while start < input.len() && input[start] == FLAG {
            start += 1;
        }
        let framed = &input[start..];
        if framed.len() < 2 {
            return Err(nom::Err::Incomplete(nom::Needed::new(9)));
        }
        let format = u16::from_be_bytes([framed[0], framed[1]]);
        if format & 0xf000 != FORMAT_TYPE {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag)));
        }
        let frame_len = (format & 0x07ff) as usize;
        // frame body plus the closing flag
        if framed.len() < frame_len + 1 {
            return Err(nom::Err::Incomplete(nom::Needed::new(frame_len + 1 - framed.len())));
        }
        let body = &framed[..frame_len];
        if framed[frame_len] != FLAG || body.len() < 7 {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify)));
        }

        let dest = body[2];
        let src = body[3];
        let control = body[4];
        let hcs = u16::from_le_bytes([body[5], body[6]]);
        if fcs16(&body[..5]) != hcs {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify)));
        }
        let information = if body.len() > 7 {
            if body.len() < 9 {
                return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify)));
            }
            let fcs = u16::from_le_bytes([body[body.len() - 2], body[body.len() - 1]]);
            if fcs16(&body[..body.len() - 2]) != fcs {
                return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify)));
            }
            body[7..body.len() - 2].to_vec()
        } else {
            Vec::new()
        };

        Ok((
            &input[start + frame_len + 1..],
            Self {
                dest,
                src,
                control,
                segmented: format & SEGMENTATION_BIT != 0,
                information,
            },
        ))
    }

    /// The application payload with its LLC header stripped.
    pub fn payload(&self) -> Result<&[u8], Error> {
        match self.information.get(..3) {
            Some(llc) if llc == LLC_REQUEST || llc == LLC_RESPONSE => Ok(&self.information[3..]),
            Some(_) => Err(Error::InvalidFrame),
            None if self.information.is_empty() => Ok(&[]),
            None => Err(Error::InvalidFrame),
        }
    }
}

/// Map a logical address onto the 1-byte HDLC form.
pub fn address_byte(address: u32) -> u8 {
    ((address as u8) << 1) | 1
}

/// HDLC FCS-16: bit-reflected 0x1021 (poly 0x8408), init 0xFFFF,
/// complemented.
pub fn fcs16(data: &[u8]) -> u16 {
    let mut fcs = 0xffffu16;
    for &byte in data {
        fcs ^= byte as u16;
        for _ in 0..8 {
            fcs = if fcs & 1 != 0 { (fcs >> 1) ^ 0x8408 } else { fcs >> 1 };
        }
    }
    !fcs
}
