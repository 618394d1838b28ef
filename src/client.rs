//! Blocking DLMS client: drives one request/response cycle at a time over a
//! [`Transport`], reassembling multi-frame and multi-block replies.
//!
//! A session is strictly half-duplex. One request is outstanding at a time
//! and the only suspension point is the transport's bounded `receive`;
//! independent meters get independent clients.

use alloc::vec::Vec;
use core::fmt;
use core::time::Duration;

use log::{debug, trace};

use crate::{
    Error,
    association::{self, AssociationReply},
    data::Value,
    hdlc::{Frame, LLC_REQUEST},
    obis_code::ObisCode,
    reply::{DataAccessResult, GetRequest, MoreData, ReplyData, parse_notification},
    session::Session,
    transport::{Delay, NotificationSink, NullSink, Transport},
};

/// Receive attempts per expected frame before giving up.
const RECEIVE_ATTEMPTS: u32 = 3;
/// Full-request retries after a transient rejection.
const REJECTED_RETRY_LIMIT: u32 = 3;
/// Backoff before retrying a transiently rejected request.
const REJECTED_BACKOFF: Duration = Duration::from_secs(1);
/// Default per-receive timeout.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur during client operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientError<E> {
    /// Error from the underlying transport layer.
    Transport(E),
    /// The receive retry budget was exhausted without a usable frame.
    Timeout,
    /// The peer sent bytes the codecs reject.
    Protocol(Error),
    /// The peer answered with a data access error.
    DataAccess(DataAccessResult),
}

impl<E> From<E> for ClientError<E> {
    fn from(e: E) -> Self {
        ClientError::Transport(e)
    }
}

impl<E: fmt::Debug> fmt::Display for ClientError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(e) => write!(f, "transport error: {:?}", e),
            ClientError::Timeout => write!(f, "no reply within the retry budget"),
            ClientError::Protocol(e) => write!(f, "protocol error: {}", e),
            ClientError::DataAccess(e) => write!(f, "data access error: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for ClientError<E> {}

/// A DLMS client bound to one transport and one session.
#[derive(Debug)]
pub struct DlmsClient<T, D = (), N = NullSink> {
    pub session: Session,
    transport: T,
    delay: D,
    sink: N,
    /// How long each receive may block.
    pub timeout: Duration,
}

impl<T: Transport> DlmsClient<T> {
    pub fn new(session: Session, transport: T) -> Self {
        Self {
            session,
            transport,
            delay: (),
            sink: NullSink,
            timeout: RECEIVE_TIMEOUT,
        }
    }
}

impl<T, D, N> DlmsClient<T, D, N>
where
    T: Transport,
    D: Delay,
    N: NotificationSink,
{
    /// A client with explicit delay and notification capabilities.
    pub fn with_parts(session: Session, transport: T, delay: D, sink: N) -> Self {
        Self { session, transport, delay, sink, timeout: RECEIVE_TIMEOUT }
    }

    /// Give the transport back.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Establish the application association.
    ///
    /// A rejection by the server is a structured outcome, not an error;
    /// only wire-level failures map to `Err`.
    pub fn associate(&mut self) -> Result<AssociationReply, ClientError<T::Error>> {
        self.transport.open()?;
        let result = self.try_associate();
        let _ = self.transport.close();
        result
    }

    fn try_associate(&mut self) -> Result<AssociationReply, ClientError<T::Error>> {
        let aarq = association::encode_aarq(&mut self.session).map_err(ClientError::Protocol)?;
        let sent = self.send_pdu(&aarq)?;
        let pdu = self.read_pdu(&sent, &mut ReplyData::new())?;
        association::parse_aare(&mut self.session, &pdu).map_err(ClientError::Protocol)
    }

    /// Read one attribute of one COSEM object.
    pub fn get(
        &mut self,
        class_id: u16,
        instance_id: ObisCode,
        attribute_id: i8,
    ) -> Result<Value, ClientError<T::Error>> {
        let request = GetRequest::Normal {
            invoke_id: self.session.invoke_id_and_priority(),
            class_id,
            instance_id,
            attribute_id,
        };
        self.exchange(&request.encode())
    }

    /// Send one application request and return the fully reassembled reply
    /// value, driving frame and block continuation as needed.
    pub fn exchange(&mut self, request: &[u8]) -> Result<Value, ClientError<T::Error>> {
        self.transport.open()?;
        let result = self.try_exchange(request);
        let _ = self.transport.close();
        result
    }

    fn try_exchange(&mut self, request: &[u8]) -> Result<Value, ClientError<T::Error>> {
        let mut rejected = 0;
        loop {
            self.session.reset_block_index();
            match self.run_request(request) {
                Err(ClientError::DataAccess(DataAccessResult::TemporaryFailure))
                    if rejected < REJECTED_RETRY_LIMIT =>
                {
                    rejected += 1;
                    debug!("request transiently rejected, retry {} after backoff", rejected);
                    self.delay.delay(REJECTED_BACKOFF);
                }
                other => return other,
            }
        }
    }

    fn run_request(&mut self, request: &[u8]) -> Result<Value, ClientError<T::Error>> {
        let mut sent = self.send_pdu(request)?;
        let mut reply = ReplyData::new();
        loop {
            let pdu = self.read_pdu(&sent, &mut reply)?;
            if let Some(notification) = parse_notification(&pdu) {
                debug!("unsolicited {:?} while awaiting reply", notification.command);
                self.sink.notify(notification.body);
                continue;
            }
            reply.ingest(&mut self.session, &pdu).map_err(ClientError::Protocol)?;
            if reply.more_data == MoreData::Block {
                let next = GetRequest::next_block(&self.session).encode();
                sent = self.send_pdu(&next)?;
                continue;
            }
            break;
        }
        if let Some(access) = reply.access_error() {
            return Err(ClientError::DataAccess(access));
        }
        reply.value.ok_or(ClientError::Protocol(Error::InvalidPdu))
    }

    /// Frame and send one application PDU; returns the link bytes for echo
    /// comparison.
    fn send_pdu(&mut self, apdu: &[u8]) -> Result<Vec<u8>, ClientError<T::Error>> {
        let mut payload = Vec::with_capacity(apdu.len() + LLC_REQUEST.len());
        payload.extend_from_slice(&LLC_REQUEST);
        payload.extend_from_slice(apdu);
        let bytes = Frame::information(&mut self.session, &payload)
            .encode()
            .map_err(ClientError::Protocol)?;
        trace!("send frame, {} bytes", bytes.len());
        self.transport.send(&bytes)?;
        Ok(bytes)
    }

    /// Read frames until one application PDU is complete, answering
    /// segmented frames with receiver-ready continuations.
    fn read_pdu(
        &mut self,
        sent: &[u8],
        reply: &mut ReplyData,
    ) -> Result<Vec<u8>, ClientError<T::Error>> {
        let mut pdu = Vec::new();
        let mut buffer: Vec<u8> = Vec::new();
        let mut echo_resent = false;
        loop {
            let frame = loop {
                match Frame::parse(&buffer) {
                    Ok((rest, frame)) => {
                        let consumed = buffer.len() - rest.len();
                        buffer.drain(..consumed);
                        break frame;
                    }
                    Err(nom::Err::Incomplete(_)) => {
                        let resend = buffer.is_empty() && pdu.is_empty();
                        let bytes = self.receive_some(sent, resend)?;
                        if !echo_resent && buffer.is_empty() && pdu.is_empty() && bytes == sent {
                            trace!("transport echoed the request, resending once");
                            echo_resent = true;
                            self.transport.send(sent)?;
                            continue;
                        }
                        buffer.extend_from_slice(&bytes);
                    }
                    Err(_) => return Err(ClientError::Protocol(Error::InvalidFrame)),
                }
            };
            trace!(
                "recv frame, control 0x{:02x}, {} info bytes, segmented {}",
                frame.control,
                frame.information.len(),
                frame.segmented
            );
            if pdu.is_empty() {
                pdu.extend_from_slice(frame.payload().map_err(ClientError::Protocol)?);
            } else {
                // continuation frames carry no LLC header
                pdu.extend_from_slice(&frame.information);
            }
            if frame.segmented {
                reply.note_segmented_frame();
                let rr = Frame::receiver_ready(&mut self.session)
                    .encode()
                    .map_err(ClientError::Protocol)?;
                trace!("segmented frame, sending receiver ready");
                self.transport.send(&rr)?;
                continue;
            }
            return Ok(pdu);
        }
    }

    /// One bounded receive: empty reads and transport errors consume an
    /// attempt, the budget exhausting maps to `Timeout`. While nothing of the
    /// reply has arrived yet, the request frame is sent again before each
    /// further attempt in case the first copy was lost.
    fn receive_some(
        &mut self,
        sent: &[u8],
        resend_on_retry: bool,
    ) -> Result<Vec<u8>, ClientError<T::Error>> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.transport.receive(self.timeout) {
                Ok(bytes) if !bytes.is_empty() => return Ok(bytes),
                result if attempts < RECEIVE_ATTEMPTS => {
                    trace!("receive attempt {} yielded nothing ({:?})", attempts, result.is_err());
                    if resend_on_retry {
                        trace!("resending request before next attempt");
                        self.transport.send(sent)?;
                    }
                }
                _ => return Err(ClientError::Timeout),
            }
        }
    }
}
