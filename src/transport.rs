//! Transport abstraction consumed by the client.
//!
//! The engine is agnostic of the communication medium (TCP, UDP, serial,
//! optical head); implementations handle the low-level byte moving and
//! the crate only sees these capabilities.

use alloc::vec::Vec;
use core::fmt::Debug;
use core::time::Duration;

use crate::data::Value;

/// The byte pipe a session runs over.
///
/// `receive` blocks up to `timeout` and returns whatever bytes arrived;
/// an empty return means the peer sent nothing within the window and is
/// treated as a failed attempt by the retry policy.
pub trait Transport {
    /// The error type returned by transport operations.
    type Error: Debug;

    /// Open the underlying channel.
    fn open(&mut self) -> Result<(), Self::Error>;

    /// Send raw bytes to the remote device.
    fn send(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receive raw bytes, waiting at most `timeout`.
    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, Self::Error>;

    /// Close the underlying channel.
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// Blocking delay, used for the backoff before retrying a transiently
/// rejected request.
pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

#[cfg(feature = "std")]
impl Delay for () {
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Receiver for unsolicited push values (event/data notifications) that
/// arrive while the client is waiting for a solicited reply.
pub trait NotificationSink {
    fn notify(&mut self, value: Value);
}

/// Drops notifications.
#[derive(Debug, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&mut self, _value: Value) {}
}

impl NotificationSink for Vec<Value> {
    fn notify(&mut self, value: Value) {
        self.push(value);
    }
}
