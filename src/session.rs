//! Mutable per-association state: addressing, authentication material,
//! negotiated parameters, HDLC frame sequencing and block progress.

use alloc::vec::Vec;
use core::fmt;

use derive_try_from_primitive::TryFromPrimitive;

use crate::association::Conformance;

/// Authentication mechanism, by its mechanism-name OID id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum Authentication {
    None = 0,
    Low = 1,
    High = 2,
    HighMd5 = 3,
    HighSha1 = 4,
    HighGmac = 5,
}

impl Authentication {
    /// The High family carries challenges instead of a password.
    pub const fn uses_challenges(self) -> bool {
        !matches!(self, Authentication::None | Authentication::Low)
    }
}

impl fmt::Display for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authentication::None => "none".fmt(f),
            Authentication::Low => "low".fmt(f),
            Authentication::High => "high".fmt(f),
            Authentication::HighMd5 => "high-md5".fmt(f),
            Authentication::HighSha1 => "high-sha1".fmt(f),
            Authentication::HighGmac => "high-gmac".fmt(f),
        }
    }
}

/// Frame-sequence starting value for a server.
pub const SERVER_START_SEQUENCE: u8 = 0x0f;
/// Frame-sequence starting value for a client.
pub const CLIENT_START_SEQUENCE: u8 = 0xee;

/// One association's worth of mutable protocol state.
///
/// The two HDLC sequence counters share the single `frame_sequence` byte:
/// the sender sequence lives in bits 1-3 and the receiver sequence in bits
/// 5-7, with bit 4 the receiver-ready marker. The increment methods
/// preserve that layout exactly; the peer validates it per frame.
#[derive(Debug, Clone)]
pub struct Session {
    pub client_address: u32,
    pub server_address: u32,
    pub authentication: Authentication,
    pub password: Vec<u8>,
    pub dlms_version: u8,
    pub max_receive_pdu_size: u16,
    pub use_logical_name_referencing: bool,
    pub conformance: Conformance,
    pub invoke_id: u8,
    is_server: bool,
    frame_sequence: u8,
    block_index: u32,
    ctos_challenge: Vec<u8>,
    stoc_challenge: Vec<u8>,
    custom_challenges: bool,
}

impl Session {
    pub fn new_client(client_address: u32, server_address: u32) -> Self {
        Self {
            client_address,
            server_address,
            authentication: Authentication::None,
            password: Vec::new(),
            dlms_version: 6,
            max_receive_pdu_size: 0xffff,
            use_logical_name_referencing: true,
            conformance: Conformance::CLIENT_DEFAULT_LN,
            invoke_id: 1,
            is_server: false,
            frame_sequence: CLIENT_START_SEQUENCE,
            block_index: 1,
            ctos_challenge: Vec::new(),
            stoc_challenge: Vec::new(),
            custom_challenges: false,
        }
    }

    pub fn new_server(client_address: u32, server_address: u32) -> Self {
        let mut session = Self::new_client(client_address, server_address);
        session.is_server = true;
        session.frame_sequence = SERVER_START_SEQUENCE;
        session
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    /// Switch to short-name referencing, swapping in the SN conformance
    /// proposal.
    pub fn use_short_names(&mut self) {
        self.use_logical_name_referencing = false;
        self.conformance = Conformance::CLIENT_DEFAULT_SN;
    }

    // --- frame sequencing -------------------------------------------------

    pub fn frame_sequence(&self) -> u8 {
        self.frame_sequence
    }

    /// Reset to the role-specific starting value. The asymmetry (server
    /// 0x0F, client 0xEE) is mandated by the link protocol.
    pub fn reset_frame_sequence(&mut self) {
        self.frame_sequence =
            if self.is_server { SERVER_START_SEQUENCE } else { CLIENT_START_SEQUENCE };
    }

    /// Advance the receiver sequence (bits 5-7, step 0x20) and force the
    /// receiver-ready bit; sender bits 1-3 pass through untouched.
    pub fn increase_receiver_sequence(&mut self) -> u8 {
        let v = self.frame_sequence;
        self.frame_sequence = v.wrapping_add(0x20) | 0x10 | (v & 0x0e);
        self.frame_sequence
    }

    /// Advance the sender sequence (bits 1-3, step 2); receiver bits and
    /// the receiver-ready bit pass through untouched.
    pub fn increase_send_sequence(&mut self) -> u8 {
        let v = self.frame_sequence;
        self.frame_sequence = (v & 0xf0) | (v.wrapping_add(2) & 0x0e);
        self.frame_sequence
    }

    // --- block transfer ---------------------------------------------------

    pub fn block_index(&self) -> u32 {
        self.block_index
    }

    /// Called once per accepted segmented block.
    pub fn advance_block_index(&mut self) {
        self.block_index += 1;
    }

    /// Called at the start of each new top-level exchange.
    pub fn reset_block_index(&mut self) {
        self.block_index = 1;
    }

    // --- invoke id --------------------------------------------------------

    /// The invoke-id-and-priority byte: id in the low bits, service-class
    /// and priority bits forced.
    pub fn invoke_id_and_priority(&self) -> u8 {
        self.invoke_id & 0x0f | 0xc0
    }

    // --- challenges -------------------------------------------------------

    /// Pin the challenges so later generated values never overwrite them
    /// (deterministic-testing support).
    pub fn use_custom_challenges(&mut self) {
        self.custom_challenges = true;
    }

    pub fn ctos_challenge(&self) -> &[u8] {
        &self.ctos_challenge
    }

    pub fn stoc_challenge(&self) -> &[u8] {
        &self.stoc_challenge
    }

    /// Set the client-to-server challenge. In custom mode the first
    /// non-empty value sticks.
    pub fn set_ctos_challenge(&mut self, challenge: Vec<u8>) {
        if !(self.custom_challenges && !self.ctos_challenge.is_empty()) {
            self.ctos_challenge = challenge;
        }
    }

    /// Set the server-to-client challenge; same pinning rule.
    pub fn set_stoc_challenge(&mut self, challenge: Vec<u8>) {
        if !(self.custom_challenges && !self.stoc_challenge.is_empty()) {
            self.stoc_challenge = challenge;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_asymmetric_start() {
        let client = Session::new_client(0x10, 0x01);
        assert_eq!(client.frame_sequence(), 0xee);

        let server = Session::new_server(0x10, 0x01);
        assert_eq!(server.frame_sequence(), 0x0f);
    }

    #[test]
    fn test_send_sequence_steps_low_bits_only() {
        let mut session = Session::new_server(0x10, 0x01);
        // 0x0F: sender bits 1-3 advance by 2 and wrap inside the nibble
        assert_eq!(session.increase_send_sequence(), 0x00);
        assert_eq!(session.increase_send_sequence(), 0x02);
        assert_eq!(session.increase_send_sequence(), 0x04);
        // receiver bits never move
        for _ in 0..8 {
            session.increase_send_sequence();
        }
        assert_eq!(session.frame_sequence() & 0xf0, 0x00);
    }

    #[test]
    fn test_receiver_sequence_forces_rr_bit() {
        let mut session = Session::new_client(0x10, 0x01);
        // 0xEE -> receiver bits wrap to 0, RR bit set, sender bits kept
        assert_eq!(session.increase_receiver_sequence(), 0x1e);
        assert_eq!(session.increase_receiver_sequence(), 0x3e);
        assert_eq!(session.increase_receiver_sequence(), 0x5e);
        // RR bit always present afterwards
        assert_ne!(session.frame_sequence() & 0x10, 0);
    }

    #[test]
    fn test_sequences_are_independent() {
        let mut session = Session::new_server(0x10, 0x01);
        session.increase_receiver_sequence();
        let receiver_bits = session.frame_sequence() & 0xf0;
        session.increase_send_sequence();
        assert_eq!(session.frame_sequence() & 0xf0, receiver_bits);
    }

    #[test]
    fn test_sequence_chains_never_reach_peer_start() {
        // walk every interleaving pattern of the two step operations for a
        // while; neither role's chain may ever land on the other's start value
        for pattern in 0u32..16 {
            let mut server = Session::new_server(0x10, 0x01);
            let mut client = Session::new_client(0x10, 0x01);
            for step in 0..256 {
                let (s, c) = if pattern >> (step % 4) & 1 == 0 {
                    (server.increase_send_sequence(), client.increase_send_sequence())
                } else {
                    (server.increase_receiver_sequence(), client.increase_receiver_sequence())
                };
                assert_ne!(s, CLIENT_START_SEQUENCE, "pattern {pattern} step {step}");
                assert_ne!(c, SERVER_START_SEQUENCE, "pattern {pattern} step {step}");
            }
        }
    }

    #[test]
    fn test_reset_restores_role_start() {
        let mut session = Session::new_client(0x10, 0x01);
        session.increase_send_sequence();
        session.increase_receiver_sequence();
        session.reset_frame_sequence();
        assert_eq!(session.frame_sequence(), 0xee);
    }

    #[test]
    fn test_block_index_lifecycle() {
        let mut session = Session::new_client(0x10, 0x01);
        assert_eq!(session.block_index(), 1);
        session.advance_block_index();
        session.advance_block_index();
        assert_eq!(session.block_index(), 3);
        session.reset_block_index();
        assert_eq!(session.block_index(), 1);
    }

    #[test]
    fn test_custom_challenge_is_pinned() {
        let mut session = Session::new_client(0x10, 0x01);
        session.use_custom_challenges();
        session.set_ctos_challenge(alloc::vec![1, 2, 3, 4]);
        session.set_ctos_challenge(alloc::vec![9, 9, 9, 9]);
        assert_eq!(session.ctos_challenge(), &[1, 2, 3, 4]);

        // default mode always takes the latest value
        let mut session = Session::new_client(0x10, 0x01);
        session.set_ctos_challenge(alloc::vec![1, 2, 3, 4]);
        session.set_ctos_challenge(alloc::vec![9, 9, 9, 9]);
        assert_eq!(session.ctos_challenge(), &[9, 9, 9, 9]);
    }

    #[test]
    fn test_invoke_id_and_priority() {
        let mut session = Session::new_client(0x10, 0x01);
        assert_eq!(session.invoke_id_and_priority(), 0xc1);
        session.invoke_id = 5;
        assert_eq!(session.invoke_id_and_priority(), 0xc5);
    }
}
