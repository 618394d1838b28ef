//! Security plumbing for ciphered association contexts: the security
//! control byte and the general-glo-ciphering envelope (Green Book
//! 9.2.7.2.4.1). The AEAD itself is AES-128-GCM from the `aes-gcm` crate;
//! only the envelope and key-material handling live here.

use alloc::vec::Vec;
use core::fmt;

use aes::Aes128;
use aes_gcm::Aes128Gcm;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use cipher::Key;
use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
    number::streaming::{be_u32, u8 as nom_u8},
};

use crate::data::parse_object_count;

/// Outer tag of a general-glo-ciphering APDU.
pub const GENERAL_GLO_CIPHERING_TAG: u8 = 0xdb;

/// The one-byte security header: suite id in the low nibble, feature bits
/// above it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecurityControl(u8);

impl SecurityControl {
    const AUTHENTICATION_BIT: u8 = 0b0001_0000;
    const ENCRYPTION_BIT: u8 = 0b0010_0000;
    const BROADCAST_BIT: u8 = 0b0100_0000;
    const COMPRESSION_BIT: u8 = 0b1000_0000;

    pub fn new(suite_id: u8) -> Self {
        Self(suite_id & 0x0f)
    }

    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    pub fn byte(self) -> u8 {
        self.0
    }

    pub fn suite_id(self) -> u8 {
        self.0 & 0x0f
    }

    pub fn authenticated(self) -> bool {
        self.0 & Self::AUTHENTICATION_BIT != 0
    }

    pub fn encrypted(self) -> bool {
        self.0 & Self::ENCRYPTION_BIT != 0
    }

    pub fn broadcast(self) -> bool {
        self.0 & Self::BROADCAST_BIT != 0
    }

    pub fn compressed(self) -> bool {
        self.0 & Self::COMPRESSION_BIT != 0
    }

    pub fn with_authentication(self) -> Self {
        Self(self.0 | Self::AUTHENTICATION_BIT)
    }

    pub fn with_encryption(self) -> Self {
        Self(self.0 | Self::ENCRYPTION_BIT)
    }

    fn without_encryption(self) -> Self {
        Self(self.0 & !Self::ENCRYPTION_BIT)
    }
}

impl fmt::Debug for SecurityControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityControl")
            .field("suite_id", &self.suite_id())
            .field("authenticated", &self.authenticated())
            .field("encrypted", &self.encrypted())
            .field("broadcast", &self.broadcast())
            .field("compressed", &self.compressed())
            .finish()
    }
}

/// A ciphered APDU envelope: originator system title, security header,
/// invocation counter, ciphertext.
///
/// The initialization vector is the 8-byte system title followed by the
/// 4-byte invocation counter; the counter must never repeat under one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipheredApdu {
    pub system_title: [u8; 8],
    security_control: SecurityControl,
    invocation_counter: u32,
    payload: Vec<u8>,
}

impl CipheredApdu {
    /// Encrypt `plaintext` under `key` into an envelope.
    pub fn seal(
        key: &Key<Aes128>,
        system_title: [u8; 8],
        invocation_counter: u32,
        plaintext: &[u8],
    ) -> Result<Self, aes_gcm::Error> {
        let mut payload = plaintext.to_vec();
        let cipher = Aes128Gcm::new(key);
        let iv = iv(&system_title, invocation_counter);
        cipher.encrypt_in_place_detached(&iv.into(), &[], &mut payload)?;
        Ok(Self {
            system_title,
            security_control: SecurityControl::new(0).with_encryption(),
            invocation_counter,
            payload,
        })
    }

    /// Recover the plaintext. A keystream pass is its own inverse, so this
    /// mirrors `seal`.
    pub fn open(mut self, key: &Key<Aes128>) -> Result<Vec<u8>, aes_gcm::Error> {
        if self.security_control.encrypted() {
            let cipher = Aes128Gcm::new(key);
            let iv = iv(&self.system_title, self.invocation_counter);
            cipher.encrypt_in_place_detached(&iv.into(), &[], &mut self.payload)?;
            self.security_control = self.security_control.without_encryption();
        }
        Ok(self.payload)
    }

    pub fn security_control(&self) -> SecurityControl {
        self.security_control
    }

    pub fn invocation_counter(&self) -> u32 {
        self.invocation_counter
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.payload.len() + 16);
        buf.push(GENERAL_GLO_CIPHERING_TAG);
        buf.push(self.system_title.len() as u8);
        buf.extend_from_slice(&self.system_title);
        crate::data::encode_object_count(self.payload.len() + 5, &mut buf);
        buf.push(self.security_control.byte());
        buf.extend_from_slice(&self.invocation_counter.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != GENERAL_GLO_CIPHERING_TAG {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, title_len) = nom_u8(input)?;
        if title_len != 8 {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify)));
        }
        if input.len() < 8 {
            return Err(nom::Err::Incomplete(nom::Needed::new(8 - input.len())));
        }
        let mut system_title = [0u8; 8];
        system_title.copy_from_slice(&input[..8]);
        let input = &input[8..];

        let (input, body_len) = parse_object_count(input)?;
        if body_len < 5 {
            return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify)));
        }
        let (input, security_control) = nom_u8(input)?;
        let (input, invocation_counter) = be_u32(input)?;
        let payload_len = body_len - 5;
        if input.len() < payload_len {
            return Err(nom::Err::Incomplete(nom::Needed::new(payload_len - input.len())));
        }
        Ok((
            &input[payload_len..],
            Self {
                system_title,
                security_control: SecurityControl::from_byte(security_control),
                invocation_counter,
                payload: input[..payload_len].to_vec(),
            },
        ))
    }
}

fn iv(system_title: &[u8; 8], invocation_counter: u32) -> [u8; 12] {
    let mut iv = [0u8; 12];
    iv[..8].copy_from_slice(system_title);
    iv[8..].copy_from_slice(&invocation_counter.to_be_bytes());
    iv
}
