use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

pub const ADDRESS_LENGTH: usize = 20;

/// Fixed-width caller identifier.
///
/// The all-zero address means "no identified caller" and is never tracked.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    #[inline]
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Address(bytes)
    }

    /// Converts raw caller bytes into an address. Inputs longer than
    /// `ADDRESS_LENGTH` keep their trailing bytes, shorter ones are
    /// left-padded with zeros.
    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut out = [0u8; ADDRESS_LENGTH];
        if bytes.len() > ADDRESS_LENGTH {
            out.copy_from_slice(&bytes[bytes.len() - ADDRESS_LENGTH..]);
        } else {
            out[ADDRESS_LENGTH - bytes.len()..].copy_from_slice(bytes);
        }
        Address(out)
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    #[inline]
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Address(bytes)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let mut out = [0u8; ADDRESS_LENGTH];
        hex::decode_to_slice(digits, &mut out)?;
        Ok(Address(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
