//! Hardware address parsing
//!
//! Only the canonical `xx:xx:xx:xx:xx:xx` form is accepted: exactly 17
//! characters, six hex pairs separated by colons. Case is not significant.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a canonical colon-separated hardware address string
pub const MAC_STRING_LEN: usize = 17;

/// Errors produced while parsing a hardware address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacError {
    #[error("Invalid address length: {0} characters (expected {MAC_STRING_LEN})")]
    InvalidLength(usize),

    #[error("Expected ':' separator at position {0}")]
    InvalidSeparator(usize),

    #[error("Invalid hex digit at position {0}")]
    InvalidHex(usize),
}

/// A 6-byte link-layer hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Create from raw octets
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Parse a canonical `xx:xx:xx:xx:xx:xx` string
    pub fn parse(input: &str) -> Result<Self, MacError> {
        let bytes = input.as_bytes();
        if bytes.len() != MAC_STRING_LEN {
            return Err(MacError::InvalidLength(input.chars().count()));
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            let start = i * 3;
            if i > 0 && bytes[start - 1] != b':' {
                return Err(MacError::InvalidSeparator(start - 1));
            }
            let hi = hex_value(bytes[start]).ok_or(MacError::InvalidHex(start))?;
            let lo = hex_value(bytes[start + 1]).ok_or(MacError::InvalidHex(start + 1))?;
            *octet = (hi << 4) | lo;
        }

        Ok(Self(octets))
    }

    /// Check whether a string is a valid canonical address
    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    /// Raw octets
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl FromStr for MacAddress {
    type Err = MacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}", a, b, c, d, e, g)
    }
}
