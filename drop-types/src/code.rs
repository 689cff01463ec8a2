//! The rendezvous code space.
//!
//! A code is four distinct symbols drawn from a 20-symbol alphabet. The
//! alphabet leaves out letters that are easy to misread or mistype, and codes
//! never repeat a symbol so a doubled key press cannot land on a valid code.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The ordered symbol alphabet.
pub const ALPHABET: [u8; 20] = *b"0123456789ACFHNRUWXY";

/// Number of symbols in a code.
pub const CODE_LEN: usize = 4;

/// Number of distinct codes: 20 * 19 * 18 * 17.
pub const CODE_SPACE_SIZE: usize = 116_280;

/// A 4-symbol rendezvous code.
///
/// Only [`generate_all`] and [`Code::parse`] construct codes, and both reject
/// anything outside the code space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Code([u8; CODE_LEN]);

/// Reasons a string is not a valid code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    /// Wrong number of symbols.
    #[error("code must be {CODE_LEN} symbols, got {0}")]
    Length(usize),

    /// A symbol outside the alphabet.
    #[error("symbol {0:?} is not in the code alphabet")]
    Symbol(char),

    /// The same symbol appears twice.
    #[error("symbol {0:?} is repeated")]
    Repeated(char),
}

impl Code {
    /// Parse a code, checking length, alphabet membership and distinctness.
    pub fn parse(s: &str) -> Result<Self, CodeError> {
        let len = s.chars().count();
        if len != CODE_LEN {
            return Err(CodeError::Length(len));
        }

        let mut symbols = [0u8; CODE_LEN];
        for (i, c) in s.chars().enumerate() {
            let b = u8::try_from(c)
                .ok()
                .filter(|b| ALPHABET.contains(b))
                .ok_or(CodeError::Symbol(c))?;
            if symbols[..i].contains(&b) {
                return Err(CodeError::Repeated(c));
            }
            symbols[i] = b;
        }
        Ok(Self(symbols))
    }

    /// The symbols of this code as ASCII bytes.
    pub fn as_bytes(&self) -> &[u8; CODE_LEN] {
        &self.0
    }
}

/// Enumerate every valid code exactly once, in alphabet order.
///
/// Deterministic; called once at startup to populate the slot registry.
pub fn generate_all() -> Vec<Code> {
    let mut codes = Vec::with_capacity(CODE_SPACE_SIZE);
    for &a in &ALPHABET {
        for &b in &ALPHABET {
            if b == a {
                continue;
            }
            for &c in &ALPHABET {
                if c == a || c == b {
                    continue;
                }
                for &d in &ALPHABET {
                    if d == a || d == b || d == c {
                        continue;
                    }
                    codes.push(Code([a, b, c, d]));
                }
            }
        }
    }
    codes
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({})", self)
    }
}

impl FromStr for Code {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Code {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Code::parse(&s).map_err(serde::de::Error::custom)
    }
}
