//! Settlement currencies (ISO 4217)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::SettlementError;

/// Three-letter ISO 4217 currency code, stored uppercase
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const EUR: Currency = Currency(*b"EUR");
    pub const USD: Currency = Currency(*b"USD");
    pub const GBP: Currency = Currency(*b"GBP");
    pub const CHF: Currency = Currency(*b"CHF");

    /// Validate a code. Case and surrounding whitespace are ignored.
    pub fn new(code: &str) -> Result<Self, SettlementError> {
        let trimmed = code.trim();
        let bytes = trimmed.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(SettlementError::invalid_input(
                "currency",
                format!("'{}' is not a three-letter ISO 4217 code", code),
            ));
        }
        Ok(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }

    /// Get the ISO 4217 code
    pub fn code(&self) -> &str {
        // Only ASCII letters get past `new`
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// EUR blocks need no exchange rate
    pub fn is_eur(&self) -> bool {
        *self == Self::EUR
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.code())
    }
}

impl FromStr for Currency {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = SettlementError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.code().to_string()
    }
}
