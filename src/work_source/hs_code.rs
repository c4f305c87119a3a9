//! The unit of work: one 8-digit HS commodity code

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of digits in a tariff-line code
pub const HS_CODE_LEN: usize = 8;

/// An 8-digit numeric commodity code
///
/// Immutable once constructed; the only way in is `FromStr`/`TryFrom`,
/// which enforces the shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HsCode(String);

/// Why a candidate string was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HsCodeError {
    #[error("non-numeric HS code: {0}")]
    NonNumeric(String),
    #[error("HS code must be {HS_CODE_LEN} digits, got {len}: {code}")]
    InvalidLength { code: String, len: usize },
}

impl HsCode {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-digit chapter
    #[must_use]
    pub fn chapter(&self) -> &str {
        &self.0[..2]
    }

    /// Four-digit heading
    #[must_use]
    pub fn heading(&self) -> &str {
        &self.0[..4]
    }

    /// Six-digit sub-heading
    #[must_use]
    pub fn sub_heading(&self) -> &str {
        &self.0[..6]
    }
}

impl FromStr for HsCode {
    type Err = HsCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if !code.chars().all(|c| c.is_ascii_digit()) || code.is_empty() {
            return Err(HsCodeError::NonNumeric(code.to_string()));
        }
        if code.len() != HS_CODE_LEN {
            return Err(HsCodeError::InvalidLength {
                code: code.to_string(),
                len: code.len(),
            });
        }
        Ok(Self(code.to_string()))
    }
}

impl TryFrom<String> for HsCode {
    type Error = HsCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HsCode> for String {
    fn from(code: HsCode) -> Self {
        code.0
    }
}

impl AsRef<str> for HsCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
