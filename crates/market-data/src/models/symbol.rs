use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Longest ticker accepted, including exchange suffix (e.g., "BRK.B", "^GSPC").
const MAX_SYMBOL_LEN: usize = 12;

/// Validated, uppercase ticker symbol.
///
/// Two symbols that differ only in case or surrounding whitespace are equal.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Normalize and validate a raw symbol.
    ///
    /// Accepts `[A-Z0-9.^=-]`, must start with an alphanumeric character or `^`.
    pub fn parse(raw: &str) -> Result<Self, MarketDataError> {
        let normalized = raw.trim().to_ascii_uppercase();

        if normalized.is_empty() {
            return Err(MarketDataError::InvalidRequest(
                "Symbol must not be empty".to_string(),
            ));
        }

        if normalized.len() > MAX_SYMBOL_LEN {
            return Err(MarketDataError::InvalidRequest(format!(
                "Symbol '{}' exceeds {} characters",
                normalized, MAX_SYMBOL_LEN
            )));
        }

        let mut chars = normalized.chars();
        let first_ok = chars
            .next()
            .map(|c| c.is_ascii_alphanumeric() || c == '^')
            .unwrap_or(false);
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '=' | '^'));

        if !first_ok || !rest_ok {
            return Err(MarketDataError::InvalidRequest(format!(
                "Symbol '{}' contains invalid characters",
                normalized
            )));
        }

        Ok(Self(Arc::from(normalized)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = MarketDataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0.to_string()
    }
}
