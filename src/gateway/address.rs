//! Recipient address normalization.

use crate::error::GatewayError;

/// How raw phone numbers become network addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressFormat {
    /// Replaces a single leading `0` (trunk prefix).
    pub country_code: String,
    /// Domain appended after `@`.
    pub suffix: String,
}

impl Default for AddressFormat {
    fn default() -> Self {
        Self {
            country_code: "62".to_string(),
            suffix: "s.whatsapp.net".to_string(),
        }
    }
}

impl AddressFormat {
    pub fn new(country_code: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            suffix: suffix.into(),
        }
    }

    /// Turn a user-entered phone number into a network address.
    ///
    /// Non-digits are dropped, a leading `0` becomes the country code and the
    /// suffix is appended. Already-normalized addresses come back unchanged.
    pub fn normalize(&self, raw: &str) -> Result<String, GatewayError> {
        let trimmed = raw.trim();
        let local = trimmed
            .strip_suffix(self.suffix.as_str())
            .and_then(|rest| rest.strip_suffix('@'))
            .unwrap_or(trimmed);

        let digits: String = local.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(GatewayError::InvalidRecipient {
                input: raw.to_string(),
            });
        }

        let number = match digits.strip_prefix('0') {
            Some(rest) => format!("{}{}", self.country_code, rest),
            None => digits,
        };
        Ok(format!("{}@{}", number, self.suffix))
    }
}
