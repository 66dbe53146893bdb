//! Recipient address normalization.

use std::fmt;

use serde::Serialize;

use crate::error::DispatchError;

/// Server part of every individual chat address on the network.
pub const DOMAIN_SUFFIX: &str = "s.whatsapp.net";

/// Country code applied to local numbers unless configured otherwise.
pub const DEFAULT_COUNTRY_CODE: &str = "62";

const MIN_DIGITS: usize = 10;
const MAX_DIGITS: usize = 15;

/// Normalize a free-form phone string into a country-qualified digit string.
///
/// Separators are dropped, a trailing `@s.whatsapp.net` is accepted, a local
/// leading `0` is swapped for `country_code` and any other number without the
/// code gets it prepended, unless that would push it past 15 digits, in which
/// case it is taken as already international. The result always has 10 to 15
/// digits and is a fixed point: normalizing it again returns it unchanged.
pub fn normalize(raw: &str, country_code: &str) -> Result<String, DispatchError> {
    let number = match raw.trim().split_once('@') {
        Some((user, server)) if server == DOMAIN_SUFFIX => user,
        Some((_, server)) => {
            return Err(DispatchError::invalid_recipient(format!(
                "unsupported address domain {server:?}"
            )));
        },
        None => raw,
    };

    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    check_length(&digits)?;

    let qualified = if let Some(local) = digits.strip_prefix('0') {
        format!("{country_code}{local}")
    } else if digits.starts_with(country_code)
        || digits.len() + country_code.len() > MAX_DIGITS
    {
        digits
    } else {
        format!("{country_code}{digits}")
    };
    check_length(&qualified)?;
    Ok(qualified)
}

fn check_length(digits: &str) -> Result<(), DispatchError> {
    if digits.len() < MIN_DIGITS {
        return Err(DispatchError::invalid_recipient(format!(
            "expected at least {MIN_DIGITS} digits, got {}",
            digits.len()
        )));
    }
    if digits.len() > MAX_DIGITS {
        return Err(DispatchError::invalid_recipient(format!(
            "expected at most {MAX_DIGITS} digits, got {}",
            digits.len()
        )));
    }
    Ok(())
}

/// Network-qualified recipient, e.g. `628123456789@s.whatsapp.net`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct RecipientAddress {
    user: String,
}

impl RecipientAddress {
    pub fn parse(raw: &str, country_code: &str) -> Result<Self, DispatchError> {
        Ok(Self {
            user: normalize(raw, country_code)?,
        })
    }

    /// Country-qualified digits.
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn server(&self) -> &'static str {
        DOMAIN_SUFFIX
    }
}

impl fmt::Display for RecipientAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, DOMAIN_SUFFIX)
    }
}

impl From<RecipientAddress> for String {
    fn from(address: RecipientAddress) -> Self {
        address.to_string()
    }
}
