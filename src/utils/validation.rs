//! Input validation primitives.
//!
//! The provisioning core trusts its parameters; these checks run at the CLI
//! boundary before a job is created.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Require a string to be non-empty after trimming.
///
/// Returns a reference to the trimmed string on success.
pub fn require_non_empty<'a>(value: &'a str, field: &str, message: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::validation_invalid_argument(field, message, None, None))
    } else {
        Ok(trimmed)
    }
}

fn domain_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$")
            .expect("domain pattern is valid")
    })
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("email pattern is valid")
    })
}

/// Validate a bare domain name (DNS label syntax) and return it lower-cased.
pub fn domain(value: &str) -> Result<String> {
    let trimmed = require_non_empty(value, "domain", "Domain cannot be empty")?;
    if trimmed.len() > 253 || !domain_pattern().is_match(trimmed) {
        return Err(Error::validation_invalid_argument(
            "domain",
            "Please enter a valid domain name (e.g., example.com)",
            Some(trimmed.to_string()),
            None,
        ));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Validate an administrator email address.
pub fn email(value: &str) -> Result<String> {
    let trimmed = require_non_empty(value, "email", "Admin email cannot be empty")?;
    if trimmed.len() > 255 || !email_pattern().is_match(trimmed) {
        return Err(Error::validation_invalid_argument(
            "email",
            "Please enter a valid email address",
            Some(trimmed.to_string()),
            None,
        ));
    }
    Ok(trimmed.to_string())
}
