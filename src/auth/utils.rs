//! Small helpers for credential validation and random material.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{Rng, RngCore, rngs::OsRng};
use regex::Regex;

/// Length of the random session marker embedded in every login token.
pub const SESSION_MARKER_LEN: usize = 64;

/// Basic email format check.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

/// Create the per-login session marker: 48 random bytes, encoded to exactly
/// 64 url-safe characters. The same value goes into the token payload and
/// the session row, never anywhere else.
pub fn new_session_marker() -> Result<String> {
    let mut bytes = [0u8; 48];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session marker")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Numeric one-time code for password resets.
#[must_use]
pub fn random_digits(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}

/// Mask a phone number for the forgot-password response, keeping only the
/// trailing digits visible.
#[must_use]
pub fn mask_phone(phone: &str) -> String {
    let visible = phone.get(6..).unwrap_or("");
    format!("{}{}", "*".repeat(6), visible)
}

#[cfg(test)]
mod tests {
    use super::{SESSION_MARKER_LEN, mask_phone, new_session_marker, random_digits, valid_email};
    use anyhow::Result;

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn session_marker_is_64_chars_and_unique() -> Result<()> {
        let first = new_session_marker()?;
        let second = new_session_marker()?;
        assert_eq!(first.len(), SESSION_MARKER_LEN);
        assert_eq!(second.len(), SESSION_MARKER_LEN);
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn random_digits_are_numeric() {
        let code = random_digits(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn mask_phone_keeps_trailing_digits() {
        assert_eq!(mask_phone("5512345678"), "******5678");
        // Short values degrade to a fully masked string.
        assert_eq!(mask_phone("12345"), "******");
    }
}
