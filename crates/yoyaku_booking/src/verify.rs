// --- File: crates/yoyaku_booking/src/verify.rs ---
//! Guest verification tokens.
//!
//! A booking response carries a deterministic token derived from the
//! guest's contact fields. Presenting the same email/phone/token triple
//! later authorizes detail lookup and cancellation without any account
//! session. Tokens are a salted HMAC, so they cannot be forged from the
//! contact fields alone.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_LEN: usize = 16;

/// Lowercased, trimmed email. One guest account per normalized email.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Digits only; upstream stores phone numbers in assorted formats.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Generates the verification token for a contact pair.
pub fn generate_token(email: &str, phone: &str, salt: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(normalize_email(email).as_bytes());
    mac.update(b"|");
    mac.update(normalize_phone(phone).as_bytes());
    let digest = mac.finalize().into_bytes();
    let mut token = hex::encode(digest);
    token.truncate(TOKEN_LEN);
    token
}

/// Constant-time token check.
pub fn verify_token(email: &str, phone: &str, salt: &str, token: &str) -> bool {
    constant_time_eq(generate_token(email, phone, salt).as_bytes(), token.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
