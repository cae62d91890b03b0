//! Payment callback signing and verification.
//!
//! The provider signs every callback with HMAC-SHA256 over a canonical
//! string: all non-signature fields as `key=value`, sorted by key, joined
//! with `|`. Verification recomputes the MAC and compares in constant time.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Field names that never take part in the canonical string.
pub const SIGNATURE_FIELDS: [&str; 2] = ["signature", "hash"];

/// Build the canonical string for a set of callback fields.
pub fn canonical_string(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .filter(|(k, _)| !SIGNATURE_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("|")
}

/// Sign callback fields, returning the lowercase hex MAC.
pub fn sign(secret: &str, fields: &BTreeMap<String, String>) -> String {
    let mut mac = new_mac(secret);
    mac.update(canonical_string(fields).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex signature over callback fields.
///
/// Malformed hex is treated as a mismatch.
pub fn verify(secret: &str, fields: &BTreeMap<String, String>, signature: &str) -> bool {
    let Some(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let mut mac = new_mac(secret);
    mac.update(canonical_string(fields).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Compare two shared secrets without short-circuiting on the first
/// differing byte.
pub fn secrets_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn new_mac(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length")
}

// ---------------------------------------------------------------------------
// hex encoding helper (no extra dep)
// ---------------------------------------------------------------------------

mod hex {
    /// Encode bytes as a lowercase hex string.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Decode a hex string, `None` on odd length or non-hex characters.
    pub fn decode(s: &str) -> Option<Vec<u8>> {
        // `from_str_radix` alone would accept a sign prefix such as "+a".
        if s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
            .collect()
    }
}
