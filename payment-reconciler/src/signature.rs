//! Webhook signature verification
//!
//! The gateway signs the canonical payload string with HMAC-SHA256;
//! the signature travels base64-encoded. Verification recomputes the
//! MAC and compares in constant time — a mismatch is a plain `false`,
//! never an exception.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign a canonical payload string (test fixtures, outbound calls)
pub fn sign_payload(payload: &str, secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Verify a signature over a canonical payload string.
///
/// Returns `false` for undecodable signatures as well as MAC
/// mismatches; the comparison itself is constant-time.
pub fn verify_signature(payload: &str, signature: &str, secret: &[u8]) -> bool {
    let provided = match STANDARD.decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload.as_bytes());
    mac.verify_slice(&provided).is_ok()
}

/// Generate a random 32-byte webhook secret
pub fn generate_secret() -> [u8; 32] {
    rand::random::<[u8; 32]>()
}
