//! Forge webhook signature verification (HMAC-SHA256).
//!
//! The Forge signs the raw request body with the shared webhook secret and sends
//! `X-Forge-Signature: sha256=<hex>`. Verification runs before the body is parsed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "X-Forge-Signature";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Hex digits in a SHA-256 signature.
const SIGNATURE_HEX_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Missing X-Forge-Signature header")]
    Missing,
    #[error("Invalid signature")]
    Invalid,
}

/// HMAC-SHA256 of `payload` under `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so this never fails.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Header value for a raw signature: `sha256=<hex>`.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(signature))
}

/// Verify `header` against `payload`. With no secret configured every delivery is accepted,
/// signed or not. The header must be exactly `sha256=` followed by 64 lowercase hex digits;
/// the digest comparison is constant time.
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: Option<&str>,
) -> Result<(), SignatureError> {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return Ok(());
    };
    let header = header.ok_or(SignatureError::Missing)?;
    let expected = header
        .strip_prefix(SIGNATURE_PREFIX)
        .filter(|h| is_lowercase_hex_digest(h))
        .and_then(|h| hex::decode(h).ok())
        .ok_or(SignatureError::Invalid)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Invalid)?;
    mac.update(payload);
    mac.verify_slice(&expected).map_err(|_| SignatureError::Invalid)
}

fn is_lowercase_hex_digest(h: &str) -> bool {
    h.len() == SIGNATURE_HEX_LEN && h.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
