//! Signature check for order webhooks
//!
//! The shop signs each delivery with `base64(HMAC-SHA256(secret, body))` in
//! the `x-webhook-signature` header.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tagpage_common::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

fn mac(secret: &str, body: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Other(anyhow::anyhow!("invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(mac)
}

/// Signature the shop is expected to send for `body`
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    Ok(STANDARD.encode(mac(secret, body)?.finalize().into_bytes()))
}

/// Check a delivery's signature header against its body
pub fn verify(secret: &str, body: &[u8], signature: Option<&str>) -> Result<()> {
    let signature = signature
        .ok_or_else(|| Error::Authorization("missing webhook signature".to_string()))?;
    let tag = STANDARD
        .decode(signature.trim())
        .map_err(|_| Error::Authorization("malformed webhook signature".to_string()))?;

    mac(secret, body)?
        .verify_slice(&tag)
        .map_err(|_| Error::Authorization("webhook signature mismatch".to_string()))
}
