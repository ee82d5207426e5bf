//! WhatsApp webhook signature verification.
//!
//! Meta signs every webhook delivery with HMAC-SHA256 keyed by the app
//! secret and sends `X-Hub-Signature-256: sha256=<hex>`. The digest covers
//! the raw body bytes exactly as transmitted, so verification must run on
//! those bytes and never on re-serialized JSON.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Verify a webhook signature header against the raw request body.
///
/// # Arguments
///
/// * `app_secret` - The Meta app secret
/// * `body` - Raw request body bytes
/// * `signature_header` - Value of `X-Hub-Signature-256`
///
/// # Returns
///
/// `true` only if the header is well formed and the digest matches. The
/// digest comparison is constant time.
pub fn verify_signature(app_secret: &str, body: &[u8], signature_header: &str) -> bool {
    if app_secret.is_empty() {
        warn!("webhook_signature_no_secret");
        return false;
    }

    let Some(hex_signature) = signature_header.trim().strip_prefix(SIGNATURE_PREFIX) else {
        warn!("webhook_signature_bad_prefix");
        return false;
    };

    let Ok(expected) = hex::decode(hex_signature) else {
        warn!(
            signature_length = hex_signature.len(),
            "webhook_signature_invalid_hex"
        );
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(app_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            warn!("webhook_signature_invalid_key");
            return false;
        }
    };

    mac.update(body);

    let valid = mac.verify_slice(&expected).is_ok();
    if !valid {
        warn!(
            body_length = body.len(),
            signature_length = expected.len(),
            "webhook_signature_mismatch"
        );
    }

    valid
}
