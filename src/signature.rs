//! # Webhook Signature Verification
//!
//! Verifies the `X-Fluid-Signature` header carried by inbound Fluid webhook
//! deliveries: HMAC-SHA256 over the exact raw request bytes, keyed by the
//! tenant's webhook secret, compared in constant time.
//!
//! All failure modes collapse to `false`. Callers must respond identically
//! whether the header was missing, malformed, or simply wrong, so the
//! response never reveals which check failed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-fluid-signature";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Verify an inbound delivery signature against the tenant's webhook secret.
///
/// Expected header format: `sha256=<hex-hmac>` computed over the raw body.
pub fn verify_signature(body: &[u8], signature_header: Option<&str>, secret: Option<&str>) -> bool {
    let (Some(header), Some(secret)) = (signature_header, secret) else {
        return false;
    };

    if secret.is_empty() {
        return false;
    }

    let Some(provided_hex) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    let Ok(provided_bytes) = hex::decode(provided_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected_bytes = mac.finalize().into_bytes();

    let expected: &[u8] = expected_bytes.as_ref();
    subtle::ConstantTimeEq::ct_eq(expected, &provided_bytes[..]).into()
}

/// Compute the signature header value for a body and secret.
///
/// Used by tests and by outbound calls that must sign their own payloads.
pub fn sign_body(body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}
