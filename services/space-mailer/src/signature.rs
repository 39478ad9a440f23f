//! Webhook payload authentication
//!
//! Webex signs every webhook delivery with HMAC-SHA1 over the raw request
//! body, keyed by the secret given at registration, and sends the lowercase
//! hex digest in `X-Spark-Signature`.

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-spark-signature";

/// Lowercase hex HMAC-SHA1 of `body` under `secret`.
pub fn sign(secret: &[u8], body: &[u8]) -> Option<String> {
    let mut mac = HmacSha1::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Whether `signature` is the exact digest of `body`. Compared in constant time.
pub fn verify(secret: &[u8], body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    let Some(expected) = sign(secret, body) else {
        return false;
    };
    common::constant_time_eq(expected.as_bytes(), signature.as_bytes())
}
