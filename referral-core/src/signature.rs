//! Request signature verification for inbound Slack calls.
//!
//! Slack signs every request with the app's signing secret:
//! - Signed payload: `v0:{timestamp}:{raw body}`
//! - Header value: `v0=` followed by the hex HMAC-SHA256 of the signed payload
//!
//! Requests outside the timestamp tolerance are rejected before the
//! signature is even looked at, so a captured request cannot be replayed
//! once the window has passed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Version prefix used by Slack for both the base string and the header value.
pub const SIGNATURE_VERSION: &str = "v0";

/// Maximum distance between the request timestamp and now (5 minutes).
///
/// Applies in both directions: old timestamps are replays, future ones are
/// clock skew we refuse to trust.
pub const TIMESTAMP_TOLERANCE_SECONDS: i64 = 300;

/// Header carrying the request timestamp (unix seconds).
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Header carrying the `v0=` signature.
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

/// Check if a request timestamp is within the acceptable tolerance window.
pub fn is_timestamp_within_tolerance(timestamp_secs: i64, now_secs: i64) -> bool {
    (now_secs - timestamp_secs).abs() <= TIMESTAMP_TOLERANCE_SECONDS
}

fn keyed_mac(secret: &str, timestamp: &str, body: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Some(mac)
}

/// Compute the `v0=` header value for a request.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let digest = keyed_mac(secret, timestamp, body)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("{}={}", SIGNATURE_VERSION, digest)
}

/// Verify a Slack request signature.
///
/// Fails closed: an unparseable timestamp, a timestamp outside the tolerance
/// window, a missing `v0=` prefix or non-hex digest all yield `false`. The
/// digest comparison is constant-time.
pub fn verify(secret: &str, body: &[u8], timestamp: &str, signature: &str, now_secs: i64) -> bool {
    let timestamp_secs: i64 = match timestamp.trim().parse() {
        Ok(secs) => secs,
        Err(_) => return false,
    };

    if !is_timestamp_within_tolerance(timestamp_secs, now_secs) {
        return false;
    }

    let signature_hex = match signature
        .strip_prefix(SIGNATURE_VERSION)
        .and_then(|rest| rest.strip_prefix('='))
    {
        Some(hex_part) => hex_part,
        None => return false,
    };

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mac = match keyed_mac(secret, timestamp, body) {
        Some(mac) => mac,
        None => return false,
    };

    // verify_slice performs constant-time comparison
    mac.verify_slice(&signature_bytes).is_ok()
}

/// Compare a presented shared secret (e.g. a bearer token) with the expected
/// one in constant time.
///
/// Both values are run through the same keyed MAC and the digests compared
/// with `verify_slice`, so the comparison time does not depend on where the
/// inputs first differ or on their lengths.
pub fn secrets_match(expected: &str, presented: &str) -> bool {
    const KEY: &[u8] = b"referral-desk shared secret comparison";
    let digest = |value: &str| {
        HmacSha256::new_from_slice(KEY).map(|mut mac| {
            mac.update(value.as_bytes());
            mac
        })
    };
    match (digest(expected), digest(presented)) {
        (Ok(expected_mac), Ok(presented_mac)) => expected_mac
            .verify_slice(&presented_mac.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}
