//! Short-lived signed download links for media files.
//!
//! A link carries the file id and an expiry, signed with HMAC-SHA256 so the
//! download endpoint can verify it without a database lookup.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::types::{DbId, Timestamp};

type HmacSha256 = Hmac<Sha256>;

/// Compute the signature for `file_id` expiring at `expires` (unix seconds).
pub fn sign_download(secret: &str, file_id: DbId, expires: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{file_id}:{expires}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a signature and that it has not expired at `now`.
pub fn verify_download(
    secret: &str,
    file_id: DbId,
    expires: i64,
    signature: &str,
    now: Timestamp,
) -> bool {
    if now.timestamp() > expires {
        return false;
    }
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{file_id}:{expires}").as_bytes());
    match hex::decode(signature) {
        Some(bytes) => mac.verify_slice(&bytes).is_ok(),
        None => false,
    }
}

/// Build a signed download URL valid for `ttl_secs` from `now`.
pub fn signed_download_url(
    base_url: &str,
    secret: &str,
    file_id: DbId,
    ttl_secs: i64,
    now: Timestamp,
) -> String {
    let expires = now.timestamp() + ttl_secs;
    let signature = sign_download(secret, file_id, expires);
    format!(
        "{}/media/{file_id}/download?expires={expires}&signature={signature}",
        base_url.trim_end_matches('/')
    )
}

// ---------------------------------------------------------------------------
// hex encoding helper (no extra dep)
// ---------------------------------------------------------------------------

mod hex {
    /// Encode bytes as a lowercase hex string.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Decode a hex string, returning `None` on odd length or bad digits.
    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
