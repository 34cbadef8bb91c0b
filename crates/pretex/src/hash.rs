//! Short content hashes used for cache keys and generated CSS ids.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;

/// MD5 digest truncated to 15 bytes, encoded as 20 URL-safe base64 characters.
pub fn b64_hash(data: impl AsRef<[u8]>) -> String {
    let digest = md5::compute(data.as_ref());
    URL_SAFE.encode(&digest.0[..15])
}

/// Prefixed four-character id derived from [`b64_hash`]; `prefix` keeps it a valid CSS identifier.
pub fn short_id(prefix: char, data: impl AsRef<[u8]>) -> String {
    let mut id = String::with_capacity(5);
    id.push(prefix);
    id.push_str(&b64_hash(data)[..4]);
    id
}
