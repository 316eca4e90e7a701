//! Helpers for sanitizing data before it reaches logs or the filesystem.
//!
//! Logs are safe to share for debugging. These functions make sure user
//! ids and credentials embedded in stream URLs never leak into them, and
//! that arbitrary file names never become filesystem paths.

/// Strips userinfo and query string from a URL.
///
/// - `https://token@api.example.com/batches/1/events` → `https://****@api.example.com/batches/1/events`
/// - `https://api.example.com/batches/1/events?userId=42` → `https://api.example.com/batches/1/events?****`
/// - `https://api.example.com/batches/1/events` → unchanged
pub fn redact_url(url: &str) -> String {
    let (base, has_query) = match url.find('?') {
        Some(pos) => (&url[..pos], true),
        None => (url, false),
    };

    let mut redacted = base.to_string();
    if let Some(scheme_end) = base.find("://") {
        let after_scheme = &base[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].find('@') {
            let scheme = &base[..scheme_end + 3];
            let after_at = &after_scheme[at_pos + 1..];
            redacted = format!("{}****@{}", scheme, after_at);
        }
    }

    if has_query {
        redacted.push_str("?****");
    }
    redacted
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Returns a short hash of a file name, stable across builds (FNV-1a).
///
/// Used as the on-disk key for stored blobs so that names such as
/// `../../etc/passwd` cannot address anything outside the blob directory.
pub fn hash_name(name: &str) -> String {
    let hash = name.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    });
    format!("{:016x}", hash)
}
