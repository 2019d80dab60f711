// src/fingerprint.rs
//! Content fingerprints used for deduplication.
//!
//! `fingerprint = sha256(normalized_title + "\n" + canonical_url)`, hex encoded.
//! Both halves are normalized so cosmetic differences between feeds (case,
//! whitespace, tracking parameters, fragments, trailing slashes) collapse to
//! the same value.

use sha2::{Digest, Sha256};
use url::Url;

/// Lowercase and collapse all whitespace runs into single spaces.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical form of a link: no fragment, no `utm_*` parameters, no trailing
/// slash on non-root paths. Unparsable input is only trimmed and lowercased.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_ascii_lowercase();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.to_ascii_lowercase().starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    url.to_string()
}

/// Stable hex fingerprint of an item's canonical fields.
pub fn fingerprint(title: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_title(title).as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_url(url).as_bytes());
    hex::encode(hasher.finalize())
}
