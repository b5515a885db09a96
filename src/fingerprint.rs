//! Stable fingerprints for log correlation.
//!
//! Query text can carry sensitive literals, so logs at `info` and above
//! identify queries by fingerprint only.
//!
//! Whitespace runs collapse to a single space before hashing, so
//! reformatted copies of a query share a fingerprint.

use xxhash_rust::xxh64::xxh64;

/// Collapse whitespace runs and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// xxh64 of the whitespace-normalized query, as 16 hex chars.
pub fn query_fingerprint(cypher: &str) -> String {
    format!("{:016x}", xxh64(normalize_whitespace(cypher).as_bytes(), 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_insensitive() {
        assert_eq!(
            query_fingerprint("MATCH (n)\n   RETURN n"),
            query_fingerprint("  MATCH (n) RETURN n ")
        );
        assert_ne!(query_fingerprint("MATCH (n) RETURN n"), query_fingerprint("MATCH (m) RETURN m"));
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = query_fingerprint("RETURN 1");
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
