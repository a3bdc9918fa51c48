use sha2::{Digest, Sha256};

/// Key identifying one webhook delivery, so redelivered callbacks can be
/// acknowledged without being applied again.
pub fn compute_webhook_key(
    invoice_id: Option<&str>,
    external_id: &str,
    status: &str,
    paid_at: Option<&str>,
) -> String {
    let mut s = String::new();
    if let Some(id) = invoice_id {
        s.push_str(id);
    }
    s.push('|');
    s.push_str(external_id);
    s.push('|');
    s.push_str(status);
    s.push('|');
    if let Some(ts) = paid_at {
        s.push_str(ts);
    }

    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 hex digest of an API token; only the digest is stored.
pub fn hash_api_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares two shared secrets without short-circuiting on the first
/// differing byte. Both sides are hashed first so lengths do not leak either.
pub fn tokens_match(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_key_distinguishes_status_changes() {
        let paid = compute_webhook_key(Some("inv_1"), "lms-abc", "PAID", Some("2026-01-01T00:00:00Z"));
        let again = compute_webhook_key(Some("inv_1"), "lms-abc", "PAID", Some("2026-01-01T00:00:00Z"));
        let settled = compute_webhook_key(Some("inv_1"), "lms-abc", "SETTLED", Some("2026-01-01T00:00:00Z"));
        assert_eq!(paid, again);
        assert_ne!(paid, settled);
        assert_eq!(paid.len(), 64);
    }

    #[test]
    fn missing_fields_do_not_collide_with_present_ones() {
        let without = compute_webhook_key(None, "lms-abc", "EXPIRED", None);
        let with = compute_webhook_key(Some(""), "lms-abc", "EXPIRED", Some(""));
        // Absent and empty are the same canonical string
        assert_eq!(without, with);
        assert_ne!(without, compute_webhook_key(None, "lms-abd", "EXPIRED", None));
    }

    #[test]
    fn token_hash_is_hex_sha256() {
        assert_eq!(
            hash_api_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn tokens_match_only_on_equal_secrets() {
        assert!(tokens_match("change-me", "change-me"));
        assert!(!tokens_match("change-mf", "change-me"));
        assert!(!tokens_match("change", "change-me"));
        assert!(!tokens_match("", "change-me"));
    }
}
