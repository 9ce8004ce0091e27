// auth.rs — password hashing and opaque API tokens.
//
// Passwords are stored as `{salt_hex}${digest_hex}` where the digest is an
// iterated salted SHA-256. Tokens are random 32-char hex strings handed out
// at login and stored server-side; clients send them back as
// `Authorization: Token <t>` (or `Bearer <t>`).

use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const HASH_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let digest = iterate(&salt, password.as_bytes());
    format!("{}${}", hex::encode(salt), hex::encode(digest))
}

/// Check a candidate password against a stored `{salt}${digest}` string.
/// Malformed stored values never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };
    let actual = iterate(&salt, password.as_bytes());
    if expected.len() != actual.len() {
        return false;
    }
    // Branch-free comparison so timing does not leak the match prefix.
    expected
        .iter()
        .zip(actual.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn iterate(salt: &[u8], password: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password);
    let mut digest: [u8; 32] = hasher.finalize().into();
    for _ in 1..HASH_ITERATIONS {
        let mut h = Sha256::new();
        h.update(digest);
        h.update(password);
        digest = h.finalize().into();
    }
    digest
}

/// Generate a new API token (UUID v4, hex without dashes = 32 chars).
pub fn generate_token() -> String {
    Uuid::new_v4().to_string().replace('-', "")
}

/// Extract the token from an `Authorization` header value.
///
/// Accepts the original wire format `Token <t>` and `Bearer <t>` as an alias.
pub fn parse_auth_header(value: &str) -> Option<&str> {
    value
        .strip_prefix("Token ")
        .or_else(|| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrip() {
        let stored = hash_password("correct horse battery");
        assert!(verify_password("correct horse battery", &stored));
        assert!(!verify_password("correct horse battery!", &stored));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn malformed_stored_value_never_matches() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "nodollar"));
        assert!(!verify_password("x", "zz$zz"));
    }

    #[test]
    fn token_is_32_hex_chars() {
        let t = generate_token();
        assert_eq!(t.len(), 32);
        assert!(t.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn auth_header_parsing() {
        assert_eq!(parse_auth_header("Token abc123"), Some("abc123"));
        assert_eq!(parse_auth_header("Bearer abc123"), Some("abc123"));
        assert_eq!(parse_auth_header("Basic abc123"), None);
        assert_eq!(parse_auth_header("Token "), None);
    }
}
