//! HTTP Basic authentication (component 4.N).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// A precomputed `base64("user:pass")` token, built once at config load.
#[derive(Debug, Clone)]
pub struct AuthToken(String);

impl AuthToken {
    /// `None` if `user:pass` exceeds 256 bytes.
    pub fn new(user: &str, pass: &str) -> Option<Self> {
        let plain = format!("{user}:{pass}");
        if plain.len() > 256 {
            return None;
        }
        Some(Self(BASE64.encode(plain)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct BasicAuth {
    tokens: Vec<AuthToken>,
    pub realm: String,
}

impl BasicAuth {
    pub fn new(tokens: Vec<AuthToken>, realm: String) -> Self {
        Self { tokens, realm }
    }

    pub fn is_configured(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Extract the token from a `Basic <tok>` header value and linear-scan
    /// the configured set.
    pub fn authenticate(&self, header_value: &str) -> bool {
        let Some(tok) = header_value.strip_prefix("Basic ") else {
            return false;
        };
        self.tokens.iter().any(|t| t.0 == tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_token_authenticates() {
        let tok = AuthToken::new("alice", "secret").unwrap();
        let auth = BasicAuth::new(vec![tok], "realm".into());
        let header = format!("Basic {}", BASE64.encode("alice:secret"));
        assert!(auth.authenticate(&header));
    }

    #[test]
    fn wrong_token_fails() {
        let tok = AuthToken::new("alice", "secret").unwrap();
        let auth = BasicAuth::new(vec![tok], "realm".into());
        let header = format!("Basic {}", BASE64.encode("alice:wrong"));
        assert!(!auth.authenticate(&header));
    }

    #[test]
    fn oversized_credentials_are_rejected_at_build_time() {
        let huge_user = "a".repeat(300);
        assert!(AuthToken::new(&huge_user, "p").is_none());
    }

    #[test]
    fn base64_round_trips_under_the_256_byte_cap() {
        let creds = "user:pass";
        let encoded = BASE64.encode(creds);
        let decoded = BASE64.decode(&encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), creds);
    }
}
