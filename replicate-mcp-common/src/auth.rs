//! Replicate API credential handling.
//!
//! The token is read once at startup and attached to every inference request
//! as a bearer header. It never appears in `Debug` output or logs.

use std::fmt;

/// Name of the environment variable holding the Replicate token.
pub const API_TOKEN_ENV: &str = "REPLICATE_API_TOKEN";

/// Replicate API token.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wrap a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// The raw token.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the token is blank.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // r8_ prefix is kept so operators can tell token types apart
        let prefix: String = self.0.chars().take(3).collect();
        write!(f, "ApiToken({}***)", prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_header() {
        let token = ApiToken::new("r8_secret");
        assert_eq!(token.bearer(), "Bearer r8_secret");
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = ApiToken::new("r8_supersecretvalue");
        let debug = format!("{:?}", token);
        assert!(!debug.contains("supersecretvalue"));
        assert!(debug.starts_with("ApiToken(r8_"));
    }

    #[test]
    fn test_token_is_trimmed() {
        let token = ApiToken::new("  r8_abc\n");
        assert_eq!(token.expose(), "r8_abc");
        assert!(!token.is_empty());
        assert!(ApiToken::new("   ").is_empty());
    }
}
