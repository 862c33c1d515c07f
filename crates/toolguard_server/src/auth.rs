//! Bearer-token authentication for the `/api` routes.

use axum::http::{header, HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// Authentication error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization: Bearer` header
    #[error("missing bearer token")]
    MissingToken,
    /// Token does not match the configured key
    #[error("invalid API key")]
    InvalidToken,
}

/// Authentication settings
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Shared API key; `None` disables authentication
    pub api_key: Option<SecretString>,
}

impl AuthConfig {
    /// Require `key` on every API request
    #[must_use]
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::from(key.into())),
        }
    }
}

/// Checks request headers against the configured key
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    config: AuthConfig,
}

impl Authenticator {
    /// Create an authenticator
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Check if a key is configured
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Authenticate a request
    ///
    /// # Errors
    ///
    /// Returns error if a key is configured and the request does not carry it
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let Some(expected) = &self.config.api_key else {
            return Ok(());
        };

        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AuthError::MissingToken)?;

        if constant_time_eq(token.trim().as_bytes(), expected.expose_secret().as_bytes()) {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_disabled_allows_everything() {
        let auth = Authenticator::default();
        assert!(!auth.is_enabled());
        assert!(auth.authenticate(&HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_key_required() {
        let auth = Authenticator::new(AuthConfig::with_api_key("s3cret"));
        assert!(auth.is_enabled());
        assert_eq!(auth.authenticate(&HeaderMap::new()), Err(AuthError::MissingToken));
        assert_eq!(auth.authenticate(&bearer("nope")), Err(AuthError::InvalidToken));
        assert!(auth.authenticate(&bearer("s3cret")).is_ok());
    }

    #[test]
    fn test_token_comparison() {
        assert!(constant_time_eq(b"s3cret", b"s3cret"));
        assert!(!constant_time_eq(b"s3cret", b"s3creT"));
        assert!(!constant_time_eq(b"s3cret", b"s3cret-longer"));
        assert!(!constant_time_eq(b"", b"s3cret"));
    }

    #[test]
    fn test_key_not_in_debug_output() {
        let config = AuthConfig::with_api_key("s3cret");
        assert!(!format!("{:?}", config).contains("s3cret"));
    }
}
