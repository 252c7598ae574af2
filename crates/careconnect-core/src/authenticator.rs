//! Attaches the bearer token to outgoing API requests.

use std::collections::BTreeMap;

use crate::token_store::TokenStore;

pub const AUTHORIZATION: &str = "Authorization";

/// Auth endpoints that must never carry credentials.
const PUBLIC_ENDPOINTS: &[&str] = &["/login", "/password-hint", "/health"];

/// Header set of an outgoing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    pub headers: BTreeMap<String, String>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Adds `Authorization: Bearer <token>` when a token is stored.
///
/// Expiry is not checked here; the backend decides. An existing
/// `Authorization` header is left untouched.
pub fn authorize(params: RequestParams, tokens: &TokenStore) -> RequestParams {
    if params.header(AUTHORIZATION).is_some() {
        return params;
    }
    match tokens.read() {
        Some(session) => params.with_header(AUTHORIZATION, format!("Bearer {}", session.token)),
        None => params,
    }
}

/// Returns true for endpoints that are called without credentials.
pub fn is_public_endpoint(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    PUBLIC_ENDPOINTS
        .iter()
        .any(|endpoint| path.ends_with(endpoint))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::MemoryStore;

    fn tokens() -> TokenStore {
        TokenStore::new(Arc::new(MemoryStore::new()), Arc::new(FixedClock::new(1_000)))
    }

    #[test]
    fn test_no_token_leaves_params_unchanged() {
        let params = RequestParams::new().with_header("Accept", "application/json");
        assert_eq!(authorize(params.clone(), &tokens()), params);
    }

    #[test]
    fn test_token_is_attached_even_when_expired() {
        let tokens = tokens();
        tokens.save("abc", 10).unwrap();

        let params = authorize(RequestParams::new(), &tokens);
        assert_eq!(params.header("authorization"), Some("Bearer abc"));
    }

    #[test]
    fn test_existing_authorization_is_kept() {
        let tokens = tokens();
        tokens.save("abc", 5_000).unwrap();

        let params = authorize(
            RequestParams::new().with_header("authorization", "Bearer explicit"),
            &tokens,
        );
        assert_eq!(params.header(AUTHORIZATION), Some("Bearer explicit"));
        assert_eq!(params.headers.len(), 1);
    }

    #[test]
    fn test_public_endpoints() {
        assert!(is_public_endpoint("/api/auth/login"));
        assert!(is_public_endpoint("/api/auth/password-hint?x=1"));
        assert!(is_public_endpoint("/health"));
        assert!(!is_public_endpoint("/api/auth/verify-token"));
        assert!(!is_public_endpoint("/api/caregivers"));
    }
}
