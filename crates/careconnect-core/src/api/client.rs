//! HTTP client for the CareConnect backend.
//!
//! Every call carries an explicit timeout. Protected endpoints go through
//! [`authorize`]; login, password hint and health are sent without
//! credentials.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::errors::{AuthError, AuthResult, ErrorKind};
use super::types::{
    ErrorBody, HealthResponse, LoginRequest, LoginResponse, PasswordHintResponse, VerifyResponse,
};
use crate::authenticator::{self, AUTHORIZATION, RequestParams, authorize};
use crate::config::Config;
use crate::token_store::TokenStore;

/// Standard User-Agent header for CareConnect API requests.
pub const USER_AGENT: &str = concat!("careconnect/", env!("CARGO_PKG_VERSION"));

const LOGIN_ENDPOINT: &str = "/login";
const VERIFY_ENDPOINT: &str = "/verify-token";
const PASSWORD_HINT_ENDPOINT: &str = "/password-hint";
const HEALTH_ENDPOINT: &str = "/health";

/// Typed client for the auth and health endpoints.
#[derive(Debug, Clone)]
pub struct BrainClient {
    http: reqwest::Client,
    server_url: String,
    auth_prefix: String,
    timeout: Duration,
    tokens: TokenStore,
}

impl BrainClient {
    /// Creates a client rooted at `server_url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        server_url: &str,
        auth_prefix: &str,
        timeout: Duration,
        tokens: TokenStore,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        let prefix = auth_prefix.trim().trim_end_matches('/');
        let auth_prefix = if prefix.is_empty() || prefix.starts_with('/') {
            prefix.to_string()
        } else {
            format!("/{prefix}")
        };

        Ok(Self {
            http,
            server_url: server_url.trim().trim_end_matches('/').to_string(),
            auth_prefix,
            timeout,
            tokens,
        })
    }

    /// Creates a client from configuration (server URL env override applies).
    ///
    /// # Errors
    /// Returns an error if the server URL is invalid or the client cannot be built.
    pub fn from_config(config: &Config, tokens: TokenStore) -> Result<Self> {
        let server_url = config.resolve_server_url()?;
        Self::new(
            &server_url,
            &config.auth_prefix,
            config.request_timeout(),
            tokens,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Exchanges the password for a bearer token.
    ///
    /// # Errors
    /// `InvalidCredentials` with the backend's `detail` on non-2xx,
    /// `MalformedResponse` if the body lacks a token, `NetworkFailure` or
    /// `Timeout` on transport problems.
    pub async fn login(&self, password: &str) -> AuthResult<LoginResponse> {
        let builder = self
            .request(Method::POST, &self.auth_url(LOGIN_ENDPOINT), RequestParams::new())
            .json(&LoginRequest { password });
        let (status, body) = send(builder).await?;

        if !status.is_success() {
            let detail = ErrorBody::parse(&body)
                .message()
                .unwrap_or_else(|| "Authentication failed".to_string());
            debug!(%status, "Login rejected");
            return Err(AuthError::invalid_credentials(detail).with_details(format!("HTTP {status}")));
        }

        let parsed: LoginResponse = parse_json(&body)?;
        if parsed.access_token.trim().is_empty() {
            return Err(AuthError::malformed("Missing access token in login response"));
        }
        Ok(parsed)
    }

    /// Verifies the stored token with the backend.
    ///
    /// # Errors
    /// `VerificationRejected` on non-2xx, `MalformedResponse`,
    /// `NetworkFailure` or `Timeout` otherwise.
    pub async fn verify_token(&self) -> AuthResult<VerifyResponse> {
        self.verify(RequestParams::new()).await
    }

    /// Verifies an explicit token without consulting storage.
    ///
    /// # Errors
    /// Same as [`BrainClient::verify_token`].
    pub async fn verify_token_with(&self, token: &str) -> AuthResult<VerifyResponse> {
        self.verify(RequestParams::new().with_header(AUTHORIZATION, format!("Bearer {token}")))
            .await
    }

    /// Fetches the password hint.
    ///
    /// # Errors
    /// Any transport, status or parse failure.
    pub async fn password_hint(&self) -> AuthResult<String> {
        let builder = self.request(
            Method::GET,
            &self.auth_url(PASSWORD_HINT_ENDPOINT),
            RequestParams::new(),
        );
        let (status, body) = send(builder).await?;
        if !status.is_success() {
            return Err(unexpected_status(status, &body));
        }
        let parsed: PasswordHintResponse = parse_json(&body)?;
        Ok(parsed.hint)
    }

    /// Checks backend liveness.
    ///
    /// # Errors
    /// Any transport, status or parse failure.
    pub async fn health(&self) -> AuthResult<HealthResponse> {
        let url = format!("{}{HEALTH_ENDPOINT}", self.server_url);
        let builder = self.request(Method::GET, &url, RequestParams::new());
        let (status, body) = send(builder).await?;
        if !status.is_success() {
            return Err(unexpected_status(status, &body));
        }
        parse_json(&body)
    }

    async fn verify(&self, params: RequestParams) -> AuthResult<VerifyResponse> {
        let builder = self.request(Method::GET, &self.auth_url(VERIFY_ENDPOINT), params);
        let (status, body) = send(builder).await?;
        if !status.is_success() {
            let detail = ErrorBody::parse(&body)
                .message()
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(AuthError::verification_rejected(detail));
        }
        parse_json(&body)
    }

    fn auth_url(&self, endpoint: &str) -> String {
        format!("{}{}{endpoint}", self.server_url, self.auth_prefix)
    }

    fn request(&self, method: Method, url: &str, params: RequestParams) -> RequestBuilder {
        let path = url.strip_prefix(&self.server_url).unwrap_or(url);
        let params = if authenticator::is_public_endpoint(path) {
            params
        } else {
            authorize(params, &self.tokens)
        };

        let mut builder = self.http.request(method, url).timeout(self.timeout);
        for (name, value) in &params.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
}

async fn send(builder: RequestBuilder) -> AuthResult<(StatusCode, String)> {
    let response = builder
        .send()
        .await
        .map_err(|e| AuthError::from_reqwest(&e))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AuthError::from_reqwest(&e))?;
    Ok((status, body))
}

fn parse_json<T: DeserializeOwned>(body: &str) -> AuthResult<T> {
    serde_json::from_str(body).map_err(|e| AuthError::malformed(e.to_string()))
}

fn unexpected_status(status: StatusCode, body: &str) -> AuthError {
    let message = ErrorBody::parse(body)
        .message()
        .unwrap_or_else(|| format!("HTTP {status}"));
    AuthError::new(ErrorKind::MalformedResponse, "Unexpected response from server")
        .with_details(message)
}
