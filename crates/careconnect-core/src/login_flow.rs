//! Login page behavior: submit a password, report the outcome, pick where to
//! go next.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{AuthError, AuthResult, ErrorKind};
use crate::config::Config;
use crate::guard::normalize_path;
use crate::notice::Notice;
use crate::session::AuthSession;

pub const HINT_UNAVAILABLE: &str = "Password hint not available";
const LOGIN_SUCCESS: &str = "Login successful";
const EMPTY_PASSWORD: &str = "Please enter the password";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    /// Path to navigate to after a successful login.
    pub redirect_to: String,
}

#[derive(Debug, Clone)]
pub struct LoginFlow {
    session: AuthSession,
    login_path: String,
    default_redirect: String,
}

impl LoginFlow {
    pub fn new(session: AuthSession, login_path: &str, default_redirect: &str) -> Self {
        Self {
            session,
            login_path: normalize_path(login_path),
            default_redirect: default_redirect.to_string(),
        }
    }

    pub fn from_config(session: AuthSession, config: &Config) -> Self {
        Self::new(session, &config.login_path, &config.default_redirect)
    }

    /// Logs in and returns where to go next: `return_to` when it is a safe
    /// local path, else the default landing page.
    ///
    /// # Errors
    /// The login failure. Its message has already been published as a notice.
    pub async fn submit(
        &self,
        password: &str,
        return_to: Option<&str>,
        cancel: &CancellationToken,
    ) -> AuthResult<LoginOutcome> {
        if password.is_empty() {
            let err = AuthError::invalid_credentials(EMPTY_PASSWORD);
            self.session.notifier().publish(Notice::error(&err.message));
            return Err(err);
        }

        match self.session.login(password, cancel).await {
            Ok(()) => {
                self.session.notifier().publish(Notice::success(LOGIN_SUCCESS));
                Ok(LoginOutcome {
                    redirect_to: self.return_target(return_to),
                })
            }
            Err(err) => {
                // Cancellation and supersession are not the user's mistake.
                if !matches!(err.kind, ErrorKind::Cancelled | ErrorKind::Superseded) {
                    self.session.notifier().publish(Notice::error(&err.message));
                }
                Err(err)
            }
        }
    }

    /// The password hint, or a fixed fallback text.
    pub async fn hint(&self) -> String {
        self.session
            .password_hint()
            .await
            .unwrap_or_else(|| HINT_UNAVAILABLE.to_string())
    }

    fn return_target(&self, return_to: Option<&str>) -> String {
        let Some(target) = return_to.map(str::trim).filter(|t| !t.is_empty()) else {
            return self.default_redirect.clone();
        };
        let local = target.starts_with('/') && !target.starts_with("//");
        if local && normalize_path(target) != self.login_path {
            target.to_string()
        } else {
            debug!(target, "Ignoring unsafe return path");
            self.default_redirect.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api::BrainClient;
    use crate::clock::FixedClock;
    use crate::notice::{NoticeLevel, Notifier, drain};
    use crate::session::{AuthStatus, SessionOptions};
    use crate::storage::MemoryStore;
    use crate::token_store::TokenStore;

    fn flow(server: &MockServer) -> LoginFlow {
        let tokens = TokenStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FixedClock::new(1_700_000_000)),
        );
        let client =
            BrainClient::new(&server.uri(), "/api/auth", Duration::from_secs(5), tokens.clone())
                .unwrap();
        let session =
            AuthSession::new(tokens, client, Notifier::default(), SessionOptions::default());
        LoginFlow::from_config(session, &Config::default())
    }

    async fn mount_successful_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "abc",
                "expires_at": 9_999_999_999_i64
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/verify-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"valid": true, "username": "admin"})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_submit_returns_carried_path() {
        let server = MockServer::start().await;
        mount_successful_login(&server).await;
        let flow = flow(&server);
        let mut notices = flow.session.notices();

        let outcome = flow
            .submit("banana1984", Some("/CaregiverProfile/42"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.redirect_to, "/CaregiverProfile/42");
        assert_eq!(drain(&mut notices), vec![Notice::success("Login successful")]);
    }

    #[tokio::test]
    async fn test_submit_defaults_to_dashboard() {
        let server = MockServer::start().await;
        mount_successful_login(&server).await;
        let flow = flow(&server);

        for return_to in [None, Some(""), Some("https://evil.example"), Some("//evil"), Some("/AdminLogin")] {
            let outcome = flow
                .submit("banana1984", return_to, &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(outcome.redirect_to, "/AdminDashboard", "{return_to:?}");
        }
    }

    #[tokio::test]
    async fn test_login_path_compared_normalized() {
        let server = MockServer::start().await;
        mount_successful_login(&server).await;
        let session = flow(&server).session;
        let flow = LoginFlow::new(session, "/AdminLogin/", "/AdminDashboard");

        for return_to in ["/AdminLogin", "/AdminLogin/?from=%2FAdmin", "/AdminLogin#top"] {
            let outcome = flow
                .submit("banana1984", Some(return_to), &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(outcome.redirect_to, "/AdminDashboard", "{return_to}");
        }
    }

    #[tokio::test]
    async fn test_submit_publishes_backend_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid password"})),
            )
            .mount(&server)
            .await;
        let flow = flow(&server);
        let mut notices = flow.session.notices();

        let err = flow
            .submit("wrong", None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvalidCredentials);
        let notices = drain(&mut notices);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].message, "Invalid password");
    }

    #[tokio::test]
    async fn test_empty_password_skips_network() {
        let server = MockServer::start().await;
        let flow = flow(&server);

        let err = flow
            .submit("", None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvalidCredentials);
        assert_eq!(flow.session.state().status, AuthStatus::Uninitialized);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hint_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/password-hint"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let flow = flow(&server);

        assert_eq!(flow.hint().await, HINT_UNAVAILABLE);
    }
}
