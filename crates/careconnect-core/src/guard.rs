//! Route guard for protected console paths.

use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::form_urlencoded;

use crate::config::Config;
use crate::session::{AuthSession, AuthState, AuthStatus};

/// Query parameter carrying the originally requested path.
pub const RETURN_PARAM: &str = "from";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    Protected,
}

/// Redirect to the login page, remembering where the user was headed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    pub from: String,
}

impl Redirect {
    /// `to?from=<encoded path>`.
    pub fn location(&self) -> String {
        let from: String = form_urlencoded::byte_serialize(self.from.as_bytes()).collect();
        format!("{}?{RETURN_PARAM}={from}", self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    /// Auth state not settled yet; show a loading indicator.
    Wait,
    Redirect(Redirect),
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    session: AuthSession,
    login_path: String,
    protected: Vec<String>,
}

impl RouteGuard {
    pub fn new(session: AuthSession, login_path: &str, protected: &[String]) -> Self {
        Self {
            session,
            login_path: normalize_path(login_path),
            protected: protected
                .iter()
                .map(|p| normalize_path(p))
                .filter(|p| p != "/")
                .collect(),
        }
    }

    pub fn from_config(session: AuthSession, config: &Config) -> Self {
        Self::new(session, &config.login_path, &config.protected_paths)
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Classifies `path` by whole-segment prefix match; the login page is
    /// always public.
    pub fn classify(&self, path: &str) -> RouteClass {
        let path = normalize_path(path);
        if path == self.login_path {
            return RouteClass::Public;
        }
        let protected = self
            .protected
            .iter()
            .any(|prefix| is_segment_prefix(prefix, &path));
        if protected {
            RouteClass::Protected
        } else {
            RouteClass::Public
        }
    }

    /// Decision for `path` under `state`. Pure.
    pub fn check(&self, state: &AuthState, path: &str) -> GuardDecision {
        if self.classify(path) == RouteClass::Public {
            return GuardDecision::Render;
        }
        match state.status {
            AuthStatus::Authenticated => GuardDecision::Render,
            AuthStatus::Uninitialized | AuthStatus::Loading => GuardDecision::Wait,
            AuthStatus::Unauthenticated | AuthStatus::Error => GuardDecision::Redirect(Redirect {
                to: self.login_path.clone(),
                from: path.to_string(),
            }),
        }
    }

    /// Waits for the auth state to settle and returns the final decision.
    ///
    /// An uninitialized session is initialized from storage here, so the
    /// call settles without a separate `init_from_storage`.
    pub async fn resolve(&self, path: &str) -> GuardDecision {
        let mut rx = self.session.subscribe();
        loop {
            let state = self.session.state();
            let decision = self.check(&state, path);
            if decision != GuardDecision::Wait {
                debug!(path, ?decision, "Route resolved");
                return decision;
            }
            if state.status == AuthStatus::Uninitialized {
                self.session
                    .init_from_storage(&CancellationToken::new())
                    .await;
                continue;
            }
            if rx.changed().await.is_err() {
                // Sender gone; nothing will settle the state.
                return self.check(&AuthState::unauthenticated(), path);
            }
        }
    }
}

/// Strips query and fragment, ensures a leading slash and drops trailing ones.
pub fn normalize_path(path: &str) -> String {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn is_segment_prefix(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api::BrainClient;
    use crate::clock::FixedClock;
    use crate::notice::Notifier;
    use crate::session::SessionOptions;
    use crate::storage::MemoryStore;
    use crate::token_store::TokenStore;

    const NOW: i64 = 1_700_000_000;

    fn guard_for(server_url: &str) -> RouteGuard {
        let tokens = TokenStore::new(Arc::new(MemoryStore::new()), Arc::new(FixedClock::new(NOW)));
        let client =
            BrainClient::new(server_url, "/api/auth", Duration::from_secs(5), tokens.clone())
                .unwrap();
        let session =
            AuthSession::new(tokens, client, Notifier::default(), SessionOptions::default());
        RouteGuard::from_config(session, &Config::default())
    }

    fn guard() -> RouteGuard {
        guard_for("http://127.0.0.1:9")
    }

    #[test]
    fn test_classify_matches_whole_segments() {
        let guard = guard();
        assert_eq!(guard.classify("/AdminDashboard"), RouteClass::Protected);
        assert_eq!(guard.classify("/Admin/users"), RouteClass::Protected);
        assert_eq!(guard.classify("/CaregiverProfile/42"), RouteClass::Protected);
        assert_eq!(guard.classify("/ClientProfile?id=7"), RouteClass::Protected);
        assert_eq!(guard.classify("/LocationMatching#map"), RouteClass::Protected);

        assert_eq!(guard.classify("/AdminLogin"), RouteClass::Public);
        assert_eq!(guard.classify("/AdminLogin?from=%2FAdmin"), RouteClass::Public);
        assert_eq!(guard.classify("/Administrator"), RouteClass::Public);
        assert_eq!(guard.classify("/"), RouteClass::Public);
        assert_eq!(guard.classify("/about"), RouteClass::Public);
    }

    #[test]
    fn test_check_decisions() {
        let guard = guard();
        let path = "/AdminDashboard";

        assert_eq!(
            guard.check(&AuthState::default(), path),
            GuardDecision::Wait
        );
        assert_eq!(guard.check(&AuthState::loading(), path), GuardDecision::Wait);
        assert_eq!(
            guard.check(&AuthState::authenticated(None), path),
            GuardDecision::Render
        );
        let expected = GuardDecision::Redirect(Redirect {
            to: "/AdminLogin".to_string(),
            from: path.to_string(),
        });
        assert_eq!(guard.check(&AuthState::unauthenticated(), path), expected);
        assert_eq!(guard.check(&AuthState::error("nope"), path), expected);
    }

    #[test]
    fn test_public_paths_never_blocked() {
        let guard = guard();
        for state in [
            AuthState::default(),
            AuthState::loading(),
            AuthState::unauthenticated(),
            AuthState::error("x"),
        ] {
            assert_eq!(guard.check(&state, "/AdminLogin"), GuardDecision::Render);
            assert_eq!(guard.check(&state, "/about"), GuardDecision::Render);
        }
    }

    #[test]
    fn test_redirect_location_encodes_return_path() {
        let redirect = Redirect {
            to: "/AdminLogin".to_string(),
            from: "/CaregiverProfile/42".to_string(),
        };
        assert_eq!(
            redirect.location(),
            "/AdminLogin?from=%2FCaregiverProfile%2F42"
        );
    }

    #[tokio::test]
    async fn test_resolve_waits_for_settled_state() {
        let server = MockServer::start().await;
        let guard = guard_for(&server.uri());
        let session = guard.session.clone();

        let cancel = CancellationToken::new();
        let (decision, _) = tokio::join!(
            guard.resolve("/AdminDashboard"),
            session.init_from_storage(&cancel)
        );

        assert_eq!(
            decision,
            GuardDecision::Redirect(Redirect {
                to: "/AdminLogin".to_string(),
                from: "/AdminDashboard".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_resolve_initializes_idle_session() {
        let server = MockServer::start().await;
        let guard = guard_for(&server.uri());

        let decision = tokio::time::timeout(
            Duration::from_secs(5),
            guard.resolve("/CaregiverProfile/42"),
        )
        .await
        .unwrap();

        assert_eq!(
            decision,
            GuardDecision::Redirect(Redirect {
                to: "/AdminLogin".to_string(),
                from: "/CaregiverProfile/42".to_string(),
            })
        );
        assert_eq!(guard.session.state().status, AuthStatus::Unauthenticated);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/AdminLogin/"), "/AdminLogin");
        assert_eq!(normalize_path(" AdminLogin?from=x"), "/AdminLogin");
        assert_eq!(normalize_path("/"), "/");
    }

    #[tokio::test]
    async fn test_resolve_renders_after_verification() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/verify-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"valid": true, "username": "admin"}))
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;
        let guard = guard_for(&server.uri());
        let session = guard.session.clone();
        session.tokens().save("abc", NOW + 3600).unwrap();

        let cancel = CancellationToken::new();
        let (decision, state) = tokio::join!(
            guard.resolve("/Admin"),
            session.init_from_storage(&cancel)
        );

        assert!(state.is_authenticated());
        assert_eq!(decision, GuardDecision::Render);
    }
}
