//! Auth state machine.
//!
//! `AuthSession` owns the auth state and the session token lifecycle:
//! startup verification, login, logout and expiry cleanup. State changes are
//! published on a watch channel for the route guard and other observers.
//!
//! Login and verification attempts are tagged with a generation; only the
//! latest issued attempt may touch storage or state when it completes.

mod attempt;
mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use self::attempt::{Attempt, Attempts, Generation};
pub use self::state::{AuthState, AuthStatus};
use crate::api::{AuthError, AuthResult, BrainClient, ErrorKind, VerifyResponse};
use crate::notice::{Notice, Notifier};
use crate::token_store::{SessionToken, TokenStore};

const LOGGED_OUT: &str = "Logged out successfully";

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// A token with less remaining lifetime than this counts as expired.
    pub expiry_buffer: Duration,
}

/// Shared handle to the auth state machine. Clones refer to the same session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tokens: TokenStore,
    client: BrainClient,
    notifier: Notifier,
    options: SessionOptions,
    state: watch::Sender<AuthState>,
    // Held while applying results so storage and state change together.
    attempts: Mutex<Attempts>,
}

impl AuthSession {
    pub fn new(
        tokens: TokenStore,
        client: BrainClient,
        notifier: Notifier,
        options: SessionOptions,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            inner: Arc::new(Inner {
                tokens,
                client,
                notifier,
                options,
                state,
                attempts: Mutex::new(Attempts::default()),
            }),
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    pub fn client(&self) -> &BrainClient {
        &self.inner.client
    }

    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    pub fn expiry_buffer(&self) -> Duration {
        self.inner.options.expiry_buffer
    }

    /// Receiver that wakes on every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notifier.subscribe()
    }

    /// Current state.
    ///
    /// An `Authenticated` state whose token is missing or expired is repaired
    /// to `Unauthenticated` (and storage cleared) before being returned.
    pub fn state(&self) -> AuthState {
        let current = self.inner.state.borrow().clone();
        if !current.is_authenticated() || self.token_usable() {
            return current;
        }

        let _attempts = self.lock_attempts();
        let current = self.inner.state.borrow().clone();
        if !current.is_authenticated() || self.token_usable() {
            return current;
        }
        debug!(kind = %ErrorKind::TokenExpired, "Authenticated without a usable token; clearing session");
        self.clear_tokens();
        let repaired = AuthState::unauthenticated();
        self.set_state(repaired.clone());
        repaired
    }

    /// Returns the stored token if it is still usable.
    ///
    /// # Errors
    /// `TokenExpired` when the token is missing or expired; expired tokens
    /// are cleared silently and the state becomes `Unauthenticated`.
    pub fn require_token(&self) -> AuthResult<SessionToken> {
        if let Some(token) = self.usable_token() {
            return Ok(token);
        }
        let attempts = self.lock_attempts();
        if self.inner.tokens.read().is_some() {
            self.clear_tokens();
        }
        if !attempts.has_in_flight() && self.inner.state.borrow().is_authenticated() {
            self.set_state(AuthState::unauthenticated());
        }
        Err(AuthError::token_expired())
    }

    /// Derives the auth state from storage at startup.
    ///
    /// A missing or expired token settles to `Unauthenticated` without a
    /// network call. Otherwise the token is verified once; any failure clears
    /// it and publishes a one-time "session expired" notice.
    pub async fn init_from_storage(&self, cancel: &CancellationToken) -> AuthState {
        let Some(token) = self.inner.tokens.read() else {
            debug!("No session token in storage");
            self.settle_without_token();
            return self.state();
        };
        if !token.is_valid_at(self.inner.tokens.now(), self.expiry_buffer()) {
            debug!(
                kind = %ErrorKind::TokenExpired,
                expires_at = token.expires_at,
                "Stored session token expired"
            );
            self.settle_without_token();
            return self.state();
        }

        let (attempt, prior) = self.begin(cancel);
        let outcome = tokio::select! {
            biased;
            () = attempt.cancel.cancelled() => None,
            result = self.inner.client.verify_token() => Some(result),
        };
        let Some(result) = outcome else {
            self.abandon(&attempt, prior);
            return self.state();
        };

        let verdict = match result {
            Ok(VerifyResponse {
                valid: true,
                username,
                ..
            }) => Ok(username),
            Ok(_) => Err(AuthError::verification_rejected(
                "Backend reported the token as invalid",
            )),
            Err(err) => Err(err),
        };

        match verdict {
            Ok(username) => {
                let applied = self.finish(&attempt, || {
                    self.set_state(AuthState::authenticated(username.clone()));
                });
                if applied {
                    info!(username = username.as_deref().unwrap_or("-"), "Session restored");
                } else {
                    debug!("Discarding stale verification result");
                }
            }
            Err(err) => {
                log_failure("verify", &err);
                let applied = self.finish(&attempt, || {
                    self.clear_tokens();
                    self.set_state(AuthState::unauthenticated());
                });
                if applied {
                    self.inner
                        .notifier
                        .publish(Notice::error(AuthError::verification_rejected("").message));
                } else {
                    debug!("Discarding stale verification failure");
                }
            }
        }

        self.state()
    }

    /// Exchanges `password` for a session token.
    ///
    /// On success the token is stored and the state becomes `Authenticated`.
    /// On failure the state becomes `Error` with a readable message and any
    /// previously stored token is left as it was.
    ///
    /// # Errors
    /// The exchange failure, `StorageFailure` if the token cannot be saved,
    /// `Cancelled` if `cancel` fires first, or `Superseded` if a newer attempt
    /// started before this one finished.
    pub async fn login(&self, password: &str, cancel: &CancellationToken) -> AuthResult<()> {
        let (attempt, prior) = self.begin(cancel);

        let outcome = tokio::select! {
            biased;
            () = attempt.cancel.cancelled() => None,
            result = self.inner.client.login(password) => Some(result),
        };
        let Some(result) = outcome else {
            self.abandon(&attempt, prior);
            return Err(AuthError::cancelled());
        };

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                log_failure("login", &err);
                let message = err.message.clone();
                if !self.finish(&attempt, || self.set_state(AuthState::error(message))) {
                    debug!("Discarding stale login failure");
                }
                return Err(err);
            }
        };

        // The username is informational; a failed lookup does not fail login.
        let lookup = tokio::select! {
            biased;
            () = attempt.cancel.cancelled() => None,
            result = self.inner.client.verify_token_with(&response.access_token) => Some(result),
        };
        let Some(lookup) = lookup else {
            self.abandon(&attempt, prior);
            return Err(AuthError::cancelled());
        };
        let username = match lookup {
            Ok(VerifyResponse {
                valid: true,
                username,
                ..
            }) => username,
            Ok(_) => {
                warn!("Token verification failed, proceeding with login");
                None
            }
            Err(err) => {
                warn!(kind = %err.kind, "Token verification error, proceeding with login");
                None
            }
        };

        let mut saved = Ok(());
        let applied = self.finish(&attempt, || {
            match self
                .inner
                .tokens
                .save(&response.access_token, response.expires_at)
            {
                Ok(()) => self.set_state(AuthState::authenticated(username)),
                Err(e) => {
                    let err = AuthError::storage(format!("{e:#}"));
                    warn!(details = ?err.details, "Failed to persist session token");
                    self.set_state(AuthState::error(err.message.clone()));
                    saved = Err(err);
                }
            }
        });
        if !applied {
            debug!("Discarding stale login result");
            return Err(AuthError::superseded());
        }
        saved?;

        info!(expires_at = response.expires_at, "Login successful");
        Ok(())
    }

    /// Clears the session unconditionally. Any in-flight attempt is cancelled
    /// and its result discarded.
    pub fn logout(&self) {
        {
            let mut attempts = self.lock_attempts();
            attempts.abort();
            self.clear_tokens();
            self.set_state(AuthState::unauthenticated());
        }
        info!("Logged out");
        self.inner.notifier.publish(Notice::success(LOGGED_OUT));
    }

    /// Best-effort password hint. Failures are logged and reported as `None`.
    pub async fn password_hint(&self) -> Option<String> {
        match self.inner.client.password_hint().await {
            Ok(hint) if !hint.trim().is_empty() => Some(hint),
            Ok(_) => {
                debug!("Backend returned an empty password hint");
                None
            }
            Err(err) => {
                warn!(kind = %err.kind, details = ?err.details, "Password hint unavailable");
                None
            }
        }
    }

    fn begin(&self, cancel: &CancellationToken) -> (Attempt, AuthState) {
        let mut attempts = self.lock_attempts();
        let prior = self.inner.state.borrow().clone();
        let attempt = attempts.begin(cancel);
        self.set_state(AuthState::loading());
        (attempt, prior)
    }

    /// Runs `apply` if `attempt` is still the latest; returns whether it ran.
    fn finish(&self, attempt: &Attempt, apply: impl FnOnce()) -> bool {
        let mut attempts = self.lock_attempts();
        if !attempts.finish(attempt.generation) {
            return false;
        }
        apply();
        true
    }

    /// Restores the pre-attempt state after cancellation.
    fn abandon(&self, attempt: &Attempt, prior: AuthState) {
        let mut attempts = self.lock_attempts();
        if attempts.finish(attempt.generation) {
            let restored = if prior.status.is_settled() {
                prior
            } else {
                AuthState::unauthenticated()
            };
            debug!(status = %restored.status, "Auth attempt cancelled");
            self.set_state(restored);
        }
    }

    fn settle_without_token(&self) {
        let attempts = self.lock_attempts();
        self.clear_tokens();
        // An in-flight login will settle the state itself.
        if !attempts.has_in_flight() {
            self.set_state(AuthState::unauthenticated());
        }
    }

    fn usable_token(&self) -> Option<SessionToken> {
        self.inner
            .tokens
            .read()
            .filter(|t| t.is_valid_at(self.inner.tokens.now(), self.expiry_buffer()))
    }

    fn token_usable(&self) -> bool {
        self.usable_token().is_some()
    }

    fn clear_tokens(&self) {
        if let Err(e) = self.inner.tokens.clear() {
            warn!(error = %format!("{e:#}"), "Failed to clear session storage");
        }
    }

    fn set_state(&self, state: AuthState) {
        debug!(status = %state.status, "Auth state changed");
        self.inner.state.send_replace(state);
    }

    fn lock_attempts(&self) -> MutexGuard<'_, Attempts> {
        self.inner
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_failure(operation: &str, err: &AuthError) {
    match err.kind {
        ErrorKind::InvalidCredentials => info!(operation, "Credentials rejected"),
        ErrorKind::MalformedResponse => {
            warn!(operation, details = ?err.details, "Malformed response from server");
        }
        ErrorKind::NetworkFailure => {
            warn!(operation, details = ?err.details, "Network failure");
        }
        ErrorKind::Timeout => warn!(operation, "Request timed out"),
        ErrorKind::VerificationRejected => {
            info!(operation, details = ?err.details, "Token rejected by server");
        }
        _ => debug!(operation, kind = %err.kind, "Auth attempt failed"),
    }
}
