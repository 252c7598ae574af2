//! Application wiring: builds storage, client, session, guard and login flow
//! from configuration and owns the shutdown token.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{AuthResult, BrainClient, HealthResponse};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::guard::RouteGuard;
use crate::login_flow::LoginFlow;
use crate::notice::Notifier;
use crate::session::{AuthSession, AuthState, SessionOptions};
use crate::storage::{FileStore, KeyValueStore};
use crate::token_store::TokenStore;

#[derive(Debug)]
pub struct App {
    config: Config,
    session: AuthSession,
    guard: RouteGuard,
    login_flow: LoginFlow,
    shutdown: CancellationToken,
    initialized: OnceCell<()>,
}

impl App {
    /// Builds the app with file-backed storage at `config.session_path()`.
    ///
    /// # Errors
    /// Returns an error if the server URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let storage = Arc::new(FileStore::new(config.session_path()));
        Self::with_storage(config, storage, Arc::new(SystemClock))
    }

    /// Builds the app over explicit storage and clock.
    ///
    /// # Errors
    /// Same as [`App::new`].
    pub fn with_storage(
        config: Config,
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let tokens = TokenStore::new(storage, clock);
        let client = BrainClient::from_config(&config, tokens.clone())?;
        let options = SessionOptions {
            expiry_buffer: config.expiry_buffer(),
        };
        let session = AuthSession::new(tokens, client, Notifier::default(), options);
        let guard = RouteGuard::from_config(session.clone(), &config);
        let login_flow = LoginFlow::from_config(session.clone(), &config);

        Ok(Self {
            config,
            session,
            guard,
            login_flow,
            shutdown: CancellationToken::new(),
            initialized: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    pub fn login_flow(&self) -> &LoginFlow {
        &self.login_flow
    }

    /// Token cancelled on shutdown; pass to session operations.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Derives the auth state from storage. Runs once; later calls return
    /// the current state.
    pub async fn initialize(&self) -> AuthState {
        self.initialized
            .get_or_init(|| async {
                let state = self.session.init_from_storage(&self.shutdown).await;
                debug!(status = %state.status, "Session initialized");
            })
            .await;
        self.session.state()
    }

    /// Backend liveness check.
    ///
    /// # Errors
    /// Any transport, status or parse failure.
    pub async fn health(&self) -> AuthResult<HealthResponse> {
        self.session.client().health().await
    }

    /// Cancels every in-flight operation.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
