//! Auth state snapshot.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStatus {
    /// Storage not yet consulted
    #[default]
    Uninitialized,
    /// A verification or login call is in flight
    Loading,
    Authenticated,
    Unauthenticated,
    /// Last login attempt failed
    Error,
}

impl AuthStatus {
    /// True once no call is pending and storage has been consulted.
    pub fn is_settled(self) -> bool {
        !matches!(self, AuthStatus::Uninitialized | AuthStatus::Loading)
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuthStatus::Uninitialized => "uninitialized",
            AuthStatus::Loading => "loading",
            AuthStatus::Authenticated => "authenticated",
            AuthStatus::Unauthenticated => "unauthenticated",
            AuthStatus::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthState {
    pub status: AuthStatus,
    pub error_message: Option<String>,
    pub username: Option<String>,
}

impl AuthState {
    pub fn loading() -> Self {
        Self {
            status: AuthStatus::Loading,
            ..Self::default()
        }
    }

    pub fn authenticated(username: Option<String>) -> Self {
        Self {
            status: AuthStatus::Authenticated,
            error_message: None,
            username,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            status: AuthStatus::Unauthenticated,
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AuthStatus::Error,
            error_message: Some(message.into()),
            username: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Authenticated
    }
}
