//! Backend API: typed client, wire types and auth error taxonomy.

mod client;
mod errors;
mod types;

pub use client::{BrainClient, USER_AGENT};
pub use errors::{AuthError, AuthResult, ErrorKind};
pub use types::{
    ErrorBody, HealthResponse, LoginRequest, LoginResponse, PasswordHintResponse, VerifyResponse,
};
