//! Session and authentication core for the CareConnect admin console
//! (token storage, auth state machine, backend client, route guard).

pub mod api;
pub mod app;
pub mod authenticator;
pub mod clock;
pub mod config;
pub mod guard;
pub mod login_flow;
pub mod notice;
pub mod session;
pub mod storage;
pub mod token_store;
