//! Session command handlers.

use std::io::BufRead;

use anyhow::{Context, Result};
use careconnect_core::app::App;
use careconnect_core::session::AuthStatus;
use tracing::debug;

use super::print_notices;
use crate::cli::{EXIT_FAILURE, EXIT_OK};

pub async fn login(app: &App, password: Option<String>, return_to: Option<&str>) -> Result<i32> {
    let password = match password {
        Some(password) => password,
        None => read_password_line()?,
    };

    let mut notices = app.session().notices();
    let result = app
        .login_flow()
        .submit(&password, return_to, app.cancel_token())
        .await;
    print_notices(&mut notices);

    match result {
        Ok(outcome) => {
            println!("Redirect to {}", outcome.redirect_to);
            Ok(EXIT_OK)
        }
        Err(err) => {
            debug!(kind = %err.kind, "Login failed");
            Ok(EXIT_FAILURE)
        }
    }
}

pub fn logout(app: &App) -> i32 {
    let mut notices = app.session().notices();
    app.session().logout();
    print_notices(&mut notices);
    EXIT_OK
}

pub async fn status(app: &App) -> i32 {
    let mut notices = app.session().notices();
    let state = app.initialize().await;
    print_notices(&mut notices);

    println!("status: {}", state.status);
    if let Some(username) = &state.username {
        println!("username: {username}");
    }
    if state.status == AuthStatus::Authenticated
        && let Some(remaining) = app.session().tokens().expires_in()
    {
        println!("expires in: {}s", remaining.as_secs());
    }
    if let Some(message) = &state.error_message {
        println!("error: {message}");
    }
    EXIT_OK
}

pub async fn hint(app: &App) -> i32 {
    println!("{}", app.login_flow().hint().await);
    EXIT_OK
}

fn read_password_line() -> Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
