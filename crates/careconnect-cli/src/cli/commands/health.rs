//! Backend health check.

use anyhow::{Result, anyhow};
use careconnect_core::app::App;

use crate::cli::EXIT_OK;

pub async fn run(app: &App) -> Result<i32> {
    let health = app.health().await.map_err(|err| match &err.details {
        Some(details) => anyhow!("Backend unhealthy: {err} ({details})"),
        None => anyhow!("Backend unhealthy: {err}"),
    })?;
    println!("status: {}", health.status);
    println!("version: {}", health.version);
    Ok(EXIT_OK)
}
