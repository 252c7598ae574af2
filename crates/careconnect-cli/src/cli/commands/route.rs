//! Route guard check for a console path.

use careconnect_core::app::App;
use careconnect_core::guard::GuardDecision;

use super::print_notices;
use crate::cli::{EXIT_OK, EXIT_REDIRECT};

pub async fn open(app: &App, path: &str) -> i32 {
    let mut notices = app.session().notices();
    app.initialize().await;
    let decision = app.guard().resolve(path).await;
    print_notices(&mut notices);

    match decision {
        GuardDecision::Render => {
            println!("render {path}");
            EXIT_OK
        }
        GuardDecision::Redirect(redirect) => {
            println!("redirect {}", redirect.location());
            EXIT_REDIRECT
        }
        // resolve only returns settled decisions
        GuardDecision::Wait => {
            println!("wait {path}");
            EXIT_OK
        }
    }
}
