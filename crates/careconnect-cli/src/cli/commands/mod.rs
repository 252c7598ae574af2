pub mod auth;
pub mod config;
pub mod health;
pub mod route;

use careconnect_core::notice::{self, Notice, NoticeLevel};
use tokio::sync::broadcast;

/// Prints queued notices: errors to stderr, everything else to stdout.
pub(crate) fn print_notices(rx: &mut broadcast::Receiver<Notice>) {
    for notice in notice::drain(rx) {
        match notice.level {
            NoticeLevel::Error => eprintln!("{}", notice.message),
            NoticeLevel::Info | NoticeLevel::Success => println!("{}", notice.message),
        }
    }
}
