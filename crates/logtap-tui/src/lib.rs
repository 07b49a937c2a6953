//! logtap-tui: terminal surfaces for logtap.
//!
//! Currently one: the modal shown while credentials are acquired for the
//! remote source.

pub mod auth_modal;

pub use auth_modal::{AuthModal, AuthPopup};

use crossterm::tty::IsTty;

/// True when stdout is a terminal the modal can take over.
pub fn interactive() -> bool {
    std::io::stdout().is_tty()
}
