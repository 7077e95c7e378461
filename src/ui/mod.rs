//! Presentation layer for interactive sessions.
//!
//! - `tui`: full-screen transcript viewport with an input box
//! - `line`: plain scrolling terminal, one prompt per turn

pub mod line;
pub mod tui;

use crate::conversation::Role;
use chrono::{DateTime, Local};

/// Shown before the first message.
pub const GREETING: &str = "What would you like to know?";

/// Frames of the "thinking" indicator.
const SPINNER: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Short speaker tag shown before each message.
pub fn label(role: Role) -> &'static str {
    match role {
        Role::User => "<you>",
        Role::Assistant => "<bot>",
        Role::System => "<sys>",
    }
}

/// Wall-clock time as `HH:MM`.
pub fn timestamp(at: DateTime<Local>) -> String {
    at.format("%H:%M").to_string()
}

pub fn spinner_frame(tick: usize) -> char {
    SPINNER[tick % SPINNER.len()]
}

/// One-line description of piped-in content.
pub fn seed_summary(seed: &str) -> String {
    format!(
        "Content loaded: {} lines, {} characters",
        seed.lines().count(),
        seed.chars().count()
    )
}
