//! Leveled, colorized diagnostic output for startup and host messages.

use tracing::Level;

/// ANSI colour codes.
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const FG_RED: &str = "\x1b[31m";
    pub const FG_GREEN: &str = "\x1b[32m";
    pub const FG_YELLOW: &str = "\x1b[33m";
    pub const FG_BLUE: &str = "\x1b[34m";
}

const TAG: &str = "Jetpath";

/// Stateless printer. Each level has its own colour; the line is handed to
/// `tracing` so it lands wherever the subscriber writes.
pub struct Log;

impl Log {
    /// Render `message` with the fixed tag wrapped in `color`.
    pub fn paint(message: &str, color: &str) -> String {
        format!("{}{}: {}{}", color, TAG, message, colors::RESET)
    }

    fn print(level: Level, message: &str, color: &str) {
        let line = Self::paint(message, color);
        match level {
            Level::ERROR => tracing::error!(target: "jetpath", "{}", line),
            Level::WARN => tracing::warn!(target: "jetpath", "{}", line),
            _ => tracing::info!(target: "jetpath", "{}", line),
        }
    }

    pub fn info(message: impl AsRef<str>) {
        Self::print(Level::INFO, message.as_ref(), colors::FG_BLUE);
    }

    pub fn warn(message: impl AsRef<str>) {
        Self::print(Level::WARN, message.as_ref(), colors::FG_YELLOW);
    }

    pub fn error(message: impl AsRef<str>) {
        Self::print(Level::ERROR, message.as_ref(), colors::FG_RED);
    }

    pub fn success(message: impl AsRef<str>) {
        Self::print(Level::INFO, message.as_ref(), colors::FG_GREEN);
    }
}
