//! # Terminal Output
//!
//! Colour and emoji decisions for the `mirrorsync` summary lines. The
//! library itself only logs; everything a user reads at the end of a run
//! goes through [`OutputConfig`] and [`status_line`].
//!
//! Colour is controlled by:
//! - `--color=never|always|auto`
//! - `NO_COLOR` (any value, including empty, disables colour)
//! - `CLICOLOR=0` disables, `CLICOLOR_FORCE=1` forces colour on non-TTYs
//! - `TERM=dumb` disables colour

use std::env;

use console::style;

/// Whether colour and emoji are used in output.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    /// Resolve the `--color` flag against the environment.
    ///
    /// `always` overrides `NO_COLOR`; anything other than `always` or
    /// `never` falls back to detection on stdout.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };
        Self { use_color }
    }

    fn detect_color_support() -> bool {
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// `emoji_str` when colour is on, `plain` otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// Outcome class of a summary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Changed,
    Warning,
    DryRun,
}

/// Format one summary line with a status marker.
///
/// ```
/// use mirrorsync::output::{status_line, OutputConfig, Status};
///
/// let config = OutputConfig::from_env_and_flag("never");
/// assert_eq!(status_line(&config, Status::Ok, "all clean"), "[OK] all clean");
/// ```
pub fn status_line(config: &OutputConfig, status: Status, message: &str) -> String {
    let (marker, plain) = match status {
        Status::Ok => ("✅", "[OK]"),
        Status::Changed => ("🔄", "[SYNC]"),
        Status::Warning => ("⚠️ ", "[WARN]"),
        Status::DryRun => ("🔎", "[DRY-RUN]"),
    };
    let marker = emoji(config, marker, plain);
    if !config.use_color {
        return format!("{} {}", marker, message);
    }
    let text = match status {
        Status::Ok => style(message).green(),
        Status::Changed => style(message).cyan(),
        Status::Warning => style(message).yellow(),
        Status::DryRun => style(message).dim(),
    };
    format!("{} {}", marker, text.force_styling(true))
}
