//! Terminal styles for status and inspect annotations.

use anstyle::{AnsiColor, Color, Style};

/// Pending checkout changes.
pub const PENDING: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Magenta)));

/// Additions to the workspace.
pub const ADDED: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green)));

/// Things that need the user's attention.
pub const ATTENTION: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red)));
