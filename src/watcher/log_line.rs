//! Fixed-shape parser for vanilla/Paper server log lines.
//!
//! Only one structural shape matters:
//! `[<timestamp>] [<category>/<thread>]<anything-until-colon>: <message>`.
//! Anything else is log noise and is skipped without error.

use regex::Regex;

/// A parsed server log line.
///
/// Immutable; produced per line and discarded after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Timestamp text, e.g. `12:00:00`.
    pub timestamp: String,
    /// Thread category, e.g. `Server thread`.
    pub category: String,
    /// Log level, read from the part after the slash, e.g. `INFO`.
    pub level: String,
    /// Message payload after the colon.
    pub message: String,
}

/// Parser for the fixed log line shape.
#[derive(Debug, Clone)]
pub struct LogLineParser {
    shape: Regex,
}

impl LogLineParser {
    /// Create a parser with the compiled line shape.
    ///
    /// # Errors
    ///
    /// Returns `regex::Error` if the shape fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        // Shape groups: timestamp, category, thread name, message.
        let shape = Regex::new(r"^\[(.*)\] \[([^/]*)/(.*)\][^:]*: (.*)$")?;
        Ok(Self { shape })
    }

    /// Parse one raw line, or return `None` when it does not conform.
    #[must_use]
    pub fn parse(&self, raw: &str) -> Option<LogLine> {
        let caps = self.shape.captures(raw)?;
        Some(LogLine {
            timestamp: caps[1].to_string(),
            category: caps[2].to_string(),
            level: caps[3].to_string(),
            message: caps[4].to_string(),
        })
    }
}
