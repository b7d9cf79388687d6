//! Declarative dispatch table for lifecycle-relevant log messages.
//!
//! Every parsed line is checked against the full table in order and every
//! matching entry fires. Dispatch is all-matches, not first-match, so entries
//! must be written so unrelated patterns never co-match.

use regex::{Regex, RegexBuilder};

use super::log_line::LogLine;

/// Lifecycle transition detected from a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTrigger {
    /// The server announced it is shutting down.
    ServerStopping,
    /// The server finished booting (RCON listener is up).
    ServerStarted,
}

/// One entry of the pattern table.
#[derive(Debug)]
struct PatternEntry {
    /// Required log level; `None` matches any level.
    level: Option<&'static str>,
    pattern: Regex,
    trigger: LogTrigger,
}

/// Ordered table of (level filter, message pattern, trigger) entries.
#[derive(Debug)]
pub struct PatternTable {
    entries: Vec<PatternEntry>,
}

impl PatternTable {
    /// Build the baseline table: server stop and server start patterns.
    ///
    /// # Errors
    ///
    /// Returns `regex::Error` if a pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        let stop = RegexBuilder::new(r"^(Closing|Stopping)\sServer$")
            .case_insensitive(true)
            .build()?;
        let start = Regex::new(r"^RCON\srunning\son\s")?;

        Ok(Self {
            entries: vec![
                PatternEntry {
                    level: Some("INFO"),
                    pattern: stop,
                    trigger: LogTrigger::ServerStopping,
                },
                PatternEntry {
                    level: Some("INFO"),
                    pattern: start,
                    trigger: LogTrigger::ServerStarted,
                },
            ],
        })
    }

    /// Evaluate all entries against a parsed line.
    ///
    /// Returns the triggers of every entry whose level filter matches the
    /// line's level and whose pattern matches the message, in table order.
    #[must_use]
    pub fn matches(&self, line: &LogLine) -> Vec<LogTrigger> {
        self.entries
            .iter()
            .filter(|entry| entry.level.is_none_or(|level| level == line.level))
            .filter(|entry| entry.pattern.is_match(&line.message))
            .map(|entry| entry.trigger)
            .collect()
    }
}
