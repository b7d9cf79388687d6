//! Parsing of dynmap render statistics responses.

use regex::Regex;

/// Outcome of classifying a `dynmap stats` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsOutcome {
    /// The statistics block was found; `None` means no render job is active.
    ActiveJobs(Option<String>),
    /// The response was not a render statistics block; skip it.
    Unrecognized,
}

/// Extracts the active render job target from a statistics block.
#[derive(Debug)]
pub struct StatsParser {
    shape: Regex,
}

impl StatsParser {
    /// Compile the statistics block shape.
    ///
    /// # Errors
    ///
    /// Returns `regex::Error` if the pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            shape: Regex::new(
                r"Tile Render Statistics:(?s:.*?)Active render jobs: ([^\r\n]*)",
            )?,
        })
    }

    /// Classify one response body.
    ///
    /// An empty or `none` job list is the "no active job" sentinel.
    #[must_use]
    pub fn parse(&self, message: &str) -> StatsOutcome {
        let Some(caps) = self.shape.captures(message) else {
            return StatsOutcome::Unrecognized;
        };

        let target = caps[1].trim();
        if target.is_empty() || target.eq_ignore_ascii_case("none") {
            StatsOutcome::ActiveJobs(None)
        } else {
            StatsOutcome::ActiveJobs(Some(target.to_string()))
        }
    }
}
