//! Parsing of `version` command responses.

use regex::Regex;

use crate::events::VersionInfo;

/// Outcome of classifying a `version` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionOutcome {
    /// Terminal response; the server reported its version.
    Running(VersionInfo),
    /// Transient "still checking" response; retry after a short delay.
    Checking,
    /// The response matched neither shape; skip it.
    Unrecognized,
}

/// Classifier for `version` responses.
#[derive(Debug)]
pub struct VersionParser {
    running: Regex,
    checking: Regex,
}

impl VersionParser {
    /// Compile the response shapes.
    ///
    /// # Errors
    ///
    /// Returns `regex::Error` if a pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            running: Regex::new(r"This server is running\s(.*\sversion\s.*)\s\(MC: (.*?)\)")?,
            checking: Regex::new(r"Checking version, please wait\.\.\.")?,
        })
    }

    /// Classify one response body.
    #[must_use]
    pub fn parse(&self, message: &str) -> VersionOutcome {
        if let Some(caps) = self.running.captures(message) {
            let server_software = caps[1].trim().to_string();
            let mc_version = caps[2].trim().to_string();
            if !server_software.is_empty() && !mc_version.is_empty() {
                return VersionOutcome::Running(VersionInfo {
                    server_software,
                    mc_version,
                });
            }
        }

        if self.checking.is_match(message) {
            return VersionOutcome::Checking;
        }

        VersionOutcome::Unrecognized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_response_resolves_version() {
        let parser = VersionParser::new().unwrap();
        let outcome =
            parser.parse("This server is running Paper version git-Paper-123 (MC: 1.20.1)");

        assert_eq!(
            outcome,
            VersionOutcome::Running(VersionInfo {
                server_software: "Paper version git-Paper-123".to_string(),
                mc_version: "1.20.1".to_string(),
            })
        );
    }

    #[test]
    fn test_checking_response_is_transient() {
        let parser = VersionParser::new().unwrap();
        assert_eq!(
            parser.parse("Checking version, please wait..."),
            VersionOutcome::Checking
        );
    }

    #[test]
    fn test_unrelated_response_is_unrecognized() {
        let parser = VersionParser::new().unwrap();
        assert_eq!(
            parser.parse("Unknown command. Type \"/help\" for help."),
            VersionOutcome::Unrecognized
        );
        assert_eq!(parser.parse(""), VersionOutcome::Unrecognized);
    }

    #[test]
    fn test_non_paper_software_is_accepted() {
        let parser = VersionParser::new().unwrap();
        let outcome = parser.parse("This server is running Purpur version 2034 (MC: 1.21)");
        assert!(matches!(
            outcome,
            VersionOutcome::Running(info) if info.server_software == "Purpur version 2034"
        ));
    }
}
