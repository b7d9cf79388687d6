//! Watcher module for the Minecraft server log.
//!
//! Tails the append-only log and classifies lines against a pattern table to
//! detect lifecycle transitions.

mod error;
mod log_line;
mod log_watcher;
mod patterns;
mod tailer;

pub use error::WatcherError;
pub use log_line::{LogLine, LogLineParser};
pub use log_watcher::{LogEvent, LogWatcher};
pub use patterns::{LogTrigger, PatternTable};
pub use tailer::LogTailer;
