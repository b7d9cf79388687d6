//! Incremental text file tailer.
//!
//! Reads new lines from the server log as they are appended.

use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use super::error::WatcherError;

/// Incremental line reader that tracks its byte offset in the file.
///
/// Reads only lines appended since the last read, making it suitable for
/// following a growing log file.
#[derive(Debug)]
pub struct LogTailer {
    /// Path to the log file.
    path: PathBuf,
    /// Current byte offset in the file.
    offset: u64,
}

impl LogTailer {
    /// Create a new tailer for the given path, starting at offset 0.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path, offset: 0 }
    }

    /// Create a tailer positioned at the current end of the file.
    ///
    /// Lines already present are never reported; only new growth is. If the
    /// file does not exist yet the tailer starts at offset 0.
    #[must_use]
    pub fn from_end(path: PathBuf) -> Self {
        let offset = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self { path, offset }
    }

    /// Get the current byte offset.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Get the path being tailed.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Read new lines appended since the last read, in file order.
    ///
    /// Blank lines are skipped. A partial line at EOF (no trailing newline
    /// yet) is left unread so the next call sees it whole.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read. If the file is
    /// truncated (smaller than our offset, e.g. log rotation), the offset is
    /// reset to 0 and reading restarts from the beginning.
    pub async fn read_new_lines(&mut self) -> Result<Vec<String>, WatcherError> {
        let file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WatcherError::FileDeleted(self.path.clone()));
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(WatcherError::PermissionDenied(self.path.clone()));
            }
            Err(e) => return Err(WatcherError::Io(e)),
        };

        let metadata = file.metadata().await?;
        let file_len = metadata.len();

        if file_len < self.offset {
            tracing::warn!(
                path = %self.path.display(),
                old_offset = self.offset,
                new_len = file_len,
                "Log file truncated, resetting offset to 0"
            );
            self.offset = 0;
        }

        if file_len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = file;
        file.seek(std::io::SeekFrom::Start(self.offset)).await?;

        let mut reader = BufReader::new(file);
        let mut lines = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                break;
            }

            if !line.ends_with('\n') {
                // Writer is mid-line; pick it up once the newline lands.
                break;
            }

            self.offset += bytes_read as u64;

            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            lines.push(trimmed.to_string());
        }

        Ok(lines)
    }

    /// Reset the offset to the beginning of the file.
    pub fn reset(&mut self) {
        self.offset = 0;
    }
}
