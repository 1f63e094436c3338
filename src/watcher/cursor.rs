//! Incremental log file reader.
//!
//! Reads complete lines appended since the last read, starting from the
//! point of attachment.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use super::error::WatcherError;

/// Read position in a followed log file.
#[derive(Debug)]
pub struct LogCursor {
    path: PathBuf,
    /// Byte offset of the first unread byte.
    offset: u64,
}

impl LogCursor {
    /// Attach to `path` at its current end, so earlier content is never read.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or inspected.
    pub async fn attach(path: PathBuf) -> Result<Self, WatcherError> {
        let file = File::open(&path)
            .await
            .map_err(|e| WatcherError::from_open(&path, e))?;
        let offset = file.metadata().await?.len();
        tracing::debug!(path = %path.display(), offset, "Attached to log file");
        Ok(Self { path, offset })
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read complete lines appended since the last read.
    ///
    /// A trailing line still missing its newline is left for the next call.
    /// If the file shrank below the cursor (truncated or rotated in place),
    /// reading restarts from the beginning.
    ///
    /// # Errors
    ///
    /// Returns an error if the file disappeared, became unreadable or an
    /// I/O error occurred.
    pub async fn read_new_lines(&mut self) -> Result<Vec<String>, WatcherError> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| WatcherError::from_open(&self.path, e))?;

        let file_len = file.metadata().await?.len();

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
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let bytes_read = reader.read_until(b'\n', &mut buf).await?;

            if bytes_read == 0 || buf.last() != Some(&b'\n') {
                // EOF, possibly in the middle of a line still being written
                break;
            }

            self.offset += bytes_read as u64;
            lines.push(String::from_utf8_lossy(&buf).trim_end().to_string());
        }

        Ok(lines)
    }
}
