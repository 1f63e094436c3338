//! Log file discovery and tailing.

mod cursor;
mod discovery;
mod error;
mod log_tailer;

pub use cursor::LogCursor;
pub use discovery::{find_latest_log, is_log_file_name, logs_dir, workspace_for_script};
pub use error::WatcherError;
pub use log_tailer::{LogTailer, TailerHandle, TailerOptions};
