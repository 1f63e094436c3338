//! Log file discovery.
//!
//! The tunnel script writes `<workspace>/logs/<prefix>_<stamp>.log`, creating
//! a new file on every run. The newest file is the one being written.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Directory under the workspace holding the logs.
#[must_use]
pub fn logs_dir(workspace: &Path) -> PathBuf {
    workspace.join("logs")
}

/// Whether `filename` matches `<prefix>_*.log`.
///
/// # Examples
///
/// ```
/// use rwt_supervisor::watcher::is_log_file_name;
///
/// assert!(is_log_file_name("pdanet_20250101_120000.log", "pdanet"));
/// assert!(!is_log_file_name("pdanet.log", "pdanet"));
/// assert!(!is_log_file_name("pdanet_1.log.gz", "pdanet"));
/// ```
#[must_use]
pub fn is_log_file_name(filename: &str, prefix: &str) -> bool {
    filename
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|rest| rest.ends_with(".log"))
}

/// Find the most recently created log file for `prefix` in the workspace.
///
/// Creation time falls back to modification time on filesystems that do not
/// record it. Ties are broken by file name.
///
/// Returns `None` if no matching file exists or the directory cannot be read.
#[must_use]
pub fn find_latest_log(workspace: &Path, prefix: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(logs_dir(workspace)).ok()?;

    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| is_log_file_name(name, prefix))
        })
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            if !metadata.is_file() {
                return None;
            }
            let created = metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            Some((created, entry.path()))
        })
        .max()
        .map(|(_, path)| path)
}

/// Workspace directory for a tunnel script: the directory containing the
/// script after resolving symlinks.
///
/// Falls back to the unresolved parent if the script cannot be resolved.
#[must_use]
pub fn workspace_for_script(script: &Path) -> Option<PathBuf> {
    match std::fs::canonicalize(script) {
        Ok(resolved) => resolved.parent().map(Path::to_path_buf),
        Err(_) => script.parent().map(Path::to_path_buf),
    }
}
