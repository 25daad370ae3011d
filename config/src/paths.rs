//! Utilities for locating and reading configuration files.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// The file name searched for by [`find_config`].
pub const CONFIG_FILE_NAME: &str = "sizing.toml";

/// Finds the nearest [`CONFIG_FILE_NAME`] in `cwd` or any of its ancestors.
///
/// `stop_root_at`, if given, is the last directory searched.
pub fn find_config(cwd: &Path, stop_root_at: Option<&Path>) -> Option<PathBuf> {
    for dir in cwd.ancestors() {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if stop_root_at == Some(dir) {
            break;
        }
    }
    None
}

/// Equivalent to [`std::fs::read_to_string`] with better error messages.
pub(crate) fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read `{}`", path.display()))
}
