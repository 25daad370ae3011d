use std::path::PathBuf;

use anyhow::Context;

pub const BUILD_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/build");

pub fn get_path(test_name: &str, file_name: &str) -> PathBuf {
    PathBuf::from(BUILD_DIR).join(test_name).join(file_name)
}

/// Writes a test artifact under the build directory, creating parent directories.
pub fn write_artifact(test_name: &str, file_name: &str, contents: &[u8]) -> anyhow::Result<PathBuf> {
    let path = get_path(test_name, file_name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create `{}`", parent.display()))?;
    }
    std::fs::write(&path, contents)
        .with_context(|| format!("failed to write `{}`", path.display()))?;
    Ok(path)
}
