//! File system helpers.
//!
//! Writes that land in a user's project (generated sources, `deps.json`) go
//! through [`atomic_write`]: the bytes are written to a sibling temp file,
//! synced, and renamed over the target so an interrupted build never leaves a
//! half-written file behind.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Create a directory and all its parents if missing.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Atomically write a UTF-8 string.
pub fn safe_write(path: &Path, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Atomically write bytes using a temp-and-rename strategy.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = temp_sibling(path);

    {
        let mut file = fs::File::create(&temp_path).with_context(|| {
            format!(
                "Failed to create temp file: {}\n\nCheck file permissions and that the directory exists",
                temp_path.display()
            )
        })?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;

        file.sync_all().with_context(|| "Failed to sync file to disk")?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Read a text file, returning `None` when it does not exist.
pub fn read_text_if_exists(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Convert a path to the forward-slash form stored in the graph.
#[must_use]
pub fn normalize_path_for_storage<P: AsRef<Path>>(path: P) -> String {
    path.as_ref().to_string_lossy().replace('\\', "/")
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".intentcode-tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parents() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("src").join("lib").join("main.rs");

        safe_write(&target, "fn main() {}\n").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "fn main() {}\n");
        assert!(!temp_sibling(&target).exists());
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("deps.json");
        safe_write(&target, "{}").unwrap();
        safe_write(&target, "{\"tool\":\"cargo\"}").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "{\"tool\":\"cargo\"}");
    }

    #[test]
    fn test_read_text_if_exists() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.txt");
        assert!(read_text_if_exists(&missing).unwrap().is_none());

        fs::write(&missing, "now here").unwrap();
        assert_eq!(read_text_if_exists(&missing).unwrap().as_deref(), Some("now here"));
    }

    #[test]
    fn test_ensure_dir_rejects_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(ensure_dir(&file).is_err());
    }

    #[test]
    fn test_normalize_path_for_storage() {
        assert_eq!(normalize_path_for_storage("a\\b\\c.md"), "a/b/c.md");
        assert_eq!(normalize_path_for_storage("a/b.md"), "a/b.md");
    }
}
