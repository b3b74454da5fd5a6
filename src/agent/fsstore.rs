//! Traversal-safe materialization of generated files onto local disk.
//!
//! Generated paths come straight out of a model response and are treated as
//! hostile: every path is sanitized before it touches the filesystem, so a
//! file can never land outside its project root.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Strip traversal sequences and leading slashes from a generated path.
/// Every `..` occurrence is removed outright, then the result is re-rooted
/// as relative.
pub fn sanitize_path(path: &str) -> String {
    let cleaned = path.replace("..", "");
    cleaned.trim_start_matches('/').to_string()
}

/// Root directory for a project's materialized files.
pub fn project_dir(data_dir: &Path, project_id: &str) -> PathBuf {
    data_dir.join(project_id)
}

/// Write one file under the project root, creating parent directories as
/// needed. Re-running with the same path overwrites (last write wins).
pub async fn save_file(project_root: &Path, path: &str, content: &str) -> Result<PathBuf> {
    let relative = sanitize_path(path);
    let full = project_root.join(&relative);
    if let Some(parent) = full.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    tokio::fs::write(&full, content)
        .await
        .with_context(|| format!("Failed to write {}", full.display()))?;
    Ok(full)
}

/// Read one file back from the project root.
pub async fn read_file(project_root: &Path, path: &str) -> Result<String> {
    let full = project_root.join(sanitize_path(path));
    tokio::fs::read_to_string(&full)
        .await
        .with_context(|| format!("Failed to read {}", full.display()))
}

/// List every file under the project root as sorted root-relative paths.
pub fn list_files(project_root: &Path) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(project_root) {
        let entry = entry.with_context(|| {
            format!("Failed to walk {}", project_root.display())
        })?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(project_root)
                .context("Walked entry outside the project root")?;
            paths.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    paths.sort();
    Ok(paths)
}

/// Remove a project's directory tree. Deleting a project that was never
/// materialized is not an error.
pub async fn delete_project(data_dir: &Path, project_id: &str) -> Result<()> {
    let root = project_dir(data_dir, project_id);
    match tokio::fs::remove_dir_all(&root).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to delete {}", root.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_strips_traversal() {
        assert_eq!(sanitize_path("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_path("src/../../main.rs"), "src///main.rs");
        assert_eq!(sanitize_path("a/..b/c"), "a/b/c");
    }

    #[test]
    fn test_sanitize_strips_leading_slash() {
        assert_eq!(sanitize_path("/etc/hosts"), "etc/hosts");
        assert_eq!(sanitize_path("//double"), "double");
        assert_eq!(sanitize_path("normal/path.txt"), "normal/path.txt");
    }

    #[tokio::test]
    async fn test_save_creates_parent_dirs_and_overwrites() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("proj");

        let written = save_file(&root, "src/deep/mod.rs", "one").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&written).await.unwrap(), "one");

        save_file(&root, "src/deep/mod.rs", "two").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&written).await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_save_confines_hostile_paths() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("proj");

        let written = save_file(&root, "../../escape.txt", "gotcha").await.unwrap();
        assert!(written.starts_with(&root));
    }

    #[tokio::test]
    async fn test_list_files_relative_and_sorted() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("proj");
        save_file(&root, "b.txt", "b").await.unwrap();
        save_file(&root, "a/nested.txt", "n").await.unwrap();
        save_file(&root, "a.txt", "a").await.unwrap();

        let listed = list_files(&root).unwrap();
        assert_eq!(listed, vec!["a.txt", "a/nested.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_read_file_round_trip() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("proj");
        save_file(&root, "readme.md", "# hi").await.unwrap();
        assert_eq!(read_file(&root, "readme.md").await.unwrap(), "# hi");
    }

    #[tokio::test]
    async fn test_delete_project_idempotent() {
        let tmp = TempDir::new().unwrap();
        let root = project_dir(tmp.path(), "p1");
        save_file(&root, "f.txt", "x").await.unwrap();

        delete_project(tmp.path(), "p1").await.unwrap();
        assert!(!root.exists());
        // Second delete is a no-op, not an error.
        delete_project(tmp.path(), "p1").await.unwrap();
    }
}
