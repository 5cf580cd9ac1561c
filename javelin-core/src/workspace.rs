use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the workspace root, `/`-separated.
    pub path: String,
    pub contents: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Every `.java` file below `root`, ordered by relative path.
pub fn load_workspace(root: impl AsRef<Path>) -> Result<Vec<SourceFile>, CoreError> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(CoreError::MissingWorkspace(root.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "java") {
            let contents = fs::read_to_string(path)?;
            let relative: PathBuf = path.strip_prefix(root).unwrap_or(path).to_path_buf();
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push(SourceFile::new(relative, contents));
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!(target: "pipeline", root = %root.display(), files = files.len(), "workspace loaded");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_java_files_sorted_by_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/B.java"), "class B {}").unwrap();
        fs::write(dir.path().join("A.java"), "class A {}").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = load_workspace(dir.path()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["A.java", "pkg/B.java"]);
        assert_eq!(files[1].contents, "class B {}");
    }

    #[test]
    fn missing_root_is_reported() {
        let err = load_workspace("/definitely/not/here").unwrap_err();
        assert!(matches!(err, CoreError::MissingWorkspace(_)));
    }
}
