//! Finds the files of a benchmark run.

use std::io;
use std::path::{Path, PathBuf};

/// A regular file found in the input directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Lists the regular files directly inside `input_dir`, sorted by file name.
///
/// Symlinks are followed. Subdirectories and entries that vanish or cannot be inspected while
/// listing are skipped. At most `limit` files are returned.
pub async fn discover(input_dir: &Path, limit: Option<usize>) -> io::Result<Vec<SourceFile>> {
    let mut entries = tokio::fs::read_dir(input_dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => files.push(SourceFile {
                path,
                size: metadata.len(),
            }),
            Ok(_) => tracing::trace!(path = %path.display(), "skipping non-file entry"),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = &err as &dyn std::error::Error,
                    "skipping unreadable entry"
                );
            }
        }
    }

    files.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    if let Some(limit) = limit {
        files.truncate(limit);
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_regular_files_in_order() {
        let tempdir = tempfile::tempdir().unwrap();
        std::fs::write(tempdir.path().join("b"), b"bb").unwrap();
        std::fs::write(tempdir.path().join("a"), b"a").unwrap();
        std::fs::write(tempdir.path().join("c"), b"ccc").unwrap();
        std::fs::create_dir(tempdir.path().join("nested")).unwrap();

        let files = discover(tempdir.path(), None).await.unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|file| file.path.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
        let sizes: Vec<_> = files.iter().map(|file| file.size).collect();
        assert_eq!(sizes, [1, 2, 3]);
    }

    #[tokio::test]
    async fn truncates_to_limit() {
        let tempdir = tempfile::tempdir().unwrap();
        for name in ["e", "d", "c", "b", "a"] {
            std::fs::write(tempdir.path().join(name), name).unwrap();
        }

        let files = discover(tempdir.path(), Some(2)).await.unwrap();

        assert_eq!(files.len(), 2);
        assert!(files[0].path.ends_with("a"));
        assert!(files[1].path.ends_with("b"));
    }

    #[tokio::test]
    async fn missing_directory() {
        let tempdir = tempfile::tempdir().unwrap();

        let err = discover(&tempdir.path().join("nope"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
