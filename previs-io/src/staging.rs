//! # Staging
//!
//! Generated code never overwrites the user's file directly. It is written
//! to a sibling `.__previs__` copy which is either accepted (renamed over
//! the original) or discarded.

use crate::error::{self, Result};
use std::path::{Path, PathBuf};

const STAGING_MARKER: &str = "__previs__";
const TEST_MARKER: &str = "test";

/// `dir/bar.test.ts` -> `dir/bar.test.__previs__.ts`
pub fn staging_path(target: &Path) -> PathBuf {
    with_infix(target, STAGING_MARKER)
}

/// `dir/button.tsx` -> `dir/button.test.tsx`
pub fn test_file_path(target: &Path) -> PathBuf {
    with_infix(target, TEST_MARKER)
}

/// Source of the test next to `target`, if there is one
pub async fn read_test_file(target: &Path) -> Result<Option<String>> {
    let path = test_file_path(target);
    match tokio::fs::read_to_string(&path).await {
        Ok(source) => Ok(Some(source)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(error::io_at(e, "staging::read_test_file", &path)),
    }
}

fn with_infix(target: &Path, infix: &str) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{}.{}.{}", stem, infix, ext.to_string_lossy()),
        None => format!("{}.{}", stem, infix),
    };
    target.with_file_name(name)
}

/// A working copy of `target`
#[derive(Debug)]
pub struct Staging {
    target: PathBuf,
    staged: PathBuf,
}

impl Staging {
    /// Copy `target` to its staging path
    pub async fn begin(target: impl Into<PathBuf>) -> Result<Self> {
        let target = target.into();
        let staged = staging_path(&target);
        tokio::fs::copy(&target, &staged)
            .await
            .map_err(|e| error::io_at(e, "staging::begin", &target))?;
        Ok(Self { target, staged })
    }

    /// Start from `contents` instead of an existing file
    pub async fn create(target: impl Into<PathBuf>, contents: &str) -> Result<Self> {
        let target = target.into();
        let staged = staging_path(&target);
        let staging = Self { target, staged };
        staging.write(contents).await?;
        Ok(staging)
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn path(&self) -> &Path {
        &self.staged
    }

    pub async fn read(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.staged)
            .await
            .map_err(|e| error::io_at(e, "staging::read", &self.staged))
    }

    pub async fn write(&self, contents: &str) -> Result<()> {
        tokio::fs::write(&self.staged, contents)
            .await
            .map_err(|e| error::io_at(e, "staging::write", &self.staged))
    }

    /// Replace the target with the staged copy
    pub async fn accept(self) -> Result<PathBuf> {
        tokio::fs::rename(&self.staged, &self.target)
            .await
            .map_err(|e| error::io_at(e, "staging::accept", &self.staged))?;
        Ok(self.target)
    }

    /// Drop the staged copy, leaving the target untouched
    pub async fn discard(self) -> Result<()> {
        match tokio::fs::remove_file(&self.staged).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(error::io_at(e, "staging::discard", &self.staged)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_staging_path() {
        assert_eq!(
            staging_path(Path::new("/tmp/foo/bar.ts")),
            PathBuf::from("/tmp/foo/bar.__previs__.ts")
        );
        assert_eq!(
            staging_path(Path::new("/tmp/foo/bar.test.ts")),
            PathBuf::from("/tmp/foo/bar.test.__previs__.ts")
        );
        assert_eq!(
            staging_path(Path::new("/tmp/foo/bar_test.ts")),
            PathBuf::from("/tmp/foo/bar_test.__previs__.ts")
        );
        assert_eq!(
            staging_path(Path::new("Makefile")),
            PathBuf::from("Makefile.__previs__")
        );
    }

    #[tokio::test]
    async fn test_accept_replaces_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("button.tsx");
        std::fs::write(&target, "old").unwrap();

        let staging = Staging::begin(&target).await.unwrap();
        assert_eq!(staging.read().await.unwrap(), "old");
        staging.write("new").await.unwrap();

        staging.accept().await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
        assert!(!staging_path(&target).exists());
    }

    #[tokio::test]
    async fn test_discard_keeps_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("card.tsx");
        std::fs::write(&target, "original").unwrap();

        let staging = Staging::begin(&target).await.unwrap();
        staging.write("rejected").await.unwrap();
        staging.discard().await.unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "original");
        assert!(!staging_path(&target).exists());
    }

    #[tokio::test]
    async fn test_sibling_test_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("sum.ts");
        assert_eq!(test_file_path(&target), dir.path().join("sum.test.ts"));
        assert_eq!(read_test_file(&target).await.unwrap(), None);

        std::fs::write(dir.path().join("sum.test.ts"), "expect(sum(1, 2)).toBe(3)").unwrap();
        assert_eq!(
            read_test_file(&target).await.unwrap().as_deref(),
            Some("expect(sum(1, 2)).toBe(3)")
        );
    }

    #[tokio::test]
    async fn test_begin_missing_target() {
        let dir = TempDir::new().unwrap();
        let err = Staging::begin(dir.path().join("nope.tsx")).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::FileNotFound);
    }
}
