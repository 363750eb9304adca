use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::storage::Storage;
use crate::{Error, Result};

/// Store backed by a directory on the local filesystem. Rename within one
/// filesystem is atomic, which is all the commit protocol asks for.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base: Arc<PathBuf>,
}

impl FileStorage {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Arc::new(base.into()),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty()
            || path.starts_with('/')
            || Path::new(path).components().any(|c| c.as_os_str() == "..")
        {
            return Err(Error::InvalidArgument(format!("invalid store path {path:?}")));
        }
        Ok(self.base.join(path))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("creating {}: {e}", parent.display())))?;
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    async fn create(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        Self::ensure_parent(&full).await?;
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&full)
            .await
            .map_err(|e| Error::Storage(format!("creating {path}: {e}")))?;
        Ok(())
    }

    async fn append(&self, path: &str, data: Bytes) -> Result<()> {
        let full = self.resolve(path)?;
        Self::ensure_parent(&full).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .await
            .map_err(|e| Error::Storage(format!("opening {path}: {e}")))?;
        file.write_all(&data)
            .await
            .map_err(|e| Error::Storage(format!("appending to {path}: {e}")))?;
        file.flush()
            .await
            .map_err(|e| Error::Storage(format!("flushing {path}: {e}")))?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path)?;
        let data = tokio::fs::read(&full)
            .await
            .map_err(|e| Error::Storage(format!("reading {path}: {e}")))?;
        Ok(Bytes::from(data))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from_full = self.resolve(from)?;
        let to_full = self.resolve(to)?;
        Self::ensure_parent(&to_full).await?;
        debug!(from, to, "renaming");
        tokio::fs::rename(&from_full, &to_full)
            .await
            .map_err(|e| Error::Storage(format!("renaming {from} to {to}: {e}")))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("deleting {path}: {e}"))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // walk from the deepest existing directory of the prefix and filter
        let dir = match prefix.rfind('/') {
            Some(idx) => self.base.join(&prefix[..idx]),
            None => self.base.as_ref().clone(),
        };
        let mut found = Vec::new();
        let mut pending = vec![dir];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(Error::Storage(format!("listing {}: {e}", dir.display())));
                }
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::Storage(format!("listing {}: {e}", dir.display())))?
            {
                let entry_path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| Error::Storage(format!("listing {prefix}: {e}")))?;
                if file_type.is_dir() {
                    pending.push(entry_path);
                    continue;
                }
                let Ok(relative) = entry_path.strip_prefix(self.base.as_ref()) else {
                    continue;
                };
                let relative = relative.to_string_lossy().replace('\\', "/");
                if relative.starts_with(prefix) {
                    found.push(relative);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        tokio::fs::try_exists(&full)
            .await
            .map_err(|e| Error::Storage(format!("checking {path}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_read_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        storage
            .append("a/b/data", Bytes::from("hello "))
            .await
            .unwrap();
        storage
            .append("a/b/data", Bytes::from("world"))
            .await
            .unwrap();

        let content = storage.read("a/b/data").await.unwrap();
        assert_eq!(content, Bytes::from("hello world"));
        assert!(storage.exists("a/b/data").await.unwrap());
        assert!(!storage.exists("a/b/other").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_moves_content() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        storage.append("tmp/x", Bytes::from("payload")).await.unwrap();
        storage.rename("tmp/x", "final/y").await.unwrap();

        assert!(!storage.exists("tmp/x").await.unwrap());
        assert_eq!(storage.read("final/y").await.unwrap(), Bytes::from("payload"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        storage.create("f").await.unwrap();
        storage.delete("f").await.unwrap();
        storage.delete("f").await.unwrap();
        assert!(!storage.exists("f").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix_and_sorts() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        storage.create("topics/t/p=0/b").await.unwrap();
        storage.create("topics/t/p=0/a").await.unwrap();
        storage.create("topics/t/p=1/c").await.unwrap();
        storage.create("logs/t/0/log").await.unwrap();

        let listed = storage.list("topics/t/").await.unwrap();
        assert_eq!(
            listed,
            vec!["topics/t/p=0/a", "topics/t/p=0/b", "topics/t/p=1/c"]
        );

        let listed = storage.list("topics/t/p=0/").await.unwrap();
        assert_eq!(listed, vec!["topics/t/p=0/a", "topics/t/p=0/b"]);

        // missing prefix lists nothing
        assert!(storage.list("topics/other/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(storage.create("../escape").await.is_err());
        assert!(storage.create("/absolute").await.is_err());
    }
}
