use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::storage::Storage;
use crate::{Error, Result};

/// Which storage call the next injected failure should hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailWhen {
    Append,
    Rename,
}

#[derive(Default)]
struct Inner {
    files: BTreeMap<String, BytesMut>,
    failure: Option<FailWhen>,
}

/// In-memory store. Failure injection is one-shot: the next matching call
/// fails, then the store heals, which is exactly what a transient storage
/// outage looks like to the writer.
#[derive(Clone, Default)]
pub struct MemStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or clears) the one-shot failure.
    pub fn set_failure(&self, failure: Option<FailWhen>) {
        self.inner.lock().failure = failure;
    }

    fn trip_failure(&self, when: FailWhen, what: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.failure == Some(when) {
            inner.failure = None;
            return Err(Error::Storage(format!("injected failure during {what}")));
        }
        Ok(())
    }

    /// Contents of a file, for test assertions.
    pub fn contents(&self, path: &str) -> Option<Bytes> {
        self.inner
            .lock()
            .files
            .get(path)
            .map(|data| Bytes::copy_from_slice(data))
    }

    /// Every file path currently in the store, in lexical order.
    pub fn file_names(&self) -> Vec<String> {
        self.inner.lock().files.keys().cloned().collect()
    }
}

impl Storage for MemStorage {
    async fn create(&self, path: &str) -> Result<()> {
        self.inner
            .lock()
            .files
            .insert(path.to_string(), BytesMut::new());
        Ok(())
    }

    async fn append(&self, path: &str, data: Bytes) -> Result<()> {
        self.trip_failure(FailWhen::Append, "append")?;
        self.inner
            .lock()
            .files
            .entry(path.to_string())
            .or_default()
            .extend_from_slice(&data);
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        self.contents(path)
            .ok_or_else(|| Error::Storage(format!("no such file {path}")))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.trip_failure(FailWhen::Rename, "rename")?;
        let mut inner = self.inner.lock();
        let data = inner
            .files
            .remove(from)
            .ok_or_else(|| Error::Storage(format!("no such file {from}")))?;
        inner.files.insert(to.to_string(), data);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.lock().files.remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .files
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, _)| path.clone())
            .collect())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.inner.lock().files.contains_key(path))
    }
}
