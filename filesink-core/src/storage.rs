use bytes::Bytes;

use crate::Result;

/// Local filesystem backend.
pub mod file;
/// In-memory backend with failure injection, for tests and dry runs.
pub mod mem;

pub use file::FileStorage;
pub use mem::MemStorage;

/// Capabilities the commit protocol needs from a hierarchical store.
///
/// Paths are store-root-relative strings with `/` separators. Atomic
/// `rename` within the store's namespace is the only atomicity primitive
/// the protocol relies on; everything else may fail midway and is redone
/// idempotently.
#[trait_variant::make(Storage: Send)]
pub trait LocalStorage {
    /// Creates (or truncates) an empty file, creating parent directories as
    /// needed.
    async fn create(&self, path: &str) -> Result<()>;

    /// Appends `data` to the file, creating it if absent. The data must be
    /// visible to a subsequent `read` once this returns.
    async fn append(&self, path: &str, data: Bytes) -> Result<()>;

    /// Reads the whole file.
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Atomically renames `from` to `to`, replacing `to` if it exists.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Removes the file. Removing a missing file is not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// All file paths that start with `prefix`, in lexical order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn exists(&self, path: &str) -> Result<bool>;
}
