//! Per-partition write-ahead log of commit intents.
//!
//! The WAL is an append-only sequence of `(key, value)` string pairs, each
//! framed as a u64-le length followed by the bytes. Three sentinel keys give
//! entries their meaning: a begin marker opens a commit batch, mapping
//! entries record one temp-to-committed file pair each, and an end marker
//! seals the batch. A fourth sentinel stores the byte position up to which a
//! previous recovery has already applied the log, so a restart does not
//! re-scan history.
//!
//! The WAL is written through the [Storage] seam like every other file, so a
//! storage outage fails a WAL append the same way it fails a data append;
//! the caller owns the retry policy. Once `append` returns, the entry has
//! been handed to the store — it survives a crash of this process.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::storage::Storage;
use crate::Result;

const BEGIN_MARKER: &str = "__begin__";
const END_MARKER: &str = "__end__";
const RECOVERY_MARKER: &str = "__recovery__";

/// A single decoded WAL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WalEntry {
    /// Opens a commit batch.
    Begin,
    /// One temp file destined for its committed name.
    Mapping { temp: String, committed: String },
    /// Seals the batch; everything since the begin marker is now redoable.
    End,
    /// Replay up to this byte position has already been applied.
    Recovery { position: u64 },
}

impl WalEntry {
    fn key_value(&self) -> (&str, String) {
        match self {
            WalEntry::Begin => (BEGIN_MARKER, String::new()),
            WalEntry::End => (END_MARKER, String::new()),
            WalEntry::Mapping { temp, committed } => (temp, committed.clone()),
            WalEntry::Recovery { position } => (RECOVERY_MARKER, position.to_string()),
        }
    }

    fn from_key_value(key: &str, value: &str) -> Option<Self> {
        match key {
            BEGIN_MARKER => Some(WalEntry::Begin),
            END_MARKER => Some(WalEntry::End),
            RECOVERY_MARKER => match value.parse() {
                Ok(position) => Some(WalEntry::Recovery { position }),
                Err(_) => {
                    warn!(value, "unparseable recovery marker, ignoring");
                    None
                }
            },
            temp => Some(WalEntry::Mapping {
                temp: temp.to_string(),
                committed: value.to_string(),
            }),
        }
    }
}

/// Result of a full WAL replay.
#[derive(Debug, Default)]
pub(crate) struct WalReplay {
    /// Decoded entries paired with the byte position at which each starts.
    pub(crate) entries: Vec<(u64, WalEntry)>,
    /// Total length of the log in bytes.
    pub(crate) len: u64,
    /// True when the tail of the log was cut off mid-entry (a crash during
    /// an append). The torn bytes are ignored.
    pub(crate) truncated: bool,
}

/// The write-ahead log of one partition. Opened at first use and kept for
/// the life of the task; used only for crash recovery, never for queries.
pub(crate) struct Wal<S> {
    storage: S,
    path: String,
}

impl<S: Storage + Sync> Wal<S> {
    pub(crate) fn new(storage: S, path: String) -> Self {
        Self { storage, path }
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    /// Durably appends one entry. Policy-free: storage failures propagate
    /// unmodified to the caller.
    pub(crate) async fn append(&self, entry: &WalEntry) -> Result<()> {
        let (key, value) = entry.key_value();
        let mut buf = BytesMut::with_capacity(16 + key.len() + value.len());
        buf.put_u64_le(key.len() as u64);
        buf.put_slice(key.as_bytes());
        buf.put_u64_le(value.len() as u64);
        buf.put_slice(value.as_bytes());
        self.storage.append(&self.path, buf.freeze()).await
    }

    /// Decodes the whole log front-to-back. A missing log replays as empty.
    pub(crate) async fn replay(&self) -> Result<WalReplay> {
        if !self.storage.exists(&self.path).await? {
            return Ok(WalReplay::default());
        }
        let data = self.storage.read(&self.path).await?;
        let len = data.len() as u64;
        let mut cursor = data;
        let mut entries = Vec::new();
        let mut position = 0u64;
        let mut truncated = false;
        while cursor.has_remaining() {
            let Some((entry_len, key, value)) = decode_one(&mut cursor) else {
                warn!(
                    path = self.path,
                    position, "torn entry at WAL tail, ignoring"
                );
                truncated = true;
                break;
            };
            if let Some(entry) = WalEntry::from_key_value(&key, &value) {
                entries.push((position, entry));
            }
            position += entry_len;
        }
        Ok(WalReplay {
            entries,
            len,
            truncated,
        })
    }
}

/// Decodes one length-prefixed key/value pair, or `None` when the remaining
/// bytes are shorter than the frame claims.
fn decode_one(cursor: &mut Bytes) -> Option<(u64, String, String)> {
    let mut taken = 0u64;
    let key = take_field(cursor, &mut taken)?;
    let value = take_field(cursor, &mut taken)?;
    Some((taken, key, value))
}

fn take_field(cursor: &mut Bytes, taken: &mut u64) -> Option<String> {
    if cursor.remaining() < size_of::<u64>() {
        return None;
    }
    let len = cursor.get_u64_le() as usize;
    if cursor.remaining() < len {
        return None;
    }
    let bytes = cursor.split_to(len);
    *taken += (size_of::<u64>() + len) as u64;
    String::from_utf8(bytes.to_vec()).ok()
}
