//! An exactly-once sink that materializes ordered per-partition record
//! streams as immutable, offset-ranged files in a hierarchical store.
//!
//! The sink executes the following for every assigned partition:
//! - buffer delivered records and append them to an open temp file
//! - rotate the temp file when it is full (or on schedule / explicit flush)
//! - commit the rotation batch: record the temp-to-committed file mappings
//!   in a write-ahead log, then rename the temp files into place
//! - on startup, replay the write-ahead log to finish or discard commits
//!   that were interrupted by a crash, and report the offset at which the
//!   upstream source should resume
//!
//! Storage backends and record encodings are pluggable behind the
//! [`storage::Storage`] and [`format::Format`] seams.

pub(crate) use self::error::Error;
pub use self::error::Result;

/// Error and Result types for the sink.
mod error;

/// Static configuration of the sink.
pub mod config;

/// Records and partition identity.
pub mod message;

/// Deterministic file naming for temp and committed files.
pub mod naming;

/// Storage capability trait and the built-in backends.
pub mod storage;

/// Record serialization seam.
pub mod format;

/// Derives the encoded sub-partition directory for a record.
pub mod partitioner;

/// Per-partition write-ahead log of commit intents.
mod wal;

/// Per-partition writer: buffering, rotation, and the commit sequence.
mod writer;

/// Startup reconciliation of WAL state against the store.
mod recovery;

/// Top-level sink task: one writer actor per assigned partition.
pub mod task;

/// Boundary trait for the upstream record source.
pub mod source;

/// Drives a record source into the sink task until cancelled.
pub mod forwarder;
