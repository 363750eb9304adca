use bytes::Bytes;

use crate::Result;
use crate::message::SinkRecord;

/// Newline-delimited plain-text format.
pub mod line;

pub use line::LineFormat;

/// Converts records into the bytes appended to an open temp file. The sink
/// never looks inside the produced bytes; it only needs the serialization to
/// be deterministic and the extension to be stable for the life of a file.
pub trait Format: Send + Sync {
    /// Bytes to append to the file for one record.
    fn serialize(&self, record: &SinkRecord) -> Result<Bytes>;

    /// File extension (including the leading dot) for files of this format,
    /// or an empty string for none.
    fn extension(&self) -> &str;
}
