use bytes::{BufMut, Bytes, BytesMut};

use crate::Result;
use crate::format::Format;
use crate::message::SinkRecord;

/// One record value per line. Values are written as-is; a trailing newline
/// terminates each record.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormat;

impl Format for LineFormat {
    fn serialize(&self, record: &SinkRecord) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(record.value.len() + 1);
        buf.extend_from_slice(&record.value);
        buf.put_u8(b'\n');
        Ok(buf.freeze())
    }

    fn extension(&self) -> &str {
        ".tsv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PartitionKey;

    #[test]
    fn test_serialize_appends_newline() {
        let record = SinkRecord::new(PartitionKey::new("t", 0), 0, "k", "a\tb");
        let bytes = LineFormat.serialize(&record).unwrap();
        assert_eq!(bytes, Bytes::from("a\tb\n"));
        assert_eq!(LineFormat.extension(), ".tsv");
    }
}
