//! A [SinkRecord] is one element of an ordered per-partition stream as it
//! arrives from the source. Offsets are assigned by the source and are
//! strictly increasing within a [PartitionKey]; the sink never reorders
//! records and never re-reads them once their enclosing file is committed.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Identity of one independent ordered stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub topic: Arc<str>,
    pub partition: i32,
}

impl PartitionKey {
    pub fn new(topic: impl Into<Arc<str>>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// A single record delivered to the sink.
/// NOTE: It is cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkRecord {
    pub partition: PartitionKey,
    /// Source-assigned offset of the record within its partition.
    pub offset: i64,
    pub key: Bytes,
    pub value: Bytes,
    pub timestamp: DateTime<Utc>,
}

impl SinkRecord {
    pub fn new(
        partition: PartitionKey,
        offset: i64,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            partition,
            offset,
            key: key.into(),
            value: value.into(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for SinkRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.partition, self.offset)
    }
}
