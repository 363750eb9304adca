//! Boundary trait for the upstream record source.
//!
//! The sink does not care where records come from, only that each partition
//! delivers them in offset order and can be rewound. `seek` positions the
//! source at the offsets recovery reported; partitions absent from the map
//! start wherever the source pleases.

use std::collections::HashMap;

use crate::message::{PartitionKey, SinkRecord};
use crate::Result;

#[trait_variant::make(RecordSource: Send)]
pub trait LocalRecordSource {
    /// Repositions the source so the next read for each listed partition
    /// starts at the given offset.
    async fn seek(&mut self, offsets: HashMap<PartitionKey, i64>) -> Result<()>;

    /// Next batch of records, in per-partition offset order. May be empty;
    /// an empty batch still drives the sink's retry timers.
    async fn read_batch(&mut self) -> Result<Vec<SinkRecord>>;
}
