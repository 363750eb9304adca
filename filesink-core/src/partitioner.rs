use crate::message::SinkRecord;

/// Derives the encoded sub-partition directory a record belongs to. Records
/// of one partition may fan out into several sub-partitions; each open temp
/// file belongs to exactly one, and all files pending at a rotation commit
/// together as one batch.
pub trait Partitioner: Send + Sync {
    fn encode(&self, record: &SinkRecord) -> String;
}

/// One sub-partition per source partition: `partition=<n>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPartitioner;

impl Partitioner for DefaultPartitioner {
    fn encode(&self, record: &SinkRecord) -> String {
        format!("partition={}", record.partition.partition)
    }
}

/// Content-derived fan-out by record key: `key=<key>`. Keys that are not
/// valid UTF-8 or would break the path are hex-escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyPartitioner;

impl Partitioner for KeyPartitioner {
    fn encode(&self, record: &SinkRecord) -> String {
        match std::str::from_utf8(&record.key) {
            Ok(key) if !key.is_empty() && !key.contains(['/', '+', '=']) => {
                format!("key={key}")
            }
            _ => {
                let hex: String = record.key.iter().map(|b| format!("{b:02x}")).collect();
                format!("key=x{hex}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PartitionKey;

    #[test]
    fn test_default_partitioner() {
        let record = SinkRecord::new(PartitionKey::new("t", 12), 0, "k", "v");
        assert_eq!(DefaultPartitioner.encode(&record), "partition=12");
    }

    #[test]
    fn test_key_partitioner() {
        let key = PartitionKey::new("t", 0);
        let plain = SinkRecord::new(key.clone(), 0, "alice", "v");
        assert_eq!(KeyPartitioner.encode(&plain), "key=alice");

        let awkward = SinkRecord::new(key, 1, "a/b", "v");
        assert_eq!(KeyPartitioner.encode(&awkward), "key=x612f62");
    }
}
