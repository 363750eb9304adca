//! Deterministic, store-root-relative path construction.
//!
//! Committed file names embed the partition and the zero-padded offset range
//! so that a plain listing yields ranges in ascending order and two files for
//! the same partition and sub-path can never collide. Temp files carry a
//! random name with no offset range under a dedicated `+tmp` subtree, so a
//! listing can separate in-flight artifacts from durable ones without opening
//! a single file.

use crate::message::PartitionKey;
use crate::{Error, Result};

/// Path segment that marks the temp-file subtree of a topic.
pub const TEMPFILE_DIR: &str = "+tmp";

/// Separator between the fields embedded in a committed file name.
const FIELD_SEPARATOR: char = '+';

/// Directory that holds committed files for one topic and encoded
/// sub-partition: `<topics_dir>/<topic>/<encoded_partition>`.
pub fn partition_dir(topics_dir: &str, topic: &str, encoded_partition: &str) -> String {
    format!("{topics_dir}/{topic}/{encoded_partition}")
}

/// Name of a committed file covering `[start_offset, end_offset]`:
/// `<topics_dir>/<topic>/<encoded_partition>/<topic>+<partition>+<start>+<end><ext>`
/// with both offsets zero-padded to `zero_pad_width` digits.
pub fn committed_file_name(
    topics_dir: &str,
    encoded_partition: &str,
    key: &PartitionKey,
    start_offset: i64,
    end_offset: i64,
    extension: &str,
    zero_pad_width: usize,
) -> Result<String> {
    if key.topic.is_empty() || key.topic.contains(['/', FIELD_SEPARATOR]) {
        return Err(Error::InvalidArgument(format!(
            "invalid topic name {:?}",
            key.topic
        )));
    }
    if start_offset < 0 || end_offset < start_offset {
        return Err(Error::InvalidArgument(format!(
            "invalid offset range [{start_offset}, {end_offset}]"
        )));
    }
    let dir = partition_dir(topics_dir, &key.topic, encoded_partition);
    Ok(format!(
        "{dir}/{topic}{sep}{partition}{sep}{start_offset:0width$}{sep}{end_offset:0width$}{extension}",
        topic = key.topic,
        partition = key.partition,
        sep = FIELD_SEPARATOR,
        width = zero_pad_width,
    ))
}

/// Name for a fresh temp file:
/// `<topics_dir>/<topic>/+tmp/<encoded_partition>/<uuid><ext>`.
/// Unique per call; carries no offset range.
pub fn temp_file_name(topics_dir: &str, topic: &str, encoded_partition: &str, extension: &str) -> String {
    format!(
        "{topics_dir}/{topic}/{TEMPFILE_DIR}/{encoded_partition}/{}{extension}",
        uuid::Uuid::new_v4()
    )
}

/// Whether `path` points into a temp subtree.
pub fn is_temp_path(path: &str) -> bool {
    path.contains(&format!("/{TEMPFILE_DIR}/"))
}

/// Prefix under which all of a topic's committed files live.
pub fn topic_prefix(topics_dir: &str, topic: &str) -> String {
    format!("{topics_dir}/{topic}/")
}

/// WAL location for one partition: `<logs_dir>/<topic>/<partition>/log`.
pub fn wal_file(logs_dir: &str, key: &PartitionKey) -> String {
    format!("{logs_dir}/{}/{}/log", key.topic, key.partition)
}

/// Extracts the offset range embedded in a committed file name produced by
/// [committed_file_name]. Returns `None` for any path that does not follow
/// the scheme (temp files, WALs, foreign files), so listings can be filtered
/// without erroring on strangers.
pub fn parse_committed_offsets(path: &str) -> Option<(i64, i64)> {
    if is_temp_path(path) {
        return None;
    }
    let name = path.rsplit('/').next()?;
    let mut fields = name.split(FIELD_SEPARATOR);
    let _topic = fields.next()?;
    let _partition: i32 = fields.next()?.parse().ok()?;
    let start: i64 = fields.next()?.parse().ok()?;
    let end_field = fields.next()?;
    if fields.next().is_some() {
        return None;
    }
    // the extension, if any, is glued onto the end offset
    let end_digits = end_field
        .split_once('.')
        .map_or(end_field, |(digits, _ext)| digits);
    let end: i64 = end_digits.parse().ok()?;
    (start >= 0 && end >= start).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PartitionKey {
        PartitionKey::new("clicks", 12)
    }

    #[test]
    fn test_committed_file_name() {
        let name =
            committed_file_name("topics", "partition=12", &key(), 0, 2, ".tsv", 10).unwrap();
        assert_eq!(
            name,
            "topics/clicks/partition=12/clicks+12+0000000000+0000000002.tsv"
        );
        // identical inputs, identical output
        let again =
            committed_file_name("topics", "partition=12", &key(), 0, 2, ".tsv", 10).unwrap();
        assert_eq!(name, again);
    }

    #[test]
    fn test_committed_names_sort_by_offset_range() {
        let ranges = [(0, 2), (3, 5), (6, 9)];
        let names: Vec<String> = ranges
            .iter()
            .map(|(s, e)| {
                committed_file_name("topics", "partition=12", &key(), *s, *e, ".tsv", 10).unwrap()
            })
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(committed_file_name("topics", "p", &key(), -1, 2, "", 10).is_err());
        assert!(committed_file_name("topics", "p", &key(), 5, 2, "", 10).is_err());
        let bad_topic = PartitionKey::new("a/b", 0);
        assert!(committed_file_name("topics", "p", &bad_topic, 0, 1, "", 10).is_err());
    }

    #[test]
    fn test_temp_file_name_is_unique_and_distinguishable() {
        let a = temp_file_name("topics", "clicks", "partition=12", ".tsv");
        let b = temp_file_name("topics", "clicks", "partition=12", ".tsv");
        assert_ne!(a, b);
        assert!(a.starts_with("topics/clicks/+tmp/partition=12/"));
        assert!(is_temp_path(&a));
        assert_eq!(parse_committed_offsets(&a), None);
    }

    #[test]
    fn test_wal_file() {
        assert_eq!(wal_file("logs", &key()), "logs/clicks/12/log");
    }

    #[test]
    fn test_parse_committed_offsets() {
        let name =
            committed_file_name("topics", "partition=12", &key(), 100, 200, ".tsv", 10).unwrap();
        assert_eq!(parse_committed_offsets(&name), Some((100, 200)));

        let bare = committed_file_name("topics", "partition=12", &key(), 7, 7, "", 10).unwrap();
        assert_eq!(parse_committed_offsets(&bare), Some((7, 7)));

        assert_eq!(parse_committed_offsets("logs/clicks/12/log"), None);
        assert_eq!(parse_committed_offsets("topics/clicks/p/garbage"), None);
    }
}
