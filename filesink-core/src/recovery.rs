//! Startup reconciliation between the WAL and the store.
//!
//! A crash can leave a partition in exactly three shapes: a commit batch
//! fully bracketed in the WAL whose renames may or may not have happened, a
//! batch begun but never sealed with an end marker, or nothing in flight.
//! Recovery replays the WAL front-to-back, finishes every complete bracket
//! (rename idempotently, skipping files that already landed), discards every
//! incomplete one along with its orphaned temp files, and finally derives the
//! resume offset from the committed file names themselves. The WAL is never
//! trusted for offsets; the store listing is the single source of truth.
//!
//! A recovery marker appended at the end records how far the log has been
//! reconciled, so the next startup skips straight past everything already
//! applied instead of re-walking stale temp paths.
//!
//! Storage hiccups during recovery are retried a bounded number of times;
//! exhausting the retries fails startup for the partition.

use tracing::{info, warn};

use crate::config::SinkConfig;
use crate::message::PartitionKey;
use crate::naming;
use crate::storage::Storage;
use crate::wal::{Wal, WalEntry};
use crate::{Error, Result};

/// Reconciles one partition and returns the offset the source should resume
/// from, or `None` when the store holds no committed file for it.
pub(crate) async fn recover<S>(
    storage: &S,
    wal: &Wal<S>,
    config: &SinkConfig,
    key: &PartitionKey,
) -> Result<Option<i64>>
where
    S: Storage + Sync,
{
    let replay = with_retries(config, "wal replay", || wal.replay()).await?;

    // everything before the newest recovery marker was reconciled by an
    // earlier startup
    let skip_before = replay
        .entries
        .iter()
        .filter_map(|(_, entry)| match entry {
            WalEntry::Recovery { position } => Some(*position),
            _ => None,
        })
        .max()
        .unwrap_or(0);

    let mut section: Option<Vec<(String, String)>> = None;
    let mut orphans: Vec<String> = Vec::new();
    let mut applied = 0usize;
    for (position, entry) in &replay.entries {
        if *position < skip_before {
            continue;
        }
        match entry {
            WalEntry::Begin => {
                if let Some(stale) = section.replace(Vec::new()) {
                    warn!(partition = %key, "commit batch restarted, superseding earlier mappings");
                    orphans.extend(stale.into_iter().map(|(temp, _)| temp));
                }
            }
            WalEntry::Mapping { temp, committed } => match section.as_mut() {
                Some(open) => open.push((temp.clone(), committed.clone())),
                None => {
                    warn!(partition = %key, temp, "mapping outside a begin/end bracket, ignoring");
                }
            },
            WalEntry::End => match section.take() {
                Some(complete) => {
                    with_retries(config, "apply commit batch", || {
                        apply_section(storage, key, &complete)
                    })
                    .await?;
                    applied += 1;
                }
                None => warn!(partition = %key, "end marker without a begin, ignoring"),
            },
            WalEntry::Recovery { .. } => {}
        }
    }

    // a batch begun but never sealed commits nothing; its records will be
    // redelivered, so the half-written temp files are garbage
    if let Some(incomplete) = section.take() {
        info!(
            partition = %key,
            files = incomplete.len(),
            "discarding incomplete commit batch"
        );
        orphans.extend(incomplete.into_iter().map(|(temp, _)| temp));
    }
    let swept = orphans.len();
    for temp in orphans {
        // leftovers are invisible to listings anyway, so a failed sweep is
        // only worth a warning
        if let Err(err) = storage.delete(&temp).await {
            warn!(partition = %key, path = temp, %err, "could not sweep temp file");
        }
    }

    if replay.truncated {
        // a torn tail would mask anything appended after it, since replay
        // stops at the first undecodable frame. The log's content has just
        // been reconciled, so start it over.
        warn!(partition = %key, wal = wal.path(), "WAL ends in a torn entry, resetting the log");
        with_retries(config, "wal reset", || storage.delete(wal.path())).await?;
    } else if replay.len > 0 {
        let marker = WalEntry::Recovery {
            position: replay.len,
        };
        with_retries(config, "recovery marker", || wal.append(&marker)).await?;
    }

    let resume = resume_offset(storage, config, key).await?;
    info!(partition = %key, applied, swept, resume, "recovery complete");
    Ok(resume)
}

/// Finishes a fully bracketed batch. Renames that already happened before
/// the crash are detected by the committed file's presence; a mapping whose
/// files are both gone is skipped, since a complete bracket means the batch
/// was already durable once.
async fn apply_section<S>(
    storage: &S,
    key: &PartitionKey,
    section: &[(String, String)],
) -> Result<()>
where
    S: Storage + Sync,
{
    for (temp, committed) in section {
        if storage.exists(committed).await? {
            continue;
        }
        if storage.exists(temp).await? {
            storage.rename(temp, committed).await?;
        } else {
            warn!(partition = %key, temp, committed, "neither file of a mapping present, skipping");
        }
    }
    Ok(())
}

/// Largest committed end offset for this partition, plus one. Derived purely
/// from file names, so it holds across process generations.
async fn resume_offset<S>(
    storage: &S,
    config: &SinkConfig,
    key: &PartitionKey,
) -> Result<Option<i64>>
where
    S: Storage + Sync,
{
    let prefix = naming::topic_prefix(&config.topics_dir, &key.topic);
    let listing = with_retries(config, "store listing", || storage.list(&prefix)).await?;
    let own = format!("{}+{}+", key.topic, key.partition);
    Ok(listing
        .iter()
        .filter(|path| {
            path.rsplit('/')
                .next()
                .is_some_and(|name| name.starts_with(&own))
        })
        .filter_map(|path| naming::parse_committed_offsets(path))
        .map(|(_, end)| end)
        .max()
        .map(|end| end + 1))
}

async fn with_retries<T, F, Fut>(config: &SinkConfig, what: &str, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let strategy =
        backoff::strategy::fixed::Interval::new(config.retry_backoff).take(config.recovery_retries);
    backoff::retry(strategy, operation, |err: &Error| err.is_retryable())
        .await
        .map_err(|err| Error::Recovery(format!("{what} failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mem::FailWhen;
    use crate::storage::MemStorage;
    use bytes::Bytes;

    fn key() -> PartitionKey {
        PartitionKey::new("clicks", 0)
    }

    fn config() -> SinkConfig {
        SinkConfig::default()
    }

    fn wal(storage: &MemStorage) -> Wal<MemStorage> {
        Wal::new(storage.clone(), naming::wal_file("logs", &key()))
    }

    fn committed_name(start: i64, end: i64) -> String {
        naming::committed_file_name("topics", "partition=0", &key(), start, end, ".tsv", 10)
            .unwrap()
    }

    fn temp_name() -> String {
        naming::temp_file_name("topics", "clicks", "partition=0", ".tsv")
    }

    async fn write_section(wal: &Wal<MemStorage>, temp: &str, committed: &str, sealed: bool) {
        wal.append(&WalEntry::Begin).await.unwrap();
        wal.append(&WalEntry::Mapping {
            temp: temp.to_string(),
            committed: committed.to_string(),
        })
        .await
        .unwrap();
        if sealed {
            wal.append(&WalEntry::End).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_finishes_interrupted_commit() {
        let storage = MemStorage::new();
        let wal = wal(&storage);
        let temp = temp_name();
        let committed = committed_name(0, 2);
        storage.append(&temp, Bytes::from("a\nb\nc\n")).await.unwrap();
        write_section(&wal, &temp, &committed, true).await;

        let resume = recover(&storage, &wal, &config(), &key()).await.unwrap();

        assert_eq!(storage.contents(&committed).unwrap(), Bytes::from("a\nb\nc\n"));
        assert!(storage.contents(&temp).is_none());
        assert_eq!(resume, Some(3));
    }

    #[tokio::test]
    async fn test_crash_between_renames_rolls_forward() {
        let storage = MemStorage::new();
        let wal = wal(&storage);

        // two sub-partition files sealed in one bracket; the crash hit
        // after the first rename but before the second
        let committed_a =
            naming::committed_file_name("topics", "key=a", &key(), 0, 0, ".tsv", 10).unwrap();
        let committed_b =
            naming::committed_file_name("topics", "key=b", &key(), 1, 2, ".tsv", 10).unwrap();
        let temp_a = naming::temp_file_name("topics", "clicks", "key=a", ".tsv");
        let temp_b = naming::temp_file_name("topics", "clicks", "key=b", ".tsv");
        storage.append(&committed_a, Bytes::from("a0\n")).await.unwrap();
        storage.append(&temp_b, Bytes::from("b1\nb2\n")).await.unwrap();
        wal.append(&WalEntry::Begin).await.unwrap();
        for (temp, committed) in [(&temp_a, &committed_a), (&temp_b, &committed_b)] {
            wal.append(&WalEntry::Mapping {
                temp: temp.clone(),
                committed: committed.clone(),
            })
            .await
            .unwrap();
        }
        wal.append(&WalEntry::End).await.unwrap();

        let resume = recover(&storage, &wal, &config(), &key()).await.unwrap();

        // the second file landed too; no offset of the batch is lost
        assert_eq!(storage.contents(&committed_a).unwrap(), Bytes::from("a0\n"));
        assert_eq!(storage.contents(&committed_b).unwrap(), Bytes::from("b1\nb2\n"));
        assert!(storage.contents(&temp_b).is_none());
        assert_eq!(resume, Some(3));
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let storage = MemStorage::new();
        let wal = wal(&storage);
        let temp = temp_name();
        let committed = committed_name(0, 2);
        // the rename already happened before the crash
        storage
            .append(&committed, Bytes::from("a\nb\nc\n"))
            .await
            .unwrap();
        write_section(&wal, &temp, &committed, true).await;

        for _ in 0..2 {
            let resume = recover(&storage, &wal, &config(), &key()).await.unwrap();
            assert_eq!(resume, Some(3));
            assert_eq!(
                storage.contents(&committed).unwrap(),
                Bytes::from("a\nb\nc\n")
            );
        }
    }

    #[tokio::test]
    async fn test_incomplete_batch_discarded_and_swept() {
        let storage = MemStorage::new();
        let wal = wal(&storage);
        let temp = temp_name();
        storage.append(&temp, Bytes::from("partial\n")).await.unwrap();
        write_section(&wal, &temp, &committed_name(0, 0), false).await;

        let resume = recover(&storage, &wal, &config(), &key()).await.unwrap();

        assert!(storage.contents(&temp).is_none());
        assert!(storage.contents(&committed_name(0, 0)).is_none());
        assert_eq!(resume, None);
    }

    #[tokio::test]
    async fn test_marker_skips_already_reconciled_sections() {
        let storage = MemStorage::new();
        let wal = wal(&storage);
        let temp = temp_name();
        let committed = committed_name(0, 2);
        storage.append(&temp, Bytes::from("a\nb\nc\n")).await.unwrap();
        write_section(&wal, &temp, &committed, true).await;

        recover(&storage, &wal, &config(), &key()).await.unwrap();

        // the committed file ages out of the store and an unrelated file
        // reappears at the old temp path; a replay without the marker
        // would resurrect it
        storage.delete(&committed).await.unwrap();
        storage.append(&temp, Bytes::from("junk\n")).await.unwrap();

        let resume = recover(&storage, &wal, &config(), &key()).await.unwrap();
        assert!(storage.contents(&committed).is_none());
        assert_eq!(resume, None);
    }

    #[tokio::test]
    async fn test_resume_offset_from_listing_only() {
        let storage = MemStorage::new();
        // no WAL at all: offsets come from the committed names
        storage.create(&committed_name(0, 9)).await.unwrap();
        storage.create(&committed_name(10, 20)).await.unwrap();
        // a sibling partition's file must not leak into the result
        let other = PartitionKey::new("clicks", 1);
        let other_file =
            naming::committed_file_name("topics", "partition=1", &other, 0, 99, ".tsv", 10)
                .unwrap();
        storage.create(&other_file).await.unwrap();

        let wal = wal(&storage);
        let resume = recover(&storage, &wal, &config(), &key()).await.unwrap();
        assert_eq!(resume, Some(21));

        let fresh = PartitionKey::new("clicks", 2);
        let fresh_wal = Wal::new(storage.clone(), naming::wal_file("logs", &fresh));
        let resume = recover(&storage, &fresh_wal, &config(), &fresh)
            .await
            .unwrap();
        assert_eq!(resume, None);
    }

    #[tokio::test]
    async fn test_torn_wal_tail_resets_the_log() {
        let storage = MemStorage::new();
        let wal = wal(&storage);
        let temp = temp_name();
        let committed = committed_name(0, 2);
        storage.append(&temp, Bytes::from("a\nb\nc\n")).await.unwrap();
        write_section(&wal, &temp, &committed, true).await;
        // a crash mid-append leaves a frame that claims more bytes than
        // the file holds
        storage
            .append(wal.path(), Bytes::from(u64::MAX.to_le_bytes().to_vec()))
            .await
            .unwrap();

        let resume = recover(&storage, &wal, &config(), &key()).await.unwrap();

        // the complete section was still applied, and the log starts over
        assert_eq!(storage.contents(&committed).unwrap(), Bytes::from("a\nb\nc\n"));
        assert_eq!(resume, Some(3));
        assert!(storage.contents(wal.path()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_rename_failure_is_retried() {
        let storage = MemStorage::new();
        let wal = wal(&storage);
        let temp = temp_name();
        let committed = committed_name(0, 2);
        storage.append(&temp, Bytes::from("a\nb\nc\n")).await.unwrap();
        write_section(&wal, &temp, &committed, true).await;

        storage.set_failure(Some(FailWhen::Rename));
        let resume = recover(&storage, &wal, &config(), &key()).await.unwrap();

        assert_eq!(storage.contents(&committed).unwrap(), Bytes::from("a\nb\nc\n"));
        assert_eq!(resume, Some(3));
    }
}
