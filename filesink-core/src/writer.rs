//! Per-partition writer: buffers delivered records, appends them to open
//! temp files, and drives the rotation/commit sequence.
//!
//! The writer moves through three states. Idle: no open temp file. Writing:
//! records are being appended to one temp file per encoded sub-partition.
//! Committing: the pending batch is being made durable, step by step — WAL
//! begin marker, one WAL mapping per temp file, WAL end marker, then the
//! renames. The end marker seals the bracket before any rename happens, so
//! a crash mid-rename leaves a complete bracket that recovery rolls forward;
//! a crash before the end marker leaves an incomplete bracket that recovery
//! discards for redelivery. No crash point can commit part of a batch.
//! Every step is individually retryable; a storage failure suspends the
//! writer for a fixed backoff instead of unwinding, and the next call after
//! the deadline resumes the exact step that failed. Renames are made
//! idempotent by an existence check, so re-running a half-done commit cannot
//! duplicate data.
//!
//! While suspended the writer still accepts records into its buffer; it just
//! refuses to issue storage calls. A suspended partition therefore never
//! blocks delivery, and nothing is lost — the buffer drains once the store
//! heals.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SinkConfig;
use crate::format::Format;
use crate::message::{PartitionKey, SinkRecord};
use crate::naming;
use crate::partitioner::Partitioner;
use crate::storage::Storage;
use crate::wal::{Wal, WalEntry};
use crate::Result;

/// Fixed-interval suspension of storage activity after a failure. Single
/// flight: one deadline governs the whole writer, and the pending operation
/// is re-attempted only once the deadline has passed.
#[derive(Debug)]
pub(crate) struct RetryTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl RetryTimer {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Starts (or restarts) the backoff window.
    fn suspend(&mut self) {
        self.deadline = Some(Instant::now() + self.interval);
    }

    /// Whether storage calls are still withheld.
    fn suspended(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() < deadline)
    }

    fn clear(&mut self) {
        self.deadline = None;
    }
}

/// An open, not-yet-finalized file holding records `[start_offset, end_offset]`.
#[derive(Debug)]
struct TempFile {
    path: String,
    encoded_partition: String,
    start_offset: i64,
    end_offset: i64,
}

/// One temp file queued for commit, with its destination name.
#[derive(Debug)]
struct PendingFile {
    temp: String,
    committed: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Idle,
    Writing,
    Committing(CommitPhase),
}

/// Resume point of an in-flight commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitPhase {
    WalBegin,
    /// Next mapping entry to append.
    WalMappings(usize),
    WalEnd,
    Renames,
}

pub(crate) struct PartitionWriter<S, F, P> {
    key: PartitionKey,
    config: SinkConfig,
    storage: S,
    format: F,
    partitioner: P,
    wal: Wal<S>,
    /// Records accepted but not yet appended to a temp file.
    buffer: VecDeque<SinkRecord>,
    /// Open temp files, one per encoded sub-partition.
    temp_files: HashMap<String, TempFile>,
    /// Batch currently being committed, in sub-partition order.
    commit_queue: Vec<PendingFile>,
    /// Next offset expected from the source; records below it are dropped
    /// as redelivered duplicates.
    next_offset: Option<i64>,
    /// Records appended since the last completed commit.
    records_since_commit: usize,
    /// When the first temp file of the current batch was opened.
    opened_at: Option<Instant>,
    state: WriterState,
    retry: RetryTimer,
}

impl<S, F, P> PartitionWriter<S, F, P>
where
    S: Storage + Clone + Send + Sync + 'static,
    F: Format,
    P: Partitioner,
{
    pub(crate) fn new(
        key: PartitionKey,
        config: SinkConfig,
        storage: S,
        format: F,
        partitioner: P,
    ) -> Self {
        let wal_path = naming::wal_file(&config.logs_dir, &key);
        let wal = Wal::new(storage.clone(), wal_path);
        let retry = RetryTimer::new(config.retry_backoff);
        Self {
            key,
            config,
            storage,
            format,
            partitioner,
            wal,
            buffer: VecDeque::new(),
            temp_files: HashMap::new(),
            commit_queue: Vec::new(),
            next_offset: None,
            records_since_commit: 0,
            opened_at: None,
            state: WriterState::Idle,
            retry,
        }
    }

    /// Reconciles WAL state with the store and positions the offset cursor.
    /// Must run before the first `write`.
    pub(crate) async fn recover(&mut self) -> Result<Option<i64>> {
        let resume =
            crate::recovery::recover(&self.storage, &self.wal, &self.config, &self.key).await?;
        self.next_offset = resume;
        Ok(resume)
    }

    /// Accepts a delivered batch and makes as much progress as the store
    /// allows. Storage failures do not surface here — they suspend the
    /// writer and the records stay buffered.
    pub(crate) async fn write(&mut self, records: Vec<SinkRecord>) -> Result<()> {
        self.accept(records);
        self.drive(false).await
    }

    /// Rotates the open temp files now, regardless of record count.
    pub(crate) async fn flush(&mut self) -> Result<()> {
        self.drive(true).await
    }

    /// Discards open temp files and buffered records. They were never
    /// committed, so the source will redeliver them after the next start.
    pub(crate) async fn close(&mut self) -> Result<()> {
        if !self.buffer.is_empty() || !self.temp_files.is_empty() {
            info!(
                partition = %self.key,
                buffered = self.buffer.len(),
                open_files = self.temp_files.len() + self.commit_queue.len(),
                "discarding uncommitted state on close"
            );
        }
        self.buffer.clear();
        for file in self.temp_files.values() {
            // best effort: an unreachable store just leaves the temp file
            // for the next recovery sweep
            if let Err(err) = self.storage.delete(&file.path).await {
                warn!(path = file.path, %err, "could not delete temp file");
            }
        }
        self.temp_files.clear();
        self.commit_queue.clear();
        self.records_since_commit = 0;
        self.opened_at = None;
        self.state = WriterState::Idle;
        Ok(())
    }

    fn accept(&mut self, records: Vec<SinkRecord>) {
        for record in records {
            if let Some(next) = self.next_offset
                && record.offset < next
            {
                debug!(record = %record, next, "dropping redelivered record");
                continue;
            }
            self.next_offset = Some(record.offset + 1);
            self.buffer.push_back(record);
        }
    }

    /// Runs the state machine until the buffer is drained or the store
    /// fails. Retryable failures arm the backoff timer and leave every bit
    /// of pending state in place for the next attempt.
    async fn drive(&mut self, force_rotate: bool) -> Result<()> {
        if self.retry.suspended() {
            return Ok(());
        }
        self.retry.clear();
        match self.advance(force_rotate).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_retryable() => {
                warn!(partition = %self.key, %err, "storage failure, suspending partition");
                self.retry.suspend();
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn advance(&mut self, force_rotate: bool) -> Result<()> {
        // an interrupted commit resumes before anything else
        if matches!(self.state, WriterState::Committing(_)) {
            self.run_commit().await?;
        }
        while let Some(record) = self.buffer.front().cloned() {
            self.append_record(&record).await?;
            self.buffer.pop_front();
            if self.records_since_commit >= self.config.flush_size {
                self.begin_commit()?;
                self.run_commit().await?;
            }
        }
        if (force_rotate || self.schedule_due()) && !self.temp_files.is_empty() {
            self.begin_commit()?;
            self.run_commit().await?;
        }
        Ok(())
    }

    fn schedule_due(&self) -> bool {
        match (self.config.rotate_interval, self.opened_at) {
            (Some(interval), Some(opened_at)) => opened_at.elapsed() >= interval,
            _ => false,
        }
    }

    /// Appends one record to the temp file of its sub-partition, opening
    /// the file if this is the first record after a rotation.
    async fn append_record(&mut self, record: &SinkRecord) -> Result<()> {
        let encoded = self.partitioner.encode(record);
        if !self.temp_files.contains_key(&encoded) {
            let path = naming::temp_file_name(
                &self.config.topics_dir,
                &self.key.topic,
                &encoded,
                self.format.extension(),
            );
            self.storage.create(&path).await?;
            debug!(partition = %self.key, path, "opened temp file");
            self.temp_files.insert(
                encoded.clone(),
                TempFile {
                    path,
                    encoded_partition: encoded.clone(),
                    start_offset: record.offset,
                    end_offset: record.offset,
                },
            );
            if self.opened_at.is_none() {
                self.opened_at = Some(Instant::now());
            }
            self.state = WriterState::Writing;
        }

        let data = self.format.serialize(record)?;
        if let Some(file) = self.temp_files.get_mut(&encoded) {
            self.storage.append(&file.path, data).await?;
            file.end_offset = record.offset;
            self.records_since_commit += 1;
        }
        Ok(())
    }

    /// Seals the open temp files into a commit batch. A rotation with no
    /// open files is a no-op.
    fn begin_commit(&mut self) -> Result<()> {
        if self.temp_files.is_empty() {
            return Ok(());
        }
        let mut files: Vec<TempFile> = self.temp_files.drain().map(|(_, file)| file).collect();
        files.sort_by(|a, b| a.encoded_partition.cmp(&b.encoded_partition));
        let mut queue = Vec::with_capacity(files.len());
        for file in files {
            let committed = naming::committed_file_name(
                &self.config.topics_dir,
                &file.encoded_partition,
                &self.key,
                file.start_offset,
                file.end_offset,
                self.format.extension(),
                self.config.zero_pad_width,
            )?;
            queue.push(PendingFile {
                temp: file.path,
                committed,
            });
        }
        self.commit_queue = queue;
        self.state = WriterState::Committing(CommitPhase::WalBegin);
        Ok(())
    }

    /// Executes the commit sequence from wherever it last stopped. All
    /// files of the batch land inside one WAL begin/end bracket, and the
    /// end marker is written before the first rename: once the bracket is
    /// sealed the whole batch is durable (recovery finishes any rename a
    /// crash interrupted); until then recovery discards the whole batch.
    async fn run_commit(&mut self) -> Result<()> {
        loop {
            let WriterState::Committing(phase) = self.state else {
                return Ok(());
            };
            match phase {
                CommitPhase::WalBegin => {
                    if self.commit_queue.is_empty() {
                        // a resumed rotation that turned out to be empty
                        self.state = WriterState::Idle;
                        return Ok(());
                    }
                    self.wal.append(&WalEntry::Begin).await?;
                    self.state = WriterState::Committing(CommitPhase::WalMappings(0));
                }
                CommitPhase::WalMappings(next) => {
                    if let Some(file) = self.commit_queue.get(next) {
                        self.wal
                            .append(&WalEntry::Mapping {
                                temp: file.temp.clone(),
                                committed: file.committed.clone(),
                            })
                            .await?;
                        self.state = WriterState::Committing(CommitPhase::WalMappings(next + 1));
                    } else {
                        self.state = WriterState::Committing(CommitPhase::WalEnd);
                    }
                }
                CommitPhase::WalEnd => {
                    self.wal.append(&WalEntry::End).await?;
                    self.state = WriterState::Committing(CommitPhase::Renames);
                }
                CommitPhase::Renames => {
                    for index in 0..self.commit_queue.len() {
                        let file = &self.commit_queue[index];
                        // a retried commit may find some renames already done
                        if self.storage.exists(&file.committed).await? {
                            continue;
                        }
                        self.storage.rename(&file.temp, &file.committed).await?;
                    }
                    info!(
                        partition = %self.key,
                        files = self.commit_queue.len(),
                        "committed rotation batch"
                    );
                    self.commit_queue.clear();
                    self.records_since_commit = 0;
                    self.opened_at = None;
                    self.state = WriterState::Idle;
                    return Ok(());
                }
            }
        }
    }
}
