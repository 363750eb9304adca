//! Drives a [`RecordSource`] into a [`SinkTask`] until cancelled.
//!
//! The loop is deliberately dumb: start the task, seek the source to the
//! recovered offsets, then shuttle batches until the cancellation token
//! fires, and stop the task so nothing half-written survives. All the
//! exactly-once machinery lives below in the task and its writers.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::format::Format;
use crate::message::PartitionKey;
use crate::partitioner::Partitioner;
use crate::source::RecordSource;
use crate::storage::Storage;
use crate::task::SinkTask;
use crate::Result;

pub struct Forwarder<R, S, F, P> {
    source: R,
    task: SinkTask<S, F, P>,
    cancel: CancellationToken,
}

impl<R, S, F, P> Forwarder<R, S, F, P>
where
    R: RecordSource,
    S: Storage + Clone + Send + Sync + 'static,
    F: Format + Clone + 'static,
    P: Partitioner + Clone + 'static,
{
    pub fn new(source: R, task: SinkTask<S, F, P>, cancel: CancellationToken) -> Self {
        Self {
            source,
            task,
            cancel,
        }
    }

    /// Runs until the token is cancelled, then shuts the sink down cleanly.
    pub async fn run(mut self, partitions: Vec<PartitionKey>) -> Result<()> {
        let resume = self.task.start(partitions).await?;
        self.source.seek(resume).await?;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("forwarder cancelled, stopping sink");
                    break;
                }
                batch = self.source.read_batch() => {
                    self.task.put(batch?).await?;
                }
            }
        }
        self.task.stop().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;
    use crate::config::SinkConfig;
    use crate::format::LineFormat;
    use crate::message::SinkRecord;
    use crate::naming;
    use crate::partitioner::DefaultPartitioner;
    use crate::storage::MemStorage;
    use bytes::Bytes;

    /// Source with a fixed script of batches; once drained it pends forever,
    /// like a stream with nothing new to say. Ignores seeks, so committed
    /// offsets come back as redeliveries the sink has to drop.
    struct ScriptedSource {
        batches: VecDeque<Vec<SinkRecord>>,
    }

    impl RecordSource for ScriptedSource {
        async fn seek(&mut self, _offsets: HashMap<PartitionKey, i64>) -> Result<()> {
            Ok(())
        }

        async fn read_batch(&mut self) -> Result<Vec<SinkRecord>> {
            match self.batches.pop_front() {
                Some(batch) => Ok(batch),
                None => std::future::pending().await,
            }
        }
    }

    fn records(key: &PartitionKey, range: std::ops::Range<i64>) -> Vec<SinkRecord> {
        range
            .map(|offset| SinkRecord::new(key.clone(), offset, "k", format!("value-{offset}")))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_until_cancelled() {
        let storage = MemStorage::new();
        let key = PartitionKey::new("clicks", 0);
        let committed =
            naming::committed_file_name("topics", "partition=0", &key, 0, 2, ".tsv", 10).unwrap();

        // one committed file exists already, so the source must be seeked
        // past it; its records are in the script anyway, as a redelivery
        storage.create(&committed).await.unwrap();

        let source = ScriptedSource {
            batches: VecDeque::from([records(&key, 0..3), records(&key, 3..6)]),
        };
        let task = SinkTask::new(
            SinkConfig::default(),
            storage.clone(),
            LineFormat,
            DefaultPartitioner,
        )
        .unwrap();

        let cancel = CancellationToken::new();
        let forwarder = Forwarder::new(source, task, cancel.clone());
        let run = tokio::spawn(forwarder.run(vec![key.clone()]));

        // wait for the second batch to land as a committed file
        let target =
            naming::committed_file_name("topics", "partition=0", &key, 3, 5, ".tsv", 10).unwrap();
        while !storage.file_names().contains(&target) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            storage.contents(&target).unwrap(),
            Bytes::from("value-3\nvalue-4\nvalue-5\n")
        );

        cancel.cancel();
        run.await.unwrap().unwrap();
        // the pre-existing file was never rewritten
        assert_eq!(storage.contents(&committed).unwrap(), Bytes::new());
    }
}
