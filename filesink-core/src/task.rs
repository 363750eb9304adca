//! The sink task owns one writer actor per assigned partition and routes
//! delivered batches to them. Partitions never share mutable state, so a
//! suspended or slow partition cannot hold up any other: each actor runs on
//! its own tokio task and serializes the operations for its partition
//! through a bounded channel.
//!
//! Startup recovers every assigned partition before the first record is
//! accepted and reports the per-partition resume offsets. Stop discards
//! whatever is still uncommitted; those records were never acknowledged and
//! will be redelivered after the next start.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::SinkConfig;
use crate::format::Format;
use crate::message::{PartitionKey, SinkRecord};
use crate::partitioner::Partitioner;
use crate::storage::Storage;
use crate::writer::PartitionWriter;
use crate::{Error, Result};

enum ActorMessage {
    Recover {
        respond_to: oneshot::Sender<Result<Option<i64>>>,
    },
    Write {
        records: Vec<SinkRecord>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Flush {
        respond_to: oneshot::Sender<Result<()>>,
    },
    Close {
        respond_to: oneshot::Sender<Result<()>>,
    },
}

struct WriterActor<S, F, P> {
    actor_messages: mpsc::Receiver<ActorMessage>,
    writer: PartitionWriter<S, F, P>,
}

impl<S, F, P> WriterActor<S, F, P>
where
    S: Storage + Clone + Send + Sync + 'static,
    F: Format,
    P: Partitioner,
{
    async fn run(mut self) {
        while let Some(msg) = self.actor_messages.recv().await {
            self.handle_message(msg).await;
        }
    }

    async fn handle_message(&mut self, msg: ActorMessage) {
        match msg {
            ActorMessage::Recover { respond_to } => {
                let _ = respond_to.send(self.writer.recover().await);
            }
            ActorMessage::Write {
                records,
                respond_to,
            } => {
                let _ = respond_to.send(self.writer.write(records).await);
            }
            ActorMessage::Flush { respond_to } => {
                let _ = respond_to.send(self.writer.flush().await);
            }
            ActorMessage::Close { respond_to } => {
                let _ = respond_to.send(self.writer.close().await);
            }
        }
    }
}

struct WriterHandle {
    sender: mpsc::Sender<ActorMessage>,
    task: JoinHandle<()>,
}

impl WriterHandle {
    async fn recover(&self) -> Result<Option<i64>> {
        let (tx, rx) = oneshot::channel();
        self.request(ActorMessage::Recover { respond_to: tx }, rx)
            .await?
    }

    /// Queues a batch and hands back the reply channel without waiting for
    /// the writer to act, so one slow store call cannot serialize delivery
    /// across partitions.
    async fn submit_write(
        &self,
        records: Vec<SinkRecord>,
    ) -> Result<oneshot::Receiver<Result<()>>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::Write {
                records,
                respond_to: tx,
            })
            .await
            .map_err(|_| Error::ActorPatternRecv("writer actor is gone".to_string()))?;
        Ok(rx)
    }

    async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.request(ActorMessage::Flush { respond_to: tx }, rx)
            .await?
    }

    async fn close(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.request(ActorMessage::Close { respond_to: tx }, rx)
            .await?
    }

    async fn request<T>(&self, msg: ActorMessage, rx: oneshot::Receiver<T>) -> Result<T> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| Error::ActorPatternRecv("writer actor is gone".to_string()))?;
        rx.await
            .map_err(|err| Error::ActorPatternRecv(err.to_string()))
    }
}

/// Orchestrates the per-partition writers behind a single put/flush/stop
/// surface.
pub struct SinkTask<S, F, P> {
    config: SinkConfig,
    storage: S,
    format: F,
    partitioner: P,
    writers: HashMap<PartitionKey, WriterHandle>,
}

impl<S, F, P> SinkTask<S, F, P>
where
    S: Storage + Clone + Send + Sync + 'static,
    F: Format + Clone + 'static,
    P: Partitioner + Clone + 'static,
{
    pub fn new(config: SinkConfig, storage: S, format: F, partitioner: P) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage,
            format,
            partitioner,
            writers: HashMap::new(),
        })
    }

    /// Opens a writer per assigned partition and recovers each one. The
    /// returned map holds a resume offset for every partition the store
    /// already has committed files for; absent keys mean the source should
    /// start wherever it likes.
    pub async fn start(
        &mut self,
        partitions: Vec<PartitionKey>,
    ) -> Result<HashMap<PartitionKey, i64>> {
        for key in partitions {
            if !self.writers.contains_key(&key) {
                let handle = self.spawn_writer(key.clone());
                self.writers.insert(key, handle);
            }
        }
        let mut resume = HashMap::new();
        for (key, handle) in &self.writers {
            if let Some(offset) = handle.recover().await? {
                resume.insert(key.clone(), offset);
            }
        }
        info!(partitions = self.writers.len(), "sink task started");
        Ok(resume)
    }

    /// Routes a delivered batch to the partition writers, preserving the
    /// delivery order within each partition. Every writer is driven on
    /// every call, records or not, so suspended partitions get to check
    /// their retry deadline even when the source has nothing new for them.
    /// All batches are dispatched before any reply is awaited; the writers
    /// work their storage calls concurrently and only the slowest one
    /// gates the return.
    pub async fn put(&self, records: Vec<SinkRecord>) -> Result<()> {
        let mut batches: HashMap<PartitionKey, Vec<SinkRecord>> = HashMap::new();
        for record in records {
            batches
                .entry(record.partition.clone())
                .or_default()
                .push(record);
        }
        for key in batches.keys() {
            if !self.writers.contains_key(key) {
                return Err(Error::InvalidArgument(format!(
                    "record for unassigned partition {key}"
                )));
            }
        }
        let mut replies = Vec::with_capacity(self.writers.len());
        for (key, handle) in &self.writers {
            let batch = batches.remove(key).unwrap_or_default();
            replies.push(handle.submit_write(batch).await?);
        }
        for reply in replies {
            reply
                .await
                .map_err(|err| Error::ActorPatternRecv(err.to_string()))??;
        }
        Ok(())
    }

    /// Rotates every open temp file now.
    pub async fn flush(&self) -> Result<()> {
        for handle in self.writers.values() {
            handle.flush().await?;
        }
        Ok(())
    }

    /// Shuts the writers down. Uncommitted temp files and buffered records
    /// are discarded, never half-committed.
    pub async fn stop(mut self) -> Result<()> {
        for (key, handle) in self.writers.drain() {
            if let Err(err) = handle.close().await {
                error!(partition = %key, %err, "error while closing partition writer");
            }
            let WriterHandle { sender, task } = handle;
            drop(sender);
            if let Err(err) = task.await {
                error!(partition = %key, %err, "writer actor panicked");
            }
        }
        info!("sink task stopped");
        Ok(())
    }

    fn spawn_writer(&self, key: PartitionKey) -> WriterHandle {
        let (sender, receiver) = mpsc::channel(self.config.channel_buffer_size);
        let writer = PartitionWriter::new(
            key,
            self.config.clone(),
            self.storage.clone(),
            self.format.clone(),
            self.partitioner.clone(),
        );
        let actor = WriterActor {
            actor_messages: receiver,
            writer,
        };
        let task = tokio::spawn(actor.run());
        WriterHandle { sender, task }
    }
}
