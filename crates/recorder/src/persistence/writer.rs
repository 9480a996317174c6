#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::domain::SessionId;
use crate::error::Error;
use crate::events::{EventBus, RecorderEvent};
use crate::persistence::{ChunkStore, StreamChunk};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl WritePolicy {
    pub fn from_config(config: &config::Persistence) -> Self {
        Self {
            attempts: config.write_attempts.max(1),
            backoff: config.write_backoff,
        }
    }
}

/// What the writer task left behind when it stopped.
#[derive(Debug, Default)]
pub struct WriterReport {
    pub written: u32,
    /// Chunks that exhausted their retries, oldest first.
    pub backlog: Vec<StreamChunk>,
}

/// Writes chunks in sequence order on a background task so storage latency
/// never reaches the tick path.
#[derive(Debug)]
pub struct ChunkWriter {
    tx: flume::Sender<StreamChunk>,
    task: JoinHandle<WriterReport>,
}

impl ChunkWriter {
    pub fn spawn(
        session: SessionId,
        store: Arc<dyn ChunkStore>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        policy: WritePolicy,
    ) -> Self {
        let (tx, rx) = flume::unbounded();
        let task = tokio::spawn(run(session, rx, store, clock, events, policy));
        Self { tx, task }
    }

    /// Queues a chunk. Hands the chunk back if the writer task is gone.
    pub fn submit(&self, chunk: StreamChunk) -> Result<(), flume::SendError<StreamChunk>> {
        self.tx.send(chunk)
    }

    /// Stops accepting chunks, waits for everything queued to be attempted
    /// and returns what could not be written.
    pub async fn finish(self) -> Result<WriterReport, Error> {
        drop(self.tx);
        Ok(self.task.await?)
    }
}

async fn run(
    session: SessionId,
    rx: flume::Receiver<StreamChunk>,
    store: Arc<dyn ChunkStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    policy: WritePolicy,
) -> WriterReport {
    let mut backlog = VecDeque::new();
    let mut written = 0;

    while let Ok(chunk) = rx.recv_async().await {
        backlog.push_back(chunk);
        // Later chunks wait behind a failed one so sequences land in order.
        while let Some(chunk) = backlog.front() {
            match write_with_retry(store.as_ref(), clock.as_ref(), session, chunk, policy).await {
                Ok(()) => {
                    written += 1;
                    backlog.pop_front();
                }
                Err(err) => {
                    error!(%session, backlog = backlog.len(), %err, "chunk write failed, keeping backlog");
                    events.publish(RecorderEvent::from_error(&err));
                    break;
                }
            }
        }
    }

    debug!(%session, written, backlog = backlog.len(), "chunk writer stopped");
    WriterReport {
        written,
        backlog: backlog.into(),
    }
}

/// Writes one chunk, retrying with a fixed backoff. The error names the
/// chunk's sequence.
pub async fn write_with_retry(
    store: &dyn ChunkStore,
    clock: &dyn Clock,
    session: SessionId,
    chunk: &StreamChunk,
    policy: WritePolicy,
) -> Result<(), Error> {
    let attempts = policy.attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        match store.write(session, chunk).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!(%session, sequence = chunk.sequence, attempt, %err, "chunk write attempt failed");
                last_error = Some(err);
                if attempt < attempts {
                    clock.sleep(policy.backoff).await;
                }
            }
        }
    }
    Err(Error::ChunkWrite {
        sequence: chunk.sequence,
        reason: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}
