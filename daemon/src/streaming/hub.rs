//! Live fan-out of run output to viewers

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::service::RunKey;
use crate::streaming::log_store::{ChunkPosition, LogSnapshot, LogStore};
use crate::streaming::viewer::{ViewerSink, ViewerSource};

/// Hub options
#[derive(Debug, Clone)]
pub struct Options {
    /// A viewer without inbound activity for this long is dropped
    pub idle_timeout: Duration,

    /// Chunks queued per subscriber before it is evicted as too slow
    pub buffer_chunks: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            buffer_chunks: 1024,
        }
    }
}

/// A published piece of run output
#[derive(Debug, Clone)]
pub struct LogChunk {
    /// Where the chunk sits in the run log; `None` for chunks that never made
    /// it to the log (they are always delivered)
    pub position: Option<ChunkPosition>,

    pub data: Bytes,
}

type Senders = HashMap<Uuid, mpsc::Sender<LogChunk>>;

/// Registry of live subscriptions keyed by (service, phase)
pub struct BroadcastHub {
    log_store: Arc<LogStore>,
    options: Options,
    subscribers: RwLock<HashMap<RunKey, Senders>>,
}

impl BroadcastHub {
    /// Create a new hub replaying from `log_store`
    pub fn new(log_store: Arc<LogStore>, options: Options) -> Self {
        Self {
            log_store,
            options,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a subscriber for `key`.
    ///
    /// The subscriber is registered before the log is read, and the returned
    /// subscription discards whatever part of the queued live chunks the
    /// replay already covers.
    pub async fn subscribe(self: &Arc<Self>, key: RunKey) -> Result<Subscription, AppError> {
        let (tx, rx) = mpsc::channel(self.options.buffer_chunks);
        let id = Uuid::new_v4();

        {
            let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
            subscribers.entry(key.clone()).or_default().insert(id, tx);
        }

        let snapshot = match self.log_store.read(&key).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.unsubscribe(&key, id);
                return Err(e);
            }
        };

        debug!(key = %key, subscriber = %id, replay_bytes = snapshot.len(), "Subscribed");
        Ok(Subscription {
            id,
            key,
            hub: self.clone(),
            replay_generation: snapshot.generation,
            replay_len: snapshot.len(),
            replay: Some(snapshot),
            rx,
        })
    }

    /// Deliver a chunk to every subscriber of `key`.
    ///
    /// Never waits on a subscriber: one whose queue is full or closed is
    /// evicted.
    pub fn publish(&self, key: &RunKey, chunk: LogChunk) {
        let mut evicted = Vec::new();
        {
            let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            let Some(senders) = subscribers.get(key) else {
                return;
            };
            for (id, tx) in senders {
                match tx.try_send(chunk.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(key = %key, subscriber = %id, "Subscriber too slow, dropping it");
                        evicted.push(*id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => evicted.push(*id),
                }
            }
        }

        for id in evicted {
            self.unsubscribe(key, id);
        }
    }

    /// Remove a subscriber. Idempotent.
    pub fn unsubscribe(&self, key: &RunKey, id: Uuid) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(senders) = subscribers.get_mut(key) {
            if senders.remove(&id).is_some() {
                debug!(key = %key, subscriber = %id, "Unsubscribed");
            }
            if senders.is_empty() {
                subscribers.remove(key);
            }
        }
    }

    /// Number of live subscribers of `key`
    pub fn subscriber_count(&self, key: &RunKey) -> usize {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        subscribers.get(key).map(|s| s.len()).unwrap_or(0)
    }

    /// Serve one viewer connection until it closes, errors, goes idle or
    /// falls behind: replay first, then live chunks.
    pub async fn attach<S, R>(
        self: &Arc<Self>,
        key: RunKey,
        mut sink: S,
        mut source: R,
    ) -> Result<(), AppError>
    where
        S: ViewerSink,
        R: ViewerSource,
    {
        let mut subscription = self.subscribe(key.clone()).await?;
        let subscriber = subscription.id();
        info!(key = %key, %subscriber, "Viewer attached");

        let idle_timeout = self.options.idle_timeout;
        let (dead_tx, mut dead_rx) = oneshot::channel::<()>();
        let liveness = tokio::spawn(async move {
            loop {
                match tokio::time::timeout(idle_timeout, source.receive()).await {
                    Ok(Ok(true)) => continue,
                    Ok(Ok(false)) => {
                        debug!(%subscriber, "Viewer closed the connection");
                        break;
                    }
                    Ok(Err(e)) => {
                        debug!(%subscriber, "Viewer receive failed: {}", e);
                        break;
                    }
                    Err(_) => {
                        debug!(%subscriber, "Viewer idle for {:?}, dropping it", idle_timeout);
                        break;
                    }
                }
            }
            let _ = dead_tx.send(());
        });

        let mut healthy = true;
        if let Some(replay) = subscription.take_replay() {
            if let Err(e) = sink.send(replay).await {
                debug!(%subscriber, "Failed to send replay: {}", e);
                healthy = false;
            }
        }

        while healthy {
            tokio::select! {
                _ = &mut dead_rx => break,
                chunk = subscription.recv() => match chunk {
                    Some(data) => {
                        if let Err(e) = sink.send(data).await {
                            debug!(%subscriber, "Failed to send chunk: {}", e);
                            break;
                        }
                    }
                    // Evicted by the publisher
                    None => break,
                },
            }
        }

        liveness.abort();
        drop(subscription);
        sink.close().await;
        info!(key = %key, %subscriber, "Viewer detached");
        Ok(())
    }
}

/// A registered subscriber; unsubscribes itself when dropped
pub struct Subscription {
    id: Uuid,
    key: RunKey,
    hub: Arc<BroadcastHub>,
    replay_generation: u64,
    replay_len: u64,
    replay: Option<LogSnapshot>,
    rx: mpsc::Receiver<LogChunk>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Take the replay of already persisted output. Yields `None` if it was
    /// already taken or the log was empty.
    pub fn take_replay(&mut self) -> Option<Bytes> {
        self.replay
            .take()
            .filter(|snapshot| !snapshot.is_empty())
            .map(|snapshot| Bytes::from(snapshot.data))
    }

    /// Next live output not already covered by the replay. Returns `None`
    /// once the subscription was evicted.
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            let chunk = self.rx.recv().await?;
            if let Some(data) = after_replay(chunk, self.replay_generation, self.replay_len) {
                return Some(data);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.key, self.id);
    }
}

/// The part of `chunk` that lies beyond a replay of `replay_len` bytes of
/// generation `replay_generation`.
fn after_replay(chunk: LogChunk, replay_generation: u64, replay_len: u64) -> Option<Bytes> {
    let Some(position) = chunk.position else {
        return Some(chunk.data);
    };

    if position.generation < replay_generation {
        return None;
    }
    if position.generation > replay_generation {
        return Some(chunk.data);
    }

    let end = position.offset + chunk.data.len() as u64;
    if end <= replay_len {
        None
    } else if position.offset < replay_len {
        Some(chunk.data.slice((replay_len - position.offset) as usize..))
    } else {
        Some(chunk.data)
    }
}
