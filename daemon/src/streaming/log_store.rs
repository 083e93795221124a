//! Durable per-(service, phase) run logs
//!
//! Each run log is a flat file of raw process output. Opening a log for a new
//! run truncates it and bumps the entry's generation, so every byte written
//! can be addressed by `(generation, offset)`. The broadcast hub relies on
//! these positions to splice a replay snapshot onto live output without gaps
//! or duplicates.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::models::service::RunKey;
use crate::storage::layout::StorageLayout;

/// Position of a chunk within the run logs of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPosition {
    /// Run generation, incremented on every `open`
    pub generation: u64,

    /// Byte offset of the chunk within that run's log
    pub offset: u64,
}

/// Full content of a run log at one point in time
#[derive(Debug, Clone)]
pub struct LogSnapshot {
    /// Generation the content belongs to; 0 for logs left by a previous process
    pub generation: u64,

    pub data: Vec<u8>,
}

impl LogSnapshot {
    /// Byte length of the snapshot
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Default)]
struct EntryState {
    generation: u64,
    /// Bytes durably written in the current generation; `None` until the
    /// first `open` in this process
    len: Option<u64>,
    file: Option<fs::File>,
}

#[derive(Default)]
struct LogEntry {
    state: Mutex<EntryState>,
}

/// Store of run logs, one file per (service, phase)
pub struct LogStore {
    layout: StorageLayout,
    entries: RwLock<HashMap<RunKey, Arc<LogEntry>>>,
}

impl LogStore {
    /// Create a new log store
    pub fn new(layout: StorageLayout) -> Self {
        Self {
            layout,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, key: &RunKey) -> Arc<LogEntry> {
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = entries.get(key) {
                return entry.clone();
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.entry(key.clone()).or_default().clone()
    }

    /// Truncate (or create) the log of a key and return a sink for the new run
    pub async fn open(&self, key: &RunKey) -> Result<LogSink, AppError> {
        let entry = self.entry(key);
        let file = self.layout.log_file(key);

        let mut state = entry.state.lock().await;
        let handle = file.create_truncated().await.map_err(|e| {
            AppError::StorageError(format!("unable to open {}: {}", file.path().display(), e))
        })?;
        state.generation += 1;
        state.len = Some(0);
        state.file = Some(handle);
        let generation = state.generation;
        drop(state);

        debug!(key = %key, generation, "Opened run log");
        Ok(LogSink {
            key: key.clone(),
            entry,
            generation,
        })
    }

    /// Read the full current content of a key's log.
    ///
    /// The entry lock is only held to sample the generation and length; the
    /// file itself is read outside of it, and read again if a new run
    /// truncated it in the meantime.
    pub async fn read(&self, key: &RunKey) -> Result<LogSnapshot, AppError> {
        let entry = self.entry(key);
        let file = self.layout.log_file(key);

        loop {
            let (generation, len) = {
                let state = entry.state.lock().await;
                (state.generation, state.len)
            };

            let mut data = file.read_bytes_or_empty().await?;

            if entry.state.lock().await.generation != generation {
                debug!(key = %key, generation, "Run log reopened during snapshot, reading again");
                continue;
            }

            // Without a length nothing was opened in this process yet, and the
            // file is whatever a previous run left behind.
            if let Some(len) = len {
                data.truncate(len as usize);
            }
            return Ok(LogSnapshot { generation, data });
        }
    }
}

/// Append handle for one run's log
pub struct LogSink {
    key: RunKey,
    entry: Arc<LogEntry>,
    generation: u64,
}

impl LogSink {
    /// Run generation this sink writes to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Append a chunk.
    ///
    /// The returned [`LogWrite`] keeps the entry locked until it is dropped,
    /// so whatever the caller does with the chunk while holding it (publishing
    /// it live) is ordered exactly like the writes themselves.
    pub async fn write(&self, data: &[u8]) -> LogWrite<'_> {
        let mut state = self.entry.state.lock().await;
        let offset = state.len.unwrap_or(0);
        let position = ChunkPosition {
            generation: self.generation,
            offset,
        };

        let error = if state.generation != self.generation {
            Some(AppError::StorageError(format!(
                "log {} was reopened by a newer run",
                self.key
            )))
        } else {
            match state.file.as_mut() {
                Some(file) => match append(file, data).await {
                    Ok(()) => {
                        state.len = Some(offset + data.len() as u64);
                        None
                    }
                    Err(e) => Some(e.into()),
                },
                None => Some(AppError::StorageError(format!("log {} is closed", self.key))),
            }
        };

        if let Some(e) = &error {
            warn!(key = %self.key, "Failed to append to run log: {}", e);
        }

        LogWrite {
            _state: state,
            position,
            error,
        }
    }
}

async fn append(file: &mut fs::File, data: &[u8]) -> std::io::Result<()> {
    file.write_all(data).await?;
    file.flush().await
}

/// A completed append; holds the entry lock while alive
pub struct LogWrite<'a> {
    _state: MutexGuard<'a, EntryState>,
    position: ChunkPosition,
    error: Option<AppError>,
}

impl LogWrite<'_> {
    /// Where the chunk landed
    pub fn position(&self) -> ChunkPosition {
        self.position
    }

    /// Whether the chunk reached the file
    pub fn is_persisted(&self) -> bool {
        self.error.is_none()
    }
}
