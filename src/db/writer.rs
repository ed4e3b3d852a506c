//! Write-behind for session changes.
//!
//! The run loop hands every journaled [`Change`] to a background task that
//! batches them and applies them in order. Write failures are logged; they
//! never reach the connection.

use super::Database;
use crate::session::Change;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 1000;
const BATCH_SIZE: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_millis(1000);

/// Buffers session changes and commits them in batches.
pub struct DatabaseWriter {
    sender: Sender<Change>,
    handle: JoinHandle<()>,
}

impl DatabaseWriter {
    /// Start the writer task for the connection recorded as `server_id`.
    pub fn new(db: Database, server_id: i64) -> Self {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = tokio::spawn(Self::run(db, server_id, receiver));
        Self { sender, handle }
    }

    async fn run(db: Database, server_id: i64, mut receiver: Receiver<Change>) {
        let mut buffer = Vec::with_capacity(BATCH_SIZE);
        loop {
            tokio::select! {
                write = receiver.recv() => match write {
                    Some(change) => {
                        buffer.push(change);
                        if buffer.len() >= BATCH_SIZE {
                            Self::flush(&db, server_id, &mut buffer).await;
                        }
                    }
                    None => {
                        Self::flush(&db, server_id, &mut buffer).await;
                        break;
                    }
                },
                _ = tokio::time::sleep(FLUSH_INTERVAL), if !buffer.is_empty() => {
                    Self::flush(&db, server_id, &mut buffer).await;
                }
            }
        }
        debug!(server_id, "Database writer stopped");
    }

    /// Queue one change.
    pub async fn write(&self, change: Change) {
        if self.sender.send(change).await.is_err() {
            warn!("Database writer gone, dropping change");
        }
    }

    /// Flush what is queued and wait for the task to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Database writer task failed");
        }
    }

    async fn flush(db: &Database, server_id: i64, buffer: &mut Vec<Change>) {
        if buffer.is_empty() {
            return;
        }
        debug!(count = buffer.len(), "Flushing session changes");
        let repo = db.sessions();
        for change in buffer.drain(..) {
            if let Err(e) = repo.apply(server_id, &change).await {
                warn!(error = %e, ?change, "Failed to persist session change");
            }
        }
    }
}
