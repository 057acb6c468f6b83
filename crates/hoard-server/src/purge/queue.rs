//! Deferred deletion queue
//!
//! One worker task owns the set of subjects whose files must be purged.
//! Callers talk to it through a cloneable [`PurgeHandle`] over a bounded
//! mailbox; every command carries a oneshot reply channel.
//!
//! The worker is **Idle** while the pending set is empty and blocks on the
//! mailbox. Once a subject is added it turns **Active** and runs drain passes:
//! for each pending subject the next page of files is fetched and purged, blob
//! first, record second. A single failing file is logged and skipped.
//!
//! Pages are walked by file id with a per-subject cursor, so files that keep
//! failing never hide the ones behind them. When the cursor runs off the end
//! the sweep restarts from the first id. A subject whose first page is empty
//! is done. The mailbox is drained between passes so `add` and `check` stay
//! responsive while a purge runs.

use std::collections::HashMap;
use std::sync::Arc;

use hoard_core::{DeletionTask, FileRecord, FileStore, StoreError, TaskStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::blob::BlobStore;

/// Errors from the deletion queue
#[derive(Error, Debug)]
pub enum PurgeError {
    #[error("Failed to remove blob '{name}': {source}")]
    Blob {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Deletion worker is not running")]
    QueueClosed,
}

/// Deletion queue settings
#[derive(Debug, Clone)]
pub struct PurgeConfig {
    /// Files fetched per subject per pass
    pub page_size: usize,
    /// Full sweeps without progress before a subject is dropped
    pub max_stalled_passes: u32,
    /// Mailbox capacity
    pub mailbox: usize,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_stalled_passes: 5,
            mailbox: 64,
        }
    }
}

/// Wire form of a queue request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PurgeRequest {
    Add { subject: String },
    Check,
    Shutdown,
}

/// Wire form of a queue reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PurgeReply {
    Queued { queued: bool },
    Status { active: bool },
    Done { done: bool },
}

enum Command {
    Add {
        subject: String,
        respond: oneshot::Sender<()>,
    },
    Check {
        respond: oneshot::Sender<bool>,
    },
    Shutdown {
        respond: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the deletion worker
#[derive(Debug, Clone)]
pub struct PurgeHandle {
    tx: mpsc::Sender<Command>,
}

impl PurgeHandle {
    /// Start the worker task
    pub fn spawn(
        files: Arc<dyn FileStore>,
        blobs: Arc<dyn BlobStore>,
        config: PurgeConfig,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.mailbox.max(1));
        let worker = Worker {
            files,
            blobs,
            config,
            pending: HashMap::new(),
            rx,
        };
        let task = tokio::spawn(worker.run());
        (Self { tx }, task)
    }

    /// Queue a subject for purging
    pub async fn enqueue(&self, subject_id: impl Into<String>) -> Result<(), PurgeError> {
        let (respond, rx) = oneshot::channel();
        self.send(Command::Add {
            subject: subject_id.into(),
            respond,
        })
        .await?;
        rx.await.map_err(|_| PurgeError::QueueClosed)
    }

    /// Whether the worker is currently draining
    pub async fn check(&self) -> Result<bool, PurgeError> {
        let (respond, rx) = oneshot::channel();
        self.send(Command::Check { respond }).await?;
        rx.await.map_err(|_| PurgeError::QueueClosed)
    }

    /// Finish the current pass and stop the worker
    pub async fn shutdown(&self) -> Result<(), PurgeError> {
        let (respond, rx) = oneshot::channel();
        self.send(Command::Shutdown { respond }).await?;
        rx.await.map_err(|_| PurgeError::QueueClosed)
    }

    /// Handle a request in its wire form
    pub async fn dispatch(&self, request: PurgeRequest) -> Result<PurgeReply, PurgeError> {
        match request {
            PurgeRequest::Add { subject } => {
                self.enqueue(subject).await?;
                Ok(PurgeReply::Queued { queued: true })
            }
            PurgeRequest::Check => Ok(PurgeReply::Status {
                active: self.check().await?,
            }),
            PurgeRequest::Shutdown => {
                self.shutdown().await?;
                Ok(PurgeReply::Done { done: true })
            }
        }
    }

    async fn send(&self, command: Command) -> Result<(), PurgeError> {
        self.tx.send(command).await.map_err(|_| PurgeError::QueueClosed)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Where a subject's purge stands
#[derive(Debug)]
struct Progress {
    task: DeletionTask,
    /// Last file id handled in the current sweep
    after: Option<String>,
    /// Whether any file was purged in the current sweep
    progressed: bool,
    /// Consecutive sweeps without progress
    stalls: u32,
}

impl Progress {
    fn new(subject_id: &str) -> Self {
        Self {
            task: DeletionTask::pending(subject_id),
            after: None,
            progressed: false,
            stalls: 0,
        }
    }
}

struct Worker {
    files: Arc<dyn FileStore>,
    blobs: Arc<dyn BlobStore>,
    config: PurgeConfig,
    pending: HashMap<String, Progress>,
    rx: mpsc::Receiver<Command>,
}

impl Worker {
    async fn run(mut self) {
        info!(page_size = self.config.page_size, "Deletion worker started");

        // Idle: block until something arrives
        while let Some(command) = self.rx.recv().await {
            if self.handle(command) == Flow::Stop {
                break;
            }

            // Active: drain until nothing is pending
            let mut flow = Flow::Continue;
            while !self.pending.is_empty() {
                self.pass().await;
                flow = self.drain_mailbox();
                if flow == Flow::Stop {
                    break;
                }
            }
            if flow == Flow::Stop {
                break;
            }
            debug!("Deletion worker idle");
        }

        if !self.pending.is_empty() {
            info!(pending = self.pending.len(), "Deletion worker stopped with subjects pending");
        }
        info!("Deletion worker stopped");
    }

    fn drain_mailbox(&mut self) -> Flow {
        while let Ok(command) = self.rx.try_recv() {
            if self.handle(command) == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::Add { subject, respond } => {
                if !self.pending.contains_key(&subject) {
                    info!(subject = %subject, "Queued subject for purge");
                    let progress = Progress::new(&subject);
                    self.pending.insert(subject, progress);
                }
                let _ = respond.send(());
                Flow::Continue
            }
            Command::Check { respond } => {
                let _ = respond.send(!self.pending.is_empty());
                Flow::Continue
            }
            Command::Shutdown { respond } => {
                let _ = respond.send(());
                Flow::Stop
            }
        }
    }

    /// Current tasks, for logging
    fn tasks(&self) -> Vec<DeletionTask> {
        self.pending.values().map(|p| p.task.clone()).collect()
    }

    async fn pass(&mut self) {
        debug!(tasks = ?self.tasks(), "Starting purge pass");
        let subjects: Vec<String> = self.pending.keys().cloned().collect();

        for subject in subjects {
            let after = self.pending.get(&subject).and_then(|p| p.after.clone());
            let page = match self
                .files
                .files_page(&subject, self.config.page_size, after.as_deref())
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(subject = %subject, error = %e, "Failed to list files for purge");
                    self.record_stall(&subject);
                    continue;
                }
            };

            if page.is_empty() {
                if after.is_none() {
                    info!(subject = %subject, "Purge complete");
                    self.pending.remove(&subject);
                } else {
                    self.end_sweep(&subject);
                }
                continue;
            }

            let mut purged = 0usize;
            for file in &page {
                match self.purge_file(file).await {
                    Ok(()) => purged += 1,
                    Err(e) => warn!(subject = %subject, file_id = %file.id, error = %e, "Skipping file"),
                }
            }
            debug!(subject = %subject, purged, page = page.len(), "Purge pass for subject");

            let Some(progress) = self.pending.get_mut(&subject) else {
                continue;
            };
            progress.task.status = TaskStatus::Active;
            progress.after = page.last().map(|f| f.id.clone());
            progress.progressed |= purged > 0;

            // a short page means the cursor reached the last file
            if page.len() < self.config.page_size {
                self.end_sweep(&subject);
            }
        }
    }

    /// Restart the subject's sweep from the first file id
    fn end_sweep(&mut self, subject: &str) {
        let Some(progress) = self.pending.get_mut(subject) else {
            return;
        };
        progress.after = None;
        if progress.progressed {
            progress.progressed = false;
            progress.stalls = 0;
        } else {
            self.record_stall(subject);
        }
    }

    async fn purge_file(&self, file: &FileRecord) -> Result<(), PurgeError> {
        let existed = self
            .blobs
            .remove(&file.blob_name)
            .await
            .map_err(|source| PurgeError::Blob {
                name: file.blob_name.clone(),
                source,
            })?;
        if !existed {
            debug!(file_id = %file.id, blob = %file.blob_name, "Blob already gone");
        }
        self.files.delete_file(&file.id).await?;
        Ok(())
    }

    fn record_stall(&mut self, subject: &str) {
        let Some(progress) = self.pending.get_mut(subject) else {
            return;
        };
        progress.stalls += 1;
        if progress.stalls >= self.config.max_stalled_passes {
            error!(
                subject = %subject,
                passes = progress.stalls,
                "Purge made no progress, dropping subject until the next enqueue or restart"
            );
            self.pending.remove(subject);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::purge::blob::FsBlobStore;
    use hoard_core::MemoryStore;

    fn worker(store: Arc<MemoryStore>, dir: &std::path::Path, page_size: usize) -> Worker {
        let (_tx, rx) = mpsc::channel(1);
        Worker {
            files: store,
            blobs: Arc::new(FsBlobStore::new(dir)),
            config: PurgeConfig {
                page_size,
                ..PurgeConfig::default()
            },
            pending: HashMap::new(),
            rx,
        }
    }

    fn add(worker: &mut Worker, subject: &str) {
        let (respond, _rx) = oneshot::channel();
        worker.handle(Command::Add {
            subject: subject.to_string(),
            respond,
        });
    }

    fn status(worker: &Worker, subject: &str) -> Option<TaskStatus> {
        worker
            .tasks()
            .into_iter()
            .find(|t| t.subject_id == subject)
            .map(|t| t.status)
    }

    #[tokio::test]
    async fn test_task_turns_active_after_first_page() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        for i in 0..4 {
            store.insert_file(FileRecord::new(format!("f{}", i), "u1", format!("b{}", i)));
        }

        let mut worker = worker(store.clone(), dir.path(), 2);
        add(&mut worker, "u1");
        assert_eq!(status(&worker, "u1"), Some(TaskStatus::Pending));

        worker.pass().await;
        assert_eq!(status(&worker, "u1"), Some(TaskStatus::Active));
        assert_eq!(store.count_files("u1").await.unwrap(), 2);

        // re-adding a running subject keeps its progress
        add(&mut worker, "u1");
        assert_eq!(status(&worker, "u1"), Some(TaskStatus::Active));
    }

    #[tokio::test]
    async fn test_cursor_restarts_after_last_page() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        for i in 0..3 {
            store.insert_file(FileRecord::new(format!("f{}", i), "u1", format!("b{}", i)));
        }

        let mut worker = worker(store.clone(), dir.path(), 2);
        add(&mut worker, "u1");

        worker.pass().await;
        assert_eq!(worker.pending["u1"].after.as_deref(), Some("f1"));

        // the short page ends the sweep
        worker.pass().await;
        assert_eq!(worker.pending["u1"].after, None);
        assert_eq!(worker.pending["u1"].stalls, 0);

        worker.pass().await;
        assert!(worker.pending.is_empty());
    }

    #[test]
    fn test_request_wire_shapes() {
        let add: PurgeRequest = serde_json::from_str(r#"{"op":"add","subject":"u1"}"#).unwrap();
        assert_eq!(add, PurgeRequest::Add { subject: "u1".into() });

        let check: PurgeRequest = serde_json::from_str(r#"{"op":"check"}"#).unwrap();
        assert_eq!(check, PurgeRequest::Check);

        let shutdown: PurgeRequest = serde_json::from_str(r#"{"op":"shutdown"}"#).unwrap();
        assert_eq!(shutdown, PurgeRequest::Shutdown);

        assert!(serde_json::from_str::<PurgeRequest>(r#"{"op":"drop"}"#).is_err());
    }

    #[test]
    fn test_reply_wire_shapes() {
        assert_eq!(
            serde_json::to_value(PurgeReply::Status { active: false }).unwrap(),
            serde_json::json!({"active": false})
        );
        assert_eq!(
            serde_json::to_value(PurgeReply::Done { done: true }).unwrap(),
            serde_json::json!({"done": true})
        );
    }
}
