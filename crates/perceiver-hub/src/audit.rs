//! Append-only audit trail of model calls.
//!
//! The queue belongs to one page session. Records are buffered in a bounded queue (oldest dropped
//! first) and written out by an explicit flush task that can be stopped and started again. Audit
//! problems are logged and never reach callers.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use perception_core_types::RequestId;
use response_cache::CacheOp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub request_id: RequestId,
    pub op: CacheOp,
    pub attempt: u32,
    pub cached: bool,
    pub recorded_at: DateTime<Utc>,
    pub call: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, records: &[AuditRecord]) -> std::io::Result<()>;
}

/// One JSON object per line, appended to `path`.
pub struct JsonlFileSink {
    path: PathBuf,
}

impl JsonlFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlFileSink {
    async fn write(&self, records: &[AuditRecord]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut buffer = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buffer).await?;
        file.flush().await
    }
}

struct FlushTask {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct AuditQueue {
    buffer: Arc<Mutex<VecDeque<AuditRecord>>>,
    capacity: usize,
    dropped: AtomicU64,
    task: Mutex<Option<FlushTask>>,
}

impl AuditQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            task: Mutex::new(None),
        }
    }

    pub fn push(&self, record: AuditRecord) {
        let mut buffer = self.buffer.lock();
        while buffer.len() >= self.capacity {
            buffer.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(record);
    }

    pub fn drain(&self) -> Vec<AuditRecord> {
        self.buffer.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Records discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_flushing(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Spawn the periodic flush task, replacing a running one. Must be called inside a tokio
    /// runtime.
    pub fn start_flush(&self, sink: Arc<dyn AuditSink>, interval: Duration) {
        let shutdown = CancellationToken::new();
        let buffer = Arc::clone(&self.buffer);
        let token = shutdown.clone();
        let period = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            debug!(target: "perceiver-hub", "audit flush task started");
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                select! {
                    _ = token.cancelled() => {
                        flush_once(&buffer, sink.as_ref()).await;
                        break;
                    }
                    _ = ticker.tick() => {
                        flush_once(&buffer, sink.as_ref()).await;
                    }
                }
            }
            debug!(target: "perceiver-hub", "audit flush task exited");
        });

        let previous = self.task.lock().replace(FlushTask { shutdown, handle });
        if let Some(previous) = previous {
            previous.shutdown.cancel();
        }
    }

    /// Stop the flush task after it has written out everything still queued.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.shutdown.cancel();
            if let Err(err) = task.handle.await {
                warn!(target: "perceiver-hub", ?err, "audit flush task panicked");
            }
        }
    }
}

impl Drop for AuditQueue {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.shutdown.cancel();
        }
    }
}

async fn flush_once(buffer: &Mutex<VecDeque<AuditRecord>>, sink: &dyn AuditSink) {
    let batch: Vec<AuditRecord> = buffer.lock().drain(..).collect();
    if batch.is_empty() {
        return;
    }
    if let Err(err) = sink.write(&batch).await {
        warn!(target: "perceiver-hub", %err, records = batch.len(), "audit flush failed");
    }
}
