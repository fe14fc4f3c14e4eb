// 🔁 Sync Queue - priority task queue with retry, downgrade and coalescing
// Pushes store snapshots to an external synchronization target. One pending
// task per target id (coalescing); tasks drain ordered by priority then
// enqueue time; at most one drain is active process-wide, enforced by an
// in-flight flag. A periodic worker triggers drains even when nothing new
// was enqueued, to catch previously-deferred low-priority work.

use crate::error::SyncError;
use crate::notify::{NoticeKind, Notification, NotificationCenter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default period of the background flush timer.
pub const FLUSH_PERIOD: Duration = Duration::from_secs(5);

// ============================================================================
// TASKS
// ============================================================================

/// Higher numeric value = drained first. Failure downgrades one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPriority {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl SyncPriority {
    /// The next level down, or None when already at the bottom.
    pub fn downgrade(self) -> Option<SyncPriority> {
        match self {
            SyncPriority::High => Some(SyncPriority::Medium),
            SyncPriority::Medium => Some(SyncPriority::Low),
            SyncPriority::Low => None,
        }
    }
}

/// Transient - exists only inside the queue.
#[derive(Debug, Clone)]
pub struct SyncTask {
    pub target_id: String,
    /// Opaque state snapshot handed to the dispatcher.
    pub snapshot: Value,
    pub enqueued_at: DateTime<Utc>,
    pub priority: SyncPriority,
    pub retries: u32,
}

/// Short content fingerprint for log lines.
fn fingerprint(snapshot: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(snapshot.to_string());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

// ============================================================================
// DISPATCH SEAM
// ============================================================================

/// The external synchronization target. Implementations suspend on I/O;
/// the queue guarantees at most one in-flight dispatch per process.
#[async_trait]
pub trait SyncDispatcher: Send + Sync {
    async fn dispatch(&self, task: &SyncTask) -> Result<(), SyncError>;
}

/// HTTP target: POSTs `{ target_id, snapshot }` to a sync endpoint.
pub struct HttpSyncTarget {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpSyncTarget {
    pub fn new(endpoint: &str) -> Self {
        HttpSyncTarget {
            http: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl SyncDispatcher for HttpSyncTarget {
    async fn dispatch(&self, task: &SyncTask) -> Result<(), SyncError> {
        self.http
            .post(&self.endpoint)
            .json(&json!({
                "target_id": task.target_id,
                "snapshot": task.snapshot,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

// ============================================================================
// QUEUE
// ============================================================================

pub struct SyncQueue {
    tasks: Mutex<Vec<SyncTask>>,
    /// At-most-one active drain across the process, NOT per task id.
    in_flight: AtomicBool,
    dispatcher: Arc<dyn SyncDispatcher>,
    notices: Arc<Mutex<NotificationCenter>>,
}

impl SyncQueue {
    pub fn new(
        dispatcher: Arc<dyn SyncDispatcher>,
        notices: Arc<Mutex<NotificationCenter>>,
    ) -> Self {
        SyncQueue {
            tasks: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
            dispatcher,
            notices,
        }
    }

    /// Queue a snapshot for the target id.
    ///
    /// If a pending task for the id already exists it is replaced, not
    /// duplicated: the new snapshot and timestamp win, and the task keeps
    /// the higher of the two priorities.
    pub fn enqueue(&self, target_id: &str, snapshot: Value, priority: SyncPriority) {
        let mut tasks = match self.tasks.lock() {
            Ok(t) => t,
            Err(_) => return,
        };

        debug!(
            target_id,
            ?priority,
            fingerprint = %fingerprint(&snapshot),
            "sync enqueue"
        );

        if let Some(existing) = tasks.iter_mut().find(|t| t.target_id == target_id) {
            existing.snapshot = snapshot;
            existing.enqueued_at = Utc::now();
            if priority > existing.priority {
                existing.priority = priority;
            }
            return;
        }

        tasks.push(SyncTask {
            target_id: target_id.to_string(),
            snapshot,
            enqueued_at: Utc::now(),
            priority,
            retries: 0,
        });
    }

    /// Number of pending tasks (for diagnostics and tests).
    pub fn pending(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn pending_for(&self, target_id: &str) -> Option<SyncTask> {
        let tasks = self.tasks.lock().ok()?;
        tasks.iter().find(|t| t.target_id == target_id).cloned()
    }

    /// Whether a drain is currently active.
    pub fn is_draining(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Pop the next task: highest priority first, then enqueue time
    /// ascending.
    fn pop_next(&self) -> Option<SyncTask> {
        let mut tasks = self.tasks.lock().ok()?;
        if tasks.is_empty() {
            return None;
        }
        let best = tasks
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.enqueued_at.cmp(&b.enqueued_at))
            })
            .map(|(i, _)| i)?;
        Some(tasks.remove(best))
    }

    /// Re-queue a failed task at a downgraded priority. A newer pending
    /// task for the same target supersedes the retry.
    fn requeue(&self, mut task: SyncTask, priority: SyncPriority) {
        let mut tasks = match self.tasks.lock() {
            Ok(t) => t,
            Err(_) => return,
        };
        if tasks.iter().any(|t| t.target_id == task.target_id) {
            debug!(target_id = %task.target_id, "retry superseded by newer snapshot");
            return;
        }
        task.priority = priority;
        task.retries += 1;
        task.enqueued_at = Utc::now();
        tasks.push(task);
    }

    /// Drain pending tasks, one dispatch at a time.
    ///
    /// A second drain request observed while one is active is a no-op; the
    /// work is picked up by the next periodic tick or the next enqueue. New
    /// enqueues during a drain are accepted and processed after the current
    /// item completes. On dispatch failure the task is re-enqueued one
    /// priority level down; a failure at low drops the task after logging
    /// and emits one error notification.
    pub async fn drain(&self) {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("drain already active, skipping");
            return;
        }

        while let Some(task) = self.pop_next() {
            match self.dispatcher.dispatch(&task).await {
                Ok(()) => {
                    debug!(
                        target_id = %task.target_id,
                        retries = task.retries,
                        "sync dispatched"
                    );
                }
                Err(err) => match task.priority.downgrade() {
                    Some(lower) => {
                        warn!(
                            target_id = %task.target_id,
                            ?lower,
                            %err,
                            "dispatch failed, re-enqueueing downgraded"
                        );
                        self.requeue(task, lower);
                    }
                    None => {
                        error!(
                            target_id = %task.target_id,
                            retries = task.retries,
                            %err,
                            "dispatch failed at low priority, dropping task"
                        );
                        if let Ok(mut notices) = self.notices.lock() {
                            notices.push(Notification::new(
                                NoticeKind::Error,
                                "Sync failed",
                                &format!(
                                    "Could not synchronize {} after {} attempts",
                                    task.target_id,
                                    task.retries + 1
                                ),
                            ));
                        }
                    }
                },
            }
        }

        self.in_flight.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// PERIODIC WORKER
// ============================================================================

/// Handle to the background flush task. Shutting down stops the timer;
/// an in-flight dispatch is allowed to complete and its result discarded.
pub struct SyncWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncWorker {
    /// Spawn the periodic flush loop for a shared queue.
    pub fn spawn(queue: Arc<SyncQueue>, period: Duration) -> Self {
        let (shutdown, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => queue.drain().await,
                    _ = rx.changed() => break,
                }
            }
            info!("sync worker stopped");
        });
        SyncWorker { shutdown, handle }
    }

    /// Stop the timer and wait for the loop (and any in-flight dispatch)
    /// to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

// ============================================================================
// TESTS
// ============================================================================
