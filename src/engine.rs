// 🎛️ Reconciliation Engine - the facade that wires the parts together
// Owns the store, the notification center, the sync queue and its
// worker, the workflow tracker, the snapshot vault, and the guidance
// client. Every cross-page mutation flows through here so the side
// effects (notify, persist, sync, guidance) stay in one place.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::guidance::{self, GuidanceContext, GuidanceService};
use crate::model::{CashflowData, IngestionData, Project, ReconciliationData};
use crate::notify::{NoticeKind, Notification, NotificationCenter};
use crate::persist::{KvStore, SnapshotVault};
use crate::pipeline::TransformationPipeline;
use crate::store::{ProjectSeed, RecordStore, SubscriptionToken};
use crate::sync::{SyncDispatcher, SyncPriority, SyncQueue, SyncWorker, FLUSH_PERIOD};
use crate::workflow::{WorkflowDefinition, WorkflowState, WorkflowTracker};

/// Which project page an aggregate replacement targets.
#[derive(Debug, Clone)]
pub enum PageData {
    Ingestion(IngestionData),
    Reconciliation(ReconciliationData),
    Cashflow(CashflowData),
}

impl PageData {
    fn page_name(&self) -> &'static str {
        match self {
            PageData::Ingestion(_) => "ingestion",
            PageData::Reconciliation(_) => "reconciliation",
            PageData::Cashflow(_) => "cashflow",
        }
    }
}

pub struct ReconEngine<S: KvStore> {
    store: RecordStore,
    notices: Arc<Mutex<NotificationCenter>>,
    queue: Arc<SyncQueue>,
    worker: Option<SyncWorker>,
    tracker: WorkflowTracker,
    vault: SnapshotVault<S>,
    guidance: Arc<dyn GuidanceService>,
    pipeline: TransformationPipeline,
}

impl<S: KvStore> ReconEngine<S> {
    pub fn new(
        dispatcher: Arc<dyn SyncDispatcher>,
        guidance: Arc<dyn GuidanceService>,
        vault: SnapshotVault<S>,
    ) -> Self {
        let notices = Arc::new(Mutex::new(NotificationCenter::new()));
        let queue = Arc::new(SyncQueue::new(dispatcher, Arc::clone(&notices)));

        ReconEngine {
            store: RecordStore::new(),
            notices,
            queue,
            worker: None,
            tracker: WorkflowTracker::new(),
            vault,
            guidance,
            pipeline: TransformationPipeline::new(),
        }
    }

    /// Start the periodic flush worker. Idempotent per engine: calling
    /// twice replaces nothing, the first worker keeps running.
    pub fn start_sync_worker(&mut self) {
        if self.worker.is_none() {
            self.worker = Some(SyncWorker::spawn(Arc::clone(&self.queue), FLUSH_PERIOD));
        }
    }

    /// Stop the flush worker and push out whatever is still queued.
    pub async fn shutdown(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown().await;
        }
        self.queue.drain().await;
        info!("engine shut down");
    }

    // ========================================================================
    // PROJECTS
    // ========================================================================

    pub fn create_project(&mut self, seed: ProjectSeed) -> Arc<Project> {
        let project = self.store.create(seed);
        info!(project_id = %project.id, name = %project.name, "project created");
        project
    }

    pub fn project(&self, id: &str) -> Option<Arc<Project>> {
        self.store.get(id)
    }

    pub fn project_ids(&self) -> Vec<String> {
        self.store.project_ids()
    }

    pub fn subscribe<F>(&mut self, project_id: &str, callback: F) -> SubscriptionToken
    where
        F: Fn(&Project) + Send + 'static,
    {
        self.store.subscribe(project_id, callback)
    }

    pub fn unsubscribe(&mut self, token: SubscriptionToken) {
        self.store.unsubscribe(token);
    }

    // ========================================================================
    // CROSS-PAGE UPDATES
    // ========================================================================

    /// Replace one page's aggregate and queue a medium-priority sync of
    /// the new snapshot. Subscribers fire synchronously inside the store.
    pub fn update_cross_page_data(
        &mut self,
        project_id: &str,
        data: PageData,
    ) -> Result<Arc<Project>, StoreError> {
        let page = data.page_name();
        let project = match data {
            PageData::Ingestion(ingestion) => self.store.set_ingestion(project_id, ingestion)?,
            PageData::Reconciliation(reconciliation) => {
                self.store.set_reconciliation(project_id, reconciliation)?
            }
            PageData::Cashflow(cashflow) => self.store.set_cashflow(project_id, cashflow)?,
        };

        self.enqueue_page_sync(&project, page, SyncPriority::Medium);
        Ok(project)
    }

    /// Run the first pipeline stage: ingestion records become matchable
    /// reconciliation records with derived confidence and risk.
    pub fn reconcile(&mut self, project_id: &str) -> Result<Arc<Project>, StoreError> {
        let project = self
            .store
            .get(project_id)
            .ok_or_else(|| StoreError::NotFound(project_id.to_string()))?;

        let records = self.pipeline.ingestion_to_reconciliation(&project);
        let metrics = TransformationPipeline::reconciliation_metrics(&records);

        let mut audit_trail = project.reconciliation.audit_trail.clone();
        audit_trail.push(crate::model::AuditEntry::system(
            "reconcile",
            Utc::now(),
            json!({ "records": records.len() }),
        ));

        let reconciliation = ReconciliationData {
            records,
            metrics,
            audit_trail,
            last_reconciled: Utc::now(),
        };

        let updated = self.store.set_reconciliation(project_id, reconciliation)?;
        self.vault.increment_counter("reconcile_runs");
        self.enqueue_page_sync(&updated, "reconciliation", SyncPriority::Medium);
        self.notify(
            NoticeKind::Success,
            "Reconciliation complete",
            &format!(
                "{} records matched for {}",
                updated.reconciliation.records.len(),
                updated.name
            ),
        );
        Ok(updated)
    }

    /// Run the second pipeline stage: reconciliation results become
    /// categorized cashflow with discrepancy detection.
    pub fn analyze(&mut self, project_id: &str) -> Result<Arc<Project>, StoreError> {
        let project = self
            .store
            .get(project_id)
            .ok_or_else(|| StoreError::NotFound(project_id.to_string()))?;

        let cashflow = self.pipeline.reconciliation_to_cashflow(&project);
        let discrepancies = cashflow.discrepancies.len();

        let updated = self.store.set_cashflow(project_id, cashflow)?;
        self.vault.increment_counter("analyze_runs");
        self.enqueue_page_sync(&updated, "cashflow", SyncPriority::Medium);
        if discrepancies > 0 {
            self.notify(
                NoticeKind::Warning,
                "Discrepancies found",
                &format!("{} categories need review in {}", discrepancies, updated.name),
            );
        }
        Ok(updated)
    }

    fn enqueue_page_sync(&self, project: &Project, page: &str, priority: SyncPriority) {
        let snapshot = match page_snapshot(project, page) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%err, project_id = %project.id, page, "snapshot serialization failed");
                return;
            }
        };
        self.queue
            .enqueue(&format!("{}:{}", project.id, page), snapshot, priority);
    }

    // ========================================================================
    // WORKFLOWS
    // ========================================================================

    pub fn register_workflow(&mut self, definition: WorkflowDefinition) {
        self.tracker.register(definition);
    }

    /// Start or resume a workflow. A snapshot persisted by an earlier
    /// session wins over a fresh zero-progress state.
    pub fn open_workflow(&mut self, workflow_id: &str) -> Option<WorkflowState> {
        if let Some(saved) = self.vault.load_workflow(workflow_id) {
            self.tracker.restore(saved.clone());
            info!(workflow_id, progress = saved.progress, "workflow resumed");
            return Some(saved);
        }
        self.tracker.init(workflow_id)
    }

    pub fn workflow_state(&self, workflow_id: &str) -> Option<&WorkflowState> {
        self.tracker.state(workflow_id)
    }

    /// Complete a step. On success the new state is persisted, synced at
    /// high priority, and any crossed milestone fans out to notifications
    /// and (best-effort) the guidance service.
    pub async fn advance_workflow(
        &mut self,
        workflow_id: &str,
        step_id: &str,
    ) -> Option<WorkflowState> {
        let outcome = self.tracker.advance(workflow_id, step_id)?;
        let state = outcome.state.clone();

        self.vault.save_workflow(&state);
        match serde_json::to_value(&state) {
            Ok(snapshot) => self.queue.enqueue(
                &format!("workflow:{}", workflow_id),
                snapshot,
                SyncPriority::High,
            ),
            Err(err) => warn!(%err, workflow_id, "workflow snapshot serialization failed"),
        }

        for milestone in &outcome.milestones {
            self.notify(
                NoticeKind::Info,
                "Workflow milestone",
                &format!("{} reached {}%", workflow_id, milestone),
            );
        }

        guidance::try_update_workflow(
            self.guidance.as_ref(),
            workflow_id,
            &state.current_step,
            state.progress,
            &state.completed_steps,
        )
        .await;

        for milestone in &outcome.milestones {
            let context = GuidanceContext {
                user_id: "system".to_string(),
                page: "workflow".to_string(),
                workflow_id: workflow_id.to_string(),
                current_step: state.current_step.clone(),
                completed_steps: state.completed_steps.clone(),
                total_steps: state.total_steps,
                progress: state.progress,
                milestone: Some(*milestone),
            };
            if let Some(message) = guidance::try_generate(self.guidance.as_ref(), &context).await {
                if let Ok(mut center) = self.notices.lock() {
                    center.push(Notification::new(
                        NoticeKind::Info,
                        "Guidance",
                        &message.content,
                    ));
                }
            }
        }

        Some(state)
    }

    // ========================================================================
    // IMPORT / EXPORT
    // ========================================================================

    pub fn export_project(&self, project_id: &str) -> Result<String, StoreError> {
        let exported = self.store.export(project_id)?;
        self.vault.increment_counter("exports");
        Ok(exported)
    }

    pub fn import_project(&mut self, data: &str) -> Result<Arc<Project>, StoreError> {
        let project = self.store.import(data)?;
        self.notify(
            NoticeKind::Success,
            "Project imported",
            &format!("Imported {}", project.name),
        );
        Ok(project)
    }

    // ========================================================================
    // ACCESS
    // ========================================================================

    pub fn notifications(&self) -> Arc<Mutex<NotificationCenter>> {
        Arc::clone(&self.notices)
    }

    pub fn sync_queue(&self) -> Arc<SyncQueue> {
        Arc::clone(&self.queue)
    }

    /// Force an immediate flush instead of waiting for the worker tick.
    pub async fn flush_sync(&self) {
        self.queue.drain().await;
    }

    fn notify(&self, kind: NoticeKind, title: &str, message: &str) {
        if let Ok(mut center) = self.notices.lock() {
            center.notify(kind, title, message);
        }
    }
}

fn page_snapshot(project: &Project, page: &str) -> serde_json::Result<Value> {
    match page {
        "ingestion" => serde_json::to_value(&project.ingestion),
        "reconciliation" => serde_json::to_value(&project.reconciliation),
        _ => serde_json::to_value(&project.cashflow),
    }
}

// ============================================================================
// TESTS
// ============================================================================
