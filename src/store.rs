// 🗄️ Record Store - keyed, versioned repository of per-project data
// The foundation everything else builds on. Mutation is copy-on-write:
// build the new Project value, swap it in, then synchronously invoke every
// subscriber registered for that id in registration order. Subscribers can
// therefore never observe a half-updated value.

use crate::error::StoreError;
use crate::model::{CashflowData, IngestionData, Project, ProjectPatch, ReconciliationData};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

type Callback = Box<dyn Fn(&Project) + Send>;

struct Subscriber {
    token: u64,
    callback: Callback,
}

/// Handle returned by `subscribe`; pass it back to `unsubscribe` to remove
/// exactly one callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionToken {
    project_id: String,
    token: u64,
}

/// Seed for `create`. Absent fields get defaults; an absent id is assigned.
#[derive(Debug, Clone, Default)]
pub struct ProjectSeed {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl ProjectSeed {
    pub fn named(name: &str) -> Self {
        ProjectSeed {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }
}

// ============================================================================
// RECORD STORE
// ============================================================================

/// Explicit store instance passed by handle to all collaborators. Lifecycle
/// is owned by the top-level process, not ambient global state.
pub struct RecordStore {
    projects: HashMap<String, Arc<Project>>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    next_token: u64,
}

impl RecordStore {
    pub fn new() -> Self {
        RecordStore {
            projects: HashMap::new(),
            subscribers: HashMap::new(),
            next_token: 0,
        }
    }

    // ========================================================================
    // PROJECT LIFECYCLE
    // ========================================================================

    /// Create a project, assigning an id when the seed carries none and
    /// zero-initializing all sub-aggregates.
    pub fn create(&mut self, seed: ProjectSeed) -> Arc<Project> {
        let mut project = Project::new(seed.name.as_deref().unwrap_or("New Project"));
        if let Some(id) = seed.id {
            project.id = id;
        }
        if let Some(description) = seed.description {
            project.description = description;
        }

        let project = Arc::new(project);
        self.projects.insert(project.id.clone(), Arc::clone(&project));
        self.notify(&project);
        project
    }

    pub fn get(&self, id: &str) -> Option<Arc<Project>> {
        self.projects.get(id).cloned()
    }

    pub fn project_ids(&self) -> Vec<String> {
        self.projects.keys().cloned().collect()
    }

    /// Apply a partial update, replacing the stored Project with a new
    /// immutable value and refreshing `updated_at`.
    pub fn update(&mut self, id: &str, patch: ProjectPatch) -> Result<Arc<Project>, StoreError> {
        let current = self
            .projects
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut next = (**current).clone();
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(description) = patch.description {
            next.description = description;
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(ingestion) = patch.ingestion {
            next.ingestion = ingestion;
        }
        if let Some(reconciliation) = patch.reconciliation {
            next.reconciliation = reconciliation;
        }
        if let Some(cashflow) = patch.cashflow {
            next.cashflow = cashflow;
        }
        next.updated_at = Utc::now();

        let next = Arc::new(next);
        self.projects.insert(id.to_string(), Arc::clone(&next));
        self.notify(&next);
        Ok(next)
    }

    /// Replace the ingestion aggregate, stamping `last_processed`.
    pub fn set_ingestion(
        &mut self,
        id: &str,
        mut ingestion: IngestionData,
    ) -> Result<Arc<Project>, StoreError> {
        ingestion.last_processed = Utc::now();
        self.update(
            id,
            ProjectPatch {
                ingestion: Some(ingestion),
                ..Default::default()
            },
        )
    }

    /// Replace the reconciliation aggregate, stamping `last_reconciled`.
    pub fn set_reconciliation(
        &mut self,
        id: &str,
        mut reconciliation: ReconciliationData,
    ) -> Result<Arc<Project>, StoreError> {
        reconciliation.last_reconciled = Utc::now();
        self.update(
            id,
            ProjectPatch {
                reconciliation: Some(reconciliation),
                ..Default::default()
            },
        )
    }

    /// Replace the cashflow aggregate, stamping `last_analyzed`.
    pub fn set_cashflow(
        &mut self,
        id: &str,
        mut cashflow: CashflowData,
    ) -> Result<Arc<Project>, StoreError> {
        cashflow.last_analyzed = Utc::now();
        self.update(
            id,
            ProjectPatch {
                cashflow: Some(cashflow),
                ..Default::default()
            },
        )
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    /// Register a per-project callback, invoked synchronously after every
    /// mutation of that id, in registration order.
    pub fn subscribe<F>(&mut self, project_id: &str, callback: F) -> SubscriptionToken
    where
        F: Fn(&Project) + Send + 'static,
    {
        self.next_token += 1;
        let token = self.next_token;
        self.subscribers
            .entry(project_id.to_string())
            .or_default()
            .push(Subscriber {
                token,
                callback: Box::new(callback),
            });

        SubscriptionToken {
            project_id: project_id.to_string(),
            token,
        }
    }

    /// Remove exactly one callback. Frees the id's subscriber slot when the
    /// set becomes empty.
    pub fn unsubscribe(&mut self, token: SubscriptionToken) {
        if let Some(subscribers) = self.subscribers.get_mut(&token.project_id) {
            subscribers.retain(|s| s.token != token.token);
            if subscribers.is_empty() {
                self.subscribers.remove(&token.project_id);
            }
        }
    }

    fn notify(&self, project: &Project) {
        if let Some(subscribers) = self.subscribers.get(&project.id) {
            for subscriber in subscribers {
                (subscriber.callback)(project);
            }
        }
    }

    // ========================================================================
    // EXPORT / IMPORT
    // ========================================================================

    /// Serialize a project to pretty-printed JSON.
    pub fn export(&self, id: &str) -> Result<String, StoreError> {
        let project = self
            .projects
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(serde_json::to_string_pretty(&**project)?)
    }

    /// Parse and insert a previously exported project.
    ///
    /// Structurally invalid input is rejected without mutating existing
    /// state. When the imported id collides with a stored project, the
    /// import gets a fresh id and `updated_at`; otherwise the round trip is
    /// lossless and `export(import(s)) == s`.
    pub fn import(&mut self, data: &str) -> Result<Arc<Project>, StoreError> {
        let mut project: Project = serde_json::from_str(data)?;

        if project.id.trim().is_empty() {
            return Err(StoreError::InvalidProject("empty project id".to_string()));
        }
        if project.name.trim().is_empty() {
            return Err(StoreError::InvalidProject("empty project name".to_string()));
        }

        if self.projects.contains_key(&project.id) {
            project.id = Uuid::new_v4().to_string();
            project.updated_at = Utc::now();
        }

        let project = Arc::new(project);
        self.projects.insert(project.id.clone(), Arc::clone(&project));
        self.notify(&project);
        Ok(project)
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProjectStatus;
    use std::sync::Mutex;

    #[test]
    fn test_create_assigns_id_and_defaults() {
        let mut store = RecordStore::new();
        let project = store.create(ProjectSeed::named("March Close"));

        assert_eq!(project.name, "March Close");
        assert!(!project.id.is_empty());
        assert!(store.get(&project.id).is_some());
    }

    #[test]
    fn test_create_honors_seed_id() {
        let mut store = RecordStore::new();
        let project = store.create(ProjectSeed {
            id: Some("proj-1".to_string()),
            name: Some("Fixed".to_string()),
            description: None,
        });

        assert_eq!(project.id, "proj-1");
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let mut store = RecordStore::new();
        let result = store.update("missing", ProjectPatch::default());
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_update_is_copy_on_write() {
        let mut store = RecordStore::new();
        let original = store.create(ProjectSeed::named("Before"));

        let updated = store
            .update(
                &original.id,
                ProjectPatch {
                    name: Some("After".to_string()),
                    status: Some(ProjectStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap();

        // The old handle still sees the old value.
        assert_eq!(original.name, "Before");
        assert_eq!(updated.name, "After");
        assert_eq!(updated.status, ProjectStatus::Completed);
        assert_eq!(store.get(&original.id).unwrap().name, "After");
    }

    #[test]
    fn test_subscribers_fire_in_registration_order() {
        let mut store = RecordStore::new();
        let project = store.create(ProjectSeed::named("Ordered"));

        let calls = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let calls = Arc::clone(&calls);
            store.subscribe(&project.id, move |_| {
                calls.lock().unwrap().push(label);
            });
        }

        store.update(&project.id, ProjectPatch::default()).unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_removes_exactly_one() {
        let mut store = RecordStore::new();
        let project = store.create(ProjectSeed::named("Unsub"));

        let count = Arc::new(Mutex::new(0usize));
        let keep = {
            let count = Arc::clone(&count);
            store.subscribe(&project.id, move |_| *count.lock().unwrap() += 1)
        };
        let drop_me = {
            let count = Arc::clone(&count);
            store.subscribe(&project.id, move |_| *count.lock().unwrap() += 1)
        };

        store.unsubscribe(drop_me);
        store.update(&project.id, ProjectPatch::default()).unwrap();

        assert_eq!(*count.lock().unwrap(), 1);
        store.unsubscribe(keep);
    }

    #[test]
    fn test_export_import_round_trip_is_lossless() {
        let mut store = RecordStore::new();
        let project = store.create(ProjectSeed::named("Round Trip"));
        let exported = store.export(&project.id).unwrap();

        // Import into a fresh store: no collision, byte-identical re-export.
        let mut other = RecordStore::new();
        let imported = other.import(&exported).unwrap();
        let re_exported = other.export(&imported.id).unwrap();

        assert_eq!(exported, re_exported);
    }

    #[test]
    fn test_import_rejects_garbage_without_mutation() {
        let mut store = RecordStore::new();
        store.create(ProjectSeed::named("Intact"));

        assert!(store.import("{not json").is_err());
        assert!(store.import("{\"id\": \"x\"}").is_err());
        assert_eq!(store.project_ids().len(), 1);
    }

    #[test]
    fn test_import_rejects_blank_identity() {
        let mut store = RecordStore::new();
        let mut project = Project::new("Blank Id");
        project.id = String::new();
        let data = serde_json::to_string(&project).unwrap();

        let result = store.import(&data);
        assert!(matches!(result, Err(StoreError::InvalidProject(_))));
    }

    #[test]
    fn test_import_collision_regenerates_id() {
        let mut store = RecordStore::new();
        let project = store.create(ProjectSeed::named("Original"));
        let exported = store.export(&project.id).unwrap();

        let imported = store.import(&exported).unwrap();

        assert_ne!(imported.id, project.id);
        assert_eq!(imported.name, project.name);
        assert_eq!(store.project_ids().len(), 2);
    }

    #[test]
    fn test_import_notifies_subscribers_of_that_id() {
        let mut store = RecordStore::new();
        let fired = Arc::new(Mutex::new(false));
        {
            let fired = Arc::clone(&fired);
            store.subscribe("proj-import", move |_| *fired.lock().unwrap() = true);
        }

        let mut project = Project::new("Imported");
        project.id = "proj-import".to_string();
        store
            .import(&serde_json::to_string(&project).unwrap())
            .unwrap();

        assert!(*fired.lock().unwrap());
    }
}
