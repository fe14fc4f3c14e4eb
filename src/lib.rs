// ReconFlow - Core Library
// Cross-stage reconciliation pipeline and state-synchronization engine.
// Exposes all modules for use in the CLI and tests.

pub mod analytics;
pub mod engine;
pub mod error;
pub mod guidance;
pub mod ingest;
pub mod model;
pub mod notify;
pub mod persist;
pub mod pipeline;
pub mod rules;
pub mod store;
pub mod sync;
pub mod workflow;

// Re-export commonly used types
pub use engine::{PageData, ReconEngine};
pub use error::{StorageError, StoreError, SyncError};
pub use guidance::{
    GuidanceContext, GuidanceMessage, GuidanceService, HttpGuidanceClient, NullGuidance,
};
pub use model::{
    CashflowData, DataQuality, DiscrepancyRecord, ExpenseCategory, IngestionData,
    IngestionRecord, MatchStatus, Project, ProjectPatch, ProjectStatus, ReconciliationData,
    ReconciliationMetrics, ReconciliationRecord, RiskLevel, Severity, SourceKind,
};
pub use notify::{Alert, NoticeKind, Notification, NotificationCenter};
pub use persist::{KvStore, SnapshotVault, SqliteStore};
pub use pipeline::TransformationPipeline;
pub use rules::CategoryRules;
pub use store::{ProjectSeed, RecordStore, SubscriptionToken};
pub use sync::{HttpSyncTarget, SyncDispatcher, SyncPriority, SyncQueue, SyncWorker};
pub use workflow::{WorkflowDefinition, WorkflowState, WorkflowStep, WorkflowTracker};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
