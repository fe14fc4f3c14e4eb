// 📦 Domain Model - Project aggregate and sub-aggregates
// One Project per id; the RecordStore owns all Projects exclusively.
//
// Everything here is a plain value. Mutation happens by building a new
// value and handing it back to the store (copy-on-write), never in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// PROJECT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Completed,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ingestion: IngestionData,
    pub reconciliation: ReconciliationData,
    pub cashflow: CashflowData,
}

impl Project {
    /// New project with all sub-aggregates zeroed.
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: String::new(),
            status: ProjectStatus::Active,
            created_at: now,
            updated_at: now,
            ingestion: IngestionData::empty(now),
            reconciliation: ReconciliationData::empty(now),
            cashflow: CashflowData::empty(now),
        }
    }
}

/// Partial update applied by `RecordStore::update`. `None` fields keep the
/// stored value.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub ingestion: Option<IngestionData>,
    pub reconciliation: Option<ReconciliationData>,
    pub cashflow: Option<CashflowData>,
}

// ============================================================================
// INGESTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Expenses,
    BankStatement,
    Other,
}

impl SourceKind {
    /// Human-readable system name used when building reconciliation sources.
    pub fn system_name(&self) -> &'static str {
        match self {
            SourceKind::Expenses => "Expense Journal",
            SourceKind::BankStatement => "Bank Statement",
            SourceKind::Other => "Other Source",
        }
    }
}

/// Data quality score vector, each dimension in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub completeness: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub validity: f64,
}

impl DataQuality {
    pub fn overall(&self) -> f64 {
        (self.completeness + self.accuracy + self.consistency + self.validity) / 4.0
    }
}

/// Raw uploaded data row, immutable once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub id: String,
    pub source_file: String,
    pub file_type: SourceKind,
    /// Typed payload as parsed from the upload (column name -> value).
    pub data: Value,
    pub quality: DataQuality,
    pub processed_at: DateTime<Utc>,
    pub validated: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionData {
    pub records: Vec<IngestionRecord>,
    pub quality: DataQuality,
    pub last_processed: DateTime<Utc>,
}

impl IngestionData {
    pub fn empty(now: DateTime<Utc>) -> Self {
        IngestionData {
            records: Vec::new(),
            quality: DataQuality::default(),
            last_processed: now,
        }
    }
}

// ============================================================================
// RECONCILIATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Matched,
    Unmatched,
    Discrepancy,
    Resolved,
    Escalated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// One contributing system's view of a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSource {
    pub id: String,
    pub system_id: String,
    pub system_name: String,
    pub record_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub quality: DataQuality,
    pub confidence: f64,
}

/// Append-only audit log entry. Never edited, never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub actor: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
}

impl AuditEntry {
    pub fn system(action: &str, timestamp: DateTime<Utc>, details: Value) -> Self {
        AuditEntry {
            id: Uuid::new_v4().to_string(),
            actor: "system".to_string(),
            action: action.to_string(),
            timestamp,
            details,
        }
    }
}

/// A unit of reconciliation work: one or more source records being matched.
///
/// Invariant: `confidence` and `risk_level` are derivable purely from
/// `sources` and the originating validation flags - no hidden external state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub id: String,
    pub batch_id: String,
    /// Always at least one entry.
    pub sources: Vec<ReconciliationSource>,
    pub status: MatchStatus,
    pub confidence: f64,
    pub match_score: f64,
    pub difference: Option<f64>,
    pub risk_level: RiskLevel,
    pub audit_trail: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationMetrics {
    pub total_records: usize,
    pub matched_records: usize,
    pub unmatched_records: usize,
    pub discrepancy_records: usize,
    pub pending_records: usize,
    pub resolved_records: usize,
    pub escalated_records: usize,
    /// 0 when there are no records.
    pub average_confidence: f64,
    /// Percentage of matched records, 0 when there are no records.
    pub match_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationData {
    pub records: Vec<ReconciliationRecord>,
    pub metrics: ReconciliationMetrics,
    pub audit_trail: Vec<AuditEntry>,
    pub last_reconciled: DateTime<Utc>,
}

impl ReconciliationData {
    pub fn empty(now: DateTime<Utc>) -> Self {
        ReconciliationData {
            records: Vec::new(),
            metrics: ReconciliationMetrics::default(),
            audit_trail: Vec::new(),
            last_reconciled: now,
        }
    }
}

// ============================================================================
// CASHFLOW
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryStatus {
    Balanced,
    Discrepancy,
}

/// Per-category rollup, recomputed wholesale on every transformation run.
///
/// Invariant: `total_cashflow == total_reported - discrepancy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseCategory {
    pub id: String,
    pub name: String,
    pub total_reported: f64,
    pub total_cashflow: f64,
    pub discrepancy: f64,
    /// Percent value: 150% is stored as 150.0. 0 when total_reported is 0.
    pub discrepancy_percentage: f64,
    pub transaction_count: usize,
    pub status: CategoryStatus,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscrepancyKind {
    Amount,
    Date,
    Description,
    Category,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyStatus {
    Open,
    Investigating,
    Resolved,
    FalsePositive,
}

/// One detected mismatch, emitted per discrepant reconciliation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyRecord {
    pub id: String,
    pub kind: DiscrepancyKind,
    pub severity: Severity,
    pub description: String,
    pub source_record: String,
    pub target_record: String,
    pub difference: f64,
    pub confidence: f64,
    pub status: DiscrepancyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CashflowMetrics {
    pub total_reported: f64,
    pub total_cashflow: f64,
    pub total_discrepancy: f64,
    /// Percent value, 0 when total_reported is 0.
    pub discrepancy_percentage: f64,
    pub balanced_categories: usize,
    pub discrepancy_categories: usize,
    /// 0 when there are no categories.
    pub average_discrepancy: f64,
    /// Max absolute category discrepancy, 0 when there are no categories.
    pub largest_discrepancy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashflowData {
    pub categories: Vec<ExpenseCategory>,
    pub metrics: CashflowMetrics,
    pub discrepancies: Vec<DiscrepancyRecord>,
    pub last_analyzed: DateTime<Utc>,
}

impl CashflowData {
    pub fn empty(now: DateTime<Utc>) -> Self {
        CashflowData {
            categories: Vec::new(),
            metrics: CashflowMetrics::default(),
            discrepancies: Vec::new(),
            last_analyzed: now,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_is_zeroed() {
        let project = Project::new("Q1 Close");

        assert_eq!(project.name, "Q1 Close");
        assert_eq!(project.status, ProjectStatus::Active);
        assert!(project.ingestion.records.is_empty());
        assert!(project.reconciliation.records.is_empty());
        assert!(project.cashflow.categories.is_empty());
        assert_eq!(project.cashflow.metrics, CashflowMetrics::default());
        assert!(!project.id.is_empty());
    }

    #[test]
    fn test_status_serialization_is_lowercase() {
        let json = serde_json::to_string(&ProjectStatus::Archived).unwrap();
        assert_eq!(json, "\"archived\"");

        let status: MatchStatus = serde_json::from_str("\"discrepancy\"").unwrap();
        assert_eq!(status, MatchStatus::Discrepancy);

        let status: DiscrepancyStatus = serde_json::from_str("\"false_positive\"").unwrap();
        assert_eq!(status, DiscrepancyStatus::FalsePositive);
    }

    #[test]
    fn test_quality_overall() {
        let quality = DataQuality {
            completeness: 1.0,
            accuracy: 0.5,
            consistency: 0.5,
            validity: 1.0,
        };
        assert!((quality.overall() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High > RiskLevel::Low);
        assert!(Severity::High > Severity::Medium);
    }
}
