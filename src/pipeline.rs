// ⚖️ Transformation Pipeline - Two pure, deterministic stages
// Stage 1: ingestion records -> reconciliation records
// Stage 2: reconciliation records -> cashflow categories + discrepancies
//
// Both stages are pure functions of the project value: re-running them on
// the same input yields identical output except for freshly generated
// ids/timestamps. Every division guards the zero-denominator case by
// yielding 0, never NaN/Inf - derivation failures are defended against,
// not reported.

use crate::model::{
    AuditEntry, CashflowData, CashflowMetrics, CategoryStatus, DiscrepancyKind, DiscrepancyRecord,
    DiscrepancyStatus, ExpenseCategory, MatchStatus, Project, ReconciliationMetrics,
    ReconciliationRecord, ReconciliationSource, RiskLevel, Severity,
};
use crate::rules::CategoryRules;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

/// Confidence assigned to records whose ingestion row passed validation.
pub const CONFIDENCE_VALIDATED: f64 = 95.0;

/// Confidence assigned to records whose ingestion row failed validation.
pub const CONFIDENCE_UNVALIDATED: f64 = 75.0;

/// Absolute difference above which a discrepancy is high severity.
pub const HIGH_SEVERITY_THRESHOLD: f64 = 1_000_000.0;

// ============================================================================
// PIPELINE
// ============================================================================

pub struct TransformationPipeline {
    rules: CategoryRules,
    high_severity_threshold: f64,
}

impl TransformationPipeline {
    pub fn new() -> Self {
        TransformationPipeline {
            rules: CategoryRules::default(),
            high_severity_threshold: HIGH_SEVERITY_THRESHOLD,
        }
    }

    pub fn with_rules(rules: CategoryRules) -> Self {
        TransformationPipeline {
            rules,
            high_severity_threshold: HIGH_SEVERITY_THRESHOLD,
        }
    }

    // ========================================================================
    // STAGE 1: INGESTION -> RECONCILIATION
    // ========================================================================

    /// Build one reconciliation record per ingestion record, in input order.
    ///
    /// Confidence is 95 for validated rows and 75 otherwise; risk is high
    /// when the row carried ingestion errors. Every record starts pending
    /// with a single source and a creation audit entry.
    pub fn ingestion_to_reconciliation(&self, project: &Project) -> Vec<ReconciliationRecord> {
        project
            .ingestion
            .records
            .iter()
            .map(|record| {
                let confidence = if record.validated {
                    CONFIDENCE_VALIDATED
                } else {
                    CONFIDENCE_UNVALIDATED
                };
                let risk_level = if record.errors.is_empty() {
                    RiskLevel::Low
                } else {
                    RiskLevel::High
                };

                ReconciliationRecord {
                    id: Uuid::new_v4().to_string(),
                    batch_id: format!("BATCH-{}", project.id),
                    sources: vec![ReconciliationSource {
                        id: Uuid::new_v4().to_string(),
                        system_id: record.source_file.clone(),
                        system_name: record.file_type.system_name().to_string(),
                        record_id: record.id.clone(),
                        data: record.data.clone(),
                        timestamp: record.processed_at,
                        quality: record.quality,
                        confidence,
                    }],
                    status: MatchStatus::Pending,
                    confidence,
                    match_score: confidence,
                    difference: None,
                    risk_level,
                    audit_trail: vec![AuditEntry::system(
                        "Record Created",
                        record.processed_at,
                        json!({ "source": record.source_file }),
                    )],
                }
            })
            .collect()
    }

    /// Summarize a reconciliation batch. All ratios are 0 for empty input.
    pub fn reconciliation_metrics(records: &[ReconciliationRecord]) -> ReconciliationMetrics {
        let total = records.len();
        let count = |status: MatchStatus| records.iter().filter(|r| r.status == status).count();

        let matched = count(MatchStatus::Matched);
        let average_confidence = if total > 0 {
            records.iter().map(|r| r.confidence).sum::<f64>() / total as f64
        } else {
            0.0
        };
        let match_rate = if total > 0 {
            (matched as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        ReconciliationMetrics {
            total_records: total,
            matched_records: matched,
            unmatched_records: count(MatchStatus::Unmatched),
            discrepancy_records: count(MatchStatus::Discrepancy),
            pending_records: count(MatchStatus::Pending),
            resolved_records: count(MatchStatus::Resolved),
            escalated_records: count(MatchStatus::Escalated),
            average_confidence,
            match_rate,
        }
    }

    // ========================================================================
    // STAGE 2: RECONCILIATION -> CASHFLOW
    // ========================================================================

    /// Group reconciliation records into expense categories and surface one
    /// discrepancy record per discrepant reconciliation record.
    ///
    /// Categories are recomputed wholesale, never patched incrementally.
    /// Invariant on output: `total_cashflow == total_reported - discrepancy`
    /// for every category.
    pub fn reconciliation_to_cashflow(&self, project: &Project) -> CashflowData {
        let now = Utc::now();
        // Keyed by name; insertion order preserved for stable output.
        let mut categories: Vec<ExpenseCategory> = Vec::new();
        let mut discrepancies: Vec<DiscrepancyRecord> = Vec::new();

        for record in &project.reconciliation.records {
            let source_data = record.sources.first().map(|s| &s.data);
            let amount = source_data.map(extract_amount).unwrap_or(0.0);
            let description = source_data
                .map(extract_description)
                .unwrap_or_else(|| "Unknown".to_string());
            let name = self.rules.infer(&description).to_string();

            let category = match categories.iter_mut().find(|c| c.name == name) {
                Some(existing) => existing,
                None => {
                    categories.push(ExpenseCategory {
                        id: name.to_lowercase().replace(char::is_whitespace, "-"),
                        name: name.clone(),
                        total_reported: 0.0,
                        total_cashflow: 0.0,
                        discrepancy: 0.0,
                        discrepancy_percentage: 0.0,
                        transaction_count: 0,
                        status: CategoryStatus::Balanced,
                        last_updated: now,
                    });
                    categories.last_mut().unwrap()
                }
            };

            category.total_reported += amount;
            category.transaction_count += 1;

            if record.status == MatchStatus::Discrepancy {
                if let Some(difference) = record.difference {
                    category.discrepancy += difference;
                    category.status = CategoryStatus::Discrepancy;

                    let severity = if difference.abs() > self.high_severity_threshold {
                        Severity::High
                    } else {
                        Severity::Medium
                    };

                    discrepancies.push(DiscrepancyRecord {
                        id: Uuid::new_v4().to_string(),
                        kind: DiscrepancyKind::Amount,
                        severity,
                        description: format!("Amount discrepancy in {}", description),
                        source_record: record.id.clone(),
                        target_record: record
                            .sources
                            .first()
                            .map(|s| s.record_id.clone())
                            .unwrap_or_default(),
                        difference,
                        confidence: record.confidence,
                        status: DiscrepancyStatus::Open,
                        created_at: now,
                        updated_at: now,
                    });
                }
            }
        }

        for category in &mut categories {
            category.total_cashflow = category.total_reported - category.discrepancy;
            category.discrepancy_percentage = if category.total_reported > 0.0 {
                (category.discrepancy / category.total_reported) * 100.0
            } else {
                0.0
            };
        }

        let metrics = Self::cashflow_metrics(&categories);

        CashflowData {
            categories,
            metrics,
            discrepancies,
            last_analyzed: now,
        }
    }

    fn cashflow_metrics(categories: &[ExpenseCategory]) -> CashflowMetrics {
        let total_reported: f64 = categories.iter().map(|c| c.total_reported).sum();
        let total_cashflow: f64 = categories.iter().map(|c| c.total_cashflow).sum();
        let total_discrepancy: f64 = categories.iter().map(|c| c.discrepancy).sum();

        let discrepancy_percentage = if total_reported > 0.0 {
            (total_discrepancy / total_reported) * 100.0
        } else {
            0.0
        };
        let average_discrepancy = if !categories.is_empty() {
            total_discrepancy / categories.len() as f64
        } else {
            0.0
        };
        let largest_discrepancy = categories
            .iter()
            .map(|c| c.discrepancy.abs())
            .fold(0.0, f64::max);

        CashflowMetrics {
            total_reported,
            total_cashflow,
            total_discrepancy,
            discrepancy_percentage,
            balanced_categories: categories
                .iter()
                .filter(|c| c.status == CategoryStatus::Balanced)
                .count(),
            discrepancy_categories: categories
                .iter()
                .filter(|c| c.status == CategoryStatus::Discrepancy)
                .count(),
            average_discrepancy,
            largest_discrepancy,
        }
    }
}

impl Default for TransformationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// PAYLOAD EXTRACTION
// ============================================================================

/// Pull an amount out of a source payload. Falls back across the column
/// names seen in the wild: `amount`, then the Indonesian bank-export
/// columns `Kredit` and `Debit`. Missing or non-numeric values resolve to 0.
pub fn extract_amount(data: &Value) -> f64 {
    ["amount", "Kredit", "Debit"]
        .iter()
        .find_map(|key| data.get(key).and_then(Value::as_f64))
        .unwrap_or(0.0)
}

/// Pull a description out of a source payload (`description`, then the
/// Indonesian `Uraian` column). Missing values resolve to "Unknown".
pub fn extract_description(data: &Value) -> String {
    ["description", "Uraian"]
        .iter()
        .find_map(|key| data.get(key).and_then(Value::as_str))
        .unwrap_or("Unknown")
        .to_string()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataQuality, IngestionRecord, SourceKind};

    fn ingestion_record(validated: bool, errors: Vec<String>, data: Value) -> IngestionRecord {
        IngestionRecord {
            id: Uuid::new_v4().to_string(),
            source_file: "journal.csv".to_string(),
            file_type: SourceKind::Expenses,
            data,
            quality: DataQuality {
                completeness: 1.0,
                accuracy: 1.0,
                consistency: 1.0,
                validity: 1.0,
            },
            processed_at: Utc::now(),
            validated,
            errors,
        }
    }

    fn project_with_records(records: Vec<IngestionRecord>) -> Project {
        let mut project = Project::new("Pipeline Test");
        project.ingestion.records = records;
        project
    }

    #[test]
    fn test_confidence_split_across_validation_flags() {
        // 10 ingestion records, 3 marked invalid
        let mut records = Vec::new();
        for i in 0..10 {
            records.push(ingestion_record(
                i >= 3,
                vec![],
                json!({ "amount": 100.0, "description": "kas kecil" }),
            ));
        }
        let project = project_with_records(records);

        let pipeline = TransformationPipeline::new();
        let output = pipeline.ingestion_to_reconciliation(&project);

        assert_eq!(output.len(), 10);
        for (i, record) in output.iter().enumerate() {
            let expected = if i < 3 {
                CONFIDENCE_UNVALIDATED
            } else {
                CONFIDENCE_VALIDATED
            };
            assert_eq!(record.confidence, expected, "record {}", i);
            assert_eq!(record.status, MatchStatus::Pending);
            assert_eq!(record.sources.len(), 1);
        }
    }

    #[test]
    fn test_risk_level_follows_ingestion_errors() {
        let project = project_with_records(vec![
            ingestion_record(true, vec![], json!({})),
            ingestion_record(true, vec!["bad date".to_string()], json!({})),
        ]);

        let output = TransformationPipeline::new().ingestion_to_reconciliation(&project);

        assert_eq!(output[0].risk_level, RiskLevel::Low);
        assert_eq!(output[1].risk_level, RiskLevel::High);
    }

    #[test]
    fn test_stage_one_preserves_input_order() {
        let records: Vec<_> = (0..5)
            .map(|i| ingestion_record(true, vec![], json!({ "description": format!("row {}", i) })))
            .collect();
        let input_ids: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
        let project = project_with_records(records);

        let output = TransformationPipeline::new().ingestion_to_reconciliation(&project);
        let source_ids: Vec<_> = output
            .iter()
            .map(|r| r.sources[0].record_id.clone())
            .collect();

        assert_eq!(source_ids, input_ids);
    }

    #[test]
    fn test_stage_one_is_idempotent_modulo_ids() {
        let project = project_with_records(vec![
            ingestion_record(true, vec![], json!({ "amount": 50.0 })),
            ingestion_record(false, vec!["x".to_string()], json!({ "amount": 60.0 })),
        ]);

        let pipeline = TransformationPipeline::new();
        let a = pipeline.ingestion_to_reconciliation(&project);
        let b = pipeline.ingestion_to_reconciliation(&project);

        // Equal up to freshly generated ids; compare the derived fields.
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.confidence, y.confidence);
            assert_eq!(x.risk_level, y.risk_level);
            assert_eq!(x.status, y.status);
            assert_eq!(x.sources[0].record_id, y.sources[0].record_id);
            assert_eq!(x.sources[0].data, y.sources[0].data);
        }
    }

    fn discrepant_record(amount: f64, description: &str, difference: f64) -> ReconciliationRecord {
        let mut record = pending_record(amount, description);
        record.status = MatchStatus::Discrepancy;
        record.difference = Some(difference);
        record
    }

    fn pending_record(amount: f64, description: &str) -> ReconciliationRecord {
        ReconciliationRecord {
            id: Uuid::new_v4().to_string(),
            batch_id: "BATCH-test".to_string(),
            sources: vec![ReconciliationSource {
                id: Uuid::new_v4().to_string(),
                system_id: "journal.csv".to_string(),
                system_name: "Expense Journal".to_string(),
                record_id: Uuid::new_v4().to_string(),
                data: json!({ "amount": amount, "description": description }),
                timestamp: Utc::now(),
                quality: DataQuality::default(),
                confidence: CONFIDENCE_VALIDATED,
            }],
            status: MatchStatus::Pending,
            confidence: CONFIDENCE_VALIDATED,
            match_score: CONFIDENCE_VALIDATED,
            difference: None,
            risk_level: RiskLevel::Low,
            audit_trail: vec![],
        }
    }

    #[test]
    fn test_large_discrepancy_scenario() {
        // totalReported = 1,000,000 with one discrepant record of 1,500,000
        let mut project = Project::new("Cashflow Test");
        project.reconciliation.records =
            vec![discrepant_record(1_000_000.0, "biaya operasional", 1_500_000.0)];

        let cashflow = TransformationPipeline::new().reconciliation_to_cashflow(&project);

        assert_eq!(cashflow.discrepancies.len(), 1);
        assert_eq!(cashflow.discrepancies[0].severity, Severity::High);

        let category = &cashflow.categories[0];
        assert_eq!(category.name, "Operational");
        assert!((category.discrepancy_percentage - 150.0).abs() < 1e-9);
        assert!((category.total_cashflow - (-500_000.0)).abs() < 1e-9);
    }

    #[test]
    fn test_moderate_discrepancy_is_medium_severity() {
        let mut project = Project::new("Cashflow Test");
        project.reconciliation.records = vec![discrepant_record(500.0, "pulsa", 250.0)];

        let cashflow = TransformationPipeline::new().reconciliation_to_cashflow(&project);

        assert_eq!(cashflow.discrepancies[0].severity, Severity::Medium);
        assert_eq!(cashflow.categories[0].status, CategoryStatus::Discrepancy);
    }

    #[test]
    fn test_cashflow_invariant_holds_per_category() {
        let mut project = Project::new("Invariant Test");
        project.reconciliation.records = vec![
            pending_record(1000.0, "kas harian"),
            discrepant_record(2000.0, "kas harian", 300.0),
            pending_record(750.0, "tender baru"),
            discrepant_record(90.0, "langganan utility", -40.0),
        ];

        let cashflow = TransformationPipeline::new().reconciliation_to_cashflow(&project);

        for category in &cashflow.categories {
            let expected = category.total_reported - category.discrepancy;
            assert!(
                (category.total_cashflow - expected).abs() < 1e-9,
                "category {} breaks the cashflow invariant",
                category.name
            );
        }
    }

    #[test]
    fn test_zero_reported_yields_zero_percentage() {
        let mut project = Project::new("Zero Test");
        project.reconciliation.records = vec![discrepant_record(0.0, "kas", 10.0)];

        let cashflow = TransformationPipeline::new().reconciliation_to_cashflow(&project);

        let category = &cashflow.categories[0];
        assert_eq!(category.discrepancy_percentage, 0.0);
        assert!(category.discrepancy_percentage.is_finite());
        assert_eq!(cashflow.metrics.discrepancy_percentage, 0.0);
    }

    #[test]
    fn test_empty_project_yields_zeroed_metrics() {
        let project = Project::new("Empty");
        let cashflow = TransformationPipeline::new().reconciliation_to_cashflow(&project);

        assert!(cashflow.categories.is_empty());
        assert_eq!(cashflow.metrics, CashflowMetrics::default());

        let metrics = TransformationPipeline::reconciliation_metrics(&[]);
        assert_eq!(metrics.average_confidence, 0.0);
        assert_eq!(metrics.match_rate, 0.0);
    }

    #[test]
    fn test_uncategorized_records_land_in_other() {
        let mut project = Project::new("Other Test");
        project.reconciliation.records = vec![pending_record(100.0, "mystery line item")];

        let cashflow = TransformationPipeline::new().reconciliation_to_cashflow(&project);

        assert_eq!(cashflow.categories[0].name, "Other");
        assert_eq!(cashflow.categories[0].transaction_count, 1);
    }

    #[test]
    fn test_indonesian_payload_columns_are_read() {
        let mut project = Project::new("Kredit Test");
        project.reconciliation.records = vec![{
            let mut record = pending_record(0.0, "x");
            record.sources[0].data = json!({ "Kredit": 1234.5, "Uraian": "setoran kas" });
            record
        }];

        let cashflow = TransformationPipeline::new().reconciliation_to_cashflow(&project);

        let category = &cashflow.categories[0];
        assert_eq!(category.name, "Operational");
        assert!((category.total_reported - 1234.5).abs() < 1e-9);
    }

    #[test]
    fn test_reconciliation_metrics_counts() {
        let mut matched = pending_record(10.0, "kas");
        matched.status = MatchStatus::Matched;
        let records = vec![
            matched,
            pending_record(10.0, "kas"),
            discrepant_record(10.0, "kas", 5.0),
        ];

        let metrics = TransformationPipeline::reconciliation_metrics(&records);

        assert_eq!(metrics.total_records, 3);
        assert_eq!(metrics.matched_records, 1);
        assert_eq!(metrics.pending_records, 1);
        assert_eq!(metrics.discrepancy_records, 1);
        assert!((metrics.match_rate - 100.0 / 3.0).abs() < 1e-9);
        assert!((metrics.average_confidence - CONFIDENCE_VALIDATED).abs() < 1e-9);
    }
}
