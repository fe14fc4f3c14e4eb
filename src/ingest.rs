// 📥 CSV Ingestion - uploads become validated ingestion records
// Each row is kept as a loose column map so uploads with different
// headers (expense journals vs bank statements) flow through the same
// path. Validation scores every record instead of rejecting the file.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::path::Path;
use uuid::Uuid;

use crate::model::{DataQuality, IngestionData, IngestionRecord, SourceKind};
use crate::pipeline::{extract_amount, extract_description};

// ============================================================================
// CSV LOADING
// ============================================================================

/// Load a CSV upload into ingestion records. Rows are never dropped:
/// invalid ones are kept with `validated = false` and their error list
/// filled, so reconciliation can report them instead of hiding them.
pub fn load_csv(csv_path: &Path, file_type: SourceKind) -> Result<Vec<IngestionRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let headers = rdr
        .headers()
        .context("Failed to read CSV headers")?
        .clone();

    let source_file = csv_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| csv_path.display().to_string());

    let mut records = Vec::new();

    for result in rdr.records() {
        let row = result.context("Failed to read CSV row")?;

        let mut data = Map::new();
        for (header, field) in headers.iter().zip(row.iter()) {
            data.insert(header.to_string(), coerce_field(field));
        }

        records.push(ingest_row(
            Value::Object(data),
            &source_file,
            file_type,
            Utc::now(),
        ));
    }

    Ok(records)
}

/// Numeric-looking fields become JSON numbers so downstream amount
/// extraction does not have to re-parse strings.
fn coerce_field(field: &str) -> Value {
    let trimmed = field.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if float.is_finite() {
            return Value::from(float);
        }
    }
    Value::String(field.to_string())
}

// ============================================================================
// RECORD VALIDATION
// ============================================================================

/// Turn one parsed row into a scored ingestion record.
pub fn ingest_row(
    data: Value,
    source_file: &str,
    file_type: SourceKind,
    now: DateTime<Utc>,
) -> IngestionRecord {
    let (quality, errors) = score_row(&data);

    IngestionRecord {
        id: Uuid::new_v4().to_string(),
        source_file: source_file.to_string(),
        file_type,
        data,
        quality,
        processed_at: now,
        validated: errors.is_empty(),
        errors,
    }
}

fn score_row(data: &Value) -> (DataQuality, Vec<String>) {
    let mut errors = Vec::new();

    let columns = match data.as_object() {
        Some(map) => map,
        None => {
            errors.push("row is not a column map".to_string());
            return (DataQuality::default(), errors);
        }
    };

    if columns.is_empty() {
        errors.push("row has no columns".to_string());
    }

    let filled = columns
        .values()
        .filter(|value| !is_blank(value))
        .count();
    let completeness = if columns.is_empty() {
        0.0
    } else {
        filled as f64 / columns.len() as f64
    };

    let amount = extract_amount(data);
    if amount == 0.0 {
        errors.push("missing or zero amount".to_string());
    }
    let accuracy = if amount != 0.0 { 1.0 } else { 0.0 };

    if extract_description(data) == "Unknown" {
        errors.push("missing description".to_string());
    }

    // Consistency: every value is a scalar the rest of the pipeline
    // understands (no nested objects or arrays from a malformed parse).
    let scalar = columns
        .values()
        .filter(|value| value.is_string() || value.is_number() || value.is_null())
        .count();
    let consistency = if columns.is_empty() {
        0.0
    } else {
        scalar as f64 / columns.len() as f64
    };

    let validity = if errors.is_empty() { 1.0 } else { 0.5 };

    (
        DataQuality {
            completeness,
            accuracy,
            consistency,
            validity,
        },
        errors,
    )
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

// ============================================================================
// AGGREGATE ASSEMBLY
// ============================================================================

/// Fold scored records into the ingestion aggregate, averaging the
/// per-record quality vectors.
pub fn assemble(records: Vec<IngestionRecord>, now: DateTime<Utc>) -> IngestionData {
    let quality = if records.is_empty() {
        DataQuality::default()
    } else {
        let count = records.len() as f64;
        let sum = records.iter().fold(DataQuality::default(), |acc, record| {
            DataQuality {
                completeness: acc.completeness + record.quality.completeness,
                accuracy: acc.accuracy + record.quality.accuracy,
                consistency: acc.consistency + record.quality.consistency,
                validity: acc.validity + record.quality.validity,
            }
        });
        DataQuality {
            completeness: sum.completeness / count,
            accuracy: sum.accuracy / count,
            consistency: sum.consistency / count,
            validity: sum.validity / count,
        }
    };

    IngestionData {
        records,
        quality,
        last_processed: now,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn row(value: Value) -> IngestionRecord {
        ingest_row(value, "test.csv", SourceKind::Expenses, Utc::now())
    }

    #[test]
    fn test_complete_row_validates() {
        let record = row(json!({"description": "Fuel", "amount": 125_000}));

        assert!(record.validated);
        assert!(record.errors.is_empty());
        assert_eq!(record.quality.completeness, 1.0);
        assert_eq!(record.quality.overall(), 1.0);
    }

    #[test]
    fn test_missing_amount_is_kept_but_flagged() {
        let record = row(json!({"description": "Fuel"}));

        assert!(!record.validated);
        assert!(record.errors.iter().any(|e| e.contains("amount")));
        assert_eq!(record.quality.accuracy, 0.0);
    }

    #[test]
    fn test_bank_statement_columns_validate() {
        let record = ingest_row(
            json!({"Uraian": "Setoran tunai", "Kredit": 500_000}),
            "mutasi.csv",
            SourceKind::BankStatement,
            Utc::now(),
        );

        assert!(record.validated);
        assert_eq!(record.file_type, SourceKind::BankStatement);
    }

    #[test]
    fn test_blank_columns_lower_completeness() {
        let record = row(json!({"description": "Fuel", "amount": 100, "notes": "", "ref": null}));

        assert!(record.validated);
        assert_eq!(record.quality.completeness, 0.5);
    }

    #[test]
    fn test_load_csv_coerces_numeric_columns() {
        let mut file = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "description,amount").unwrap();
        writeln!(file, "Sewa alat,250000").unwrap();
        writeln!(file, "Tanpa nominal,").unwrap();
        file.flush().unwrap();

        let records = load_csv(file.path(), SourceKind::Expenses).unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].validated);
        assert_eq!(records[0].data["amount"], json!(250000));
        assert!(!records[1].validated);
    }

    #[test]
    fn test_assemble_averages_quality() {
        let records = vec![
            row(json!({"description": "A", "amount": 10})),
            row(json!({"description": "B"})),
        ];
        let data = assemble(records, Utc::now());

        assert_eq!(data.records.len(), 2);
        assert!((data.quality.accuracy - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_assemble_empty_is_zeroed() {
        let data = assemble(Vec::new(), Utc::now());
        assert_eq!(data.quality, DataQuality::default());
    }
}
