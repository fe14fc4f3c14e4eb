// 📊 Analytics Client - typed access to the backend analytics API
// GET /analytics/dashboard, GET /analytics/reconciliation-stats,
// GET /projects/{id}/stats. The backend omits numeric fields freely and
// sometimes sends them as strings; every consumer treats absent or
// non-numeric values as 0, never as an error.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================================
// LENIENT NUMERICS
// ============================================================================

/// Absent, null, or non-numeric values deserialize to 0. Numeric strings
/// are accepted ("42.5" -> 42.5) because the backend serializes decimals
/// both ways.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

// ============================================================================
// RESPONSES
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_projects: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub active_projects: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_records: u64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub match_rate: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_discrepancy: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationStats {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_records: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub matched_records: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub unmatched_records: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub discrepancy_records: u64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub average_confidence: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub match_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectStats {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub record_count: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub matched_count: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub discrepancy_count: u64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_amount: f64,
    #[serde(default)]
    pub last_activity: Option<String>,
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct AnalyticsClient {
    http: reqwest::Client,
    base_url: String,
}

impl AnalyticsClient {
    pub fn new(base_url: &str) -> Self {
        AnalyticsClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn dashboard(&self) -> Result<DashboardStats, reqwest::Error> {
        self.http
            .get(format!("{}/analytics/dashboard", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    pub async fn reconciliation_stats(&self) -> Result<ReconciliationStats, reqwest::Error> {
        self.http
            .get(format!("{}/analytics/reconciliation-stats", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    pub async fn project_stats(&self, project_id: &str) -> Result<ProjectStats, reqwest::Error> {
        self.http
            .get(format!("{}/projects/{}/stats", self.base_url, project_id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

// ============================================================================
// TESTS
// ============================================================================
