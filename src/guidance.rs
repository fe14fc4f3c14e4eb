// 🤝 Guidance Service Client - narrow contract with the message generator
// The assistant is an external collaborator consumed through two calls:
// generate a contextual message, and mirror workflow state. Its failures
// are caught and logged at the call site, never propagated - guidance is
// advisory, losing it must not break anything.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Greeting,
    Tip,
    Warning,
    Help,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    Medium,
    High,
}

/// Context handed to the generator: where the user is and how far along.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidanceContext {
    pub user_id: String,
    pub page: String,
    pub workflow_id: String,
    pub current_step: String,
    pub completed_steps: Vec<String>,
    pub total_steps: usize,
    pub progress: u8,
    /// Milestone that triggered this request, when milestone-driven.
    pub milestone: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidanceMessage {
    pub id: String,
    pub kind: MessageKind,
    pub content: String,
    pub priority: MessagePriority,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// SERVICE SEAM
// ============================================================================

#[async_trait]
pub trait GuidanceService: Send + Sync {
    async fn generate_message(
        &self,
        context: &GuidanceContext,
    ) -> Result<GuidanceMessage, reqwest::Error>;

    async fn update_workflow_state(
        &self,
        workflow_id: &str,
        current_step: &str,
        progress: u8,
        completed_steps: &[String],
    ) -> Result<(), reqwest::Error>;
}

/// HTTP implementation against the guidance backend.
pub struct HttpGuidanceClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGuidanceClient {
    pub fn new(base_url: &str) -> Self {
        HttpGuidanceClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GuidanceService for HttpGuidanceClient {
    async fn generate_message(
        &self,
        context: &GuidanceContext,
    ) -> Result<GuidanceMessage, reqwest::Error> {
        self.http
            .post(format!("{}/guidance/messages", self.base_url))
            .json(context)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn update_workflow_state(
        &self,
        workflow_id: &str,
        current_step: &str,
        progress: u8,
        completed_steps: &[String],
    ) -> Result<(), reqwest::Error> {
        self.http
            .post(format!("{}/guidance/workflow-state", self.base_url))
            .json(&json!({
                "workflow_id": workflow_id,
                "current_step": current_step,
                "progress": progress,
                "completed_steps": completed_steps,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// No-op implementation for tests and guidance-disabled deployments.
pub struct NullGuidance;

#[async_trait]
impl GuidanceService for NullGuidance {
    async fn generate_message(
        &self,
        context: &GuidanceContext,
    ) -> Result<GuidanceMessage, reqwest::Error> {
        Ok(GuidanceMessage {
            id: Uuid::new_v4().to_string(),
            kind: MessageKind::Status,
            content: format!("Workflow {} at {}%", context.workflow_id, context.progress),
            priority: MessagePriority::Low,
            timestamp: Utc::now(),
        })
    }

    async fn update_workflow_state(
        &self,
        _workflow_id: &str,
        _current_step: &str,
        _progress: u8,
        _completed_steps: &[String],
    ) -> Result<(), reqwest::Error> {
        Ok(())
    }
}

// ============================================================================
// CALL-SITE POLICY
// ============================================================================

/// Fire a guidance request and log any failure. Returns the message only
/// when generation succeeded; callers never see the error.
pub async fn try_generate(
    service: &dyn GuidanceService,
    context: &GuidanceContext,
) -> Option<GuidanceMessage> {
    match service.generate_message(context).await {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(%err, workflow_id = %context.workflow_id, "guidance generation failed");
            None
        }
    }
}

/// Mirror workflow state to the guidance service, swallowing failures.
pub async fn try_update_workflow(
    service: &dyn GuidanceService,
    workflow_id: &str,
    current_step: &str,
    progress: u8,
    completed_steps: &[String],
) {
    if let Err(err) = service
        .update_workflow_state(workflow_id, current_step, progress, completed_steps)
        .await
    {
        warn!(%err, workflow_id, "guidance workflow sync failed");
    }
}

// ============================================================================
// TESTS
// ============================================================================
