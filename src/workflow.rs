// 🧭 Workflow Tracker - progress and milestones from completed-step sets
// Progress is always recomputed from the completed-step set, never patched.
// Milestone crossings are edge-triggered: a gate fires when progress moves
// from below a threshold to at-or-above it, and stays quiet while progress
// sits pinned on the threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Fixed progress thresholds that trigger guidance.
pub const MILESTONES: [u8; 4] = [25, 50, 75, 100];

// ============================================================================
// DEFINITIONS & STATE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    /// UI surface this step belongs to.
    pub page_id: String,
    pub order: usize,
    pub required: bool,
    /// Step ids that must be completed before this one can run.
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub steps: Vec<WorkflowStep>,
}

/// One per active workflow. Recomputed wholesale, never partially patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: String,
    pub current_step: String,
    /// Ordered, duplicate-free.
    pub completed_steps: Vec<String>,
    pub total_steps: usize,
    pub progress: u8,
    pub started_at: DateTime<Utc>,
}

/// Progress as a rounded percentage, 0 when the workflow has no steps.
/// Monotonic non-decreasing as steps are added; never exceeds 100.
pub fn progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (completed as f64 / total as f64) * 100.0;
    pct.round().min(100.0) as u8
}

/// Milestones crossed going from `previous` to `current`. Edge-triggered:
/// a milestone appears at most once per upward crossing.
pub fn crossed_milestones(previous: u8, current: u8) -> Vec<u8> {
    MILESTONES
        .iter()
        .copied()
        .filter(|m| previous < *m && current >= *m)
        .collect()
}

// ============================================================================
// TRACKER
// ============================================================================

/// Result of a successful advance.
#[derive(Debug, Clone)]
pub struct AdvanceOutcome {
    pub state: WorkflowState,
    /// Milestones crossed by this advance, in ascending order.
    pub milestones: Vec<u8>,
}

pub struct WorkflowTracker {
    definitions: HashMap<String, WorkflowDefinition>,
    states: HashMap<String, WorkflowState>,
}

impl WorkflowTracker {
    pub fn new() -> Self {
        WorkflowTracker {
            definitions: HashMap::new(),
            states: HashMap::new(),
        }
    }

    pub fn register(&mut self, definition: WorkflowDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    pub fn definition(&self, workflow_id: &str) -> Option<&WorkflowDefinition> {
        self.definitions.get(workflow_id)
    }

    /// Initialize state for a registered workflow at its first step.
    pub fn init(&mut self, workflow_id: &str) -> Option<WorkflowState> {
        let definition = self.definitions.get(workflow_id)?;
        let state = WorkflowState {
            workflow_id: workflow_id.to_string(),
            current_step: definition
                .steps
                .first()
                .map(|s| s.id.clone())
                .unwrap_or_default(),
            completed_steps: Vec::new(),
            total_steps: definition.steps.len(),
            progress: 0,
            started_at: Utc::now(),
        };
        self.states.insert(workflow_id.to_string(), state.clone());
        Some(state)
    }

    pub fn state(&self, workflow_id: &str) -> Option<&WorkflowState> {
        self.states.get(workflow_id)
    }

    /// Restore a previously persisted state (resume after restart).
    pub fn restore(&mut self, state: WorkflowState) {
        self.states.insert(state.workflow_id.clone(), state);
    }

    /// Mark a step completed (set semantics) and make it the current step.
    ///
    /// Refuses unknown workflows/steps and steps whose dependencies are not
    /// all completed; refusals are logged, not returned as errors.
    pub fn advance(&mut self, workflow_id: &str, step_id: &str) -> Option<AdvanceOutcome> {
        let definition = match self.definitions.get(workflow_id) {
            Some(d) => d,
            None => {
                warn!(workflow_id, "advance on unregistered workflow");
                return None;
            }
        };
        let step = match definition.steps.iter().find(|s| s.id == step_id) {
            Some(s) => s,
            None => {
                warn!(workflow_id, step_id, "advance to unknown step");
                return None;
            }
        };

        let state = self.states.get_mut(workflow_id)?;

        let unmet: Vec<&str> = step
            .dependencies
            .iter()
            .filter(|dep| !state.completed_steps.contains(dep))
            .map(String::as_str)
            .collect();
        if !unmet.is_empty() {
            warn!(workflow_id, step_id, ?unmet, "step dependencies not met");
            return None;
        }

        let previous = state.progress;
        if !state.completed_steps.iter().any(|s| s == step_id) {
            state.completed_steps.push(step_id.to_string());
        }
        state.current_step = step_id.to_string();
        state.progress = progress(state.completed_steps.len(), state.total_steps);

        Some(AdvanceOutcome {
            milestones: crossed_milestones(previous, state.progress),
            state: state.clone(),
        })
    }
}

impl Default for WorkflowTracker {
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

    fn step(id: &str, order: usize, dependencies: &[&str]) -> WorkflowStep {
        WorkflowStep {
            id: id.to_string(),
            name: id.to_string(),
            page_id: "reconciliation".to_string(),
            order,
            required: true,
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn four_step_tracker() -> WorkflowTracker {
        let mut tracker = WorkflowTracker::new();
        tracker.register(WorkflowDefinition {
            id: "recon".to_string(),
            name: "Reconciliation".to_string(),
            steps: vec![
                step("upload", 0, &[]),
                step("validate", 1, &["upload"]),
                step("match", 2, &["validate"]),
                step("review", 3, &["match"]),
            ],
        });
        tracker.init("recon").unwrap();
        tracker
    }

    #[test]
    fn test_progress_guards_zero_total() {
        assert_eq!(progress(0, 0), 0);
        assert_eq!(progress(5, 0), 0);
    }

    #[test]
    fn test_progress_rounds_and_caps() {
        assert_eq!(progress(1, 3), 33);
        assert_eq!(progress(2, 3), 67);
        assert_eq!(progress(3, 3), 100);
        assert_eq!(progress(7, 4), 100);
    }

    #[test]
    fn test_progress_is_monotonic_and_bounded() {
        let mut tracker = four_step_tracker();
        let mut last = 0u8;
        for id in ["upload", "validate", "match", "review"] {
            let outcome = tracker.advance("recon", id).unwrap();
            assert!(outcome.state.progress >= last);
            assert!(outcome.state.progress <= 100);
            last = outcome.state.progress;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn test_advance_has_set_semantics() {
        let mut tracker = four_step_tracker();
        tracker.advance("recon", "upload").unwrap();
        let outcome = tracker.advance("recon", "upload").unwrap();

        assert_eq!(outcome.state.completed_steps, vec!["upload"]);
        assert_eq!(outcome.state.progress, 25);
    }

    #[test]
    fn test_advance_replaces_current_step() {
        let mut tracker = four_step_tracker();
        tracker.advance("recon", "upload").unwrap();
        let outcome = tracker.advance("recon", "validate").unwrap();

        assert_eq!(outcome.state.current_step, "validate");
    }

    #[test]
    fn test_advance_refuses_unmet_dependencies() {
        let mut tracker = four_step_tracker();
        // "match" depends on "validate", which is not complete.
        assert!(tracker.advance("recon", "match").is_none());
        assert_eq!(tracker.state("recon").unwrap().completed_steps.len(), 0);
    }

    #[test]
    fn test_milestones_fire_on_upward_crossing() {
        assert_eq!(crossed_milestones(0, 25), vec![25]);
        assert_eq!(crossed_milestones(20, 60), vec![25, 50]);
        assert_eq!(crossed_milestones(75, 100), vec![100]);
    }

    #[test]
    fn test_milestones_do_not_refire_while_pinned() {
        assert!(crossed_milestones(25, 25).is_empty());
        assert!(crossed_milestones(50, 50).is_empty());
        assert!(crossed_milestones(100, 100).is_empty());
    }

    #[test]
    fn test_milestone_edges_through_tracker() {
        let mut tracker = four_step_tracker();

        let outcome = tracker.advance("recon", "upload").unwrap();
        assert_eq!(outcome.milestones, vec![25]);

        // Re-advancing the same step changes nothing and crosses nothing.
        let outcome = tracker.advance("recon", "upload").unwrap();
        assert!(outcome.milestones.is_empty());

        let outcome = tracker.advance("recon", "validate").unwrap();
        assert_eq!(outcome.milestones, vec![50]);
    }

    #[test]
    fn test_restore_resumes_state() {
        let mut tracker = four_step_tracker();
        let snapshot = tracker.advance("recon", "upload").unwrap().state;

        let mut fresh = WorkflowTracker::new();
        fresh.restore(snapshot);

        assert_eq!(fresh.state("recon").unwrap().progress, 25);
    }
}
