//! Content-writer workflow
//!
//! The pipeline is a directed graph of nodes ([`graph`]) driven by
//! [`ContentWorkflow`]. Generation nodes continue with a state patch;
//! approval gates may instead suspend with a [`SuspendPayload`] and wait
//! for a [`HumanDecision`]. State is saved at every step boundary, so a
//! suspended workflow survives restarts.
//!
//! ```text
//! generateConcepts → awaiting_concept → generateSubtopics → awaiting_subtopics
//!   → generateDraft → qualityCheck ─┬─ regenerate ───→ generateDraft
//!                                   ├─ human_review ─→ awaiting_final_review
//!                                   └─ complete ─────→ done
//! awaiting_final_review ─┬─ accept ─────→ done
//!                        └─ regenerate ─→ generateDraft
//! ```

mod engine;
mod graph;

pub use engine::{ContentWorkflow, ContentWorkflowBuilder};
pub use graph::{GraphSettings, Route, WorkflowGraph};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::gate::SuspendPayload;
use crate::state::{
    ArticleDraft, ErrorEntry, QualityDimension, QualityReport, ReviewDecision, StatePatch,
    WorkflowState, WorkflowStatus, WorkflowStep,
};

/// Result of running one node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// Apply the patch and follow the outgoing edge
    Continue(StatePatch),
    /// Apply the patch, persist, and wait for a human decision
    Suspend {
        payload: SuspendPayload,
        patch: StatePatch,
    },
}

/// A new content request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRequest {
    pub topic: String,
    pub user_id: String,
    #[serde(default)]
    pub guideline_profile_id: Option<String>,
}

impl ContentRequest {
    pub fn new(topic: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            user_id: user_id.into(),
            guideline_profile_id: None,
        }
    }

    pub fn with_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.guideline_profile_id = Some(profile_id.into());
        self
    }
}

/// A human answer to a suspended gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HumanDecision {
    SelectConcept {
        concept_id: String,
    },
    SelectSubtopics {
        subtopic_ids: Vec<String>,
    },
    FinalReview {
        decision: ReviewDecision,
        #[serde(default)]
        feedback: Option<String>,
    },
}

impl HumanDecision {
    /// The gate this decision answers
    pub fn gate(&self) -> WorkflowStep {
        match self {
            HumanDecision::SelectConcept { .. } => WorkflowStep::AwaitingConcept,
            HumanDecision::SelectSubtopics { .. } => WorkflowStep::AwaitingSubtopics,
            HumanDecision::FinalReview { .. } => WorkflowStep::AwaitingFinalReview,
        }
    }

    /// Record the selection; the gate validates it on re-entry
    pub fn into_patch(self) -> StatePatch {
        match self {
            HumanDecision::SelectConcept { concept_id } => {
                StatePatch::new().selected_concept(Some(concept_id))
            }
            HumanDecision::SelectSubtopics { subtopic_ids } => {
                StatePatch::new().selected_subtopics(subtopic_ids)
            }
            HumanDecision::FinalReview { decision, feedback } => StatePatch::new()
                .final_decision(Some(decision))
                .reviewer_feedback(feedback.filter(|f| !f.trim().is_empty())),
        }
    }
}

/// User-visible summary of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub request_id: String,
    pub status: WorkflowStatus,
    pub step: WorkflowStep,
    pub regeneration_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact_score: Option<f64>,
    /// Latest score and issues from every QC agent
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reviews: BTreeMap<QualityDimension, QualityReport>,
    /// Set while suspended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<SuspendPayload>,
    /// Set once complete, and while the draft awaits final review
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<ArticleDraft>,
    /// Set when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEntry>,
}

impl WorkflowReport {
    pub fn from_state(state: &WorkflowState) -> Self {
        let step = state.current_step();
        let show_draft = state.status == WorkflowStatus::Complete
            || (state.status == WorkflowStatus::AwaitingHuman
                && step == WorkflowStep::AwaitingFinalReview);

        Self {
            request_id: state.request_id.clone(),
            status: state.status,
            step,
            regeneration_count: state.metadata.regeneration_count,
            brand_score: state.brand_score,
            fact_score: state.fact_score,
            reviews: state.metadata.reviews.clone(),
            pending: match state.status {
                WorkflowStatus::AwaitingHuman => state.pending.clone(),
                _ => None,
            },
            draft: if show_draft {
                state.article_draft.clone()
            } else {
                None
            },
            error: match state.status {
                WorkflowStatus::Failed => state.last_error().cloned(),
                _ => None,
            },
        }
    }

    /// One-line description for logs and terminals
    pub fn summary(&self) -> String {
        match self.status {
            WorkflowStatus::Failed => match &self.error {
                Some(e) => format!("failed at {}: {}", e.step, e.message),
                None => "failed".to_string(),
            },
            WorkflowStatus::AwaitingHuman => match &self.pending {
                Some(p) => format!(
                    "waiting at {} ({} option(s)): {}",
                    p.step,
                    p.candidates.len(),
                    p.message
                ),
                None => format!("waiting at {}", self.step),
            },
            WorkflowStatus::Complete => match &self.draft {
                Some(d) => format!("complete: \"{}\" ({} words)", d.title, d.word_count),
                None => "complete".to_string(),
            },
            WorkflowStatus::Processing => format!("processing {}", self.step),
        }
    }
}
