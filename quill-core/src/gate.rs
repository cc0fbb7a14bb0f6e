//! Approval gates
//!
//! A gate checks the human selection for its step against the current
//! candidates:
//!
//! 1. nothing selected: suspend with the candidates, change nothing;
//! 2. a selection that no longer resolves: clear it and suspend again;
//! 3. a valid selection: continue with the state unchanged.
//!
//! Gates are pure functions of the state, so re-entering one after a
//! restart gives the same answer.

use serde::{Deserialize, Serialize};

use crate::error::{QuillError, Result};
use crate::policy::RegenerationPolicy;
use crate::state::{Concept, ReviewDecision, StatePatch, Subtopic, WorkflowState, WorkflowStep};
use crate::workflow::NodeOutcome;

/// A final-review choice shown to the reviewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOption {
    pub id: String,
    pub title: String,
    pub summary: String,
}

impl ReviewOption {
    fn new(decision: ReviewDecision, title: &str, summary: impl Into<String>) -> Self {
        Self {
            id: decision.id().to_string(),
            title: title.to_string(),
            summary: summary.into(),
        }
    }
}

/// Candidate list attached to a suspension, serialized as a plain array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Candidates {
    // Subtopics first: a subtopic array also satisfies the concept shape
    Subtopics(Vec<Subtopic>),
    Concepts(Vec<Concept>),
    Options(Vec<ReviewOption>),
}

impl Candidates {
    pub fn len(&self) -> usize {
        match self {
            Candidates::Subtopics(v) => v.len(),
            Candidates::Concepts(v) => v.len(),
            Candidates::Options(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<&str> {
        match self {
            Candidates::Subtopics(v) => v.iter().map(|s| s.id.as_str()).collect(),
            Candidates::Concepts(v) => v.iter().map(|c| c.id.as_str()).collect(),
            Candidates::Options(v) => v.iter().map(|o| o.id.as_str()).collect(),
        }
    }
}

/// What the human sees while the workflow is suspended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspendPayload {
    pub message: String,
    pub candidates: Candidates,
    pub step: WorkflowStep,
}

fn suspend(payload: SuspendPayload, patch: StatePatch) -> NodeOutcome {
    NodeOutcome::Suspend { payload, patch }
}

/// Gate `awaiting_concept`
pub fn concept_gate(state: &WorkflowState) -> Result<NodeOutcome> {
    if state.concepts.is_empty() {
        return Err(QuillError::Other("no concepts to choose from".to_string()));
    }

    let payload = SuspendPayload {
        message: "Choose the concept to develop into an article.".to_string(),
        candidates: Candidates::Concepts(state.concepts.clone()),
        step: WorkflowStep::AwaitingConcept,
    };

    match state.selected_concept_id.as_deref() {
        None => Ok(suspend(payload, StatePatch::new())),
        Some(id) if state.concepts.iter().any(|c| c.id == id) => {
            Ok(NodeOutcome::Continue(StatePatch::new()))
        }
        Some(id) => {
            tracing::info!(
                request_id = %state.request_id,
                stale_id = %id,
                "Selected concept is no longer a candidate; clearing selection"
            );
            Ok(suspend(payload, StatePatch::new().selected_concept(None)))
        }
    }
}

/// Gate `awaiting_subtopics`.
///
/// Duplicate ids are collapsed. One stale id invalidates the whole
/// selection.
pub fn subtopic_gate(state: &WorkflowState) -> Result<NodeOutcome> {
    if state.subtopics.is_empty() {
        return Err(QuillError::Other("no subtopics to choose from".to_string()));
    }

    let payload = SuspendPayload {
        message: "Choose one or more subtopics to cover in the article.".to_string(),
        candidates: Candidates::Subtopics(state.subtopics.clone()),
        step: WorkflowStep::AwaitingSubtopics,
    };

    if state.selected_subtopic_ids.is_empty() {
        return Ok(suspend(payload, StatePatch::new()));
    }

    let stale: Vec<&str> = state
        .selected_subtopic_ids
        .iter()
        .map(String::as_str)
        .filter(|id| !state.subtopics.iter().any(|s| s.id == *id))
        .collect();
    if !stale.is_empty() {
        tracing::info!(
            request_id = %state.request_id,
            stale_ids = ?stale,
            "Selected subtopics are no longer candidates; clearing selection"
        );
        return Ok(suspend(payload, StatePatch::new().selected_subtopics(Vec::new())));
    }

    let mut deduped: Vec<String> = Vec::with_capacity(state.selected_subtopic_ids.len());
    for id in &state.selected_subtopic_ids {
        if !deduped.contains(id) {
            deduped.push(id.clone());
        }
    }

    if deduped.len() == state.selected_subtopic_ids.len() {
        Ok(NodeOutcome::Continue(StatePatch::new()))
    } else {
        Ok(NodeOutcome::Continue(StatePatch::new().selected_subtopics(deduped)))
    }
}

/// Options offered at the final review, `regenerate` only while budget remains
pub fn review_options(state: &WorkflowState, policy: &RegenerationPolicy) -> Vec<ReviewOption> {
    let mut options = vec![ReviewOption::new(
        ReviewDecision::Accept,
        "Accept",
        "Approve this draft as final.",
    )];
    let count = state.metadata.regeneration_count;
    if policy.can_regenerate(count) {
        options.push(ReviewOption::new(
            ReviewDecision::Regenerate,
            "Regenerate",
            format!(
                "Write a new draft ({} of {} regenerations used).",
                count,
                policy.max_regenerations()
            ),
        ));
    }
    options
}

fn review_message(state: &WorkflowState) -> String {
    let score = |s: Option<f64>| format!("{:.0}", s.unwrap_or(100.0));
    let mut message = format!(
        "Review the draft. Brand score {}, fact score {}.",
        score(state.brand_score),
        score(state.fact_score)
    );
    let issues: Vec<String> = state
        .metadata
        .reviews
        .iter()
        .flat_map(|(dimension, report)| {
            report
                .issues
                .iter()
                .map(move |issue| format!("- [{}] {}", dimension, issue))
        })
        .collect();
    if !issues.is_empty() {
        message.push_str(&format!(" {} open issue(s):", issues.len()));
        for line in issues {
            message.push('\n');
            message.push_str(&line);
        }
    }
    message
}

/// Gate `awaiting_final_review`
pub fn final_review_gate(
    state: &WorkflowState,
    policy: &RegenerationPolicy,
) -> Result<NodeOutcome> {
    if state.article_draft.is_none() {
        return Err(QuillError::Other("no draft to review".to_string()));
    }

    let options = review_options(state, policy);
    let payload = SuspendPayload {
        message: review_message(state),
        candidates: Candidates::Options(options.clone()),
        step: WorkflowStep::AwaitingFinalReview,
    };

    match state.metadata.final_decision {
        None => Ok(suspend(payload, StatePatch::new())),
        Some(decision) if options.iter().any(|o| o.id == decision.id()) => {
            Ok(NodeOutcome::Continue(StatePatch::new()))
        }
        Some(decision) => {
            tracing::info!(
                request_id = %state.request_id,
                decision = decision.id(),
                "Final review decision is no longer offered; clearing it"
            );
            Ok(suspend(payload, StatePatch::new().final_decision(None)))
        }
    }
}
