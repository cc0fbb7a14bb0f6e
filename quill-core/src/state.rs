//! Workflow state aggregate
//!
//! [`WorkflowState`] is the single persisted record of a content request.
//! Step functions never mutate it directly: they return a [`StatePatch`]
//! which the engine applies, so every change passes the same lifecycle
//! checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{QuillError, Result};
use crate::gate::SuspendPayload;

/// Candidate article idea
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub rank_order: u32,
}

/// Section idea derived from an approved concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtopic {
    pub id: String,
    pub concept_id: String,
    pub title: String,
    pub summary: String,
    pub rank_order: u32,
}

/// Current article draft, replaced wholesale on regeneration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub final_article: String,
    pub title: String,
    pub word_count: usize,
    /// 1 for the first draft, incremented on each regeneration
    pub revision: u32,
    pub generated_at: DateTime<Utc>,
}

/// Lifecycle status of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Processing,
    Failed,
    AwaitingHuman,
    Complete,
}

impl WorkflowStatus {
    /// Whether moving from `self` to `next` is allowed.
    ///
    /// `processing` may move anywhere; `awaiting_human` only back to
    /// `processing` or to `failed` (cancellation). `failed` and `complete`
    /// are terminal.
    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        match (self, next) {
            (Processing, _) => true,
            (AwaitingHuman, Processing | Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Failed | WorkflowStatus::Complete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Processing => "processing",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::AwaitingHuman => "awaiting_human",
            WorkflowStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graph node to run or re-enter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStep {
    #[serde(rename = "generateConcepts")]
    GenerateConcepts,
    #[serde(rename = "awaiting_concept")]
    AwaitingConcept,
    #[serde(rename = "generateSubtopics")]
    GenerateSubtopics,
    #[serde(rename = "awaiting_subtopics")]
    AwaitingSubtopics,
    #[serde(rename = "generateDraft")]
    GenerateDraft,
    #[serde(rename = "qualityCheck")]
    QualityCheck,
    #[serde(rename = "awaiting_final_review")]
    AwaitingFinalReview,
    #[serde(rename = "done")]
    Done,
}

impl WorkflowStep {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStep::GenerateConcepts => "generateConcepts",
            WorkflowStep::AwaitingConcept => "awaiting_concept",
            WorkflowStep::GenerateSubtopics => "generateSubtopics",
            WorkflowStep::AwaitingSubtopics => "awaiting_subtopics",
            WorkflowStep::GenerateDraft => "generateDraft",
            WorkflowStep::QualityCheck => "qualityCheck",
            WorkflowStep::AwaitingFinalReview => "awaiting_final_review",
            WorkflowStep::Done => "done",
        }
    }

    /// Approval gates are the only nodes that suspend
    pub fn is_gate(self) -> bool {
        matches!(
            self,
            WorkflowStep::AwaitingConcept
                | WorkflowStep::AwaitingSubtopics
                | WorkflowStep::AwaitingFinalReview
        )
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit-trail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub step: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorEntry {
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Quality dimension scored by one QC agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    Brand,
    Fact,
    Proofreading,
    Regulatory,
}

impl QualityDimension {
    pub const ALL: [QualityDimension; 4] = [
        QualityDimension::Brand,
        QualityDimension::Fact,
        QualityDimension::Proofreading,
        QualityDimension::Regulatory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QualityDimension::Brand => "brand",
            QualityDimension::Fact => "fact",
            QualityDimension::Proofreading => "proofreading",
            QualityDimension::Regulatory => "regulatory",
        }
    }
}

impl fmt::Display for QualityDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score and issues from one QC agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Score in [0, 100]
    pub score: f64,
    pub issues: Vec<String>,
}

impl QualityReport {
    /// Build a report, clamping the score into [0, 100]
    pub fn new(score: f64, issues: Vec<String>) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 100.0) };
        Self { score, issues }
    }

    /// Nothing to check against: full marks, no issues
    pub fn pass() -> Self {
        Self::new(100.0, Vec::new())
    }
}

/// Regeneration policy outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    Regenerate,
    HumanReview,
    Complete,
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PolicyDecision::Regenerate => "regenerate",
            PolicyDecision::HumanReview => "human_review",
            PolicyDecision::Complete => "complete",
        })
    }
}

/// A reviewer's choice at the final review gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Accept,
    Regenerate,
}

impl ReviewDecision {
    /// Option id presented to the reviewer
    pub fn id(self) -> &'static str {
        match self {
            ReviewDecision::Accept => "accept",
            ReviewDecision::Regenerate => "regenerate",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "accept" => Some(ReviewDecision::Accept),
            "regenerate" => Some(ReviewDecision::Regenerate),
            _ => None,
        }
    }
}

/// Typed workflow metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowMetadata {
    pub current_step: WorkflowStep,
    pub regeneration_count: u32,
    pub brand_issues: Vec<String>,
    pub fact_issues: Vec<String>,
    pub reviews: BTreeMap<QualityDimension, QualityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_decision: Option<PolicyDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_decision: Option<ReviewDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_feedback: Option<String>,
    /// Free-form debugging notes, never read by the pipeline
    pub annotations: BTreeMap<String, String>,
}

impl Default for WorkflowMetadata {
    fn default() -> Self {
        Self {
            current_step: WorkflowStep::GenerateConcepts,
            regeneration_count: 0,
            brand_issues: Vec::new(),
            fact_issues: Vec::new(),
            reviews: BTreeMap::new(),
            last_decision: None,
            final_decision: None,
            reviewer_feedback: None,
            annotations: BTreeMap::new(),
        }
    }
}

/// Persisted state of one content request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub request_id: String,
    pub topic: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guideline_profile_id: Option<String>,

    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_concept_id: Option<String>,
    #[serde(default)]
    pub subtopics: Vec<Subtopic>,
    #[serde(default)]
    pub selected_subtopic_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_draft: Option<ArticleDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_score: Option<f64>,

    #[serde(default)]
    pub metadata: WorkflowMetadata,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
    pub status: WorkflowStatus,

    /// Present while suspended at a gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<SuspendPayload>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Fresh state with a new request id
    pub fn new(
        topic: impl Into<String>,
        user_id: impl Into<String>,
        guideline_profile_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            user_id: user_id.into(),
            guideline_profile_id,
            concepts: Vec::new(),
            selected_concept_id: None,
            subtopics: Vec::new(),
            selected_subtopic_ids: Vec::new(),
            article_draft: None,
            brand_score: None,
            fact_score: None,
            metadata: WorkflowMetadata::default(),
            errors: Vec::new(),
            status: WorkflowStatus::Processing,
            pending: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn current_step(&self) -> WorkflowStep {
        self.metadata.current_step
    }

    pub fn selected_concept(&self) -> Option<&Concept> {
        let id = self.selected_concept_id.as_deref()?;
        self.concepts.iter().find(|c| c.id == id)
    }

    /// Selected subtopics in candidate order
    pub fn selected_subtopics(&self) -> Vec<&Subtopic> {
        self.subtopics
            .iter()
            .filter(|s| self.selected_subtopic_ids.contains(&s.id))
            .collect()
    }

    pub fn last_error(&self) -> Option<&ErrorEntry> {
        self.errors.last()
    }

    /// Apply a patch, enforcing the status lifecycle.
    ///
    /// On error the state is left untouched.
    pub fn apply(&mut self, patch: StatePatch) -> Result<()> {
        if let Some(next) = patch.status {
            if next != self.status && !self.status.can_transition_to(next) {
                return Err(QuillError::InvalidTransition {
                    from: self.status.to_string(),
                    to: next.to_string(),
                });
            }
        }

        let StatePatch {
            concepts,
            selected_concept_id,
            subtopics,
            selected_subtopic_ids,
            article_draft,
            brand_score,
            fact_score,
            current_step,
            regeneration_count,
            brand_issues,
            fact_issues,
            reviews,
            last_decision,
            final_decision,
            reviewer_feedback,
            annotations,
            errors,
            status,
            pending,
        } = patch;

        if let Some(v) = concepts {
            self.concepts = v;
        }
        if let Some(v) = selected_concept_id {
            self.selected_concept_id = v;
        }
        if let Some(v) = subtopics {
            self.subtopics = v;
        }
        if let Some(v) = selected_subtopic_ids {
            self.selected_subtopic_ids = v;
        }
        if let Some(v) = article_draft {
            self.article_draft = Some(v);
        }
        if let Some(v) = brand_score {
            self.brand_score = v;
        }
        if let Some(v) = fact_score {
            self.fact_score = v;
        }
        if let Some(v) = current_step {
            self.metadata.current_step = v;
        }
        if let Some(v) = regeneration_count {
            // never decreases
            self.metadata.regeneration_count = self.metadata.regeneration_count.max(v);
        }
        if let Some(v) = brand_issues {
            self.metadata.brand_issues = v;
        }
        if let Some(v) = fact_issues {
            self.metadata.fact_issues = v;
        }
        self.metadata.reviews.extend(reviews);
        if let Some(v) = last_decision {
            self.metadata.last_decision = v;
        }
        if let Some(v) = final_decision {
            self.metadata.final_decision = v;
        }
        if let Some(v) = reviewer_feedback {
            self.metadata.reviewer_feedback = v;
        }
        self.metadata.annotations.extend(annotations);
        self.errors.extend(errors);
        if let Some(v) = status {
            self.status = v;
        }
        if let Some(v) = pending {
            self.pending = v;
        }

        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Partial update to a [`WorkflowState`].
///
/// `None` leaves a field alone. Clearable fields use a nested `Option`, so
/// `Some(None)` clears them. `reviews` and `annotations` merge by key;
/// `errors` are appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub concepts: Option<Vec<Concept>>,
    pub selected_concept_id: Option<Option<String>>,
    pub subtopics: Option<Vec<Subtopic>>,
    pub selected_subtopic_ids: Option<Vec<String>>,
    pub article_draft: Option<ArticleDraft>,
    pub brand_score: Option<Option<f64>>,
    pub fact_score: Option<Option<f64>>,
    pub current_step: Option<WorkflowStep>,
    pub regeneration_count: Option<u32>,
    pub brand_issues: Option<Vec<String>>,
    pub fact_issues: Option<Vec<String>>,
    pub reviews: BTreeMap<QualityDimension, QualityReport>,
    pub last_decision: Option<Option<PolicyDecision>>,
    pub final_decision: Option<Option<ReviewDecision>>,
    pub reviewer_feedback: Option<Option<String>>,
    pub annotations: BTreeMap<String, String>,
    pub errors: Vec<ErrorEntry>,
    pub status: Option<WorkflowStatus>,
    pub pending: Option<Option<SuspendPayload>>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn concepts(mut self, concepts: Vec<Concept>) -> Self {
        self.concepts = Some(concepts);
        self
    }

    pub fn selected_concept(mut self, id: Option<String>) -> Self {
        self.selected_concept_id = Some(id);
        self
    }

    pub fn subtopics(mut self, subtopics: Vec<Subtopic>) -> Self {
        self.subtopics = Some(subtopics);
        self
    }

    pub fn selected_subtopics(mut self, ids: Vec<String>) -> Self {
        self.selected_subtopic_ids = Some(ids);
        self
    }

    pub fn article_draft(mut self, draft: ArticleDraft) -> Self {
        self.article_draft = Some(draft);
        self
    }

    pub fn scores(mut self, brand: Option<f64>, fact: Option<f64>) -> Self {
        self.brand_score = Some(brand);
        self.fact_score = Some(fact);
        self
    }

    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.current_step = Some(step);
        self
    }

    pub fn regeneration_count(mut self, count: u32) -> Self {
        self.regeneration_count = Some(count);
        self
    }

    pub fn issues(mut self, brand: Vec<String>, fact: Vec<String>) -> Self {
        self.brand_issues = Some(brand);
        self.fact_issues = Some(fact);
        self
    }

    pub fn review(mut self, dimension: QualityDimension, report: QualityReport) -> Self {
        self.reviews.insert(dimension, report);
        self
    }

    pub fn last_decision(mut self, decision: Option<PolicyDecision>) -> Self {
        self.last_decision = Some(decision);
        self
    }

    pub fn final_decision(mut self, decision: Option<ReviewDecision>) -> Self {
        self.final_decision = Some(decision);
        self
    }

    pub fn reviewer_feedback(mut self, feedback: Option<String>) -> Self {
        self.reviewer_feedback = Some(feedback);
        self
    }

    pub fn annotate(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn error(mut self, entry: ErrorEntry) -> Self {
        self.errors.push(entry);
        self
    }

    pub fn status(mut self, status: WorkflowStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn pending(mut self, payload: Option<SuspendPayload>) -> Self {
        self.pending = Some(payload);
        self
    }

    /// Fold `other` into `self`; later values win, merged collections merge
    pub fn merge(mut self, other: StatePatch) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            concepts,
            selected_concept_id,
            subtopics,
            selected_subtopic_ids,
            article_draft,
            brand_score,
            fact_score,
            current_step,
            regeneration_count,
            brand_issues,
            fact_issues,
            last_decision,
            final_decision,
            reviewer_feedback,
            status,
            pending
        );
        self.reviews.extend(other.reviews);
        self.annotations.extend(other.annotations);
        self.errors.extend(other.errors);
        self
    }
}
