//! Graph definition for the content-writer workflow

use std::collections::HashMap;

use crate::error::{QuillError, Result};
use crate::state::{PolicyDecision, ReviewDecision, WorkflowState, WorkflowStep};

/// Where to go after a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub to: WorkflowStep,
    /// Taking this route spends one regeneration
    pub regenerate: bool,
}

impl Route {
    pub fn to(step: WorkflowStep) -> Self {
        Self {
            to: step,
            regenerate: false,
        }
    }

    pub fn regenerate(step: WorkflowStep) -> Self {
        Self {
            to: step,
            regenerate: true,
        }
    }
}

/// Graph-level switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphSettings {
    /// Send passing drafts through the final review gate too
    pub require_final_approval: bool,
}

type Branch = fn(&WorkflowState, &GraphSettings) -> Result<Route>;

#[derive(Clone, Copy)]
enum Edge {
    Always(WorkflowStep),
    Conditional(Branch),
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Always(step) => f.debug_tuple("Always").field(step).finish(),
            Edge::Conditional(_) => f.debug_tuple("Conditional").finish(),
        }
    }
}

/// Directed graph with unconditional and conditional edges
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    entry: WorkflowStep,
    edges: HashMap<WorkflowStep, Edge>,
    settings: GraphSettings,
}

fn after_quality_check(state: &WorkflowState, settings: &GraphSettings) -> Result<Route> {
    match state.metadata.last_decision {
        Some(PolicyDecision::Regenerate) => Ok(Route::regenerate(WorkflowStep::GenerateDraft)),
        Some(PolicyDecision::HumanReview) => Ok(Route::to(WorkflowStep::AwaitingFinalReview)),
        Some(PolicyDecision::Complete) if settings.require_final_approval => {
            Ok(Route::to(WorkflowStep::AwaitingFinalReview))
        }
        Some(PolicyDecision::Complete) => Ok(Route::to(WorkflowStep::Done)),
        None => Err(QuillError::Other(
            "quality check finished without a decision".to_string(),
        )),
    }
}

fn after_final_review(state: &WorkflowState, _: &GraphSettings) -> Result<Route> {
    match state.metadata.final_decision {
        Some(ReviewDecision::Accept) => Ok(Route::to(WorkflowStep::Done)),
        Some(ReviewDecision::Regenerate) => Ok(Route::regenerate(WorkflowStep::GenerateDraft)),
        None => Err(QuillError::Other(
            "final review passed without a decision".to_string(),
        )),
    }
}

impl WorkflowGraph {
    /// The content-writer pipeline
    pub fn content_writer(settings: GraphSettings) -> Self {
        use WorkflowStep::*;

        let edges = HashMap::from([
            (GenerateConcepts, Edge::Always(AwaitingConcept)),
            (AwaitingConcept, Edge::Always(GenerateSubtopics)),
            (GenerateSubtopics, Edge::Always(AwaitingSubtopics)),
            (AwaitingSubtopics, Edge::Always(GenerateDraft)),
            (GenerateDraft, Edge::Always(QualityCheck)),
            (QualityCheck, Edge::Conditional(after_quality_check)),
            (AwaitingFinalReview, Edge::Conditional(after_final_review)),
        ]);

        Self {
            entry: GenerateConcepts,
            edges,
            settings,
        }
    }

    pub fn entry(&self) -> WorkflowStep {
        self.entry
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    /// Resolve the outgoing edge of `from` against `state`
    pub fn next(&self, from: WorkflowStep, state: &WorkflowState) -> Result<Route> {
        match self.edges.get(&from) {
            Some(Edge::Always(to)) => Ok(Route::to(*to)),
            Some(Edge::Conditional(branch)) => branch(state, &self.settings),
            None => Err(QuillError::Other(format!("no outgoing edge from {}", from))),
        }
    }

    /// Whether `from` has no outgoing edge
    pub fn is_terminal(&self, from: WorkflowStep) -> bool {
        !self.edges.contains_key(&from)
    }
}
