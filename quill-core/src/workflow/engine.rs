//! Workflow engine
//!
//! [`ContentWorkflow`] drives a [`WorkflowState`] through the graph until a
//! gate suspends, a node fails, or the workflow reaches `done`. Calls for
//! the same request id are serialized by a per-request lock; different
//! requests run independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::graph::{GraphSettings, WorkflowGraph};
use super::{ContentRequest, HumanDecision, NodeOutcome, WorkflowReport};
use crate::config::{GenerationConfig, PolicyConfig, QuillConfig};
use crate::error::{QuillError, Result};
use crate::gate;
use crate::generation::ContentGenerator;
use crate::guidelines::{GuidelineStore, InMemoryGuidelineStore};
use crate::llm::{AuditedLlm, LLMProvider};
use crate::policy::RegenerationPolicy;
use crate::prompt::PromptContext;
use crate::quality::{QualityPanel, ReviewContext};
use crate::retrieval::{BrandContextOptions, ContextRetriever, RetrievalGuard, CONTENT_WRITER_TOOL};
use crate::state::{
    ErrorEntry, QualityDimension, StatePatch, WorkflowState, WorkflowStatus, WorkflowStep,
};
use crate::store::{JobStore, MemoryJobStore};

/// Error step recorded when a workflow is cancelled
pub const CANCELLED_STEP: &str = "cancelled";

/// The content-writer workflow engine
pub struct ContentWorkflow {
    generator: ContentGenerator,
    panel: QualityPanel,
    policy: RegenerationPolicy,
    graph: WorkflowGraph,
    guidelines: Arc<dyn GuidelineStore>,
    retriever: RetrievalGuard,
    store: Arc<dyn JobStore>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for ContentWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentWorkflow")
            .field("policy", &self.policy)
            .field("graph", &self.graph)
            .field("panel", &self.panel)
            .finish_non_exhaustive()
    }
}

impl ContentWorkflow {
    pub fn builder() -> ContentWorkflowBuilder {
        ContentWorkflowBuilder::new()
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn policy(&self) -> &RegenerationPolicy {
        &self.policy
    }

    /// Create a workflow for `request` and run it to the first suspension
    pub async fn start(&self, request: ContentRequest) -> Result<WorkflowReport> {
        let config = self.generator.config();
        let topic = request.topic.trim();
        if topic.chars().count() > config.max_topic_chars {
            return Err(QuillError::InvalidInput(format!(
                "topic is longer than {} characters",
                config.max_topic_chars
            )));
        }
        if request.user_id.trim().is_empty() {
            return Err(QuillError::InvalidInput("user_id must not be empty".to_string()));
        }

        let profile_id = request
            .guideline_profile_id
            .filter(|p| !p.trim().is_empty());
        let mut state = WorkflowState::new(topic, request.user_id, profile_id);
        state.metadata.current_step = self.graph.entry();

        let lock = self.lock_for(&state.request_id);
        let _guard = lock.lock().await;

        tracing::info!(
            request_id = %state.request_id,
            user_id = %state.user_id,
            "Starting content workflow"
        );
        self.store.save(&state).await?;

        let state = self.drive(state).await?;
        Ok(WorkflowReport::from_state(&state))
    }

    /// Merge a human decision into a suspended workflow and continue
    pub async fn resume(&self, request_id: &str, decision: HumanDecision) -> Result<WorkflowReport> {
        let lock = self.lock_for(request_id);
        let _guard = lock.lock().await;

        let mut state = self.load(request_id).await?;
        if state.status != WorkflowStatus::AwaitingHuman {
            return Err(QuillError::InvalidDecision(format!(
                "workflow {} is {}, not awaiting a decision",
                request_id, state.status
            )));
        }
        if decision.gate() != state.current_step() {
            return Err(QuillError::InvalidDecision(format!(
                "workflow {} is waiting at {}, decision answers {}",
                request_id,
                state.current_step(),
                decision.gate()
            )));
        }

        tracing::info!(
            request_id = %request_id,
            step = %state.current_step(),
            "Resuming workflow"
        );
        let reopen = StatePatch::new()
            .status(WorkflowStatus::Processing)
            .pending(None);
        state.apply(decision.into_patch().merge(reopen))?;
        self.store.save(&state).await?;

        let state = self.drive(state).await?;
        Ok(WorkflowReport::from_state(&state))
    }

    /// Re-drive a workflow left in `processing`, e.g. after a crash
    ///
    /// The step saved at the last boundary runs again, so a node that was
    /// interrupted mid-call is retried from scratch.
    pub async fn recover(&self, request_id: &str) -> Result<WorkflowReport> {
        let lock = self.lock_for(request_id);
        let _guard = lock.lock().await;

        let mut state = self.load(request_id).await?;
        if state.status != WorkflowStatus::Processing {
            return Err(QuillError::InvalidInput(format!(
                "workflow {} is {}, not processing",
                request_id, state.status
            )));
        }

        let step = state.current_step();
        tracing::warn!(
            request_id = %request_id,
            step = %step,
            "Recovering interrupted workflow"
        );
        state.apply(StatePatch::new().annotate("recovered_from", step.as_str()))?;
        self.store.save(&state).await?;

        let state = self.drive(state).await?;
        Ok(WorkflowReport::from_state(&state))
    }

    /// Mark a workflow failed with a `cancelled` error entry
    pub async fn cancel(&self, request_id: &str, reason: &str) -> Result<WorkflowReport> {
        let lock = self.lock_for(request_id);
        let _guard = lock.lock().await;

        let mut state = self.load(request_id).await?;
        let reason = if reason.trim().is_empty() {
            "cancelled by user"
        } else {
            reason.trim()
        };
        state.apply(
            StatePatch::new()
                .error(ErrorEntry::new(CANCELLED_STEP, reason))
                .status(WorkflowStatus::Failed)
                .pending(None),
        )?;
        self.store.save(&state).await?;

        tracing::info!(request_id = %request_id, reason, "Workflow cancelled");
        Ok(WorkflowReport::from_state(&state))
    }

    /// Current user-visible summary
    pub async fn report(&self, request_id: &str) -> Result<WorkflowReport> {
        let state = self.load(request_id).await?;
        Ok(WorkflowReport::from_state(&state))
    }

    async fn load(&self, request_id: &str) -> Result<WorkflowState> {
        self.store
            .load(request_id)
            .await?
            .ok_or_else(|| QuillError::WorkflowNotFound(request_id.to_string()))
    }

    fn lock_for(&self, request_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // Drop locks nobody holds any more
        locks.retain(|id, lock| id == request_id || Arc::strong_count(lock) > 1);
        locks
            .entry(request_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Run nodes until the workflow suspends, fails, or completes
    async fn drive(&self, mut state: WorkflowState) -> Result<WorkflowState> {
        loop {
            let step = state.current_step();

            if self.graph.is_terminal(step) {
                state.apply(
                    StatePatch::new()
                        .status(WorkflowStatus::Complete)
                        .pending(None),
                )?;
                self.store.save(&state).await?;
                tracing::info!(
                    request_id = %state.request_id,
                    regenerations = state.metadata.regeneration_count,
                    "Workflow complete"
                );
                return Ok(state);
            }

            tracing::debug!(request_id = %state.request_id, step = %step, "Running node");
            let outcome = match self.run_node(step, &state).await {
                Ok(outcome) => outcome,
                Err(e) => return self.fail(state, step, e).await,
            };

            match outcome {
                NodeOutcome::Continue(patch) => {
                    state.apply(patch)?;
                    let route = match self.graph.next(step, &state) {
                        Ok(route) => route,
                        Err(e) => return self.fail(state, step, e).await,
                    };

                    let mut advance = StatePatch::new().step(route.to);
                    if route.regenerate {
                        let count = state.metadata.regeneration_count + 1;
                        tracing::info!(
                            request_id = %state.request_id,
                            regeneration = count,
                            "Regenerating draft"
                        );
                        advance = advance.regeneration_count(count);
                    }
                    state.apply(advance)?;
                    self.store.save(&state).await?;
                }
                NodeOutcome::Suspend { .. } if !step.is_gate() => {
                    let e = QuillError::Other(format!("{} is not an approval gate", step));
                    return self.fail(state, step, e).await;
                }
                NodeOutcome::Suspend { payload, patch } => {
                    tracing::info!(
                        request_id = %state.request_id,
                        step = %step,
                        candidates = payload.candidates.len(),
                        "Workflow suspended for human input"
                    );
                    let wait = StatePatch::new()
                        .status(WorkflowStatus::AwaitingHuman)
                        .pending(Some(payload));
                    state.apply(patch.merge(wait))?;
                    self.store.save(&state).await?;
                    return Ok(state);
                }
            }
        }
    }

    async fn fail(
        &self,
        mut state: WorkflowState,
        step: WorkflowStep,
        error: QuillError,
    ) -> Result<WorkflowState> {
        tracing::error!(
            request_id = %state.request_id,
            step = %step,
            error = %error,
            "Workflow step failed"
        );
        state.apply(
            StatePatch::new()
                .error(ErrorEntry::new(step.as_str(), error.to_string()))
                .status(WorkflowStatus::Failed)
                .pending(None),
        )?;
        self.store.save(&state).await?;
        Ok(state)
    }

    async fn run_node(&self, step: WorkflowStep, state: &WorkflowState) -> Result<NodeOutcome> {
        match step {
            WorkflowStep::GenerateConcepts => {
                let ctx = self.prompt_context(state).await?;
                let patch = self.generator.generate_concepts(state, &ctx).await?;
                Ok(NodeOutcome::Continue(patch))
            }
            WorkflowStep::AwaitingConcept => gate::concept_gate(state),
            WorkflowStep::GenerateSubtopics => {
                let ctx = self.prompt_context(state).await?;
                let patch = self.generator.generate_subtopics(state, &ctx).await?;
                Ok(NodeOutcome::Continue(patch))
            }
            WorkflowStep::AwaitingSubtopics => gate::subtopic_gate(state),
            WorkflowStep::GenerateDraft => {
                let ctx = self.prompt_context(state).await?;
                let patch = self.generator.generate_draft(state, &ctx).await?;
                Ok(NodeOutcome::Continue(patch))
            }
            WorkflowStep::QualityCheck => self.quality_check(state).await,
            WorkflowStep::AwaitingFinalReview => gate::final_review_gate(state, &self.policy),
            WorkflowStep::Done => Ok(NodeOutcome::Continue(StatePatch::new())),
        }
    }

    async fn quality_check(&self, state: &WorkflowState) -> Result<NodeOutcome> {
        let ctx = self.prompt_context(state).await?;
        let reports = self
            .panel
            .review(&ReviewContext::from_state(state, ctx))
            .await?;

        let score = |d: QualityDimension| reports.get(&d).map(|r| r.score);
        let issues = |d: QualityDimension| {
            reports
                .get(&d)
                .map(|r| r.issues.clone())
                .unwrap_or_default()
        };
        let brand_score = score(QualityDimension::Brand);
        let fact_score = score(QualityDimension::Fact);
        let decision =
            self.policy
                .decide(brand_score, fact_score, state.metadata.regeneration_count);

        tracing::info!(
            request_id = %state.request_id,
            brand_score = brand_score.unwrap_or(100.0),
            fact_score = fact_score.unwrap_or(100.0),
            decision = %decision,
            "Quality check finished"
        );

        let mut patch = StatePatch::new()
            .scores(brand_score, fact_score)
            .issues(issues(QualityDimension::Brand), issues(QualityDimension::Fact))
            .last_decision(Some(decision));
        for (dimension, report) in reports {
            patch = patch.review(dimension, report);
        }
        Ok(NodeOutcome::Continue(patch))
    }

    /// Guidelines and retrieved material for the state's owner and profile
    async fn prompt_context(&self, state: &WorkflowState) -> Result<PromptContext> {
        let max_chars = self.generator.config().max_context_chars;
        let profile_id = state.guideline_profile_id.as_deref();

        let profile = match profile_id {
            Some(id) => {
                let profile = self.guidelines.get(id, &state.user_id).await?;
                if profile.is_none() {
                    tracing::warn!(
                        request_id = %state.request_id,
                        guideline_profile_id = %id,
                        "Guideline profile not found for user; continuing without it"
                    );
                }
                profile
            }
            None => None,
        };

        let query = match state.selected_concept() {
            Some(concept) => format!("{} {}", state.topic, concept.title),
            None => state.topic.clone(),
        };
        let opts = BrandContextOptions {
            max_chars,
            ..Default::default()
        };

        let feedback = self
            .retriever
            .feedback(&state.user_id, CONTENT_WRITER_TOOL, profile_id);
        let reference = async {
            match profile_id {
                Some(id) => {
                    self.retriever
                        .brand_context(&state.user_id, id, &query, &opts)
                        .await
                }
                None => String::new(),
            }
        };
        let (feedback, reference) = tokio::join!(feedback, reference);

        let non_empty = |s: String| Some(s).filter(|s| !s.trim().is_empty());
        Ok(PromptContext {
            brand_guidelines: profile
                .as_ref()
                .and_then(|p| p.brand())
                .map(|c| c.format_for_prompt(max_chars)),
            regulatory_guidelines: profile
                .as_ref()
                .and_then(|p| p.regulatory())
                .map(|c| c.format_for_prompt(max_chars)),
            feedback: non_empty(feedback),
            reference: non_empty(reference),
        })
    }
}

/// Builder for [`ContentWorkflow`]
#[derive(Default)]
pub struct ContentWorkflowBuilder {
    provider: Option<Arc<dyn LLMProvider>>,
    store: Option<Arc<dyn JobStore>>,
    guidelines: Option<Arc<dyn GuidelineStore>>,
    retriever: Option<Arc<dyn ContextRetriever>>,
    panel: Option<QualityPanel>,
    generation: GenerationConfig,
    policy: PolicyConfig,
}

impl ContentWorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text-generation service (required)
    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Job store; in-memory by default
    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Guideline profiles; empty by default
    pub fn guidelines(mut self, guidelines: Arc<dyn GuidelineStore>) -> Self {
        self.guidelines = Some(guidelines);
        self
    }

    /// RAG retriever; none by default
    pub fn retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Replace the standard QC panel
    pub fn quality_panel(mut self, panel: QualityPanel) -> Self {
        self.panel = Some(panel);
        self
    }

    pub fn generation(mut self, config: GenerationConfig) -> Self {
        self.generation = config;
        self
    }

    pub fn policy(mut self, config: PolicyConfig) -> Self {
        self.policy = config;
        self
    }

    /// Take the generation and policy sections from a loaded config
    pub fn config(self, config: &QuillConfig) -> Self {
        self.generation(config.generation.clone())
            .policy(config.policy.clone())
    }

    pub fn build(self) -> Result<ContentWorkflow> {
        let provider = self.provider.ok_or_else(|| {
            QuillError::Configuration("a text-generation provider is required".to_string())
        })?;
        let llm = AuditedLlm::new(provider);

        let panel = self
            .panel
            .unwrap_or_else(|| QualityPanel::standard(llm.clone(), self.generation.clone()));
        let retriever = match self.retriever {
            Some(retriever) => RetrievalGuard::new(retriever),
            None => RetrievalGuard::noop(),
        };

        Ok(ContentWorkflow {
            generator: ContentGenerator::new(llm, self.generation),
            panel,
            policy: RegenerationPolicy::from(&self.policy),
            graph: WorkflowGraph::content_writer(GraphSettings {
                require_final_approval: self.policy.require_final_approval,
            }),
            guidelines: self
                .guidelines
                .unwrap_or_else(|| Arc::new(InMemoryGuidelineStore::new())),
            retriever,
            store: self.store.unwrap_or_else(|| Arc::new(MemoryJobStore::new())),
            locks: Mutex::new(HashMap::new()),
        })
    }
}
