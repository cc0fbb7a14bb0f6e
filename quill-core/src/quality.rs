//! Quality control agents
//!
//! Four independent reviewers score a draft on one dimension each. The
//! [`QualityPanel`] runs them concurrently and merges their reports by
//! dimension; no agent sees another's output and conflicting issues are
//! passed through as-is.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::error::Result;
use crate::llm::{AuditedLlm, CallContext, LLMRequest, ResponseFormat};
use crate::parsing::{JsonParser, ParseError};
use crate::prompt::{assemble, system_prompt, PromptContext, PromptInputs, PromptKind};
use crate::state::{QualityDimension, QualityReport, WorkflowState};

/// What an agent reviews
#[derive(Debug, Clone)]
pub struct ReviewContext {
    pub request_id: String,
    pub user_id: String,
    pub guideline_profile_id: Option<String>,
    pub topic: String,
    pub draft: Option<String>,
    pub prompt: PromptContext,
}

impl ReviewContext {
    pub fn from_state(state: &WorkflowState, prompt: PromptContext) -> Self {
        Self {
            request_id: state.request_id.clone(),
            user_id: state.user_id.clone(),
            guideline_profile_id: state.guideline_profile_id.clone(),
            topic: state.topic.clone(),
            draft: state.article_draft.as_ref().map(|d| d.final_article.clone()),
            prompt,
        }
    }

    /// The draft, unless missing or blank
    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref().filter(|d| !d.trim().is_empty())
    }
}

/// An independent scorer of one quality dimension
#[async_trait]
pub trait QualityAgent: Send + Sync {
    fn dimension(&self) -> QualityDimension;

    async fn score(&self, ctx: &ReviewContext) -> Result<QualityReport>;
}

#[derive(Debug, Deserialize)]
struct RawReview {
    score: serde_json::Value,
    #[serde(default, alias = "errors", alias = "violations")]
    issues: Vec<serde_json::Value>,
}

fn parse_review(parser: &JsonParser, raw: &str) -> Result<QualityReport> {
    let review: RawReview = parser.parse_as(raw)?;

    let score = match &review.score {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ParseError::MissingField("score".to_string()))?;

    let issues = review
        .issues
        .into_iter()
        .filter_map(|issue| match issue {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    Ok(QualityReport::new(score, issues))
}

/// LLM-backed reviewer for a single dimension
#[derive(Debug, Clone)]
pub struct ReviewAgent {
    dimension: QualityDimension,
    llm: AuditedLlm,
    config: GenerationConfig,
    parser: JsonParser,
}

impl ReviewAgent {
    fn new(dimension: QualityDimension, llm: AuditedLlm, config: GenerationConfig) -> Self {
        Self {
            dimension,
            llm,
            config,
            parser: JsonParser::new(),
        }
    }

    /// Brand consistency; needs brand guidelines
    pub fn brand(llm: AuditedLlm, config: GenerationConfig) -> Self {
        Self::new(QualityDimension::Brand, llm, config)
    }

    /// Fact accuracy; needs brand guidelines or retrieved brand material
    pub fn fact(llm: AuditedLlm, config: GenerationConfig) -> Self {
        Self::new(QualityDimension::Fact, llm, config)
    }

    /// Spelling and grammar; needs only the draft
    pub fn proofreading(llm: AuditedLlm, config: GenerationConfig) -> Self {
        Self::new(QualityDimension::Proofreading, llm, config)
    }

    /// Regulatory compliance; needs regulatory guidelines
    pub fn regulatory(llm: AuditedLlm, config: GenerationConfig) -> Self {
        Self::new(QualityDimension::Regulatory, llm, config)
    }

    fn endpoint(&self) -> &'static str {
        match self.dimension {
            QualityDimension::Brand => "checkBrandMatch",
            QualityDimension::Fact => "checkFactAccuracy",
            QualityDimension::Proofreading => "proofreadContent",
            QualityDimension::Regulatory => "checkRegulatoryCompliance",
        }
    }

    fn kind(&self) -> PromptKind {
        match self.dimension {
            QualityDimension::Brand => PromptKind::BrandReview,
            QualityDimension::Fact => PromptKind::FactReview,
            QualityDimension::Proofreading => PromptKind::Proofread,
            QualityDimension::Regulatory => PromptKind::RegulatoryReview,
        }
    }

    /// Whether there is anything to check the draft against
    fn has_reference(&self, ctx: &PromptContext) -> bool {
        match self.dimension {
            QualityDimension::Brand => ctx.has_brand_guidelines(),
            QualityDimension::Fact => ctx.has_brand_guidelines() || ctx.has_reference(),
            QualityDimension::Proofreading => true,
            QualityDimension::Regulatory => ctx.has_regulatory_guidelines(),
        }
    }
}

#[async_trait]
impl QualityAgent for ReviewAgent {
    fn dimension(&self) -> QualityDimension {
        self.dimension
    }

    async fn score(&self, ctx: &ReviewContext) -> Result<QualityReport> {
        let Some(draft) = ctx.draft() else {
            return Ok(QualityReport::pass());
        };
        if !self.has_reference(&ctx.prompt) {
            tracing::debug!(
                request_id = %ctx.request_id,
                dimension = %self.dimension,
                "No reference material; skipping review"
            );
            return Ok(QualityReport::pass());
        }

        let inputs = PromptInputs::new(&ctx.topic)
            .context(&ctx.prompt)
            .draft(draft)
            .max_context_chars(self.config.max_context_chars);
        let kind = self.kind();

        let mut request = LLMRequest::with_system_prompt(system_prompt(kind), assemble(kind, &inputs))
            .temperature(self.config.review_temperature)
            .max_tokens(self.config.review_max_tokens)
            .response_format(ResponseFormat::JsonObject);
        if let Some(model) = &self.config.review_model {
            request = request.model(model.clone());
        }

        let call = CallContext::new(
            &ctx.user_id,
            ctx.guideline_profile_id.as_deref(),
            self.endpoint(),
        );
        let response = self.llm.complete(&call, &request).await?;
        parse_review(&self.parser, &response.content)
    }
}

/// Runs every agent concurrently and merges by dimension
#[derive(Clone)]
pub struct QualityPanel {
    agents: Vec<Arc<dyn QualityAgent>>,
}

impl std::fmt::Debug for QualityPanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityPanel")
            .field(
                "dimensions",
                &self.agents.iter().map(|a| a.dimension()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl QualityPanel {
    pub fn new(agents: Vec<Arc<dyn QualityAgent>>) -> Self {
        Self { agents }
    }

    /// The four standard reviewers
    pub fn standard(llm: AuditedLlm, config: GenerationConfig) -> Self {
        Self::new(vec![
            Arc::new(ReviewAgent::brand(llm.clone(), config.clone())),
            Arc::new(ReviewAgent::fact(llm.clone(), config.clone())),
            Arc::new(ReviewAgent::proofreading(llm.clone(), config.clone())),
            Arc::new(ReviewAgent::regulatory(llm, config)),
        ])
    }

    /// Score the draft on every dimension.
    ///
    /// All agents run to completion; the first failure, if any, is
    /// returned.
    pub async fn review(
        &self,
        ctx: &ReviewContext,
    ) -> Result<BTreeMap<QualityDimension, QualityReport>> {
        let results = join_all(self.agents.iter().map(|agent| async move {
            (agent.dimension(), agent.score(ctx).await)
        }))
        .await;

        let mut reports = BTreeMap::new();
        for (dimension, result) in results {
            let report = result?;
            tracing::debug!(
                request_id = %ctx.request_id,
                dimension = %dimension,
                score = report.score,
                issues = report.issues.len(),
                "Quality review finished"
            );
            reports.insert(dimension, report);
        }
        Ok(reports)
    }
}
