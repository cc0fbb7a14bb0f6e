//! Generation step functions
//!
//! Each step reads a slice of [`WorkflowState`], makes one audited call to
//! the text-generation service, and returns a [`StatePatch`]. Steps never
//! touch routing: the engine decides where the workflow goes next.

use chrono::Utc;
use serde::Deserialize;

use crate::config::GenerationConfig;
use crate::error::{QuillError, Result};
use crate::llm::{AuditedLlm, CallContext, LLMRequest};
use crate::parsing::{strip_code_fences, JsonParser, ParseError};
use crate::prompt::{assemble, system_prompt, PromptContext, PromptInputs, PromptKind};
use crate::state::{ArticleDraft, Concept, StatePatch, Subtopic, WorkflowState};

/// Endpoint tag for concept generation calls
pub const ENDPOINT_CONCEPTS: &str = "generateConcepts";
/// Endpoint tag for subtopic generation calls
pub const ENDPOINT_SUBTOPICS: &str = "generateSubtopics";
/// Endpoint tag for draft generation calls
pub const ENDPOINT_DRAFT: &str = "generateDraft";

#[derive(Debug, Deserialize)]
struct ListItem {
    #[serde(default, alias = "name", alias = "heading")]
    title: String,
    #[serde(default, alias = "description")]
    summary: String,
}

/// Runs the three generation steps against one provider
#[derive(Debug, Clone)]
pub struct ContentGenerator {
    llm: AuditedLlm,
    config: GenerationConfig,
    parser: JsonParser,
}

impl ContentGenerator {
    pub fn new(llm: AuditedLlm, config: GenerationConfig) -> Self {
        Self {
            llm,
            config,
            parser: JsonParser::new(),
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    fn call_context(state: &WorkflowState, endpoint: &str) -> CallContext {
        CallContext::new(
            &state.user_id,
            state.guideline_profile_id.as_deref(),
            endpoint,
        )
    }

    fn inputs(&self, state: &WorkflowState, ctx: &PromptContext) -> PromptInputs {
        PromptInputs::new(&state.topic)
            .context(ctx)
            .max_context_chars(self.config.max_context_chars)
    }

    async fn ideate(
        &self,
        state: &WorkflowState,
        kind: PromptKind,
        endpoint: &str,
        inputs: PromptInputs,
    ) -> Result<String> {
        let call = Self::call_context(state, endpoint);
        let request = LLMRequest::with_system_prompt(system_prompt(kind), assemble(kind, &inputs))
            .temperature(self.config.ideation_temperature);
        let response = self.llm.complete(&call, &request).await?;

        if !inputs.has_topic() {
            return Err(QuillError::InvalidInput(format!(
                "topic is empty; clarification requested: {}",
                response.content.trim()
            )));
        }
        Ok(response.content)
    }

    /// Parse a `[{title, summary}]` list, keeping at most `max` entries
    fn parse_items(&self, raw: &str, max: usize) -> Result<Vec<ListItem>> {
        let values = self.parser.parse_array(raw)?;
        if values.is_empty() {
            return Err(ParseError::UnexpectedShape {
                expected: "non-empty array".to_string(),
                actual: "empty array".to_string(),
            }
            .into());
        }

        let mut items = Vec::with_capacity(values.len().min(max));
        for value in values.into_iter().take(max) {
            let item: ListItem = serde_json::from_value(value)
                .map_err(|e| ParseError::InvalidFormat(e.to_string()))?;
            if item.title.trim().is_empty() {
                return Err(ParseError::MissingField("title".to_string()).into());
            }
            items.push(ListItem {
                title: item.title.trim().to_string(),
                summary: item.summary.trim().to_string(),
            });
        }

        if items.len() < max {
            tracing::warn!(requested = max, received = items.len(), "Model returned fewer items than requested");
        }
        Ok(items)
    }

    /// Generate concepts for the topic.
    ///
    /// Every concept gets a fresh id, so any earlier selection and every
    /// downstream subtopic is invalidated.
    pub async fn generate_concepts(
        &self,
        state: &WorkflowState,
        ctx: &PromptContext,
    ) -> Result<StatePatch> {
        let count = self.config.concept_count;
        let inputs = self.inputs(state, ctx).count(count);
        let raw = self
            .ideate(state, PromptKind::Concepts, ENDPOINT_CONCEPTS, inputs)
            .await?;

        let concepts: Vec<Concept> = self
            .parse_items(&raw, count)?
            .into_iter()
            .zip(1..)
            .map(|(item, rank)| Concept {
                id: uuid::Uuid::new_v4().to_string(),
                title: item.title,
                summary: item.summary,
                rank_order: rank,
            })
            .collect();

        tracing::info!(request_id = %state.request_id, count = concepts.len(), "Generated concepts");

        Ok(StatePatch::new()
            .concepts(concepts)
            .selected_concept(None)
            .subtopics(Vec::new())
            .selected_subtopics(Vec::new()))
    }

    /// Generate subtopics for the approved concept
    pub async fn generate_subtopics(
        &self,
        state: &WorkflowState,
        ctx: &PromptContext,
    ) -> Result<StatePatch> {
        let concept = state
            .selected_concept()
            .cloned()
            .ok_or_else(|| QuillError::InvalidInput("no approved concept".to_string()))?;

        let count = self.config.subtopic_count;
        let inputs = self.inputs(state, ctx).concept(concept.clone()).count(count);
        let raw = self
            .ideate(state, PromptKind::Subtopics, ENDPOINT_SUBTOPICS, inputs)
            .await?;

        let subtopics: Vec<Subtopic> = self
            .parse_items(&raw, count)?
            .into_iter()
            .zip(1..)
            .map(|(item, rank)| Subtopic {
                id: uuid::Uuid::new_v4().to_string(),
                concept_id: concept.id.clone(),
                title: item.title,
                summary: item.summary,
                rank_order: rank,
            })
            .collect();

        tracing::info!(request_id = %state.request_id, concept_id = %concept.id, count = subtopics.len(), "Generated subtopics");

        Ok(StatePatch::new()
            .subtopics(subtopics)
            .selected_subtopics(Vec::new()))
    }

    /// Write (or rewrite) the article.
    ///
    /// On a rewrite the previous review issues and any reviewer feedback are
    /// fed into the prompt. The draft replaces the previous one and clears
    /// the final review decision.
    pub async fn generate_draft(
        &self,
        state: &WorkflowState,
        ctx: &PromptContext,
    ) -> Result<StatePatch> {
        let concept = state
            .selected_concept()
            .cloned()
            .ok_or_else(|| QuillError::InvalidInput("no approved concept".to_string()))?;
        let subtopics: Vec<Subtopic> = state.selected_subtopics().into_iter().cloned().collect();
        if subtopics.is_empty() {
            return Err(QuillError::InvalidInput("no approved subtopics".to_string()));
        }

        let previous = state.article_draft.as_ref();
        let prior_issues = if previous.is_some() {
            previous_issues(state)
        } else {
            Vec::new()
        };

        let inputs = self
            .inputs(state, ctx)
            .concept(concept.clone())
            .subtopics(subtopics)
            .prior_issues(prior_issues)
            .reviewer_feedback(state.metadata.reviewer_feedback.clone());

        let call = Self::call_context(state, ENDPOINT_DRAFT);
        let request = LLMRequest::with_system_prompt(
            system_prompt(PromptKind::Draft),
            assemble(PromptKind::Draft, &inputs),
        )
        .temperature(self.config.draft_temperature)
        .max_tokens(self.config.draft_max_tokens);
        let response = self.llm.complete(&call, &request).await?;

        let text = strip_code_fences(&response.content);
        if text.is_empty() {
            return Err(ParseError::EmptyInput.into());
        }

        let revision = previous.map(|d| d.revision + 1).unwrap_or(1);
        let draft = ArticleDraft {
            final_article: text.to_string(),
            title: draft_title(text).unwrap_or_else(|| concept.title.clone()),
            word_count: word_count(text),
            revision,
            generated_at: Utc::now(),
        };

        tracing::info!(
            request_id = %state.request_id,
            revision,
            word_count = draft.word_count,
            "Generated article draft"
        );

        Ok(StatePatch::new()
            .article_draft(draft)
            .final_decision(None)
            .reviewer_feedback(None))
    }
}

/// Issues from the last review round, tagged by dimension
fn previous_issues(state: &WorkflowState) -> Vec<String> {
    state
        .metadata
        .reviews
        .iter()
        .flat_map(|(dimension, report)| {
            report
                .issues
                .iter()
                .map(move |issue| format!("[{}] {}", dimension, issue))
        })
        .collect()
}

/// Words in the article, ignoring markdown heading markers
fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| !w.chars().all(|c| c == '#'))
        .count()
}

/// Title from a leading markdown heading
fn draft_title(text: &str) -> Option<String> {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let title = first.strip_prefix('#')?.trim_start_matches('#').trim();
    Some(title.to_string()).filter(|t| !t.is_empty())
}
