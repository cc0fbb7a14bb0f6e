//! Prompt/context assembly
//!
//! [`assemble`] is a pure function of its inputs: the same [`PromptInputs`]
//! always produce the same prompt text. Optional context (guidelines, RAG
//! material, revision notes) is emitted as its own section only when
//! present, and each block is cut to `max_context_chars` before injection.

use crate::guidelines::truncate_chars;
use crate::state::{Concept, Subtopic};

/// Every generation prompt carries this rule
pub const ANTI_FABRICATION_RULE: &str = "Do not invent facts, statistics, quotes, studies or \
sources that are not present in the context provided. If the context does not support a claim, \
leave the claim out or phrase it as general guidance.";

/// Which prompt to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Concepts,
    Subtopics,
    Draft,
    BrandReview,
    FactReview,
    Proofread,
    RegulatoryReview,
}

impl PromptKind {
    pub fn is_generation(self) -> bool {
        matches!(
            self,
            PromptKind::Concepts | PromptKind::Subtopics | PromptKind::Draft
        )
    }
}

/// Role instruction sent as the system message for `kind`
pub fn system_prompt(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::Concepts => {
            "You are a content strategist who proposes distinct article concepts for marketing teams."
        }
        PromptKind::Subtopics => {
            "You are a content strategist who breaks an approved article concept into sections."
        }
        PromptKind::Draft => {
            "You are a senior copywriter who writes complete, publication-ready articles on brand."
        }
        PromptKind::BrandReview => {
            "You are a brand consistency reviewer who checks copy against brand guidelines."
        }
        PromptKind::FactReview => {
            "You are a fact-checking reviewer who verifies claims against reference material."
        }
        PromptKind::Proofread => {
            "You are a meticulous proofreader who finds spelling, grammar and clarity problems."
        }
        PromptKind::RegulatoryReview => {
            "You are a regulatory compliance reviewer who checks copy against regulatory rules."
        }
    }
}

/// Guideline and retrieved material shared by every prompt of one step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptContext {
    pub brand_guidelines: Option<String>,
    pub regulatory_guidelines: Option<String>,
    /// Past reviewer feedback for this tool
    pub feedback: Option<String>,
    /// Brand reference documents relevant to the topic
    pub reference: Option<String>,
}

impl PromptContext {
    /// Retrieved material as one block, `None` when nothing was found
    pub fn rag_context(&self) -> Option<String> {
        let mut blocks = Vec::new();
        if let Some(feedback) = present(&self.feedback) {
            blocks.push(format!("Past reviewer feedback:\n{}", feedback));
        }
        if let Some(reference) = present(&self.reference) {
            blocks.push(reference.to_string());
        }
        Some(blocks.join("\n\n")).filter(|b| !b.is_empty())
    }

    pub fn has_brand_guidelines(&self) -> bool {
        present(&self.brand_guidelines).is_some()
    }

    pub fn has_regulatory_guidelines(&self) -> bool {
        present(&self.regulatory_guidelines).is_some()
    }

    pub fn has_reference(&self) -> bool {
        present(&self.reference).is_some()
    }
}

/// Everything a prompt may draw on
#[derive(Debug, Clone)]
pub struct PromptInputs {
    pub topic: String,
    /// Pre-formatted brand guideline text
    pub brand_guidelines: Option<String>,
    /// Pre-formatted regulatory guideline text
    pub regulatory_guidelines: Option<String>,
    /// Retrieved feedback and brand reference material
    pub rag_context: Option<String>,
    pub concept: Option<Concept>,
    pub subtopics: Vec<Subtopic>,
    /// Draft under review
    pub draft: Option<String>,
    /// Issues raised against the previous draft
    pub prior_issues: Vec<String>,
    pub reviewer_feedback: Option<String>,
    /// Number of items requested from list-producing prompts
    pub count: usize,
    pub max_context_chars: usize,
}

impl Default for PromptInputs {
    fn default() -> Self {
        Self {
            topic: String::new(),
            brand_guidelines: None,
            regulatory_guidelines: None,
            rag_context: None,
            concept: None,
            subtopics: Vec::new(),
            draft: None,
            prior_issues: Vec::new(),
            reviewer_feedback: None,
            count: 5,
            max_context_chars: 4000,
        }
    }
}

impl PromptInputs {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    /// Copy guideline and retrieved material from `ctx`
    pub fn context(mut self, ctx: &PromptContext) -> Self {
        self.brand_guidelines = ctx.brand_guidelines.clone();
        self.regulatory_guidelines = ctx.regulatory_guidelines.clone();
        self.rag_context = ctx.rag_context();
        self
    }

    pub fn brand_guidelines(mut self, text: Option<String>) -> Self {
        self.brand_guidelines = text;
        self
    }

    pub fn regulatory_guidelines(mut self, text: Option<String>) -> Self {
        self.regulatory_guidelines = text;
        self
    }

    pub fn rag_context(mut self, text: Option<String>) -> Self {
        self.rag_context = text;
        self
    }

    pub fn concept(mut self, concept: Concept) -> Self {
        self.concept = Some(concept);
        self
    }

    pub fn subtopics(mut self, subtopics: Vec<Subtopic>) -> Self {
        self.subtopics = subtopics;
        self
    }

    pub fn draft(mut self, draft: impl Into<String>) -> Self {
        self.draft = Some(draft.into());
        self
    }

    pub fn prior_issues(mut self, issues: Vec<String>) -> Self {
        self.prior_issues = issues;
        self
    }

    pub fn reviewer_feedback(mut self, feedback: Option<String>) -> Self {
        self.reviewer_feedback = feedback;
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn max_context_chars(mut self, max: usize) -> Self {
        self.max_context_chars = max;
        self
    }

    pub fn has_topic(&self) -> bool {
        !self.topic.trim().is_empty()
    }
}

fn present(text: &Option<String>) -> Option<&str> {
    text.as_deref().map(str::trim).filter(|t| !t.is_empty())
}

struct Sections {
    parts: Vec<String>,
    max_chars: usize,
}

impl Sections {
    fn new(max_chars: usize) -> Self {
        Self {
            parts: Vec::new(),
            max_chars,
        }
    }

    fn raw(&mut self, heading: &str, body: impl AsRef<str>) {
        self.parts
            .push(format!("## {}\n{}", heading, body.as_ref().trim_end()));
    }

    /// Context block, cut to the character budget
    fn context(&mut self, heading: &str, body: Option<&str>) {
        if let Some(body) = body {
            let body = truncate_chars(body, self.max_chars);
            self.raw(heading, body);
        }
    }

    fn finish(self) -> String {
        self.parts.join("\n\n")
    }
}

fn concept_line(concept: &Concept) -> String {
    if concept.summary.trim().is_empty() {
        concept.title.trim().to_string()
    } else {
        format!("{}: {}", concept.title.trim(), concept.summary.trim())
    }
}

fn bullet_list<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items
        .into_iter()
        .map(|i| format!("- {}", i.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

const REVIEW_FORMAT: &str = "Respond with a single JSON object and nothing else: \
{\"score\": <integer 0-100>, \"issues\": [\"<one concrete issue per entry>\"]}. \
Use an empty issues array when you find nothing wrong.";

/// Build the user prompt for `kind`.
///
/// Never fails. A blank topic on a generation prompt produces a request
/// for clarification rather than an invented topic.
pub fn assemble(kind: PromptKind, inputs: &PromptInputs) -> String {
    let mut s = Sections::new(inputs.max_context_chars);

    if kind.is_generation() && !inputs.has_topic() {
        s.raw(
            "Task",
            "No topic was provided. Do not choose or invent a topic. Reply with one short \
             question asking the user what the article should be about.",
        );
        s.raw("Rules", format!("- {}", ANTI_FABRICATION_RULE));
        return s.finish();
    }

    if kind.is_generation() {
        s.raw("Topic", inputs.topic.trim());
    }
    s.context("Brand guidelines", present(&inputs.brand_guidelines));
    if kind.is_generation() || kind == PromptKind::RegulatoryReview {
        s.context(
            "Regulatory guidelines",
            present(&inputs.regulatory_guidelines),
        );
    }
    s.context("Reference material", present(&inputs.rag_context));

    match kind {
        PromptKind::Concepts => {
            s.raw(
                "Task",
                format!(
                    "Propose exactly {} distinct article concepts for the topic. Each concept \
                     needs a short title and a one or two sentence summary of the angle.",
                    inputs.count
                ),
            );
            s.raw("Output format", list_format(inputs.count));
        }
        PromptKind::Subtopics => {
            if let Some(concept) = &inputs.concept {
                s.raw("Approved concept", concept_line(concept));
            }
            s.raw(
                "Task",
                format!(
                    "Propose exactly {} subtopics that together structure an article on the \
                     approved concept. Each subtopic becomes one section.",
                    inputs.count
                ),
            );
            s.raw("Output format", list_format(inputs.count));
        }
        PromptKind::Draft => {
            if let Some(concept) = &inputs.concept {
                s.raw("Approved concept", concept_line(concept));
            }
            if !inputs.subtopics.is_empty() {
                let lines: Vec<String> = inputs
                    .subtopics
                    .iter()
                    .map(|st| {
                        if st.summary.trim().is_empty() {
                            st.title.trim().to_string()
                        } else {
                            format!("{}: {}", st.title.trim(), st.summary.trim())
                        }
                    })
                    .collect();
                s.raw("Sections", bullet_list(lines.iter().map(String::as_str)));
            }
            if !inputs.prior_issues.is_empty() {
                s.raw(
                    "Revision notes",
                    format!(
                        "The previous draft did not pass review. Fix every issue below.\n{}",
                        bullet_list(inputs.prior_issues.iter().map(String::as_str))
                    ),
                );
            }
            s.context("Reviewer feedback", present(&inputs.reviewer_feedback));
            s.raw(
                "Task",
                "Write the complete article, covering each section in order. Put the title on \
                 the first line as a markdown heading (`# Title`). Respond with the article text \
                 only.",
            );
        }
        PromptKind::BrandReview => {
            review_body(
                &mut s,
                inputs,
                "Score how well the article follows the brand guidelines: tone, voice, audience \
                 and terminology. List every deviation.",
            );
        }
        PromptKind::FactReview => {
            review_body(
                &mut s,
                inputs,
                "Score how well the article's factual claims are supported by the brand \
                 guidelines and reference material. List every claim that is unsupported or \
                 contradicted.",
            );
        }
        PromptKind::Proofread => {
            review_body(
                &mut s,
                inputs,
                "Score the article's spelling, grammar, punctuation and clarity. List every \
                 error with the corrected wording.",
            );
        }
        PromptKind::RegulatoryReview => {
            review_body(
                &mut s,
                inputs,
                "Score the article's compliance with the regulatory guidelines. List every \
                 statement that breaks a rule and name the rule.",
            );
        }
    }

    if kind.is_generation() {
        s.raw("Rules", format!("- {}", ANTI_FABRICATION_RULE));
    }

    s.finish()
}

fn list_format(count: usize) -> String {
    format!(
        "Respond with a JSON array of exactly {} objects and nothing else, no prose and no \
         code fences: [{{\"title\": \"...\", \"summary\": \"...\"}}]",
        count
    )
}

fn review_body(s: &mut Sections, inputs: &PromptInputs, task: &str) {
    s.raw("Article", inputs.draft.as_deref().unwrap_or_default());
    s.raw("Task", task);
    s.raw("Output format", REVIEW_FORMAT);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept() -> Concept {
        Concept {
            id: "c1".to_string(),
            title: "AI triage".to_string(),
            summary: "How triage tools shorten waits".to_string(),
            rank_order: 1,
        }
    }

    #[test]
    fn test_deterministic() {
        let inputs = PromptInputs::new("AI in healthcare")
            .brand_guidelines(Some("Tone: warm".to_string()))
            .rag_context(Some("Clinic handbook".to_string()));
        assert_eq!(
            assemble(PromptKind::Concepts, &inputs),
            assemble(PromptKind::Concepts, &inputs)
        );
    }

    #[test]
    fn test_missing_context_omits_sections() {
        let prompt = assemble(PromptKind::Concepts, &PromptInputs::new("AI in healthcare"));
        assert!(prompt.contains("## Topic\nAI in healthcare"));
        assert!(!prompt.contains("Brand guidelines"));
        assert!(!prompt.contains("Regulatory guidelines"));
        assert!(!prompt.contains("Reference material"));
        assert!(prompt.contains("exactly 5"));
    }

    #[test]
    fn test_blank_topic_requests_clarification() {
        let prompt = assemble(PromptKind::Concepts, &PromptInputs::new("   "));
        assert!(prompt.contains("Do not choose or invent a topic"));
        assert!(prompt.contains(ANTI_FABRICATION_RULE));
        assert!(!prompt.contains("JSON array"));
    }

    #[test]
    fn test_generation_prompts_carry_anti_fabrication_rule() {
        let inputs = PromptInputs::new("AI in healthcare").concept(concept());
        for kind in [PromptKind::Concepts, PromptKind::Subtopics, PromptKind::Draft] {
            assert!(assemble(kind, &inputs).contains(ANTI_FABRICATION_RULE));
        }
    }

    #[test]
    fn test_context_is_truncated() {
        let inputs = PromptInputs::new("topic")
            .rag_context(Some("x".repeat(50)))
            .max_context_chars(10);
        let prompt = assemble(PromptKind::Concepts, &inputs);
        assert!(prompt.contains(&format!("## Reference material\n{}…", "x".repeat(10))));
        assert!(!prompt.contains(&"x".repeat(11)));
    }

    #[test]
    fn test_draft_includes_revision_notes_only_on_regeneration() {
        let base = PromptInputs::new("AI in healthcare").concept(concept());
        let first = assemble(PromptKind::Draft, &base);
        assert!(!first.contains("Revision notes"));

        let retry = base
            .prior_issues(vec!["Tone too casual".to_string()])
            .reviewer_feedback(Some("Cite the handbook".to_string()));
        let prompt = assemble(PromptKind::Draft, &retry);
        assert!(prompt.contains("- Tone too casual"));
        assert!(prompt.contains("## Reviewer feedback\nCite the handbook"));
    }

    #[test]
    fn test_review_prompts_embed_draft_and_format() {
        let inputs = PromptInputs::new("t").draft("Hello wrold");
        let prompt = assemble(PromptKind::Proofread, &inputs);
        assert!(prompt.contains("## Article\nHello wrold"));
        assert!(prompt.contains("\"score\""));
        assert!(!prompt.contains("## Topic"));
    }

    #[test]
    fn test_regulatory_section_only_for_regulatory_review() {
        let inputs = PromptInputs::new("t")
            .draft("text")
            .regulatory_guidelines(Some("No cure claims".to_string()));
        assert!(!assemble(PromptKind::BrandReview, &inputs).contains("No cure claims"));
        assert!(assemble(PromptKind::RegulatoryReview, &inputs).contains("No cure claims"));
    }

    #[test]
    fn test_context_combines_feedback_and_reference() {
        let ctx = PromptContext {
            feedback: Some("- Shorter intros".to_string()),
            reference: Some("Clinic handbook".to_string()),
            ..Default::default()
        };
        let inputs = PromptInputs::new("topic").context(&ctx);
        let rag = inputs.rag_context.unwrap();
        assert!(rag.starts_with("Past reviewer feedback:\n- Shorter intros"));
        assert!(rag.ends_with("Clinic handbook"));

        assert!(PromptContext::default().rag_context().is_none());
    }

    #[test]
    fn test_system_prompts_are_distinct() {
        let kinds = [
            PromptKind::Concepts,
            PromptKind::Subtopics,
            PromptKind::Draft,
            PromptKind::BrandReview,
            PromptKind::FactReview,
            PromptKind::Proofread,
            PromptKind::RegulatoryReview,
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().map(|k| system_prompt(*k)).collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
