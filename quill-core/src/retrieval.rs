//! Retrieval-augmented context
//!
//! Two kinds of material are injected into prompts: historical reviewer
//! feedback for a tool, and brand reference documents relevant to a query.
//! Retrieval is best-effort. [`RetrievalGuard`] turns any retriever failure
//! into an empty string so a RAG outage never fails a pipeline step.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::guidelines::truncate_chars;

/// Tool name under which content-writer feedback is filed
pub const CONTENT_WRITER_TOOL: &str = "content_writer";

/// Options for brand-context lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandContextOptions {
    /// Maximum number of documents to include
    pub limit: usize,
    /// Character budget for the joined result
    pub max_chars: usize,
}

impl Default for BrandContextOptions {
    fn default() -> Self {
        Self {
            limit: 3,
            max_chars: 4000,
        }
    }
}

/// Source of retrieved context. Misses return `""`.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Past reviewer feedback for `tool_name`
    async fn retrieve_feedback(
        &self,
        user_id: &str,
        tool_name: &str,
        profile_id: Option<&str>,
    ) -> Result<String>;

    /// Brand reference material relevant to `query`
    async fn get_brand_context(
        &self,
        user_id: &str,
        profile_id: &str,
        query: &str,
        opts: &BrandContextOptions,
    ) -> Result<String>;
}

/// Retriever that never finds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRetriever;

#[async_trait]
impl ContextRetriever for NoopRetriever {
    async fn retrieve_feedback(&self, _: &str, _: &str, _: Option<&str>) -> Result<String> {
        Ok(String::new())
    }

    async fn get_brand_context(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: &BrandContextOptions,
    ) -> Result<String> {
        Ok(String::new())
    }
}

/// A stored piece of reviewer feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub user_id: String,
    pub tool_name: String,
    pub profile_id: Option<String>,
    pub text: String,
}

/// A stored brand reference document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandDocument {
    pub user_id: String,
    pub profile_id: String,
    pub text: String,
}

/// Keyword-overlap retriever over in-memory documents
#[derive(Debug, Default)]
pub struct InMemoryRetriever {
    feedback: RwLock<Vec<FeedbackEntry>>,
    documents: RwLock<Vec<BrandDocument>>,
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_feedback(&self, entry: FeedbackEntry) {
        self.feedback.write().await.push(entry);
    }

    pub async fn add_document(&self, document: BrandDocument) {
        self.documents.write().await.push(document);
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl ContextRetriever for InMemoryRetriever {
    async fn retrieve_feedback(
        &self,
        user_id: &str,
        tool_name: &str,
        profile_id: Option<&str>,
    ) -> Result<String> {
        let feedback = self.feedback.read().await;
        let lines: Vec<String> = feedback
            .iter()
            .filter(|f| f.user_id == user_id && f.tool_name == tool_name)
            .filter(|f| match (profile_id, f.profile_id.as_deref()) {
                (Some(wanted), Some(have)) => wanted == have,
                _ => true,
            })
            .map(|f| format!("- {}", f.text.trim()))
            .collect();
        Ok(lines.join("\n"))
    }

    async fn get_brand_context(
        &self,
        user_id: &str,
        profile_id: &str,
        query: &str,
        opts: &BrandContextOptions,
    ) -> Result<String> {
        let wanted = keywords(query);
        let documents = self.documents.read().await;

        let mut scored: Vec<(usize, &BrandDocument)> = documents
            .iter()
            .filter(|d| d.user_id == user_id && d.profile_id == profile_id)
            .map(|d| (keywords(&d.text).intersection(&wanted).count(), d))
            .filter(|(score, _)| *score > 0)
            .collect();
        // Stable sort keeps insertion order among ties
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let joined = scored
            .into_iter()
            .take(opts.limit)
            .map(|(_, d)| d.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(truncate_chars(&joined, opts.max_chars))
    }
}

/// Wraps a retriever so failures degrade to empty context
#[derive(Clone)]
pub struct RetrievalGuard {
    inner: Arc<dyn ContextRetriever>,
}

impl std::fmt::Debug for RetrievalGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalGuard").finish_non_exhaustive()
    }
}

impl RetrievalGuard {
    pub fn new(inner: Arc<dyn ContextRetriever>) -> Self {
        Self { inner }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopRetriever))
    }

    pub async fn feedback(&self, user_id: &str, tool_name: &str, profile_id: Option<&str>) -> String {
        match self
            .inner
            .retrieve_feedback(user_id, tool_name, profile_id)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(user_id, tool_name, error = %e, "Feedback retrieval failed; continuing without it");
                String::new()
            }
        }
    }

    pub async fn brand_context(
        &self,
        user_id: &str,
        profile_id: &str,
        query: &str,
        opts: &BrandContextOptions,
    ) -> String {
        match self
            .inner
            .get_brand_context(user_id, profile_id, query, opts)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(user_id, profile_id, error = %e, "Brand context retrieval failed; continuing without it");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuillError;

    struct FailingRetriever;

    #[async_trait]
    impl ContextRetriever for FailingRetriever {
        async fn retrieve_feedback(&self, _: &str, _: &str, _: Option<&str>) -> Result<String> {
            Err(QuillError::Other("rag down".to_string()))
        }

        async fn get_brand_context(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &BrandContextOptions,
        ) -> Result<String> {
            Err(QuillError::Other("rag down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_guard_degrades_to_empty() {
        let guard = RetrievalGuard::new(Arc::new(FailingRetriever));
        assert_eq!(guard.feedback("u", CONTENT_WRITER_TOOL, None).await, "");
        assert_eq!(
            guard
                .brand_context("u", "p", "query", &BrandContextOptions::default())
                .await,
            ""
        );
    }

    #[tokio::test]
    async fn test_feedback_is_scoped_to_user_and_tool() {
        let retriever = InMemoryRetriever::new();
        retriever
            .add_feedback(FeedbackEntry {
                user_id: "alice".to_string(),
                tool_name: CONTENT_WRITER_TOOL.to_string(),
                profile_id: None,
                text: "Shorter intros please".to_string(),
            })
            .await;
        retriever
            .add_feedback(FeedbackEntry {
                user_id: "bob".to_string(),
                tool_name: CONTENT_WRITER_TOOL.to_string(),
                profile_id: None,
                text: "More emojis".to_string(),
            })
            .await;

        let text = retriever
            .retrieve_feedback("alice", CONTENT_WRITER_TOOL, Some("p1"))
            .await
            .unwrap();
        assert_eq!(text, "- Shorter intros please");
    }

    #[tokio::test]
    async fn test_brand_context_ranks_by_overlap() {
        let retriever = InMemoryRetriever::new();
        for text in [
            "Our clinics serve rural patients.",
            "Healthcare AI triage cuts waiting times for patients.",
            "Quarterly revenue grew.",
        ] {
            retriever
                .add_document(BrandDocument {
                    user_id: "alice".to_string(),
                    profile_id: "p1".to_string(),
                    text: text.to_string(),
                })
                .await;
        }

        let opts = BrandContextOptions {
            limit: 1,
            max_chars: 4000,
        };
        let text = retriever
            .get_brand_context("alice", "p1", "AI in healthcare for patients", &opts)
            .await
            .unwrap();
        assert!(text.starts_with("Healthcare AI triage"));

        let none = retriever
            .get_brand_context("alice", "p1", "zzz", &opts)
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
