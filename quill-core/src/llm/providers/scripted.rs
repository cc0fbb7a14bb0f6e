//! Scripted provider for deterministic offline runs
//!
//! Responses are picked by matching a marker substring against the request
//! messages, so concurrent callers (the QC panel) get the right answer
//! regardless of scheduling order. Each rule replays its responses in order
//! and keeps repeating the last one.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{QuillError, Result};
use crate::llm::{LLMProvider, LLMRequest, LLMResponse, ModelInfo};

/// A scripted reply
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this completion text
    Text(String),
    /// Fail as a non-retryable transport error with this message
    Failure(String),
}

impl From<&str> for ScriptedReply {
    fn from(s: &str) -> Self {
        ScriptedReply::Text(s.to_string())
    }
}

impl From<String> for ScriptedReply {
    fn from(s: String) -> Self {
        ScriptedReply::Text(s)
    }
}

struct Rule {
    marker: String,
    replies: VecDeque<ScriptedReply>,
}

/// LLM provider answering from a script
pub struct ScriptedProvider {
    rules: Mutex<Vec<Rule>>,
    fallback: Option<ScriptedReply>,
    call_count: AtomicUsize,
    history: Mutex<Vec<LLMRequest>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            fallback: None,
            call_count: AtomicUsize::new(0),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Answer requests containing `marker` with `replies`, in order
    pub fn on<R>(self, marker: impl Into<String>, replies: impl IntoIterator<Item = R>) -> Self
    where
        R: Into<ScriptedReply>,
    {
        self.lock_rules().push(Rule {
            marker: marker.into(),
            replies: replies.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Reply used when no rule matches
    pub fn fallback(mut self, reply: impl Into<ScriptedReply>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every request received so far
    pub fn history(&self) -> Vec<LLMRequest> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// Requests whose messages contain `marker`
    pub fn requests_matching(&self, marker: &str) -> Vec<LLMRequest> {
        self.history()
            .into_iter()
            .filter(|r| r.messages.iter().any(|m| m.content.contains(marker)))
            .collect()
    }

    fn lock_rules(&self) -> std::sync::MutexGuard<'_, Vec<Rule>> {
        match self.rules.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn next_reply(&self, request: &LLMRequest) -> Option<ScriptedReply> {
        let mut rules = self.lock_rules();
        let rule = rules.iter_mut().find(|rule| {
            request
                .messages
                .iter()
                .any(|m| m.content.contains(&rule.marker))
        });

        match rule {
            Some(rule) if rule.replies.len() > 1 => rule.replies.pop_front(),
            Some(rule) => rule.replies.front().cloned(),
            None => self.fallback.clone(),
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn generate_request(&self, request: &LLMRequest) -> Result<LLMResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut history) = self.history.lock() {
            history.push(request.clone());
        }

        match self.next_reply(request) {
            Some(ScriptedReply::Text(text)) => Ok(LLMResponse::text(text)),
            Some(ScriptedReply::Failure(message)) => {
                Err(QuillError::transport(None, message, false))
            }
            None => Err(QuillError::Configuration(
                "scripted provider has no reply for this request".to_string(),
            )),
        }
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "scripted".to_string(),
            model_name: "script".to_string(),
        }
    }
}
