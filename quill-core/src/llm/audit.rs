//! Audited text-generation calls
//!
//! Every completion the pipeline requests is logged with who asked for it
//! (`user_id`), under which brand profile (`guideline_profile_id`), and from
//! which pipeline step (`endpoint`), along with latency and token usage.

use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;

use super::{LLMProvider, LLMRequest, LLMResponse};

/// Caller metadata attached to a completion for observability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub user_id: String,
    pub guideline_profile_id: Option<String>,
    pub endpoint: String,
}

impl CallContext {
    pub fn new(
        user_id: impl Into<String>,
        guideline_profile_id: Option<&str>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            guideline_profile_id: guideline_profile_id.map(str::to_string),
            endpoint: endpoint.into(),
        }
    }
}

/// Provider wrapper that logs every call
#[derive(Clone)]
pub struct AuditedLlm {
    provider: Arc<dyn LLMProvider>,
}

impl std::fmt::Debug for AuditedLlm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.provider.model_info();
        f.debug_struct("AuditedLlm")
            .field("provider", &info.provider)
            .field("model", &info.model_name)
            .finish()
    }
}

impl AuditedLlm {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    /// Send a request and log the outcome
    pub async fn complete(&self, ctx: &CallContext, request: &LLMRequest) -> Result<LLMResponse> {
        let start = Instant::now();
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.provider.model_info().model_name);
        let profile = ctx.guideline_profile_id.as_deref().unwrap_or("-");

        let result = self.provider.generate_request(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                tracing::info!(
                    user_id = %ctx.user_id,
                    guideline_profile_id = %profile,
                    endpoint = %ctx.endpoint,
                    model = %model,
                    duration_ms,
                    total_tokens = response.usage.map(|u| u.total_tokens).unwrap_or(0),
                    response_chars = response.content.len(),
                    "Text generation succeeded"
                );
            }
            Err(e) => {
                tracing::error!(
                    user_id = %ctx.user_id,
                    guideline_profile_id = %profile,
                    endpoint = %ctx.endpoint,
                    model = %model,
                    duration_ms,
                    error = %e,
                    "Text generation failed"
                );
            }
        }

        result
    }
}
