//! # Quill - Human-in-the-Loop Content Writer
//!
//! Quill turns a topic into a reviewed article through a resumable,
//! multi-step pipeline:
//! - Concept and subtopic ideation by a text-generation service
//! - Approval gates that suspend the workflow until a human decides
//! - Article drafting grounded in brand and regulatory guidelines
//! - Parallel quality review (brand, facts, proofreading, regulatory)
//! - Bounded automatic regeneration, then human review
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quill_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = QuillConfig::load()?;
//!     let workflow = ContentWorkflow::builder()
//!         .provider(LLMProviderFactory::create(&config.llm, &config.retry)?)
//!         .config(&config)
//!         .build()?;
//!
//!     let report = workflow
//!         .start(ContentRequest::new("AI in healthcare", "user-1"))
//!         .await?;
//!     println!("{}", report.summary());
//!
//!     // Later, possibly in another process sharing the same store
//!     let report = workflow
//!         .resume(
//!             &report.request_id,
//!             HumanDecision::SelectConcept { concept_id: "c1".to_string() },
//!         )
//!         .await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Prompt assembly** ([`prompt`]): deterministic prompt text per step
//! - **Generation** ([`generation`]): concept, subtopic and draft steps
//! - **Quality** ([`quality`]): QC agents run concurrently over a draft
//! - **Policy** ([`policy`]): regenerate, ask a human, or finish
//! - **Workflow** ([`workflow`]): graph, gates and the suspend/resume engine
//! - **Store** ([`store`]): durable state keyed by request id

pub mod config;
pub mod error;
pub mod gate;
pub mod generation;
pub mod guidelines;
pub mod llm;
pub mod parsing;
pub mod policy;
pub mod prompt;
pub mod quality;
pub mod retrieval;
pub mod state;
pub mod store;
pub mod workflow;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{
        GenerationConfig, LLMProvider as LLMProviderType, LLMProviderConfig, PolicyConfig,
        QuillConfig, StoreConfig,
    };
    pub use crate::error::{QuillError, Result};
    pub use crate::gate::{Candidates, ReviewOption, SuspendPayload};
    pub use crate::generation::ContentGenerator;
    pub use crate::guidelines::{
        BrandGuidelineContent, GuidelineContent, GuidelineProfile, GuidelineStore,
        InMemoryGuidelineStore,
    };
    pub use crate::llm::{
        AuditedLlm, LLMProvider, LLMProviderFactory, LLMRequest, LLMResponse, Message,
        MessageRole, RetryConfig,
    };
    pub use crate::parsing::{JsonParser, OutputParser, ParseError};
    pub use crate::policy::RegenerationPolicy;
    pub use crate::prompt::{PromptContext, PromptInputs, PromptKind};
    pub use crate::quality::{QualityAgent, QualityPanel, ReviewAgent, ReviewContext};
    pub use crate::retrieval::{
        BrandContextOptions, ContextRetriever, InMemoryRetriever, NoopRetriever,
    };
    pub use crate::state::{
        ArticleDraft, Concept, PolicyDecision, QualityDimension, QualityReport, ReviewDecision,
        StatePatch, Subtopic, WorkflowState, WorkflowStatus, WorkflowStep,
    };
    pub use crate::store::{FileJobStore, JobStore, MemoryJobStore};
    pub use crate::workflow::{
        ContentRequest, ContentWorkflow, ContentWorkflowBuilder, HumanDecision, WorkflowReport,
    };
}
