//! LLM provider implementations

#[cfg(feature = "llm-openai")]
pub mod openai;

#[cfg(feature = "llm-openai")]
pub use openai::OpenAIProvider;

pub mod scripted;

pub use scripted::ScriptedProvider;
