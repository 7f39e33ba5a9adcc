//! Reasoning and synthesis provider interfaces.
//!
//! The engine consumes two external model providers through narrow traits:
//! a reasoning provider (turn content, shadow scoring, report narration) and
//! a speech-synthesis provider. HTTP implementations target the Gemini and
//! Cartesia APIs; `mock` supplies scripted in-process stand-ins for tests
//! and offline runs.
//!
//! ## Example
//!
//! ```rust,ignore
//! use viva_core::providers::{GeminiClient, ProviderConfig, ReasoningProvider, ReasoningRequest};
//!
//! let client = GeminiClient::new(ProviderConfig::new("api-key"));
//! let reply = client
//!     .generate(ReasoningRequest::new("Ask the candidate an opening question"))
//!     .await?;
//! ```

mod client;
pub mod mock;
mod types;

pub use client::{CartesiaClient, GeminiClient, ProviderConfig};
pub use types::{AudioHandle, ReasoningRequest};

use async_trait::async_trait;

use crate::error::ProviderResult;

/// Text-generation provider used for turn content, scoring, and summaries.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    /// Generate a completion for the request.
    async fn generate(&self, request: ReasoningRequest) -> ProviderResult<String>;

    /// Provider name used in error reports and spans.
    fn name(&self) -> &str;
}

/// Speech-synthesis provider.
#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    /// Render `text` with the given voice and return a handle to the audio.
    async fn speak(&self, text: &str, voice: &str) -> ProviderResult<AudioHandle>;

    /// Provider name used in error reports and spans.
    fn name(&self) -> &str;
}
