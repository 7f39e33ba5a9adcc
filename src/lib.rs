//! # viva-core
//!
//! A live AI interview orchestration library: one session per interview
//! room, each conversational turn driven through reasoning and speech
//! synthesis, with off-path competency scoring, adaptive difficulty, and a
//! final evaluation report.
//!
//! ## Core Components
//!
//! - **Catalog**: immutable stage configuration (rubrics, tier bounds, question pools)
//! - **Prompt**: deterministic per-turn prompt composition
//! - **Pipeline**: the Transcribed → Reasoned → Synthesized → Delivered turn machine
//! - **Shadow**: fire-and-forget competency scoring of completed turns
//! - **Difficulty**: rolling-window tier adaptation with hysteresis
//! - **Session**: the single-writer session controller and engine facade
//! - **Report**: post-session reduction into an evaluation report
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use viva_core::{
//!     CartesiaClient, GeminiClient, InterviewEngine, ProviderConfig, ProviderSet,
//!     SessionConfig,
//! };
//!
//! let providers = ProviderSet::new(
//!     Arc::new(GeminiClient::new(ProviderConfig::new(gemini_key))),
//!     Arc::new(CartesiaClient::new(ProviderConfig::new(cartesia_key))),
//! );
//! let engine = InterviewEngine::new(providers);
//!
//! let session = engine.create_session(SessionConfig::new("cand-42", "Backend Engineer"))?;
//! session.start().await?;
//! let turn = session.submit_utterance("I spent five years on payments infra").await?;
//! println!("{}", turn.reply.unwrap_or_default());
//! let report = session.finalize().await?;
//! ```

pub mod catalog;
pub mod difficulty;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod report;
pub mod session;
pub mod shadow;
pub mod store;
pub mod trace;

// Re-exports for convenience
pub use catalog::{
    DifficultyTier, RubricDimension, StageCatalog, StageConfig, StageId, TerminationRule,
};
pub use difficulty::{DifficultyConfig, DifficultyController, DifficultyState};
pub use error::{Error, ProviderError, ProviderErrorKind, ProviderResult, Result};
pub use pipeline::{PipelineConfig, Turn, TurnPhase, TurnPipeline, TurnStatus};
pub use prompt::{ComposerConfig, PromptComposer, PromptPayload};
pub use providers::{
    AudioHandle, CartesiaClient, GeminiClient, ProviderConfig, ReasoningProvider,
    ReasoningRequest, SynthesisProvider,
};
pub use report::{
    AggregatorConfig, DimensionSummary, EvaluationAggregator, EvaluationReport,
};
pub use session::{
    EngineConfig, InterviewEngine, ProviderSet, Session, SessionConfig, SessionController,
    SessionId, SessionSnapshot, SessionStatus,
};
pub use shadow::{
    CompetencyLevel, CompetencyScore, DimensionScore, ShadowAnalyzer, ShadowConfig,
};
pub use store::{MemoryStore, NullStore, SessionStore};
pub use trace::{LogSink, NullSink, SessionSpan, TraceSink, TurnSpan};
