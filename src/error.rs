//! Error types for viva-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using viva-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Whether a provider failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Network failure, timeout, overload — a retry with the same payload may succeed
    Transient,
    /// Malformed request, auth failure, quota exhaustion — retrying cannot help
    Permanent,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// A failure from a reasoning or synthesis provider call.
///
/// The kind drives the retry/degrade policy centrally: transient errors are
/// retried once by the turn pipeline, permanent errors fail the step
/// immediately.
#[derive(Error, Debug, Clone)]
#[error("{provider} provider error ({kind}): {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    /// Create a transient (retryable) provider error.
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind: ProviderErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Create a permanent (non-retryable) provider error.
    pub fn permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind: ProviderErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Create a timeout error (always transient).
    pub fn timeout(provider: impl Into<String>, duration_ms: u64) -> Self {
        Self::transient(provider, format!("timed out after {}ms", duration_ms))
    }

    /// Check whether a retry with the identical payload is permitted.
    pub fn is_transient(&self) -> bool {
        self.kind == ProviderErrorKind::Transient
    }
}

/// Errors that can occur during interview orchestration.
#[derive(Error, Debug)]
pub enum Error {
    /// Stage identifier not present in the catalog
    #[error("unknown stage: {stage_id}")]
    UnknownStage { stage_id: String },

    /// Malformed stage configuration (empty rubric, inverted tier bounds, ...)
    #[error("stage configuration error: {0}")]
    Composition(String),

    /// Reasoning or synthesis provider failure
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// `start()` called on a session that already left NotStarted
    #[error("session already started")]
    AlreadyStarted,

    /// Operation requires a started session
    #[error("session not started")]
    NotStarted,

    /// Session reached a terminal state and accepts no further operations
    #[error("session is closed ({status})")]
    SessionClosed { status: String },

    /// A concurrent `submit_utterance` is already running for this session
    #[error("a turn is already in progress for this session")]
    TurnInProgress,

    /// In-flight turn cancelled by `abandon()`
    #[error("turn cancelled: session abandoned")]
    Cancelled,

    /// Shadow analysis failure; swallowed at the analyzer boundary
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Persistence failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an unknown-stage error.
    pub fn unknown_stage(stage_id: impl Into<String>) -> Self {
        Self::UnknownStage {
            stage_id: stage_id.into(),
        }
    }

    /// Create a stage configuration error.
    pub fn composition(message: impl Into<String>) -> Self {
        Self::Composition(message.into())
    }

    /// Create a session-closed error for the given terminal status.
    pub fn session_closed(status: impl Into<String>) -> Self {
        Self::SessionClosed {
            status: status.into(),
        }
    }

    /// Create an analysis error.
    pub fn analysis(message: impl Into<String>) -> Self {
        Self::Analysis(message.into())
    }
}
