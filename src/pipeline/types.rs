//! Turn record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::StageId;
use crate::providers::AudioHandle;

/// Terminal outcome of a conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// A reply reached the candidate (with or without audio)
    Delivered,
    /// The reasoning step failed persistently; a placeholder was recorded
    Failed,
    /// The turn was cancelled mid-flight by session abandonment
    Skipped,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Steps of the per-turn state machine, recorded in spans so a failure
/// names the step it died in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    AwaitingInput,
    Transcribed,
    Reasoned,
    Synthesized,
    Delivered,
    Failed,
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingInput => "awaiting_input",
            Self::Transcribed => "transcribed",
            Self::Reasoned => "reasoned",
            Self::Synthesized => "synthesized",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One candidate-utterance-to-response cycle.
///
/// Turns are created by the pipeline, appended to the session's log, and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Sequence number, strictly increasing and gapless within a session
    pub seq: u64,
    /// Stage the turn was taken in
    pub stage: StageId,
    /// Recognized candidate utterance
    pub utterance: String,
    /// Digest of the composed prompt this turn was generated from
    pub prompt_digest: String,
    /// Reasoning-provider reply (absent on Failed/Skipped turns)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    /// Synthesized audio handle (absent when synthesis degraded to text-only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioHandle>,
    /// Failure detail for Failed/Skipped turns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: TurnStatus,
}

impl Turn {
    pub fn is_delivered(&self) -> bool {
        self.status == TurnStatus::Delivered
    }

    /// Wall-clock duration of the turn.
    pub fn duration_ms(&self) -> u64 {
        (self.ended_at - self.started_at).num_milliseconds().max(0) as u64
    }

    #[cfg(test)]
    pub(crate) fn delivered_for_test(seq: u64, utterance: &str, reply: &str) -> Self {
        let now = Utc::now();
        Self {
            seq,
            stage: StageId::Technical,
            utterance: utterance.to_string(),
            prompt_digest: String::new(),
            reply: Some(reply.to_string()),
            audio: None,
            failure: None,
            started_at: now,
            ended_at: now,
            status: TurnStatus::Delivered,
        }
    }
}
