//! Observability spans for turns and sessions.
//!
//! The engine emits one span per turn (step latencies and outcome) and one
//! span per session (overall outcome). Sinks are purely informational: the
//! trait is infallible by construction and implementations must swallow
//! their own failures, so a broken sink can never affect session behavior.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::pipeline::{TurnPhase, TurnStatus};
use crate::session::{SessionId, SessionStatus};

/// Latency and outcome record for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSpan {
    pub session_id: SessionId,
    pub seq: u64,
    pub status: TurnStatus,
    /// Furthest pipeline step the turn reached
    pub phase: TurnPhase,
    /// Reasoning-step latency, including the retry if one happened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_ms: Option<u64>,
    /// Synthesis-step latency, including the retry if one happened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis_ms: Option<u64>,
    pub total_ms: u64,
    pub at: DateTime<Utc>,
}

/// Outcome record for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSpan {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub total_turns: usize,
    pub delivered_turns: usize,
    pub stage_index: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<f64>,
    pub at: DateTime<Utc>,
}

/// Destination for turn and session spans.
pub trait TraceSink: Send + Sync {
    fn record_turn(&self, span: &TurnSpan);
    fn record_session(&self, span: &SessionSpan);
}

/// Sink that forwards spans to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record_turn(&self, span: &TurnSpan) {
        info!(
            session = %span.session_id,
            seq = span.seq,
            status = %span.status,
            phase = %span.phase,
            reasoning_ms = span.reasoning_ms,
            synthesis_ms = span.synthesis_ms,
            total_ms = span.total_ms,
            "turn span"
        );
    }

    fn record_session(&self, span: &SessionSpan) {
        info!(
            session = %span.session_id,
            status = %span.status,
            turns = span.total_turns,
            delivered = span.delivered_turns,
            duration_ms = span.duration_ms,
            "session span"
        );
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn record_turn(&self, _span: &TurnSpan) {}
    fn record_session(&self, _span: &SessionSpan) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Collecting sink for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        pub turns: Mutex<Vec<TurnSpan>>,
        pub sessions: Mutex<Vec<SessionSpan>>,
    }

    impl TraceSink for RecordingSink {
        fn record_turn(&self, span: &TurnSpan) {
            self.turns.lock().unwrap().push(span.clone());
        }

        fn record_session(&self, span: &SessionSpan) {
            self.sessions.lock().unwrap().push(span.clone());
        }
    }
}
