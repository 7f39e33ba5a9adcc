//! The per-turn pipeline: Transcribed → Reasoned → Synthesized → Delivered.
//!
//! Recognition happens upstream, so the pipeline starts from an already
//! transcribed utterance. Each provider step is bounded by a timeout and
//! retried once on transient failure; after that the turn degrades instead
//! of aborting the session — a reasoning failure records a Failed
//! placeholder turn, a synthesis failure delivers text-only. A session
//! abandonment cancels the in-flight step and records a Skipped turn.
//!
//! Exactly one turn is appended to the session log per `run_turn` call,
//! regardless of retries or where the pipeline stopped.

mod types;

pub use types::{Turn, TurnPhase, TurnStatus};

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::catalog::StageConfig;
use crate::error::{Error, ProviderError, Result};
use crate::prompt::PromptPayload;
use crate::providers::{ReasoningProvider, SynthesisProvider};
use crate::session::Session;
use crate::trace::{TraceSink, TurnSpan};

/// Pipeline tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Timeout for one reasoning attempt in milliseconds
    pub reasoning_timeout_ms: u64,
    /// Timeout for one synthesis attempt in milliseconds
    pub synthesis_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reasoning_timeout_ms: 30_000,
            synthesis_timeout_ms: 15_000,
        }
    }
}

/// Outcome of one bounded provider step.
enum StepError {
    Cancelled,
    Provider(ProviderError),
}

/// Drives one conversational turn through reasoning and synthesis.
pub struct TurnPipeline {
    reasoner: Arc<dyn ReasoningProvider>,
    synthesizer: Arc<dyn SynthesisProvider>,
    tracer: Arc<dyn TraceSink>,
    config: PipelineConfig,
}

impl TurnPipeline {
    pub fn new(
        reasoner: Arc<dyn ReasoningProvider>,
        synthesizer: Arc<dyn SynthesisProvider>,
        tracer: Arc<dyn TraceSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            reasoner,
            synthesizer,
            tracer,
            config,
        }
    }

    /// Run one turn for an utterance and append the resulting record to the
    /// session's log.
    ///
    /// Returns the appended turn; `Err(Cancelled)` only when `cancel`
    /// flipped mid-flight (the Skipped turn is still appended first).
    pub async fn run_turn(
        &self,
        session: &mut Session,
        utterance: &str,
        payload: PromptPayload,
        stage: &StageConfig,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Turn> {
        let seq = session.next_seq();
        let started_at = Utc::now();
        let clock = Instant::now();
        let request = payload.to_request(utterance);

        // Reasoned step
        let reasoning_outcome = self
            .with_retry(
                || self.reasoner.generate(request.clone()),
                self.config.reasoning_timeout_ms,
                self.reasoner.name(),
                cancel,
            )
            .await;
        let reasoning_ms = clock.elapsed().as_millis() as u64;

        let reply = match reasoning_outcome {
            Ok(reply) => reply,
            Err(StepError::Cancelled) => {
                let turn = self.record(
                    session,
                    Turn {
                        seq,
                        stage: stage.id,
                        utterance: utterance.to_string(),
                        prompt_digest: payload.digest,
                        reply: None,
                        audio: None,
                        failure: Some("session abandoned mid-turn".to_string()),
                        started_at,
                        ended_at: Utc::now(),
                        status: TurnStatus::Skipped,
                    },
                    TurnPhase::Transcribed,
                    Some(reasoning_ms),
                    None,
                )?;
                debug!(seq = turn.seq, "turn skipped: cancellation during reasoning");
                return Err(Error::Cancelled);
            }
            Err(StepError::Provider(e)) => {
                warn!(seq, error = %e, "reasoning failed after retry; recording failed turn");
                let turn = self.record(
                    session,
                    Turn {
                        seq,
                        stage: stage.id,
                        utterance: utterance.to_string(),
                        prompt_digest: payload.digest,
                        reply: None,
                        audio: None,
                        failure: Some(e.to_string()),
                        started_at,
                        ended_at: Utc::now(),
                        status: TurnStatus::Failed,
                    },
                    TurnPhase::Failed,
                    Some(reasoning_ms),
                    None,
                )?;
                return Ok(turn);
            }
        };

        // Synthesized step: audio is best-effort, text is authoritative
        let synth_clock = Instant::now();
        let synthesis_outcome = self
            .with_retry(
                || self.synthesizer.speak(&reply, &stage.voice),
                self.config.synthesis_timeout_ms,
                self.synthesizer.name(),
                cancel,
            )
            .await;
        let synthesis_ms = synth_clock.elapsed().as_millis() as u64;

        let audio = match synthesis_outcome {
            Ok(handle) => Some(handle),
            Err(StepError::Cancelled) => {
                let turn = self.record(
                    session,
                    Turn {
                        seq,
                        stage: stage.id,
                        utterance: utterance.to_string(),
                        prompt_digest: payload.digest,
                        reply: Some(reply),
                        audio: None,
                        failure: Some("session abandoned mid-turn".to_string()),
                        started_at,
                        ended_at: Utc::now(),
                        status: TurnStatus::Skipped,
                    },
                    TurnPhase::Reasoned,
                    Some(reasoning_ms),
                    Some(synthesis_ms),
                )?;
                debug!(seq = turn.seq, "turn skipped: cancellation during synthesis");
                return Err(Error::Cancelled);
            }
            Err(StepError::Provider(e)) => {
                warn!(seq, error = %e, "synthesis failed after retry; delivering text-only");
                None
            }
        };

        let turn = self.record(
            session,
            Turn {
                seq,
                stage: stage.id,
                utterance: utterance.to_string(),
                prompt_digest: payload.digest,
                reply: Some(reply),
                audio,
                failure: None,
                started_at,
                ended_at: Utc::now(),
                status: TurnStatus::Delivered,
            },
            TurnPhase::Delivered,
            Some(reasoning_ms),
            Some(synthesis_ms),
        )?;
        Ok(turn)
    }

    /// Append the turn to the session log (the single append of this call)
    /// and emit its span.
    fn record(
        &self,
        session: &mut Session,
        turn: Turn,
        phase: TurnPhase,
        reasoning_ms: Option<u64>,
        synthesis_ms: Option<u64>,
    ) -> Result<Turn> {
        session.append_turn(turn.clone())?;
        self.tracer.record_turn(&TurnSpan {
            session_id: session.id,
            seq: turn.seq,
            status: turn.status,
            phase,
            reasoning_ms,
            synthesis_ms,
            total_ms: turn.duration_ms(),
            at: Utc::now(),
        });
        Ok(turn)
    }

    /// One bounded attempt plus a single retry on transient failure, with
    /// the identical payload. Cancellation wins over both.
    async fn with_retry<T, F, Fut>(
        &self,
        mut call: F,
        timeout_ms: u64,
        provider: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> std::result::Result<T, StepError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        match bounded(call(), timeout_ms, provider, cancel).await {
            Err(StepError::Provider(e)) if e.is_transient() => {
                debug!(provider, error = %e, "transient provider failure; retrying once");
                bounded(call(), timeout_ms, provider, cancel).await
            }
            other => other,
        }
    }
}

/// Run a provider future under a timeout, racing cancellation.
async fn bounded<T, Fut>(
    fut: Fut,
    timeout_ms: u64,
    provider: &str,
    cancel: &mut watch::Receiver<bool>,
) -> std::result::Result<T, StepError>
where
    Fut: Future<Output = std::result::Result<T, ProviderError>>,
{
    if *cancel.borrow() {
        return Err(StepError::Cancelled);
    }
    tokio::select! {
        outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), fut) => {
            match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(StepError::Provider(e)),
                Err(_) => Err(StepError::Provider(ProviderError::timeout(provider, timeout_ms))),
            }
        }
        _ = cancelled(cancel) => Err(StepError::Cancelled),
    }
}

/// Resolves only when the cancel flag flips to true. A dropped sender never
/// cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
