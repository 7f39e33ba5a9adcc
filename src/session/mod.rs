//! Session controller: the top-level state machine for one interview.
//!
//! One controller exists per active session and is the session's single
//! writer: `submit_utterance`, `advance_stage`, `abandon`, and `finalize`
//! all serialize on the session lock, and a concurrent `submit_utterance`
//! is rejected with `TurnInProgress` rather than interleaved. Shadow scores
//! arrive on a queue whose sole consumer feeds the difficulty controller,
//! strictly off the turn path. `abandon()` flips a watch flag that any
//! in-flight pipeline call races against, so cancellation propagates
//! without waiting for provider timeouts.

mod types;

pub use types::{Session, SessionConfig, SessionId, SessionSnapshot, SessionStatus};

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::catalog::{DifficultyTier, StageCatalog, TerminationRule};
use crate::difficulty::DifficultyController;
use crate::error::{Error, Result};
use crate::pipeline::{Turn, TurnPipeline, TurnStatus};
use crate::prompt::PromptComposer;
use crate::providers::{ReasoningProvider, SynthesisProvider};
use crate::report::{EvaluationAggregator, EvaluationReport};
use crate::shadow::{CompetencyScore, ShadowAnalyzer};
use crate::store::SessionStore;
use crate::trace::{SessionSpan, TraceSink};

/// All engine tunables in one place.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub composer: crate::prompt::ComposerConfig,
    pub pipeline: crate::pipeline::PipelineConfig,
    pub shadow: crate::shadow::ShadowConfig,
    pub difficulty: crate::difficulty::DifficultyConfig,
    pub aggregator: crate::report::AggregatorConfig,
}

/// The model providers a session runs against.
///
/// The shadow analyzer defaults to the conversation reasoner but can be
/// pointed at a cheaper/faster model, which is the usual production setup.
#[derive(Clone)]
pub struct ProviderSet {
    pub reasoner: Arc<dyn ReasoningProvider>,
    pub synthesizer: Arc<dyn SynthesisProvider>,
    pub shadow_reasoner: Arc<dyn ReasoningProvider>,
}

impl ProviderSet {
    pub fn new(
        reasoner: Arc<dyn ReasoningProvider>,
        synthesizer: Arc<dyn SynthesisProvider>,
    ) -> Self {
        Self {
            shadow_reasoner: reasoner.clone(),
            reasoner,
            synthesizer,
        }
    }

    pub fn with_shadow_reasoner(mut self, reasoner: Arc<dyn ReasoningProvider>) -> Self {
        self.shadow_reasoner = reasoner;
        self
    }
}

/// Shared state fed by the score queue: the difficulty controller and the
/// per-turn score map. Guarded by its own lock so score arrival never
/// contends with an in-flight turn.
struct ScoreBoard {
    difficulty: DifficultyController,
    scores: BTreeMap<u64, CompetencyScore>,
    /// Set on abandonment: late analyzer results are discarded
    discard: bool,
}

/// Owns one interview session's lifecycle.
///
/// Must be created inside a tokio runtime (it spawns the score consumer).
pub struct SessionController {
    id: SessionId,
    catalog: Arc<StageCatalog>,
    composer: PromptComposer,
    pipeline: TurnPipeline,
    analyzer: Arc<ShadowAnalyzer>,
    aggregator: EvaluationAggregator,
    store: Arc<dyn SessionStore>,
    tracer: Arc<dyn TraceSink>,
    session: Mutex<Session>,
    board: Arc<Mutex<ScoreBoard>>,
    score_tx: mpsc::UnboundedSender<CompetencyScore>,
    cancel_tx: watch::Sender<bool>,
    status_tx: watch::Sender<SessionSnapshot>,
    report: Mutex<Option<EvaluationReport>>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Create a controller for a new session.
    ///
    /// The stage plan must only reference stages the catalog knows
    /// (`UnknownStage` otherwise); full configuration validation happens in
    /// [`start`](Self::start).
    pub fn new(
        config: SessionConfig,
        engine: EngineConfig,
        catalog: Arc<StageCatalog>,
        providers: ProviderSet,
        store: Arc<dyn SessionStore>,
        tracer: Arc<dyn TraceSink>,
    ) -> Result<Self> {
        let stage_ids = match &config.stages {
            Some(ids) if ids.is_empty() => {
                return Err(Error::composition("session has an empty stage plan"))
            }
            Some(ids) => ids.clone(),
            None => catalog.stage_ids(),
        };
        for id in &stage_ids {
            catalog.stage_for(*id)?;
        }
        let first_stage = catalog.stage_for(stage_ids[0])?;

        let difficulty = DifficultyController::new(engine.difficulty, first_stage);
        let start_tier = difficulty.tier();
        let config = SessionConfig {
            stages: Some(stage_ids),
            ..config
        };
        let session = Session::new(config, catalog.stage_ids(), start_tier);
        let id = session.id;

        let board = Arc::new(Mutex::new(ScoreBoard {
            difficulty,
            scores: BTreeMap::new(),
            discard: false,
        }));
        let (score_tx, score_rx) = mpsc::unbounded_channel();
        Self::spawn_score_consumer(board.clone(), score_rx);

        let (cancel_tx, _) = watch::channel(false);
        let (status_tx, _) = watch::channel(session.snapshot());

        let pipeline = TurnPipeline::new(
            providers.reasoner.clone(),
            providers.synthesizer,
            tracer.clone(),
            engine.pipeline,
        );
        let analyzer = Arc::new(ShadowAnalyzer::new(
            providers.shadow_reasoner,
            engine.shadow,
        ));
        let aggregator = EvaluationAggregator::new(providers.reasoner, engine.aggregator);

        Ok(Self {
            id,
            catalog,
            composer: PromptComposer::new(engine.composer),
            pipeline,
            analyzer,
            aggregator,
            store,
            tracer,
            session: Mutex::new(session),
            board,
            score_tx,
            cancel_tx,
            status_tx,
            report: Mutex::new(None),
        })
    }

    /// The queue's sole consumer: every arriving score updates the
    /// difficulty controller and lands in the score map. The task exits
    /// when the last sender (controller plus in-flight analyzer tasks) is
    /// gone.
    fn spawn_score_consumer(
        board: Arc<Mutex<ScoreBoard>>,
        mut rx: mpsc::UnboundedReceiver<CompetencyScore>,
    ) {
        tokio::spawn(async move {
            while let Some(score) = rx.recv().await {
                let mut board = board.lock().await;
                if board.discard {
                    debug!(seq = score.turn_seq, "discarding score for terminal session");
                    continue;
                }
                board.difficulty.update(&score);
                board.scores.insert(score.turn_seq, score);
            }
        });
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current progress without touching the session lock, so it stays
    /// readable while a turn is in flight.
    pub fn status(&self) -> SessionSnapshot {
        *self.status_tx.borrow()
    }

    /// Subscribe to progress updates.
    pub fn watch_status(&self) -> watch::Receiver<SessionSnapshot> {
        self.status_tx.subscribe()
    }

    /// Difficulty tier the next turn will compose at.
    pub async fn current_tier(&self) -> DifficultyTier {
        self.board.lock().await.difficulty.tier()
    }

    /// Shadow scores received so far, keyed by turn sequence.
    pub async fn scores(&self) -> BTreeMap<u64, CompetencyScore> {
        self.board.lock().await.scores.clone()
    }

    /// NotStarted → InProgress at stage 0, turn 0.
    ///
    /// The stage plan is validated here: a malformed stage configuration
    /// fails the session (NotStarted → Failed) and it never reaches
    /// InProgress.
    pub async fn start(&self) -> Result<SessionSnapshot> {
        let mut session = self.session.lock().await;
        if session.status == SessionStatus::NotStarted {
            for id in session.stages.clone() {
                if let Err(e) = self
                    .catalog
                    .stage_for(id)
                    .and_then(|stage| stage.validate())
                {
                    let _ = session.fail();
                    warn!(session = %session.id, error = %e, "setup failed; session will not start");
                    self.on_terminal(&session, None).await;
                    self.publish(&session);
                    return Err(e);
                }
            }
        }
        session.start()?;
        info!(session = %session.id, stage = %session.current_stage(), "session started");
        if let Err(e) = self.store.append_session(&session).await {
            warn!(session = %session.id, error = %e, "store write failed; session continues");
        }
        self.publish(&session);
        Ok(session.snapshot())
    }

    /// Run one conversational turn for a recognized utterance.
    ///
    /// Only legal in InProgress. Rejects concurrent calls with
    /// `TurnInProgress` instead of queueing them.
    pub async fn submit_utterance(&self, utterance: &str) -> Result<Turn> {
        let mut session = self
            .session
            .try_lock()
            .map_err(|_| Error::TurnInProgress)?;
        match session.status {
            SessionStatus::InProgress => {}
            SessionStatus::NotStarted => return Err(Error::NotStarted),
            status => return Err(Error::session_closed(status.as_str())),
        }

        let stage = self.catalog.stage_for(session.current_stage())?.clone();
        let tier = self.board.lock().await.difficulty.tier();
        session.tier = tier;
        let payload = self.composer.compose(&session, &stage, tier, &session.turns)?;

        let mut cancel_rx = self.cancel_tx.subscribe();
        let turn = match self
            .pipeline
            .run_turn(&mut session, utterance, payload, &stage, &mut cancel_rx)
            .await
        {
            Ok(turn) => turn,
            Err(e) => {
                // cancellation: the Skipped turn is already in the log
                if let Some(last) = session.turns.last() {
                    if last.status == TurnStatus::Skipped {
                        if let Err(err) = self.store.append_turn(session.id, last).await {
                            warn!(session = %session.id, error = %err, "store write failed");
                        }
                    }
                }
                self.publish(&session);
                return Err(e);
            }
        };

        if let Err(e) = self.store.append_turn(session.id, &turn).await {
            warn!(session = %session.id, error = %e, "store write failed; session continues");
        }

        // fire-and-forget: a slow or failed analyzer never delays this return
        ShadowAnalyzer::dispatch(
            self.analyzer.clone(),
            turn.clone(),
            stage.clone(),
            session.job_role.clone(),
            self.score_tx.clone(),
        );

        if let TerminationRule::MaxTurns(max) = stage.termination {
            if session.turns_in_stage(stage.id) >= max as usize {
                self.advance_locked(&mut session).await?;
            }
        }

        self.publish(&session);
        Ok(turn)
    }

    /// Move to the next stage, or complete the session at the final one.
    ///
    /// Called internally when a stage's termination condition is met, and
    /// available to the application as the explicit close signal.
    pub async fn advance_stage(&self) -> Result<SessionSnapshot> {
        let mut session = self.session.lock().await;
        match session.status {
            SessionStatus::InProgress => {}
            SessionStatus::NotStarted => return Err(Error::NotStarted),
            status => return Err(Error::session_closed(status.as_str())),
        }
        self.advance_locked(&mut session).await?;
        self.publish(&session);
        Ok(session.snapshot())
    }

    async fn advance_locked(&self, session: &mut Session) -> Result<()> {
        match session.advance_stage() {
            Some(next_id) => {
                let next = self.catalog.stage_for(next_id)?;
                let mut board = self.board.lock().await;
                board.difficulty.enter_stage(next);
                session.tier = board.difficulty.tier();
                info!(session = %session.id, stage = %next_id, "stage advanced");
            }
            None => {
                session.complete()?;
                info!(session = %session.id, "final stage closed; session completed");
                self.on_terminal(session, None).await;
            }
        }
        Ok(())
    }

    /// InProgress → Abandoned. Cancels any in-flight turn; late shadow
    /// results for this session are discarded.
    pub async fn abandon(&self) -> Result<()> {
        // check the published status first: the session lock may be held by
        // an in-flight turn, and that is exactly the turn we must cancel
        // before waiting on the lock
        match self.status().status {
            SessionStatus::InProgress => {}
            SessionStatus::NotStarted => return Err(Error::NotStarted),
            status => return Err(Error::session_closed(status.as_str())),
        }
        let _ = self.cancel_tx.send(true);

        let mut session = self.session.lock().await;
        session.abandon()?;
        self.board.lock().await.discard = true;
        info!(session = %session.id, turns = session.turns.len(), "session abandoned");
        self.on_terminal(&session, None).await;
        self.publish(&session);
        Ok(())
    }

    /// Produce the final evaluation report, completing the session if it is
    /// still in progress.
    ///
    /// Idempotent: the first call computes and caches the report; repeated
    /// calls return the cached value without recomputation.
    pub async fn finalize(&self) -> Result<EvaluationReport> {
        let mut cached = self.report.lock().await;
        if let Some(report) = cached.as_ref() {
            return Ok(report.clone());
        }

        let mut session = self.session.lock().await;
        let transitioned = match session.status {
            SessionStatus::InProgress => {
                session.complete()?;
                info!(session = %session.id, "session completed via finalize");
                true
            }
            SessionStatus::Completed | SessionStatus::Abandoned => false,
            SessionStatus::NotStarted => return Err(Error::NotStarted),
            SessionStatus::Failed => return Err(Error::session_closed("failed")),
        };

        let scores = self.board.lock().await.scores.clone();
        let report = self.aggregator.finalize(&session, &scores).await;

        if transitioned {
            self.on_terminal(&session, Some(report.overall)).await;
        }
        if let Err(e) = self.store.append_report(session.id, &report).await {
            warn!(session = %session.id, error = %e, "store write failed for report");
        }
        self.publish(&session);
        *cached = Some(report.clone());
        Ok(report)
    }

    /// Persist the terminal session state and emit its span. Called exactly
    /// once, at the first transition into a terminal state.
    async fn on_terminal(&self, session: &Session, overall: Option<f64>) {
        if let Err(e) = self.store.append_session(session).await {
            warn!(session = %session.id, error = %e, "store write failed for terminal session");
        }
        let duration_ms = (session.completed_at.unwrap_or_else(Utc::now) - session.created_at)
            .num_milliseconds()
            .max(0) as u64;
        self.tracer.record_session(&SessionSpan {
            session_id: session.id,
            status: session.status,
            total_turns: session.turns.len(),
            delivered_turns: session.delivered_turns().count(),
            stage_index: session.stage_index,
            duration_ms,
            overall_score: overall,
            at: Utc::now(),
        });
    }

    fn publish(&self, session: &Session) {
        let _ = self.status_tx.send(session.snapshot());
    }
}

/// Application-facing entry point: holds the shared collaborators and
/// spawns one controller per interview room.
pub struct InterviewEngine {
    catalog: Arc<StageCatalog>,
    providers: ProviderSet,
    store: Arc<dyn SessionStore>,
    tracer: Arc<dyn TraceSink>,
    config: EngineConfig,
}

impl InterviewEngine {
    pub fn new(providers: ProviderSet) -> Self {
        Self {
            catalog: Arc::new(StageCatalog::default()),
            providers,
            store: Arc::new(crate::store::NullStore),
            tracer: Arc::new(crate::trace::LogSink),
            config: EngineConfig::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<StageCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn TraceSink>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Create (but do not start) a session for a candidate.
    pub fn create_session(&self, config: SessionConfig) -> Result<Arc<SessionController>> {
        let controller = SessionController::new(
            config,
            self.config.clone(),
            self.catalog.clone(),
            self.providers.clone(),
            self.store.clone(),
            self.tracer.clone(),
        )?;
        Ok(Arc::new(controller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{StageConfig, StageId};
    use crate::providers::mock::{ScriptedReasoner, ScriptedSynthesizer};
    use crate::store::MemoryStore;
    use crate::trace::NullSink;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Fixture {
        reasoner: Arc<ScriptedReasoner>,
        synthesizer: Arc<ScriptedSynthesizer>,
        shadow: Arc<ScriptedReasoner>,
        store: Arc<MemoryStore>,
        controller: Arc<SessionController>,
    }

    fn build(catalog: StageCatalog, config: EngineConfig) -> Fixture {
        let reasoner = Arc::new(ScriptedReasoner::new());
        let synthesizer = Arc::new(ScriptedSynthesizer::new());
        let shadow = Arc::new(ScriptedReasoner::new().with_fallback("not json"));
        let store = Arc::new(MemoryStore::new());
        let providers = ProviderSet::new(reasoner.clone(), synthesizer.clone())
            .with_shadow_reasoner(shadow.clone());
        let controller = SessionController::new(
            SessionConfig::new("cand-1", "Backend Engineer"),
            config,
            Arc::new(catalog),
            providers,
            store.clone(),
            Arc::new(NullSink),
        )
        .unwrap();
        Fixture {
            reasoner,
            synthesizer,
            shadow,
            store,
            controller: Arc::new(controller),
        }
    }

    fn fixture() -> Fixture {
        build(StageCatalog::default(), EngineConfig::default())
    }

    /// A technical-only catalog whose stage never auto-terminates.
    fn open_ended_catalog() -> StageCatalog {
        let mut stage = StageConfig::technical();
        stage.termination = TerminationRule::ExplicitClose;
        StageCatalog::new(vec![stage]).unwrap()
    }

    fn tech_scores_json(value: u8) -> String {
        format!(
            r#"{{"technical_depth": {v}, "problem_solving": {v}, "communication": {v}}}"#,
            v = value
        )
    }

    /// Poll until the score consumer has absorbed `n` scores.
    async fn wait_for_scores(controller: &SessionController, n: usize) {
        for _ in 0..100 {
            if controller.scores().await.len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("score queue never reached {} entries", n);
    }

    #[tokio::test]
    async fn test_start_submit_finalize_happy_path() {
        let f = build(open_ended_catalog(), EngineConfig::default());
        f.reasoner.push_reply("Tell me about your last project.");
        f.shadow.push_reply(tech_scores_json(80));

        let snap = f.controller.start().await.unwrap();
        assert_eq!(snap.status, SessionStatus::InProgress);
        assert_eq!(snap.stage_index, 0);
        assert_eq!(snap.turns, 0);

        let turn = f
            .controller
            .submit_utterance("I have been building payment systems for five years")
            .await
            .unwrap();
        assert_eq!(turn.seq, 1);
        assert_eq!(turn.status, TurnStatus::Delivered);
        assert!(turn.audio.is_some());

        wait_for_scores(&f.controller, 1).await;

        f.reasoner.push_reply("Understood, thank you for your time today.");
        let report = f.controller.finalize().await.unwrap();
        assert!(report.valid);
        assert_eq!(report.delivered_turns, 1);
        assert_eq!(report.scored_turns, 1);
        assert_eq!(report.overall, 80.0);
        assert_eq!(f.controller.status().status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_start_twice_is_already_started() {
        let f = fixture();
        f.controller.start().await.unwrap();
        assert!(matches!(
            f.controller.start().await,
            Err(Error::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_submit_before_start_rejected() {
        let f = fixture();
        assert!(matches!(
            f.controller.submit_utterance("hello").await,
            Err(Error::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_submit_after_finalize_is_session_closed() {
        let f = build(open_ended_catalog(), EngineConfig::default());
        f.controller.start().await.unwrap();
        f.controller.finalize().await.unwrap();
        assert!(matches!(
            f.controller.submit_utterance("hello").await,
            Err(Error::SessionClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_submit_rejected_with_turn_in_progress() {
        let reasoner = Arc::new(ScriptedReasoner::new().with_delay(Duration::from_millis(300)));
        let synthesizer = Arc::new(ScriptedSynthesizer::new());
        let providers = ProviderSet::new(reasoner, synthesizer)
            .with_shadow_reasoner(Arc::new(ScriptedReasoner::new().with_fallback("not json")));
        let controller = Arc::new(
            SessionController::new(
                SessionConfig::new("cand-1", "Backend Engineer"),
                EngineConfig::default(),
                Arc::new(open_ended_catalog()),
                providers,
                Arc::new(crate::store::NullStore),
                Arc::new(NullSink),
            )
            .unwrap(),
        );
        controller.start().await.unwrap();

        let slow = controller.clone();
        let in_flight =
            tokio::spawn(async move { slow.submit_utterance("a long answer").await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = controller.submit_utterance("concurrent").await.unwrap_err();
        assert!(matches!(err, Error::TurnInProgress));

        let turn = in_flight.await.unwrap().unwrap();
        assert_eq!(turn.status, TurnStatus::Delivered);
    }

    #[tokio::test]
    async fn test_shadow_latency_never_delays_submit() {
        // analyzer model is slow; conversation model is not
        let shadow = Arc::new(ScriptedReasoner::new().with_delay(Duration::from_millis(500)));
        let providers = ProviderSet::new(
            Arc::new(ScriptedReasoner::new()),
            Arc::new(ScriptedSynthesizer::new()),
        )
        .with_shadow_reasoner(shadow);
        let controller = SessionController::new(
            SessionConfig::new("cand-1", "Backend Engineer"),
            EngineConfig::default(),
            Arc::new(open_ended_catalog()),
            providers,
            Arc::new(crate::store::NullStore),
            Arc::new(NullSink),
        )
        .unwrap();
        controller.start().await.unwrap();

        let started = std::time::Instant::now();
        controller
            .submit_utterance("an answer that will be scored slowly")
            .await
            .unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(250),
            "submit waited on the shadow analyzer"
        );
    }

    #[tokio::test]
    async fn test_scores_drive_difficulty_escalation() {
        let f = build(open_ended_catalog(), EngineConfig::default());
        for _ in 0..3 {
            f.shadow.push_reply(tech_scores_json(90));
        }
        f.controller.start().await.unwrap();
        assert_eq!(f.controller.current_tier().await, DifficultyTier(3));

        for i in 0..3 {
            f.controller
                .submit_utterance(&format!("a detailed, excellent answer number {}", i))
                .await
                .unwrap();
            wait_for_scores(&f.controller, i + 1).await;
        }

        // three consecutive 90-composites at threshold 75 / N=3
        assert_eq!(f.controller.current_tier().await, DifficultyTier(4));
    }

    #[tokio::test]
    async fn test_failed_analysis_is_no_signal() {
        let f = build(open_ended_catalog(), EngineConfig::default());
        // shadow fallback reply is not JSON: analysis fails, no score arrives
        f.controller.start().await.unwrap();
        f.controller
            .submit_utterance("an answer the analyzer cannot score")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(f.controller.scores().await.is_empty());
        assert_eq!(f.controller.current_tier().await, DifficultyTier(3));
        assert_eq!(f.controller.status().status, SessionStatus::InProgress);
    }

    #[tokio::test]
    async fn test_reasoning_failure_records_failed_turn_session_continues() {
        let f = build(open_ended_catalog(), EngineConfig::default());
        f.reasoner.push_transient_errors(2); // first turn: both attempts fail
        f.reasoner.push_reply("Back on track — tell me more.");

        f.controller.start().await.unwrap();
        let failed = f.controller.submit_utterance("first answer").await.unwrap();
        assert_eq!(failed.status, TurnStatus::Failed);
        assert_eq!(f.controller.status().status, SessionStatus::InProgress);

        let ok = f.controller.submit_utterance("second answer").await.unwrap();
        assert_eq!(ok.status, TurnStatus::Delivered);
        assert_eq!(ok.seq, 2);
    }

    #[tokio::test]
    async fn test_stage_advances_on_turn_count_and_completes_at_end() {
        let mut screening = StageConfig::screening();
        screening.termination = TerminationRule::MaxTurns(1);
        let mut technical = StageConfig::technical();
        technical.termination = TerminationRule::MaxTurns(1);
        let catalog = StageCatalog::new(vec![screening, technical]).unwrap();

        let f = build(catalog, EngineConfig::default());
        f.controller.start().await.unwrap();

        f.controller.submit_utterance("screening answer").await.unwrap();
        let snap = f.controller.status();
        assert_eq!(snap.stage, StageId::Technical);
        assert_eq!(snap.stage_index, 1);
        assert_eq!(snap.status, SessionStatus::InProgress);

        f.controller.submit_utterance("technical answer").await.unwrap();
        assert_eq!(f.controller.status().status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_explicit_advance_stage_moves_forward_only() {
        let f = fixture();
        f.controller.start().await.unwrap();
        assert_eq!(f.controller.status().stage, StageId::Screening);

        let snap = f.controller.advance_stage().await.unwrap();
        assert_eq!(snap.stage, StageId::Technical);

        let snap = f.controller.advance_stage().await.unwrap();
        assert_eq!(snap.stage, StageId::Behavioral);

        // advancing past the final stage completes the session
        f.controller.advance_stage().await.unwrap();
        assert_eq!(f.controller.status().status, SessionStatus::Completed);
        assert!(matches!(
            f.controller.advance_stage().await,
            Err(Error::SessionClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_stage_transition_reclamps_tier_into_new_bounds() {
        let mut first = StageConfig::technical();
        first.termination = TerminationRule::ExplicitClose;
        first.start_tier = DifficultyTier(5);
        let mut second = StageConfig::behavioral();
        second.max_tier = DifficultyTier(3);
        second.termination = TerminationRule::ExplicitClose;
        let catalog = StageCatalog::new(vec![first, second]).unwrap();

        let f = build(catalog, EngineConfig::default());
        f.controller.start().await.unwrap();
        assert_eq!(f.controller.current_tier().await, DifficultyTier(5));

        f.controller.advance_stage().await.unwrap();
        assert_eq!(f.controller.current_tier().await, DifficultyTier(3));
    }

    #[tokio::test]
    async fn test_abandon_with_zero_turns_yields_invalid_report() {
        let f = fixture();
        f.controller.start().await.unwrap();
        f.controller.abandon().await.unwrap();
        assert_eq!(f.controller.status().status, SessionStatus::Abandoned);

        let report = f.controller.finalize().await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.overall, 0.0);
        assert!(report.strengths.is_empty());
        assert!(report.weaknesses.is_empty());
    }

    #[tokio::test]
    async fn test_abandon_cancels_in_flight_turn() {
        let reasoner = Arc::new(ScriptedReasoner::new().with_delay(Duration::from_secs(5)));
        let providers = ProviderSet::new(reasoner, Arc::new(ScriptedSynthesizer::new()))
            .with_shadow_reasoner(Arc::new(ScriptedReasoner::new().with_fallback("not json")));
        let controller = Arc::new(
            SessionController::new(
                SessionConfig::new("cand-1", "Backend Engineer"),
                EngineConfig::default(),
                Arc::new(open_ended_catalog()),
                providers,
                Arc::new(crate::store::NullStore),
                Arc::new(NullSink),
            )
            .unwrap(),
        );
        controller.start().await.unwrap();

        let submitting = controller.clone();
        let in_flight =
            tokio::spawn(async move { submitting.submit_utterance("slow answer").await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let abandon_started = std::time::Instant::now();
        controller.abandon().await.unwrap();
        // abandon must not wait out the 5s provider call
        assert!(abandon_started.elapsed() < Duration::from_secs(1));

        let err = in_flight.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        let snap = controller.status();
        assert_eq!(snap.status, SessionStatus::Abandoned);
        assert_eq!(snap.turns, 1); // the skipped turn still holds its sequence slot
    }

    #[tokio::test]
    async fn test_late_scores_discarded_after_abandon() {
        let shadow = Arc::new(
            ScriptedReasoner::new()
                .with_delay(Duration::from_millis(150))
                .with_fallback(&tech_scores_json(95)),
        );
        let providers = ProviderSet::new(
            Arc::new(ScriptedReasoner::new()),
            Arc::new(ScriptedSynthesizer::new()),
        )
        .with_shadow_reasoner(shadow);
        let controller = SessionController::new(
            SessionConfig::new("cand-1", "Backend Engineer"),
            EngineConfig::default(),
            Arc::new(open_ended_catalog()),
            providers,
            Arc::new(crate::store::NullStore),
            Arc::new(NullSink),
        )
        .unwrap();

        controller.start().await.unwrap();
        controller
            .submit_utterance("an answer whose score will arrive too late")
            .await
            .unwrap();
        controller.abandon().await.unwrap();

        // let the in-flight analysis finish and its result reach the queue
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(controller.scores().await.is_empty());
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let f = build(open_ended_catalog(), EngineConfig::default());
        f.reasoner.push_reply("An interviewer reply.");
        f.shadow.push_reply(tech_scores_json(70));

        f.controller.start().await.unwrap();
        f.controller.submit_utterance("a reasonable answer").await.unwrap();
        wait_for_scores(&f.controller, 1).await;

        f.reasoner.push_reply("Narrative: candidate did fine.");
        let first = f.controller.finalize().await.unwrap();
        let second = f.controller.finalize().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.generated_at, second.generated_at);
        // narrative consumed exactly one provider call
        assert_eq!(first.narrative, "Narrative: candidate did fine.");
    }

    #[tokio::test]
    async fn test_malformed_stage_fails_session_at_start() {
        let mut broken = StageConfig::technical();
        broken.rubric.clear();
        let catalog = StageCatalog::from_stages_unchecked(vec![broken]);

        let f = build(catalog, EngineConfig::default());
        let err = f.controller.start().await.unwrap_err();
        assert!(matches!(err, Error::Composition(_)));
        assert_eq!(f.controller.status().status, SessionStatus::Failed);

        assert!(matches!(
            f.controller.submit_utterance("hello").await,
            Err(Error::SessionClosed { .. })
        ));
        assert!(matches!(
            f.controller.finalize().await,
            Err(Error::SessionClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_stage_in_plan_rejected_at_create() {
        let catalog = StageCatalog::new(vec![StageConfig::technical()]).unwrap();
        let providers = ProviderSet::new(
            Arc::new(ScriptedReasoner::new()),
            Arc::new(ScriptedSynthesizer::new()),
        );
        let err = SessionController::new(
            SessionConfig::new("cand-1", "Backend Engineer")
                .with_stages(vec![StageId::Technical, StageId::Behavioral]),
            EngineConfig::default(),
            Arc::new(catalog),
            providers,
            Arc::new(crate::store::NullStore),
            Arc::new(NullSink),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownStage { .. }));
    }

    #[tokio::test]
    async fn test_store_receives_turns_and_report() {
        let f = build(open_ended_catalog(), EngineConfig::default());
        f.shadow.push_reply(tech_scores_json(60));
        f.controller.start().await.unwrap();
        f.controller.submit_utterance("first answer").await.unwrap();
        f.controller.submit_utterance("second answer").await.unwrap();
        f.controller.finalize().await.unwrap();

        let id = f.controller.id();
        let turns = f.store.turns_for(id).await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].seq, 1);
        assert_eq!(turns[1].seq, 2);
        assert!(f.store.report_for(id).await.is_some());
        // one lifecycle record at start, one at the terminal transition
        assert_eq!(f.store.session_event_count().await, 2);
    }

    #[tokio::test]
    async fn test_engine_facade_creates_independent_sessions() {
        let providers = ProviderSet::new(
            Arc::new(ScriptedReasoner::new()),
            Arc::new(ScriptedSynthesizer::new()),
        );
        let engine = InterviewEngine::new(providers)
            .with_catalog(Arc::new(open_ended_catalog()))
            .with_store(Arc::new(MemoryStore::new()))
            .with_tracer(Arc::new(NullSink));

        let a = engine
            .create_session(SessionConfig::new("cand-a", "Backend Engineer"))
            .unwrap();
        let b = engine
            .create_session(SessionConfig::new("cand-b", "Data Engineer"))
            .unwrap();
        assert_ne!(a.id(), b.id());

        a.start().await.unwrap();
        a.submit_utterance("answer from candidate a").await.unwrap();
        // session b is untouched by a's progress
        assert_eq!(b.status().status, SessionStatus::NotStarted);
        assert_eq!(a.status().turns, 1);
    }

    #[tokio::test]
    async fn test_synthesizer_failure_still_delivers_text() {
        let f = build(open_ended_catalog(), EngineConfig::default());
        f.synthesizer.push_transient_errors(2);
        f.reasoner.push_reply("You will read this instead of hearing it.");

        f.controller.start().await.unwrap();
        let turn = f.controller.submit_utterance("an answer").await.unwrap();
        assert_eq!(turn.status, TurnStatus::Delivered);
        assert!(turn.audio.is_none());
        assert_eq!(
            turn.reply.as_deref(),
            Some("You will read this instead of hearing it.")
        );
    }
}
