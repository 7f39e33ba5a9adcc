//! Shadow analyzer: off-path competency scoring of completed turns.
//!
//! Analysis runs strictly off the critical path. The pipeline finishes a
//! turn, the analyzer is dispatched fire-and-forget with its own timeout,
//! and a resulting score arrives asynchronously on the controller's score
//! queue. Every failure mode here — provider error, timeout, malformed
//! response — produces *no score*: the difficulty controller treats a
//! missing score as no signal, and the candidate-facing conversation is
//! never touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::catalog::{RubricDimension, StageConfig};
use crate::error::{Error, Result};
use crate::pipeline::Turn;
use crate::providers::{ReasoningProvider, ReasoningRequest};

/// Qualitative level for a 0–100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetencyLevel {
    /// 85+ — top performer
    Exceptional,
    /// 70–84 — above expectations
    Strong,
    /// 50–69 — meets expectations
    Adequate,
    /// below 50 — below expectations
    Developing,
}

impl CompetencyLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            85..=100 => Self::Exceptional,
            70..=84 => Self::Strong,
            50..=69 => Self::Adequate,
            _ => Self::Developing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exceptional => "exceptional",
            Self::Strong => "strong",
            Self::Adequate => "adequate",
            Self::Developing => "developing",
        }
    }
}

impl std::fmt::Display for CompetencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Score for one rubric dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionScore {
    /// 0–100
    pub score: u8,
    pub level: CompetencyLevel,
}

impl DimensionScore {
    pub fn new(score: u8) -> Self {
        let score = score.min(100);
        Self {
            score,
            level: CompetencyLevel::from_score(score),
        }
    }
}

/// Per-turn competency scores, keyed by rubric dimension.
///
/// Correlated to its turn by sequence number; a turn may have no score at
/// all if analysis failed or has not completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencyScore {
    pub turn_seq: u64,
    pub dimensions: BTreeMap<RubricDimension, DimensionScore>,
    pub scored_at: DateTime<Utc>,
}

impl CompetencyScore {
    pub fn new(turn_seq: u64, dimensions: BTreeMap<RubricDimension, DimensionScore>) -> Self {
        Self {
            turn_seq,
            dimensions,
            scored_at: Utc::now(),
        }
    }

    /// Single composite value: the mean across dimensions.
    pub fn composite(&self) -> f64 {
        if self.dimensions.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.dimensions.values().map(|d| d.score as u32).sum();
        sum as f64 / self.dimensions.len() as f64
    }
}

/// Analyzer tunables.
#[derive(Debug, Clone)]
pub struct ShadowConfig {
    /// Budget for one analysis, including the provider call
    pub timeout_ms: u64,
    /// Utterances shorter than this are floor-scored without a provider call
    pub min_answer_chars: usize,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            min_answer_chars: 10,
        }
    }
}

/// Scores delivered turns against the stage rubric via the reasoning
/// provider.
pub struct ShadowAnalyzer {
    reasoner: Arc<dyn ReasoningProvider>,
    config: ShadowConfig,
}

impl ShadowAnalyzer {
    /// Floor score given to answers too brief to evaluate.
    const BRIEF_ANSWER_SCORE: u8 = 20;

    pub fn new(reasoner: Arc<dyn ReasoningProvider>, config: ShadowConfig) -> Self {
        Self { reasoner, config }
    }

    /// Score one turn against its stage's rubric.
    pub async fn analyze(
        &self,
        turn: &Turn,
        stage: &StageConfig,
        job_role: &str,
    ) -> Result<CompetencyScore> {
        if turn.utterance.trim().len() < self.config.min_answer_chars {
            debug!(seq = turn.seq, "answer too brief; floor-scoring locally");
            let dimensions = stage
                .rubric
                .iter()
                .map(|d| (*d, DimensionScore::new(Self::BRIEF_ANSWER_SCORE)))
                .collect();
            return Ok(CompetencyScore::new(turn.seq, dimensions));
        }

        let request = self.scoring_request(turn, stage, job_role);
        let raw = tokio::time::timeout(
            Duration::from_millis(self.config.timeout_ms),
            self.reasoner.generate(request),
        )
        .await
        .map_err(|_| {
            Error::analysis(format!(
                "scoring timed out after {}ms",
                self.config.timeout_ms
            ))
        })?
        .map_err(|e| Error::analysis(format!("scoring call failed: {}", e)))?;

        let dimensions = parse_dimension_scores(&raw, &stage.rubric)?;
        Ok(CompetencyScore::new(turn.seq, dimensions))
    }

    /// Spawn a fire-and-forget analysis task.
    ///
    /// A successful score is pushed onto `tx`; any failure is logged and
    /// swallowed here, at the analyzer boundary.
    pub fn dispatch(
        analyzer: Arc<Self>,
        turn: Turn,
        stage: StageConfig,
        job_role: String,
        tx: mpsc::UnboundedSender<CompetencyScore>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            match analyzer.analyze(&turn, &stage, &job_role).await {
                Ok(score) => {
                    // receiver gone means the session is already torn down
                    let _ = tx.send(score);
                }
                Err(e) => {
                    warn!(seq = turn.seq, error = %e, "shadow analysis produced no score");
                }
            }
        })
    }

    fn scoring_request(&self, turn: &Turn, stage: &StageConfig, job_role: &str) -> ReasoningRequest {
        let mut prompt = String::new();
        prompt.push_str("You are an expert interview evaluator. Score this answer objectively.\n\n");
        prompt.push_str(&format!("Stage: {}\nTarget role: {}\n\n", stage.name, job_role));
        prompt.push_str("Candidate's answer:\n");
        prompt.push_str(&turn.utterance);
        prompt.push_str("\n\nScore each dimension from 0 to 100 (integers):\n");
        for dimension in &stage.rubric {
            prompt.push_str(&format!("- {}: {}\n", dimension, dimension.description()));
        }
        prompt.push_str(
            "\nBe objective: 50 is average, below 40 is weak, above 80 is strong.\n",
        );
        prompt.push_str("Return JSON only, one integer per dimension, e.g. {\"");
        prompt.push_str(stage.rubric[0].as_str());
        prompt.push_str("\": 65}\n");

        ReasoningRequest::new(prompt)
            .with_json_output()
            .with_temperature(0.0)
            .with_max_tokens(256)
    }
}

/// Strip markdown code fences some providers wrap JSON responses in.
fn clean_json_response(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    text.trim()
}

/// Parse the provider's JSON into per-dimension scores.
///
/// Every rubric dimension must be present with a numeric value; anything
/// else is an analysis error and yields no score for the turn.
fn parse_dimension_scores(
    raw: &str,
    rubric: &[RubricDimension],
) -> Result<BTreeMap<RubricDimension, DimensionScore>> {
    let cleaned = clean_json_response(raw);
    let values: BTreeMap<String, serde_json::Value> = serde_json::from_str(cleaned)
        .map_err(|e| Error::analysis(format!("scoring response is not JSON: {}", e)))?;

    let mut dimensions = BTreeMap::new();
    for dimension in rubric {
        let value = values
            .get(dimension.as_str())
            .and_then(|v| v.as_f64())
            .ok_or_else(|| {
                Error::analysis(format!(
                    "scoring response is missing dimension {}",
                    dimension
                ))
            })?;
        dimensions.insert(*dimension, DimensionScore::new(value.clamp(0.0, 100.0) as u8));
    }
    Ok(dimensions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StageConfig;
    use crate::providers::mock::ScriptedReasoner;
    use pretty_assertions::assert_eq;

    fn turn(utterance: &str) -> Turn {
        Turn::delivered_for_test(1, utterance, "and how did that go?")
    }

    fn analyzer(reasoner: Arc<ScriptedReasoner>) -> ShadowAnalyzer {
        ShadowAnalyzer::new(reasoner, ShadowConfig::default())
    }

    #[tokio::test]
    async fn test_scores_parsed_from_provider_json() {
        let reasoner = Arc::new(ScriptedReasoner::new());
        reasoner.push_reply(
            r#"{"technical_depth": 82, "problem_solving": 74, "communication": 91}"#,
        );
        let score = analyzer(reasoner)
            .analyze(
                &turn("I would shard the table by tenant id"),
                &StageConfig::technical(),
                "Backend Engineer",
            )
            .await
            .unwrap();

        assert_eq!(score.turn_seq, 1);
        assert_eq!(
            score.dimensions[&RubricDimension::Communication].score,
            91
        );
        assert_eq!(
            score.dimensions[&RubricDimension::Communication].level,
            CompetencyLevel::Exceptional
        );
        assert!((score.composite() - 82.333).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_fenced_json_accepted() {
        let reasoner = Arc::new(ScriptedReasoner::new());
        reasoner.push_reply(
            "```json\n{\"technical_depth\": 60, \"problem_solving\": 55, \"communication\": 50}\n```",
        );
        let score = analyzer(reasoner)
            .analyze(
                &turn("I'd profile before guessing"),
                &StageConfig::technical(),
                "Backend Engineer",
            )
            .await
            .unwrap();
        assert_eq!(score.dimensions[&RubricDimension::TechnicalDepth].score, 60);
    }

    #[tokio::test]
    async fn test_brief_answer_floor_scored_without_provider_call() {
        let reasoner = Arc::new(ScriptedReasoner::new());
        let score = analyzer(reasoner.clone())
            .analyze(&turn("yes"), &StageConfig::technical(), "Backend Engineer")
            .await
            .unwrap();
        assert_eq!(reasoner.call_count(), 0);
        for dim in score.dimensions.values() {
            assert_eq!(dim.score, 20);
            assert_eq!(dim.level, CompetencyLevel::Developing);
        }
    }

    #[tokio::test]
    async fn test_missing_dimension_is_analysis_error() {
        let reasoner = Arc::new(ScriptedReasoner::new());
        reasoner.push_reply(r#"{"technical_depth": 80}"#);
        let err = analyzer(reasoner)
            .analyze(
                &turn("a fairly long answer about databases"),
                &StageConfig::technical(),
                "Backend Engineer",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Analysis(_)));
    }

    #[tokio::test]
    async fn test_non_json_response_is_analysis_error() {
        let reasoner = Arc::new(ScriptedReasoner::new());
        reasoner.push_reply("the candidate did fine I suppose");
        let err = analyzer(reasoner)
            .analyze(
                &turn("a fairly long answer about databases"),
                &StageConfig::technical(),
                "Backend Engineer",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Analysis(_)));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let reasoner =
            Arc::new(ScriptedReasoner::new().with_delay(Duration::from_millis(200)));
        let analyzer = ShadowAnalyzer::new(
            reasoner,
            ShadowConfig {
                timeout_ms: 20,
                ..ShadowConfig::default()
            },
        );
        let err = analyzer
            .analyze(
                &turn("a fairly long answer about databases"),
                &StageConfig::technical(),
                "Backend Engineer",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Analysis(_)));
    }

    #[tokio::test]
    async fn test_dispatch_delivers_score_on_queue() {
        let reasoner = Arc::new(ScriptedReasoner::new());
        reasoner.push_reply(
            r#"{"technical_depth": 70, "problem_solving": 70, "communication": 70}"#,
        );
        let analyzer = Arc::new(ShadowAnalyzer::new(reasoner, ShadowConfig::default()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = ShadowAnalyzer::dispatch(
            analyzer,
            turn("I would start from the logs and work backwards"),
            StageConfig::technical(),
            "Backend Engineer".to_string(),
            tx,
        );
        handle.await.unwrap();

        let score = rx.recv().await.unwrap();
        assert_eq!(score.turn_seq, 1);
        assert_eq!(score.composite(), 70.0);
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let reasoner = Arc::new(ScriptedReasoner::new());
        reasoner.push_reply("not json at all");
        let analyzer = Arc::new(ShadowAnalyzer::new(reasoner, ShadowConfig::default()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        ShadowAnalyzer::dispatch(
            analyzer,
            turn("a fairly long answer about databases"),
            StageConfig::technical(),
            "Backend Engineer".to_string(),
            tx,
        )
        .await
        .unwrap();

        // no score, and no panic either
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_out_of_range_scores_clamped() {
        let dims = parse_dimension_scores(
            r#"{"communication": 250, "adaptability": -5}"#,
            &[RubricDimension::Communication, RubricDimension::Adaptability],
        )
        .unwrap();
        assert_eq!(dims[&RubricDimension::Communication].score, 100);
        assert_eq!(dims[&RubricDimension::Adaptability].score, 0);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(CompetencyLevel::from_score(85), CompetencyLevel::Exceptional);
        assert_eq!(CompetencyLevel::from_score(84), CompetencyLevel::Strong);
        assert_eq!(CompetencyLevel::from_score(70), CompetencyLevel::Strong);
        assert_eq!(CompetencyLevel::from_score(69), CompetencyLevel::Adequate);
        assert_eq!(CompetencyLevel::from_score(50), CompetencyLevel::Adequate);
        assert_eq!(CompetencyLevel::from_score(49), CompetencyLevel::Developing);
    }
}
