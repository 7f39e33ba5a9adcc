//! Post-session evaluation: reduce the turn and score history to a report.
//!
//! The aggregator only ever counts Delivered turns. A session that delivered
//! nothing yields an explicitly invalid report — overall zero, empty
//! strengths and weaknesses — rather than statistics fabricated from
//! silence. Turns the shadow analyzer never scored are excluded from the
//! means, not treated as zeros. The narrative is a best-effort provider
//! call: when it fails the statistics stand and the narrative is empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::catalog::RubricDimension;
use crate::pipeline::Turn;
use crate::providers::{ReasoningProvider, ReasoningRequest};
use crate::session::{Session, SessionId};
use crate::shadow::{CompetencyLevel, CompetencyScore};

/// Aggregation thresholds.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Dimensions with a mean at or above this are strengths
    pub strength_threshold: f64,
    /// Dimensions with a mean below this are weaknesses
    pub weakness_threshold: f64,
    /// Budget for the narrative provider call in milliseconds
    pub narrative_timeout_ms: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            strength_threshold: 75.0,
            weakness_threshold: 50.0,
            narrative_timeout_ms: 20_000,
        }
    }
}

/// Composite result for one rubric dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSummary {
    /// Mean score across scored delivered turns
    pub mean: f64,
    pub level: CompetencyLevel,
    /// Number of turns that contributed
    pub samples: usize,
}

/// Final performance evaluation for a session. Created once, immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub session_id: SessionId,
    /// Mean of available per-turn composites, 0–100
    pub overall: f64,
    /// Per-dimension composites; dimensions between the thresholds appear
    /// here without being classified either way
    pub dimensions: BTreeMap<RubricDimension, DimensionSummary>,
    pub strengths: Vec<RubricDimension>,
    pub weaknesses: Vec<RubricDimension>,
    /// Provider-written narrative; empty when the call failed
    pub narrative: String,
    pub summary: String,
    /// False when the session delivered zero turns
    pub valid: bool,
    pub delivered_turns: usize,
    pub scored_turns: usize,
    pub generated_at: DateTime<Utc>,
}

/// Reduces a finished session into its evaluation report.
pub struct EvaluationAggregator {
    reasoner: Arc<dyn ReasoningProvider>,
    config: AggregatorConfig,
}

impl EvaluationAggregator {
    pub fn new(reasoner: Arc<dyn ReasoningProvider>, config: AggregatorConfig) -> Self {
        Self { reasoner, config }
    }

    /// Build the report for a terminal session.
    pub async fn finalize(
        &self,
        session: &Session,
        scores: &BTreeMap<u64, CompetencyScore>,
    ) -> EvaluationReport {
        let delivered: Vec<&Turn> = session.delivered_turns().collect();
        if delivered.is_empty() {
            return Self::invalid_report(session);
        }

        let scored: Vec<&CompetencyScore> = delivered
            .iter()
            .filter_map(|t| scores.get(&t.seq))
            .collect();

        let overall = if scored.is_empty() {
            0.0
        } else {
            scored.iter().map(|s| s.composite()).sum::<f64>() / scored.len() as f64
        };

        let mut per_dimension: BTreeMap<RubricDimension, Vec<u8>> = BTreeMap::new();
        for score in &scored {
            for (dimension, value) in &score.dimensions {
                per_dimension.entry(*dimension).or_default().push(value.score);
            }
        }

        let mut dimensions = BTreeMap::new();
        let mut strengths = Vec::new();
        let mut weaknesses = Vec::new();
        for (dimension, values) in per_dimension {
            let mean = values.iter().map(|v| *v as f64).sum::<f64>() / values.len() as f64;
            dimensions.insert(
                dimension,
                DimensionSummary {
                    mean,
                    level: CompetencyLevel::from_score(mean.round() as u8),
                    samples: values.len(),
                },
            );
            if mean >= self.config.strength_threshold {
                strengths.push(dimension);
            } else if mean < self.config.weakness_threshold {
                weaknesses.push(dimension);
            }
        }

        let summary = render_summary(overall, &strengths, &weaknesses, scored.len());
        let narrative = self
            .narrative(session, &delivered, overall, &dimensions)
            .await;

        EvaluationReport {
            session_id: session.id,
            overall,
            dimensions,
            strengths,
            weaknesses,
            narrative,
            summary,
            valid: true,
            delivered_turns: delivered.len(),
            scored_turns: scored.len(),
            generated_at: Utc::now(),
        }
    }

    fn invalid_report(session: &Session) -> EvaluationReport {
        EvaluationReport {
            session_id: session.id,
            overall: 0.0,
            dimensions: BTreeMap::new(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            narrative: String::new(),
            summary: "No turns were delivered in this session; there is nothing to evaluate."
                .to_string(),
            valid: false,
            delivered_turns: 0,
            scored_turns: 0,
            generated_at: Utc::now(),
        }
    }

    /// Best-effort narrative generation. Failures degrade to an empty
    /// narrative, never to a failed report.
    async fn narrative(
        &self,
        session: &Session,
        delivered: &[&Turn],
        overall: f64,
        dimensions: &BTreeMap<RubricDimension, DimensionSummary>,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(&format!(
            "You are an expert interviewer. Write a short narrative assessment (3-5 sentences) of this candidate for a {} position.\n",
            session.job_role
        ));
        prompt.push_str(&format!("Overall score: {:.0}/100\n", overall));
        for (dimension, summary) in dimensions {
            prompt.push_str(&format!(
                "- {}: {:.0}/100 ({})\n",
                dimension, summary.mean, summary.level
            ));
        }
        prompt.push_str("\nTranscript:\n");
        for turn in delivered {
            prompt.push_str(&format!("Candidate: {}\n", turn.utterance));
            if let Some(reply) = &turn.reply {
                prompt.push_str(&format!("Interviewer: {}\n", reply));
            }
        }
        prompt.push_str("\nBe strict: no praise without evidence of skill in the transcript.\n");

        let request = ReasoningRequest::new(prompt)
            .with_temperature(0.3)
            .with_max_tokens(512);
        let call = self.reasoner.generate(request);
        match tokio::time::timeout(
            Duration::from_millis(self.config.narrative_timeout_ms),
            call,
        )
        .await
        {
            Ok(Ok(text)) => text.trim().to_string(),
            Ok(Err(e)) => {
                warn!(session = %session.id, error = %e, "narrative generation failed; report keeps statistics only");
                String::new()
            }
            Err(_) => {
                warn!(session = %session.id, "narrative generation timed out; report keeps statistics only");
                String::new()
            }
        }
    }
}

fn render_summary(
    overall: f64,
    strengths: &[RubricDimension],
    weaknesses: &[RubricDimension],
    scored_turns: usize,
) -> String {
    if scored_turns == 0 {
        return "Turns were delivered but none were scored; statistics are unavailable."
            .to_string();
    }
    let mut parts = vec![format!("Overall performance {:.0}/100", overall)];
    if !strengths.is_empty() {
        parts.push(format!(
            "Strengths: {}",
            strengths
                .iter()
                .map(|d| d.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    if !weaknesses.is_empty() {
        parts.push(format!(
            "Development areas: {}",
            weaknesses
                .iter()
                .map(|d| d.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    parts.join(". ") + "."
}
