//! Stage configuration types.
//!
//! Stage definitions are closed, validated variants rather than loose
//! key-value documents: the composer and catalog can be checked statically
//! against them, and a malformed document is rejected at load time instead
//! of surfacing mid-session.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier for an interview stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Culture fit and background screening
    Screening,
    /// Hard-skill and system-design round
    Technical,
    /// Leadership and collaboration round
    Behavioral,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Screening => "screening",
            Self::Technical => "technical",
            Self::Behavioral => "behavioral",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named competency axis scored independently of the others.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RubricDimension {
    TechnicalDepth,
    Communication,
    ProblemSolving,
    Leadership,
    Adaptability,
}

impl RubricDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TechnicalDepth => "technical_depth",
            Self::Communication => "communication",
            Self::ProblemSolving => "problem_solving",
            Self::Leadership => "leadership",
            Self::Adaptability => "adaptability",
        }
    }

    /// Human-readable description, used when composing scoring prompts.
    pub fn description(&self) -> &'static str {
        match self {
            Self::TechnicalDepth => "algorithms, system design, code quality, architecture",
            Self::Communication => "clarity, structure, articulation",
            Self::ProblemSolving => "analysis, methodology, edge cases",
            Self::Leadership => "influence, decision making, conflict resolution",
            Self::Adaptability => "learning, flexibility, growth mindset",
        }
    }
}

impl std::fmt::Display for RubricDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An ordinal question-difficulty level.
///
/// Tiers are plain ordinals (1 = foundational, 5 = open-ended expert);
/// each stage narrows the usable range via its configured bounds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DifficultyTier(pub u8);

impl DifficultyTier {
    pub const MIN: DifficultyTier = DifficultyTier(1);
    pub const MAX: DifficultyTier = DifficultyTier(5);

    pub fn value(&self) -> u8 {
        self.0
    }

    /// One step harder, saturating at the absolute maximum.
    pub fn up(&self) -> Self {
        Self(self.0.saturating_add(1).min(Self::MAX.0))
    }

    /// One step easier, saturating at the absolute minimum.
    pub fn down(&self) -> Self {
        Self(self.0.saturating_sub(1).max(Self::MIN.0))
    }

    /// Clamp into a stage's configured bounds.
    pub fn clamp(&self, min: DifficultyTier, max: DifficultyTier) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }

    /// Question-generation guidance for this tier.
    pub fn guidance(&self) -> &'static str {
        match self.0 {
            0 | 1 => "Ask about basic concepts, definitions, and simple use cases. Single-step problems.",
            2 => "Ask about common patterns, standard implementations, and typical scenarios. Multi-step problems.",
            3 => "Ask about applied knowledge with realistic constraints. Expect justification of choices.",
            4 => "Ask about edge cases, optimization, trade-offs, and complex integrations. Requires analysis.",
            _ => "Ask about architectural decisions, innovation, and strategic thinking. Open-ended design problems.",
        }
    }

    pub fn label(&self) -> &'static str {
        match self.0 {
            0 | 1 => "foundational",
            2 => "basic",
            3 => "intermediate",
            4 => "advanced",
            _ => "expert",
        }
    }
}

impl std::fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier {} ({})", self.0, self.label())
    }
}

/// When a stage hands over to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum TerminationRule {
    /// Advance once this many turns were taken in the stage
    MaxTurns(u32),
    /// Advance only on an explicit `advance_stage()` call
    ExplicitClose,
}

/// Immutable configuration for one interview stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage identifier
    pub id: StageId,
    /// Display name ("Technical Round")
    pub name: String,
    /// Interviewer persona the composed prompt speaks as
    pub persona: String,
    /// Synthesis voice for this persona
    pub voice: String,
    /// Competency axes scored in this stage
    pub rubric: Vec<RubricDimension>,
    /// Question pool the composer seeds from
    pub seed_questions: Vec<String>,
    /// Lowest difficulty tier the stage allows
    pub min_tier: DifficultyTier,
    /// Highest difficulty tier the stage allows
    pub max_tier: DifficultyTier,
    /// Tier the stage opens at
    pub start_tier: DifficultyTier,
    /// Stage hand-over rule
    pub termination: TerminationRule,
}

impl StageConfig {
    /// Validate the configuration.
    ///
    /// A stage that fails here is a `Composition` error: the session must
    /// never reach InProgress with it.
    pub fn validate(&self) -> Result<()> {
        if self.rubric.is_empty() {
            return Err(Error::composition(format!(
                "stage {} has an empty rubric",
                self.id
            )));
        }
        let mut seen = self.rubric.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != self.rubric.len() {
            return Err(Error::composition(format!(
                "stage {} lists a rubric dimension twice",
                self.id
            )));
        }
        if self.seed_questions.is_empty() {
            return Err(Error::composition(format!(
                "stage {} has no seed questions",
                self.id
            )));
        }
        if self.min_tier > self.max_tier {
            return Err(Error::composition(format!(
                "stage {} has inverted tier bounds ({} > {})",
                self.id,
                self.min_tier.value(),
                self.max_tier.value()
            )));
        }
        if self.start_tier < self.min_tier || self.start_tier > self.max_tier {
            return Err(Error::composition(format!(
                "stage {} starts outside its tier bounds",
                self.id
            )));
        }
        if let TerminationRule::MaxTurns(0) = self.termination {
            return Err(Error::composition(format!(
                "stage {} terminates after zero turns",
                self.id
            )));
        }
        Ok(())
    }
}

/// Built-in stages, used when no catalog document is supplied.
impl StageConfig {
    pub fn screening() -> Self {
        Self {
            id: StageId::Screening,
            name: "Screening Round".to_string(),
            persona: "an experienced HR recruiter assessing culture fit".to_string(),
            voice: "warm-recruiter".to_string(),
            rubric: vec![RubricDimension::Communication, RubricDimension::Adaptability],
            seed_questions: vec![
                "Walk me through your background and what brings you to this role.".to_string(),
                "Tell me about a work environment where you did your best work.".to_string(),
                "What are you looking for in your next position?".to_string(),
                "Describe a time you had to adjust quickly to a change you did not choose.".to_string(),
            ],
            min_tier: DifficultyTier(1),
            max_tier: DifficultyTier(3),
            start_tier: DifficultyTier(2),
            termination: TerminationRule::MaxTurns(6),
        }
    }

    pub fn technical() -> Self {
        Self {
            id: StageId::Technical,
            name: "Technical Round".to_string(),
            persona: "a pragmatic tech lead probing hard skills".to_string(),
            voice: "steady-lead".to_string(),
            rubric: vec![
                RubricDimension::TechnicalDepth,
                RubricDimension::ProblemSolving,
                RubricDimension::Communication,
            ],
            seed_questions: vec![
                "Describe the most complex system you have designed or significantly changed.".to_string(),
                "How would you diagnose a service whose latency doubled overnight?".to_string(),
                "Walk me through a trade-off you made between shipping speed and code quality.".to_string(),
                "How do you decide when something needs a cache, and what can go wrong once it has one?".to_string(),
                "Tell me about a bug that taught you something about your own assumptions.".to_string(),
            ],
            min_tier: DifficultyTier(1),
            max_tier: DifficultyTier(5),
            start_tier: DifficultyTier(3),
            termination: TerminationRule::MaxTurns(8),
        }
    }

    pub fn behavioral() -> Self {
        Self {
            id: StageId::Behavioral,
            name: "Behavioral Round".to_string(),
            persona: "a hiring manager evaluating leadership and collaboration".to_string(),
            voice: "direct-manager".to_string(),
            rubric: vec![
                RubricDimension::Leadership,
                RubricDimension::Communication,
                RubricDimension::Adaptability,
            ],
            seed_questions: vec![
                "Tell me about a disagreement with a colleague and how it was resolved.".to_string(),
                "Describe a decision you made with incomplete information.".to_string(),
                "When did you last change your mind about something important at work?".to_string(),
                "Tell me about a time you had to deliver hard feedback.".to_string(),
            ],
            min_tier: DifficultyTier(1),
            max_tier: DifficultyTier(4),
            start_tier: DifficultyTier(2),
            termination: TerminationRule::MaxTurns(6),
        }
    }
}
