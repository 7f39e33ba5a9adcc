//! Session state types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{DifficultyTier, StageId};
use crate::error::{Error, Result};
use crate::pipeline::Turn;

/// Unique identifier for an interview session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Completed,
    Abandoned,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied configuration for a new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Candidate identifier
    pub candidate_id: String,
    /// Target role the interview evaluates for
    pub job_role: String,
    /// Stage ordering override; catalog order when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<StageId>>,
}

impl SessionConfig {
    pub fn new(candidate_id: impl Into<String>, job_role: impl Into<String>) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            job_role: job_role.into(),
            stages: None,
        }
    }

    pub fn with_stages(mut self, stages: Vec<StageId>) -> Self {
        self.stages = Some(stages);
        self
    }
}

/// One interview session: identity, stage progress, and the append-only
/// turn log.
///
/// Mutated only through its transition methods, and only ever by the single
/// writer holding the controller's session lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub candidate_id: String,
    pub job_role: String,
    /// Ordered stage plan
    pub stages: Vec<StageId>,
    /// Index into `stages`; only ever advances
    pub stage_index: usize,
    /// Difficulty tier the next turn composes at
    pub tier: DifficultyTier,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Append-only turn log
    pub turns: Vec<Turn>,
}

impl Session {
    pub fn new(config: SessionConfig, default_stages: Vec<StageId>, start_tier: DifficultyTier) -> Self {
        let stages = config.stages.unwrap_or(default_stages);
        Self {
            id: SessionId::new(),
            candidate_id: config.candidate_id,
            job_role: config.job_role,
            stages,
            stage_index: 0,
            tier: start_tier,
            status: SessionStatus::NotStarted,
            created_at: Utc::now(),
            completed_at: None,
            turns: Vec::new(),
        }
    }

    /// Stage the session is currently in.
    pub fn current_stage(&self) -> StageId {
        self.stages[self.stage_index.min(self.stages.len() - 1)]
    }

    /// Sequence number the next turn will take (1-based, gapless).
    pub fn next_seq(&self) -> u64 {
        self.turns.len() as u64 + 1
    }

    /// Turns taken in the given stage.
    pub fn turns_in_stage(&self, stage: StageId) -> usize {
        self.turns.iter().filter(|t| t.stage == stage).count()
    }

    /// Delivered turns, in order.
    pub fn delivered_turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|t| t.is_delivered())
    }

    /// Append a turn, enforcing the gapless-sequence invariant.
    pub fn append_turn(&mut self, turn: Turn) -> Result<()> {
        if turn.seq != self.next_seq() {
            return Err(Error::Internal(format!(
                "turn sequence out of order: got {}, expected {}",
                turn.seq,
                self.next_seq()
            )));
        }
        self.turns.push(turn);
        Ok(())
    }

    /// NotStarted → InProgress at stage 0, turn 0.
    pub fn start(&mut self) -> Result<()> {
        match self.status {
            SessionStatus::NotStarted => {
                self.status = SessionStatus::InProgress;
                Ok(())
            }
            SessionStatus::InProgress => Err(Error::AlreadyStarted),
            status => Err(Error::session_closed(status.as_str())),
        }
    }

    /// Move to the next planned stage. Returns the new stage, or `None`
    /// when the plan is exhausted (the caller then completes the session).
    pub fn advance_stage(&mut self) -> Option<StageId> {
        if self.stage_index + 1 < self.stages.len() {
            self.stage_index += 1;
            Some(self.stages[self.stage_index])
        } else {
            None
        }
    }

    /// InProgress → Completed.
    pub fn complete(&mut self) -> Result<()> {
        match self.status {
            SessionStatus::InProgress => {
                self.status = SessionStatus::Completed;
                self.completed_at = Some(Utc::now());
                Ok(())
            }
            SessionStatus::NotStarted => Err(Error::NotStarted),
            status => Err(Error::session_closed(status.as_str())),
        }
    }

    /// InProgress → Abandoned.
    pub fn abandon(&mut self) -> Result<()> {
        match self.status {
            SessionStatus::InProgress => {
                self.status = SessionStatus::Abandoned;
                self.completed_at = Some(Utc::now());
                Ok(())
            }
            SessionStatus::NotStarted => Err(Error::NotStarted),
            status => Err(Error::session_closed(status.as_str())),
        }
    }

    /// NotStarted/InProgress → Failed, on unrecoverable setup error.
    pub fn fail(&mut self) -> Result<()> {
        match self.status {
            SessionStatus::NotStarted | SessionStatus::InProgress => {
                self.status = SessionStatus::Failed;
                self.completed_at = Some(Utc::now());
                Ok(())
            }
            status => Err(Error::session_closed(status.as_str())),
        }
    }

    /// Point-in-time view for `get_status` consumers.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            status: self.status,
            stage: self.current_stage(),
            stage_index: self.stage_index,
            turns: self.turns.len(),
            delivered_turns: self.delivered_turns().count(),
            tier: self.tier,
        }
    }
}

/// Read-only view of a session's progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub status: SessionStatus,
    pub stage: StageId,
    pub stage_index: usize,
    pub turns: usize,
    pub delivered_turns: usize,
    pub tier: DifficultyTier,
}
