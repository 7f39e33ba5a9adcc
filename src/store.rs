//! Append-only persistence collaborator.
//!
//! The engine writes sessions, turns, and reports out as they happen and
//! never reads its own writes back mid-session — live state stays in
//! memory. Store failures are the caller's to swallow; they must never
//! interrupt the conversation.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::pipeline::Turn;
use crate::report::EvaluationReport;
use crate::session::{Session, SessionId};

/// Append-only sink for session artifacts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record a session lifecycle event (started, terminal transition).
    async fn append_session(&self, session: &Session) -> Result<()>;

    /// Record a completed turn.
    async fn append_turn(&self, session_id: SessionId, turn: &Turn) -> Result<()>;

    /// Record the final evaluation report.
    async fn append_report(&self, session_id: SessionId, report: &EvaluationReport) -> Result<()>;
}

/// In-memory store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    sessions: Vec<Session>,
    turns: HashMap<SessionId, Vec<Turn>>,
    reports: HashMap<SessionId, EvaluationReport>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns recorded for a session, in append order.
    pub async fn turns_for(&self, session_id: SessionId) -> Vec<Turn> {
        self.inner
            .lock()
            .await
            .turns
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The report recorded for a session, if any.
    pub async fn report_for(&self, session_id: SessionId) -> Option<EvaluationReport> {
        self.inner.lock().await.reports.get(&session_id).cloned()
    }

    /// Number of session lifecycle records written.
    pub async fn session_event_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn append_session(&self, session: &Session) -> Result<()> {
        self.inner.lock().await.sessions.push(session.clone());
        Ok(())
    }

    async fn append_turn(&self, session_id: SessionId, turn: &Turn) -> Result<()> {
        self.inner
            .lock()
            .await
            .turns
            .entry(session_id)
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn append_report(&self, session_id: SessionId, report: &EvaluationReport) -> Result<()> {
        self.inner
            .lock()
            .await
            .reports
            .insert(session_id, report.clone());
        Ok(())
    }
}

/// Store that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

#[async_trait]
impl SessionStore for NullStore {
    async fn append_session(&self, _session: &Session) -> Result<()> {
        Ok(())
    }

    async fn append_turn(&self, _session_id: SessionId, _turn: &Turn) -> Result<()> {
        Ok(())
    }

    async fn append_report(
        &self,
        _session_id: SessionId,
        _report: &EvaluationReport,
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DifficultyTier, StageId};
    use crate::session::SessionConfig;

    #[tokio::test]
    async fn test_memory_store_appends_in_order() {
        let store = MemoryStore::new();
        let session = Session::new(
            SessionConfig::new("cand-1", "Backend Engineer"),
            vec![StageId::Technical],
            DifficultyTier(3),
        );
        store.append_session(&session).await.unwrap();

        for seq in 1..=3 {
            let turn = Turn::delivered_for_test(seq, "a", "b");
            store.append_turn(session.id, &turn).await.unwrap();
        }

        let turns = store.turns_for(session.id).await;
        assert_eq!(turns.len(), 3);
        assert_eq!(turns.iter().map(|t| t.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(store.session_event_count().await, 1);
        assert!(store.report_for(session.id).await.is_none());
    }
}
