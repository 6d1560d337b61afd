//! Concurrency-safe session store with single-writer discipline.
//!
//! Sessions live in a keyed map; every pipeline run must first acquire
//! the key's run-owner token ([`RunGuard`]) and a second run against the
//! same session id is rejected while one is in flight. Deleting a session
//! whose run is active marks it for deletion; the mark is applied when
//! the guard is released, never by killing the running stage.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CloneError, Result};
use crate::types::{CloneRequest, CloneSession, HtmlArtifact, ProgressStep, SessionStatus};

struct SessionEntry {
    session: CloneSession,
    run_active: bool,
    pending_delete: bool,
}

/// Outcome of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// A run is in flight; deletion applies when it finishes.
    MarkedForDeletion,
}

/// Keyed store for clone sessions. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<DashMap<String, SessionEntry>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Create a new session in `Pending` and return its snapshot.
    pub fn create(&self, request: CloneRequest) -> CloneSession {
        let session_id = Uuid::new_v4().to_string();
        let session = CloneSession::new(session_id.clone(), request);
        self.inner.insert(
            session_id,
            SessionEntry {
                session: session.clone(),
                run_active: false,
                pending_delete: false,
            },
        );
        session
    }

    /// Read-only snapshot of a session.
    pub fn get(&self, session_id: &str) -> Result<CloneSession> {
        self.inner
            .get(session_id)
            .map(|entry| entry.session.clone())
            .ok_or_else(|| CloneError::session(session_id, format!("Session {session_id} not found")))
    }

    pub fn list(&self) -> Vec<CloneSession> {
        let mut sessions: Vec<CloneSession> =
            self.inner.iter().map(|entry| entry.session.clone()).collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    /// Acquire the run-owner token for a session. Fails when the session
    /// is unknown or another run is already in flight.
    pub fn begin_run(&self, session_id: &str) -> Result<RunGuard> {
        let mut entry = self.inner.get_mut(session_id).ok_or_else(|| {
            CloneError::session(session_id, format!("Session {session_id} not found"))
        })?;
        if entry.run_active {
            return Err(CloneError::validation(format!(
                "Session {session_id} already has a pipeline run in flight"
            )));
        }
        entry.run_active = true;
        Ok(RunGuard {
            store: self.inner.clone(),
            session_id: session_id.to_string(),
        })
    }

    /// Transition a session's status, appending a progress step. Illegal
    /// transitions are rejected and leave the session untouched.
    pub fn transition(
        &self,
        session_id: &str,
        next: SessionStatus,
        step_name: &str,
        percentage: f32,
        message: impl Into<String>,
    ) -> Result<()> {
        let mut entry = self.inner.get_mut(session_id).ok_or_else(|| {
            CloneError::session(session_id, format!("Session {session_id} not found"))
        })?;

        let current = entry.session.status;
        if !current.can_transition(next) {
            return Err(CloneError::validation(format!(
                "Illegal session transition {current:?} -> {next:?}"
            )));
        }

        let message = message.into();
        debug!(session_id, ?current, ?next, %message, "session transition");

        let now = Utc::now();
        entry.session.status = next;
        entry.session.updated_at = now;
        entry.session.progress.push(ProgressStep {
            step_name: step_name.to_string(),
            status: next,
            progress_percentage: percentage,
            message: Some(message),
            started_at: now,
            completed_at: None,
        });
        Ok(())
    }

    /// Complete a session with its artifact.
    pub fn complete(
        &self,
        session_id: &str,
        artifact: HtmlArtifact,
        message: impl Into<String>,
    ) -> Result<()> {
        self.transition(session_id, SessionStatus::Completed, "Completed", 100.0, message)?;
        if let Some(mut entry) = self.inner.get_mut(session_id) {
            entry.session.result = Some(artifact);
            entry.session.error_message = None;
        }
        Ok(())
    }

    /// Move a session to `Failed`, recording the triggering message
    /// verbatim. A session already in a terminal state is left alone.
    pub fn fail(&self, session_id: &str, error_message: impl Into<String>) {
        let Some(mut entry) = self.inner.get_mut(session_id) else {
            return;
        };
        let current = entry.session.status;
        if !current.can_transition(SessionStatus::Failed) {
            warn!(session_id, ?current, "cannot fail session from terminal state");
            return;
        }

        let error_message = error_message.into();
        let now = Utc::now();
        entry.session.status = SessionStatus::Failed;
        entry.session.updated_at = now;
        // A failed run never exposes a partial result.
        entry.session.result = None;
        entry.session.progress.push(ProgressStep {
            step_name: "Failed".to_string(),
            status: SessionStatus::Failed,
            progress_percentage: 100.0,
            message: Some(error_message.clone()),
            started_at: now,
            completed_at: None,
        });
        entry.session.error_message = Some(error_message);
    }

    /// Append a progress step without changing status (sub-stage updates
    /// within one state).
    pub fn record_progress(
        &self,
        session_id: &str,
        step_name: &str,
        percentage: f32,
        message: impl Into<String>,
    ) -> Result<()> {
        let mut entry = self.inner.get_mut(session_id).ok_or_else(|| {
            CloneError::session(session_id, format!("Session {session_id} not found"))
        })?;
        let now = Utc::now();
        let status = entry.session.status;
        entry.session.updated_at = now;
        entry.session.progress.push(ProgressStep {
            step_name: step_name.to_string(),
            status,
            progress_percentage: percentage,
            message: Some(message.into()),
            started_at: now,
            completed_at: None,
        });
        Ok(())
    }

    pub fn increment_refinement(&self, session_id: &str) -> Result<()> {
        let mut entry = self.inner.get_mut(session_id).ok_or_else(|| {
            CloneError::session(session_id, format!("Session {session_id} not found"))
        })?;
        entry.session.refinement_iterations += 1;
        entry.session.updated_at = Utc::now();
        Ok(())
    }

    /// Delete a session, or mark it for deletion when a run is active.
    pub fn delete(&self, session_id: &str) -> Result<DeleteOutcome> {
        {
            let mut entry = self.inner.get_mut(session_id).ok_or_else(|| {
                CloneError::session(session_id, format!("Session {session_id} not found"))
            })?;
            if entry.run_active {
                entry.pending_delete = true;
                return Ok(DeleteOutcome::MarkedForDeletion);
            }
        }
        self.inner.remove(session_id);
        Ok(DeleteOutcome::Deleted)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.contains_key(session_id)
    }
}

/// Run-owner token for one session key. Releasing it re-opens the key to
/// new runs and applies any deletion requested while the run was active.
pub struct RunGuard {
    store: Arc<DashMap<String, SessionEntry>>,
    session_id: String,
}

impl std::fmt::Debug for RunGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunGuard")
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl RunGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let delete = match self.store.get_mut(&self.session_id) {
            Some(mut entry) => {
                entry.run_active = false;
                entry.pending_delete
            }
            None => false,
        };
        if delete {
            debug!(session_id = %self.session_id, "applying deferred session deletion");
            self.store.remove(&self.session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenUsage;

    fn artifact() -> HtmlArtifact {
        HtmlArtifact {
            html_content: "<!DOCTYPE html><html><body>x</body></html>".into(),
            css_content: None,
            assets: vec![],
            similarity_score: 80.0,
            generation_time_ms: 5,
            tokens_used: TokenUsage::default(),
        }
    }

    fn store_with_session() -> (SessionStore, String) {
        let store = SessionStore::new();
        let session = store.create(CloneRequest::new("https://example.com"));
        (store, session.session_id)
    }

    #[test]
    fn create_and_get_round_trip() {
        let (store, id) = store_with_session();
        let session = store.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Pending);
        assert!(store.get("missing").is_err());
    }

    #[test]
    fn second_run_on_same_session_is_rejected() {
        let (store, id) = store_with_session();
        let guard = store.begin_run(&id).unwrap();

        let err = store.begin_run(&id).unwrap_err();
        assert!(matches!(err, CloneError::Validation(_)));

        drop(guard);
        assert!(store.begin_run(&id).is_ok());
    }

    #[test]
    fn pending_cannot_skip_to_generating() {
        let (store, id) = store_with_session();
        let err = store
            .transition(&id, SessionStatus::Generating, "Generating", 40.0, "skip")
            .unwrap_err();
        assert!(matches!(err, CloneError::Validation(_)));
        assert_eq!(store.get(&id).unwrap().status, SessionStatus::Pending);
    }

    #[test]
    fn progress_steps_append_rather_than_replace() {
        let (store, id) = store_with_session();
        store
            .transition(&id, SessionStatus::Analyzing, "Blueprint Extraction", 10.0, "analyzing")
            .unwrap();
        store
            .transition(&id, SessionStatus::Generating, "HTML Assembly", 40.0, "generating")
            .unwrap();

        let session = store.get(&id).unwrap();
        assert_eq!(session.progress.len(), 2);
        assert_eq!(session.progress[0].step_name, "Blueprint Extraction");
        assert_eq!(session.progress[1].step_name, "HTML Assembly");
    }

    #[test]
    fn fail_records_message_verbatim_and_clears_result() {
        let (store, id) = store_with_session();
        store
            .transition(&id, SessionStatus::Analyzing, "Analyzing", 10.0, "go")
            .unwrap();
        store.fail(&id, "Extraction failed: net::ERR_NAME_NOT_RESOLVED");

        let session = store.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(
            session.error_message.as_deref(),
            Some("Extraction failed: net::ERR_NAME_NOT_RESOLVED")
        );
        assert!(session.result.is_none());
    }

    #[test]
    fn failed_sessions_never_transition_out() {
        let (store, id) = store_with_session();
        store
            .transition(&id, SessionStatus::Analyzing, "Analyzing", 10.0, "go")
            .unwrap();
        store.fail(&id, "boom");

        for next in [
            SessionStatus::Pending,
            SessionStatus::Analyzing,
            SessionStatus::Generating,
            SessionStatus::Refining,
            SessionStatus::Completed,
        ] {
            assert!(store.transition(&id, next, "x", 0.0, "x").is_err());
        }
    }

    #[test]
    fn complete_sets_result_and_clears_error() {
        let (store, id) = store_with_session();
        store
            .transition(&id, SessionStatus::Analyzing, "Analyzing", 10.0, "go")
            .unwrap();
        store
            .transition(&id, SessionStatus::Generating, "Generating", 40.0, "go")
            .unwrap();
        store.complete(&id, artifact(), "done").unwrap();

        let session = store.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.result.is_some());
        assert!(session.error_message.is_none());
    }

    #[test]
    fn delete_while_running_defers_until_guard_drop() {
        let (store, id) = store_with_session();
        let guard = store.begin_run(&id).unwrap();

        assert_eq!(store.delete(&id).unwrap(), DeleteOutcome::MarkedForDeletion);
        assert!(store.contains(&id));

        drop(guard);
        assert!(!store.contains(&id));
    }

    #[test]
    fn delete_idle_session_is_immediate() {
        let (store, id) = store_with_session();
        assert_eq!(store.delete(&id).unwrap(), DeleteOutcome::Deleted);
        assert!(store.delete(&id).is_err());
    }

    #[test]
    fn list_returns_newest_first() {
        let store = SessionStore::new();
        let first = store.create(CloneRequest::new("https://a.com"));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = store.create(CloneRequest::new("https://b.com"));

        let listed = store.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].session_id, second.session_id);
        assert_eq!(listed[1].session_id, first.session_id);
    }
}
