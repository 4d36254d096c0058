//! One summary cycle at a time.
//!
//! The lock that serializes cycles is only reachable through
//! [`SessionController::try_begin`], which hands out a [`SessionGuard`];
//! dropping the guard is the only way to release it. Every critical section
//! here is synchronous, so the check-then-set can never straddle an await.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSession {
    pub id: Uuid,
    pub url: String,
}

#[derive(Default)]
struct SessionState {
    last_url: Option<String>,
    active: Option<VideoSession>,
    started: u64,
}

#[derive(Clone, Default)]
pub struct SessionController {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        // The state is plain data, a panicking holder cannot leave it torn.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a session for `url` unless one is already running or `url` is the
    /// last URL a session was started for.
    pub fn try_begin(&self, url: &str) -> Option<SessionGuard> {
        let mut state = self.state();
        if state.active.is_some() || state.last_url.as_deref() == Some(url) {
            return None;
        }

        let session = VideoSession {
            id: Uuid::new_v4(),
            url: url.to_string(),
        };
        state.last_url = Some(url.to_string());
        state.active = Some(session.clone());
        state.started += 1;
        debug!(session_id = %session.id, url, "session started");

        Some(SessionGuard {
            controller: self.clone(),
            session,
        })
    }

    pub fn is_active(&self) -> bool {
        self.state().active.is_some()
    }

    pub fn active_session(&self) -> Option<VideoSession> {
        self.state().active.clone()
    }

    pub fn last_url(&self) -> Option<String> {
        self.state().last_url.clone()
    }

    /// Number of sessions started so far.
    pub fn started(&self) -> u64 {
        self.state().started
    }

    fn finish(&self, session: &VideoSession) {
        let mut state = self.state();
        if state.active.as_ref().is_some_and(|s| s.id == session.id) {
            state.active = None;
            debug!(session_id = %session.id, "session finished");
        }
    }
}

/// Proof that a session is running. Releases the lock when dropped.
pub struct SessionGuard {
    controller: SessionController,
    session: VideoSession,
}

impl SessionGuard {
    pub fn session(&self) -> &VideoSession {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.controller.finish(&self.session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "https://www.youtube.com/watch?v=a";
    const B: &str = "https://www.youtube.com/watch?v=b";

    #[test]
    fn only_one_session_at_a_time() {
        let sessions = SessionController::new();
        let guard = sessions.try_begin(A).unwrap();
        assert!(sessions.is_active());
        assert!(sessions.try_begin(B).is_none());
        // B was refused, so it was not recorded
        assert_eq!(sessions.last_url().as_deref(), Some(A));

        drop(guard);
        assert!(!sessions.is_active());
        assert!(sessions.try_begin(B).is_some());
        assert_eq!(sessions.started(), 2);
    }

    #[test]
    fn same_url_is_not_restarted() {
        let sessions = SessionController::new();
        drop(sessions.try_begin(A).unwrap());
        assert!(sessions.try_begin(A).is_none());
    }

    #[test]
    fn guard_releases_on_panic() {
        let sessions = SessionController::new();
        let guard = sessions.try_begin(A).unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = guard;
            panic!("cycle blew up");
        }));
        assert!(result.is_err());
        assert!(!sessions.is_active());
    }

    #[test]
    fn active_session_exposes_url() {
        let sessions = SessionController::new();
        let guard = sessions.try_begin(A).unwrap();
        assert_eq!(sessions.active_session().unwrap(), *guard.session());
    }
}
