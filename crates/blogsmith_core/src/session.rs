//! crates/blogsmith_core/src/session.rs
//!
//! Per-request session context and the sign-in state watch.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

use crate::domain::UserId;

/// The authenticated session a request runs under. Resolved once by the auth
/// layer and handed to handlers explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub token: String,
    pub user_id: UserId,
}

/// Tracks the signed-in user of each live session token.
///
/// Observers get `Some(user)` while the session lasts and `None` once it ends.
#[derive(Default)]
pub struct SessionWatch {
    sessions: Mutex<HashMap<String, watch::Sender<Option<UserId>>>>,
}

impl SessionWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or rejoins) observation of `session`.
    pub fn observe(&self, session: &SessionContext) -> watch::Receiver<Option<UserId>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(session.token.clone())
            .or_insert_with(|| watch::channel(Some(session.user_id.clone())).0)
            .subscribe()
    }

    /// Signals sign-out to every observer of `token` and forgets it.
    pub fn end(&self, token: &str) {
        let sender = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.remove(token)
        };
        if let Some(sender) = sender {
            sender.send_replace(None);
        }
    }

    /// Drops the entry for `token` if nobody observes it any more.
    pub fn release(&self, token: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if sessions.get(token).is_some_and(|s| s.receiver_count() == 0) {
            sessions.remove(token);
        }
    }

    pub fn observed_sessions(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(token: &str) -> SessionContext {
        SessionContext {
            token: token.to_string(),
            user_id: UserId::new("u-1"),
        }
    }

    #[tokio::test]
    async fn observers_see_sign_out() {
        let watch = SessionWatch::new();
        let mut rx = watch.observe(&ctx("t1"));
        assert_eq!(*rx.borrow(), Some(UserId::new("u-1")));

        watch.end("t1");

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), None);
        assert_eq!(watch.observed_sessions(), 0);
    }

    #[tokio::test]
    async fn ending_one_session_leaves_others() {
        let watch = SessionWatch::new();
        let other = watch.observe(&ctx("t2"));
        let _mine = watch.observe(&ctx("t1"));

        watch.end("t1");

        assert_eq!(*other.borrow(), Some(UserId::new("u-1")));
        assert_eq!(watch.observed_sessions(), 1);
    }

    #[test]
    fn released_sessions_without_observers_are_forgotten() {
        let watch = SessionWatch::new();
        let rx = watch.observe(&ctx("t1"));
        watch.release("t1");
        assert_eq!(watch.observed_sessions(), 1);

        drop(rx);
        watch.release("t1");
        assert_eq!(watch.observed_sessions(), 0);
    }
}
