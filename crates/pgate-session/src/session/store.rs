//! Session store: per-callsign conversations behind one coarse lock.
//!
//! Keys are connection identities: a callsign once known, or `ip:port` for a
//! telnet caller that has not logged in yet. The telnet authentication flow
//! moves a session from the network key to the callsign key via [`rekey`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pgate_core::OperatorInfo;
use tokio::sync::Mutex;

use crate::session::types::{HistoryMessage, Session, SessionSnapshot, SessionStats};

/// Shared handle to the session table. Cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    max_messages: usize,
}

impl SessionStore {
    pub fn new(max_messages: usize) -> Self {
        Self { sessions: Arc::new(Mutex::new(HashMap::new())), max_messages }
    }

    fn key(callsign: &str) -> String {
        callsign.to_uppercase()
    }

    /// Ensure a session exists for the key.
    pub async fn ensure(&self, callsign: &str) {
        let key = Self::key(callsign);
        let mut sessions = self.sessions.lock().await;
        sessions.entry(key.clone()).or_insert_with(|| {
            log::info!("[session] creating session for {}", key);
            Session::new(&key, self.max_messages)
        });
    }

    pub async fn add_user_message(&self, callsign: &str, content: &str) {
        self.with_session(callsign, |s| s.add_message(HistoryMessage::user(content))).await;
    }

    pub async fn add_assistant_message(&self, callsign: &str, content: &str) {
        self.with_session(callsign, |s| s.add_message(HistoryMessage::assistant(content))).await;
    }

    pub async fn history(&self, callsign: &str) -> Vec<HistoryMessage> {
        let mut sessions = self.sessions.lock().await;
        let key = Self::key(callsign);
        sessions
            .entry(key.clone())
            .or_insert_with(|| Session::new(&key, self.max_messages))
            .history()
    }

    /// Wipe conversation history; authentication state survives.
    pub async fn clear(&self, callsign: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&Self::key(callsign)) {
            session.clear();
        }
    }

    /// Drop the whole session.
    pub async fn remove(&self, callsign: &str) {
        let key = Self::key(callsign);
        if self.sessions.lock().await.remove(&key).is_some() {
            log::info!("[session] removed session for {}", key);
        }
    }

    pub async fn authenticate(&self, callsign: &str, operator_info: OperatorInfo) {
        self.with_session(callsign, |s| s.authenticate(operator_info)).await;
    }

    pub async fn is_authenticated(&self, callsign: &str) -> bool {
        self.sessions
            .lock()
            .await
            .get(&Self::key(callsign))
            .map(|s| s.authenticated)
            .unwrap_or(false)
    }

    pub async fn operator_info(&self, callsign: &str) -> Option<OperatorInfo> {
        self.sessions
            .lock()
            .await
            .get(&Self::key(callsign))
            .and_then(|s| s.operator_info.clone())
    }

    /// Move a session to a new key (telnet login). The whole move happens
    /// under the store lock; exactly one of the two keys exists afterwards.
    pub async fn rekey(&self, old_key: &str, new_key: &str) {
        let old = Self::key(old_key);
        let new = Self::key(new_key);
        if old == new {
            return;
        }

        let mut sessions = self.sessions.lock().await;
        if let Some(mut session) = sessions.remove(&old) {
            session.callsign = new.clone();
            // A session may already exist under the callsign from an earlier
            // visit; the live connection's state wins.
            sessions.insert(new.clone(), session);
            log::debug!("[session] rekeyed {} -> {}", old, new);
        }
    }

    pub async fn contains(&self, callsign: &str) -> bool {
        self.sessions.lock().await.contains_key(&Self::key(callsign))
    }

    pub async fn snapshot(&self, callsign: &str) -> Option<SessionSnapshot> {
        self.sessions.lock().await.get(&Self::key(callsign)).map(|s| SessionSnapshot {
            callsign: s.callsign.clone(),
            messages: s.message_count(),
            queries: s.query_count,
            authenticated: s.authenticated,
            created_at: s.created_at.to_rfc3339(),
            idle_seconds: s.idle_for().as_secs(),
            operator_name: s.operator_info.as_ref().map(|i| i.fullname.clone()),
        })
    }

    pub async fn active_callsigns(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    /// Remove sessions idle past `timeout`.
    pub async fn cleanup_idle(&self, timeout: Duration) {
        let mut sessions = self.sessions.lock().await;
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.idle_for() > timeout)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            log::info!("[session] removing idle session {}", key);
            sessions.remove(&key);
        }
    }

    pub async fn stats(&self) -> SessionStats {
        let sessions = self.sessions.lock().await;
        SessionStats {
            active_sessions: sessions.len(),
            total_messages: sessions.values().map(|s| s.message_count()).sum(),
            total_queries: sessions.values().map(|s| s.query_count).sum(),
        }
    }

    async fn with_session<F>(&self, callsign: &str, f: F)
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.lock().await;
        let key = Self::key(callsign);
        let session = sessions
            .entry(key.clone())
            .or_insert_with(|| Session::new(&key, self.max_messages));
        f(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_on_demand_and_uppercases() {
        let store = SessionStore::new(10);
        store.add_user_message("k0asm", "hello").await;
        assert!(store.contains("K0ASM").await);
        assert_eq!(store.history("K0ASM").await.len(), 1);
    }

    #[tokio::test]
    async fn history_bound_enforced_through_store() {
        let store = SessionStore::new(2);
        store.add_user_message("K0ASM", "a").await;
        store.add_assistant_message("K0ASM", "b").await;
        store.add_user_message("K0ASM", "c").await;

        let history = store.history("K0ASM").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "b");
    }

    #[tokio::test]
    async fn clear_keeps_auth_remove_drops_all() {
        let store = SessionStore::new(10);
        store.add_user_message("K0ASM", "hi").await;
        store.authenticate("K0ASM", OperatorInfo::unlisted("K0ASM")).await;

        store.clear("K0ASM").await;
        assert!(store.history("K0ASM").await.is_empty());
        assert!(store.is_authenticated("K0ASM").await);

        store.remove("K0ASM").await;
        assert!(!store.contains("K0ASM").await);
    }

    #[tokio::test]
    async fn rekey_moves_session_atomically() {
        let store = SessionStore::new(10);
        store.add_user_message("127.0.0.1:5000", "K0ASM").await;
        store.authenticate("127.0.0.1:5000", OperatorInfo::unlisted("K0ASM")).await;

        store.rekey("127.0.0.1:5000", "K0ASM").await;

        // Exactly one of the two keys exists.
        assert!(!store.contains("127.0.0.1:5000").await);
        assert!(store.contains("K0ASM").await);
        assert!(store.is_authenticated("K0ASM").await);
    }

    #[tokio::test]
    async fn rekey_missing_source_is_noop() {
        let store = SessionStore::new(10);
        store.rekey("nope", "K0ASM").await;
        assert!(!store.contains("K0ASM").await);
    }

    #[tokio::test]
    async fn idle_cleanup_removes_untouched_sessions() {
        let store = SessionStore::new(10);
        store.add_user_message("K0ASM", "hi").await;
        store.cleanup_idle(Duration::from_secs(0)).await;
        // Zero timeout reaps immediately on the next sweep.
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.cleanup_idle(Duration::from_millis(1)).await;
        assert!(!store.contains("K0ASM").await);
    }

    #[tokio::test]
    async fn stats_aggregate() {
        let store = SessionStore::new(10);
        store.add_user_message("K0ASM", "a").await;
        store.add_user_message("W1AW", "b").await;
        store.add_assistant_message("W1AW", "c").await;

        let stats = store.stats().await;
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.total_queries, 2);
    }
}
