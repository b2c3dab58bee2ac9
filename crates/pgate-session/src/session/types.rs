//! Session types: bounded conversation history plus identity state.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use pgate_core::OperatorInfo;
use serde::{Deserialize, Serialize};

/// Message author within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: ChatRole,
    pub content: String,
}

impl HistoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Conversation state for one callsign.
#[derive(Debug)]
pub struct Session {
    pub callsign: String,
    max_messages: usize,
    messages: VecDeque<HistoryMessage>,
    pub created_at: DateTime<Utc>,
    pub last_activity: Instant,
    pub query_count: u64,
    pub authenticated: bool,
    pub operator_info: Option<OperatorInfo>,
}

impl Session {
    pub fn new(callsign: &str, max_messages: usize) -> Self {
        Self {
            callsign: callsign.to_uppercase(),
            max_messages,
            messages: VecDeque::with_capacity(max_messages),
            created_at: Utc::now(),
            last_activity: Instant::now(),
            query_count: 0,
            authenticated: false,
            operator_info: None,
        }
    }

    /// Append a turn, evicting the oldest once the bound is hit.
    pub fn add_message(&mut self, message: HistoryMessage) {
        if message.role == ChatRole::User {
            self.query_count += 1;
        }
        self.messages.push_back(message);
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
        self.last_activity = Instant::now();
    }

    pub fn history(&self) -> Vec<HistoryMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Wipe the conversation but keep identity and counters.
    pub fn clear(&mut self) {
        self.messages.clear();
        log::info!("[session:{}] conversation history cleared", self.callsign);
    }

    pub fn authenticate(&mut self, operator_info: OperatorInfo) {
        log::info!("[session:{}] authenticated as {}", self.callsign, operator_info.fullname);
        self.authenticated = true;
        self.operator_info = Some(operator_info);
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Read-only view of a session for status displays and tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub callsign: String,
    pub messages: usize,
    pub queries: u64,
    pub authenticated: bool,
    pub created_at: String,
    pub idle_seconds: u64,
    pub operator_name: Option<String>,
}

/// Store-wide counters.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub total_messages: usize,
    pub total_queries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_eviction_is_strict() {
        let mut s = Session::new("K0ASM", 3);
        for i in 0..5 {
            s.add_message(HistoryMessage::user(format!("m{i}")));
        }
        let history = s.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "m2");
        assert_eq!(history[2].content, "m4");
    }

    #[test]
    fn bound_holds_for_any_sequence() {
        let mut s = Session::new("K0ASM", 4);
        for i in 0..20 {
            if i % 2 == 0 {
                s.add_message(HistoryMessage::user(format!("u{i}")));
            } else {
                s.add_message(HistoryMessage::assistant(format!("a{i}")));
            }
            assert!(s.message_count() <= 4);
        }
    }

    #[test]
    fn query_count_counts_user_turns_only() {
        let mut s = Session::new("K0ASM", 10);
        s.add_message(HistoryMessage::user("hi"));
        s.add_message(HistoryMessage::assistant("hello"));
        s.add_message(HistoryMessage::user("again"));
        assert_eq!(s.query_count, 2);
    }

    #[test]
    fn clear_preserves_auth() {
        let mut s = Session::new("K0ASM", 10);
        s.authenticate(pgate_core::OperatorInfo::unlisted("K0ASM"));
        s.add_message(HistoryMessage::user("hi"));
        s.clear();
        assert_eq!(s.message_count(), 0);
        assert!(s.authenticated);
        assert!(s.operator_info.is_some());
    }

    #[test]
    fn role_serialization_is_lowercase() {
        let json = serde_json::to_string(&ChatRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
