//! In-memory activity feed shown to operators at login.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};

const MAX_ITEMS: usize = 50;

#[derive(Debug, Clone)]
struct Activity {
    callsign: String,
    action: String,
    details: String,
    timestamp: DateTime<Utc>,
}

/// Rolling feed of recent operator actions. Cheap to clone.
#[derive(Clone, Default)]
pub struct ActivityFeed {
    activities: Arc<Mutex<VecDeque<Activity>>>,
}

impl ActivityFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, callsign: &str, action: &str, details: &str) {
        let mut activities = self.activities.lock().unwrap_or_else(|e| e.into_inner());
        activities.push_back(Activity {
            callsign: callsign.to_uppercase(),
            action: action.to_string(),
            details: details.to_string(),
            timestamp: Utc::now(),
        });
        while activities.len() > MAX_ITEMS {
            activities.pop_front();
        }
    }

    /// One-line summary of the latest activities within the age window.
    pub fn recent_summary(&self, max_items: usize, max_age_minutes: i64) -> String {
        let cutoff = Utc::now() - ChronoDuration::minutes(max_age_minutes);
        let activities = self.activities.lock().unwrap_or_else(|e| e.into_inner());

        let recent: Vec<&Activity> =
            activities.iter().rev().filter(|a| a.timestamp >= cutoff).take(max_items).collect();
        if recent.is_empty() {
            return "No recent activity".to_string();
        }

        let formatted: Vec<String> = recent
            .iter()
            .map(|a| {
                format!(
                    "{} {} {}",
                    a.callsign,
                    describe_action(&a.action, &a.details),
                    format_age(Utc::now() - a.timestamp)
                )
            })
            .collect();
        format!("Recent: {}", formatted.join(", "))
    }

    /// Distinct callsigns active within the window.
    pub fn active_users(&self, max_age_minutes: i64) -> Vec<String> {
        let cutoff = Utc::now() - ChronoDuration::minutes(max_age_minutes);
        let activities = self.activities.lock().unwrap_or_else(|e| e.into_inner());
        let mut users: Vec<String> = activities
            .iter()
            .filter(|a| a.timestamp >= cutoff)
            .map(|a| a.callsign.clone())
            .collect();
        users.sort();
        users.dedup();
        users
    }

    pub fn count_since(&self, max_age_minutes: i64) -> usize {
        let cutoff = Utc::now() - ChronoDuration::minutes(max_age_minutes);
        let activities = self.activities.lock().unwrap_or_else(|e| e.into_inner());
        activities.iter().filter(|a| a.timestamp >= cutoff).count()
    }
}

fn describe_action(action: &str, details: &str) -> String {
    match action {
        "query" => "asked a question".to_string(),
        "lookup" => {
            if details.is_empty() {
                "looked up a callsign".to_string()
            } else {
                format!("looked up {}", details)
            }
        }
        "message_sent" => "sent a message".to_string(),
        "message_read" => "read mail".to_string(),
        "pota" => "got POTA spots".to_string(),
        "search" => "searched the web".to_string(),
        "connect" => "connected".to_string(),
        "disconnect" => "disconnected".to_string(),
        "upload" => "uploaded a file".to_string(),
        "download" => "downloaded a file".to_string(),
        other => other.to_string(),
    }
}

fn format_age(age: chrono::Duration) -> String {
    let seconds = age.num_seconds().max(0);
    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h ago", seconds / 3600)
    } else {
        format!("{}d ago", seconds / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_feed_summary() {
        let feed = ActivityFeed::new();
        assert_eq!(feed.recent_summary(3, 60), "No recent activity");
    }

    #[test]
    fn summary_lists_latest_first() {
        let feed = ActivityFeed::new();
        feed.add("K0ASM", "connect", "");
        feed.add("W1AW", "query", "");
        let summary = feed.recent_summary(2, 60);
        assert!(summary.starts_with("Recent: W1AW asked a question just now"));
        assert!(summary.contains("K0ASM connected"));
    }

    #[test]
    fn summary_honors_item_cap() {
        let feed = ActivityFeed::new();
        for i in 0..5 {
            feed.add(&format!("K{}ABC", i), "query", "");
        }
        let summary = feed.recent_summary(2, 60);
        assert_eq!(summary.matches("asked a question").count(), 2);
    }

    #[test]
    fn feed_is_bounded() {
        let feed = ActivityFeed::new();
        for _ in 0..100 {
            feed.add("K0ASM", "query", "");
        }
        assert_eq!(feed.count_since(60), MAX_ITEMS);
    }

    #[test]
    fn active_users_deduplicated() {
        let feed = ActivityFeed::new();
        feed.add("K0ASM", "query", "");
        feed.add("K0ASM", "connect", "");
        feed.add("W1AW", "query", "");
        assert_eq!(feed.active_users(10), vec!["K0ASM", "W1AW"]);
    }

    #[test]
    fn age_formatting() {
        assert_eq!(format_age(chrono::Duration::seconds(30)), "just now");
        assert_eq!(format_age(chrono::Duration::seconds(120)), "2m ago");
        assert_eq!(format_age(chrono::Duration::hours(3)), "3h ago");
        assert_eq!(format_age(chrono::Duration::days(2)), "2d ago");
    }

    #[test]
    fn lookup_action_includes_target() {
        assert_eq!(describe_action("lookup", "W1AW"), "looked up W1AW");
        assert_eq!(describe_action("lookup", ""), "looked up a callsign");
    }
}
