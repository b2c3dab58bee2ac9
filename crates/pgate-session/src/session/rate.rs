//! Per-callsign admission control over the query log's sliding windows.

use pgate_db::{Database, RateStatus};

/// Rate limiter backed by the durable query log. Counting successful queries
/// (rather than keeping separate counters) makes denial monotonic within a
/// window: rows only age out, they are never un-counted.
#[derive(Clone)]
pub struct RateLimiter {
    db: Database,
    queries_per_hour: i64,
    queries_per_day: i64,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(db: Database, queries_per_hour: i64, queries_per_day: i64, enabled: bool) -> Self {
        Self { db, queries_per_hour, queries_per_day, enabled }
    }

    /// Admission decision. Returns `(allowed, denial_reason)`.
    pub async fn check(&self, callsign: &str) -> (bool, Option<String>) {
        if !self.enabled {
            return (true, None);
        }

        if !pgate_core::is_valid_callsign(callsign) {
            return (false, Some("Invalid callsign format".to_string()));
        }

        match self
            .db
            .check_rate_limit(&callsign.to_uppercase(), self.queries_per_hour, self.queries_per_day)
            .await
        {
            Ok((allowed, reason)) => {
                if let Some(ref reason) = reason {
                    log::warn!("[rate] limit exceeded for {}: {}", callsign, reason);
                }
                (allowed, reason)
            }
            Err(e) => {
                // A broken store must not lock every operator out.
                log::error!("[rate] check failed for {}: {}", callsign, e);
                (true, None)
            }
        }
    }

    /// Window counters for display, or `None` when limiting is disabled.
    pub async fn status(&self, callsign: &str) -> Option<RateStatus> {
        if !self.enabled {
            return None;
        }
        self.db
            .rate_limit_status(&callsign.to_uppercase(), self.queries_per_hour, self.queries_per_day)
            .await
            .ok()
    }

    /// Operator-facing rendering of the window counters.
    pub fn format_status(status: Option<&RateStatus>) -> String {
        match status {
            None => "Rate limiting is disabled.".to_string(),
            Some(s) => format!(
                "Rate limits:\nHourly: {}/{} ({} remaining)\nDaily: {}/{} ({} remaining)",
                s.hourly_used,
                s.hourly_limit,
                s.hourly_remaining,
                s.daily_used,
                s.daily_limit,
                s.daily_remaining
            ),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgate_db::QueryLog;

    async fn limiter(per_hour: i64, per_day: i64, enabled: bool) -> (RateLimiter, Database) {
        let db = Database::open_in_memory().await.unwrap();
        (RateLimiter::new(db.clone(), per_hour, per_day, enabled), db)
    }

    #[tokio::test]
    async fn disabled_limiter_always_allows() {
        let (rl, _db) = limiter(0, 0, false).await;
        let (allowed, reason) = rl.check("K0ASM").await;
        assert!(allowed);
        assert!(reason.is_none());
        assert!(rl.status("K0ASM").await.is_none());
    }

    #[tokio::test]
    async fn invalid_callsign_denied() {
        let (rl, _db) = limiter(10, 50, true).await;
        let (allowed, reason) = rl.check("127.0.0.1:5000").await;
        assert!(!allowed);
        assert_eq!(reason.unwrap(), "Invalid callsign format");
    }

    #[tokio::test]
    async fn denial_is_monotonic_within_window() {
        let (rl, db) = limiter(2, 10, true).await;
        db.log_query("K0ASM", "a", QueryLog::default()).await.unwrap();
        db.log_query("K0ASM", "b", QueryLog::default()).await.unwrap();

        let (allowed, reason) = rl.check("K0ASM").await;
        assert!(!allowed);
        assert_eq!(reason.unwrap(), "Hourly limit reached (2/hour)");

        // Still denied on every subsequent check.
        for _ in 0..3 {
            let (allowed, _) = rl.check("K0ASM").await;
            assert!(!allowed);
        }
    }

    #[tokio::test]
    async fn status_reports_both_windows() {
        let (rl, db) = limiter(10, 50, true).await;
        db.log_query("K0ASM", "a", QueryLog::default()).await.unwrap();

        let status = rl.status("K0ASM").await.unwrap();
        assert_eq!(status.hourly_used, 1);
        assert_eq!(status.hourly_remaining, 9);
        assert_eq!(status.daily_remaining, 49);

        let text = RateLimiter::format_status(Some(&status));
        assert!(text.contains("Hourly: 1/10 (9 remaining)"));
        assert!(text.contains("Daily: 1/50 (49 remaining)"));
    }

    #[tokio::test]
    async fn format_status_when_disabled() {
        assert_eq!(RateLimiter::format_status(None), "Rate limiting is disabled.");
    }
}
