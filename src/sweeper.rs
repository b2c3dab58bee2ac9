//! Background maintenance: one coarse sweep every minute.

use std::time::Duration;

use log::{debug, warn};

use crate::gateway::Gateway;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Fallback idle timeout when sessions are configured to drop at disconnect.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const DATA_RETENTION_DAYS: i64 = 30;
const PRESENCE_STALE_HOURS: i64 = 1;

/// Runs until shutdown; cancellation is observed within one tick.
pub async fn run(gateway: Gateway) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so the sweep starts one
    // interval after boot.
    interval.tick().await;

    loop {
        interval.tick().await;
        if !gateway.is_running() {
            break;
        }

        let idle_timeout = if gateway.config.sessions.timeout > 0 {
            Duration::from_secs(gateway.config.sessions.timeout)
        } else {
            DEFAULT_IDLE_TIMEOUT
        };

        if let Some(link) = &gateway.link {
            link.lock().await.cleanup_stale(idle_timeout).await;
        }
        if let Some(telnet) = &gateway.telnet {
            telnet.cleanup_stale(idle_timeout).await;
        }
        gateway.sessions.cleanup_idle(idle_timeout).await;

        if let Err(e) = gateway.db.cleanup_old_data(DATA_RETENTION_DAYS).await {
            warn!("[sweep] retention cleanup failed: {}", e);
        }
        if let Err(e) = gateway.db.cleanup_stale_presence(PRESENCE_STALE_HOURS).await {
            warn!("[sweep] presence cleanup failed: {}", e);
        }

        let stats = gateway.sessions.stats().await;
        debug!("[sweep] active sessions: {}", stats.active_sessions);
    }

    debug!("[sweep] exited");
}
