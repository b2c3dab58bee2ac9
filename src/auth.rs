//! Callsign authentication and the login greeting.

use log::{info, warn};

use pgate_core::OperatorInfo;

use crate::banner::get_banner;
use crate::gateway::{ConnRef, Gateway, Transport};

/// Authenticate a connection as `callsign` and greet the operator.
///
/// The syntactic callsign check happens before this is called; a failed
/// directory lookup only downgrades the greeting, never the login.
pub async fn authenticate(gateway: &Gateway, conn: &ConnRef, callsign: &str) {
    let callsign = pgate_core::normalize_callsign(callsign);
    info!("[auth] authenticating {}", callsign);

    let operator_info = match gateway.qrz.lookup(&callsign).await {
        Ok(Some(info)) => info,
        Ok(None) => {
            info!("[auth] {} not in directory, accepting anyway", callsign);
            OperatorInfo::unlisted(&callsign)
        }
        Err(e) => {
            warn!("[auth] directory lookup failed for {}: {}", callsign, e);
            OperatorInfo::unlisted(&callsign)
        }
    };

    // For telnet the identity moves from ip:port to the callsign: transport
    // table, session store, and worker queue move together under one lock.
    let conn = if conn.transport == Transport::Telnet && conn.key != callsign {
        let _guard = gateway.auth_lock.lock().await;

        if let Some(telnet) = &gateway.telnet {
            if let Err(e) = telnet.rekey(&conn.key, &callsign).await {
                warn!("[auth] rekey failed for {}: {}", conn.key, e);
                gateway
                    .send_to_station(conn, "\nThat callsign is already connected. Callsign: ")
                    .await;
                return;
            }
        }
        gateway.sessions.rekey(&conn.key, &callsign).await;
        gateway.rekey_worker(&conn.key, &callsign).await;
        ConnRef::telnet(callsign.as_str())
    } else {
        conn.clone()
    };

    let skey = gateway.session_key(&conn);
    gateway.sessions.ensure(&skey).await;
    gateway.sessions.authenticate(&skey, operator_info.clone()).await;

    // ── Greeting ────────────────────────────────────────────────────
    let grid = operator_info.grid.as_deref().unwrap_or("");
    let banner = get_banner(&gateway.config.station.callsign, grid);
    gateway.send_to_station(&conn, &format!("\n{}\n", banner)).await;

    let summary = gateway.activity.recent_summary(2, 30);
    gateway.send_to_station(&conn, &format!("{}\n", summary)).await;

    match gateway.db.unread_count(&callsign).await {
        Ok(0) | Err(_) => {}
        Ok(1) => {
            gateway
                .send_to_station(&conn, "You have 1 new message. Type 'check mail' to read it.\n")
                .await;
        }
        Ok(n) => {
            gateway
                .send_to_station(
                    &conn,
                    &format!("You have {} new messages. Type 'check mail' to read them.\n", n),
                )
                .await;
        }
    }
    gateway.send_to_station(&conn, "\n").await;

    gateway.activity.add(&callsign, "connect", "");

    let welcome = format!(
        "Welcome {} ({})!\nType 'help' for commands.\n> ",
        operator_info.fullname, callsign
    );
    gateway.send_to_station(&conn, &welcome).await;

    info!("[auth] authenticated {} - {}", callsign, operator_info.fullname);
}
