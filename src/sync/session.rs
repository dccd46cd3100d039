//! Client session lifecycle and resume tokens.
//!
//! The session manager owns every client cursor and all status
//! transitions; nothing else writes them. Time never comes from a clock
//! here — every operation that compares or records time takes `now` from
//! the caller, so the whole lifecycle is deterministic under test.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::engine::types::{ClubId, PlayerId, TableId};

use super::errors::SessionError;

const LOG_TARGET: &str = "holdem_core::sync::session";
const TOKEN_DOMAIN: &[u8] = b"holdem_core/sync/resume_token/v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Created, but no activity seen yet; the first ack or heartbeat
    /// promotes the session to Connected.
    Connecting,
    Connected,
    Disconnected,
    /// A resumption attempt is underway: the client presented a token with
    /// a valid signature. A failed attempt leaves the session here until a
    /// retry succeeds or the sweep winds it down.
    Reconnecting,
    Suspended,
    Terminated,
}

impl SessionStatus {
    /// States in which a client is attached to the table and receives
    /// broadcasts.
    pub fn is_attached(self) -> bool {
        matches!(
            self,
            SessionStatus::Connecting | SessionStatus::Connected | SessionStatus::Reconnecting
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    UserRequested,
    NetworkError,
    Timeout,
    Kicked,
    TableClosed,
    DuplicateSession,
}

impl DisconnectReason {
    /// Kicks, table closures, and duplicate-session evictions are final.
    pub fn resumable(self) -> bool {
        !matches!(
            self,
            DisconnectReason::Kicked
                | DisconnectReason::TableClosed
                | DisconnectReason::DuplicateSession
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSession {
    pub session_id: Uuid,
    pub player_id: PlayerId,
    pub device: String,
    pub table_id: TableId,
    pub club_id: Option<ClubId>,
    pub status: SessionStatus,
    /// Latest snapshot version the client has acknowledged.
    pub current_version: u64,
    pub timeline_cursor: u64,
    /// Versions sent but not yet acknowledged.
    pub pending_acks: Vec<u64>,
    pub reconnect_attempts: u32,
    pub can_resume: bool,
    pub disconnect_reason: Option<DisconnectReason>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub disconnected_at: Option<DateTime<Utc>>,
}

/// Signed, short-lived credential letting a disconnected client rejoin
/// with its identity and last-known position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken {
    pub session_id: Uuid,
    pub player_id: PlayerId,
    pub table_id: TableId,
    pub last_version: u64,
    pub last_cursor: u64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
}

impl ResumeToken {
    fn compute_signature(
        session_id: Uuid,
        player_id: &PlayerId,
        table_id: &TableId,
        last_version: u64,
        last_cursor: u64,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(TOKEN_DOMAIN);
        hasher.update(session_id.as_bytes());
        hasher.update((player_id.len() as u64).to_be_bytes());
        hasher.update(player_id.as_bytes());
        hasher.update((table_id.len() as u64).to_be_bytes());
        hasher.update(table_id.as_bytes());
        hasher.update(last_version.to_be_bytes());
        hasher.update(last_cursor.to_be_bytes());
        hasher.update(issued_at.timestamp_millis().to_be_bytes());
        hasher.update(expires_at.timestamp_millis().to_be_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify_signature(&self) -> bool {
        self.signature
            == Self::compute_signature(
                self.session_id,
                &self.player_id,
                &self.table_id,
                self.last_version,
                self.last_cursor,
                self.issued_at,
                self.expires_at,
            )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectResponse {
    pub session_id: Uuid,
    pub current_version: u64,
    /// `server_version - last_known_version` at reconnect time.
    pub missed_events: u64,
    pub requires_full_sync: bool,
}

/// Sessions moved by a maintenance sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub timed_out: Vec<Uuid>,
    pub suspended: Vec<Uuid>,
    pub terminated: Vec<Uuid>,
}

pub struct SessionManager {
    config: SessionConfig,
    sessions: BTreeMap<Uuid, ClientSession>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: BTreeMap::new(),
        }
    }

    pub fn get(&self, session_id: Uuid) -> Option<&ClientSession> {
        self.sessions.get(&session_id)
    }

    pub fn get_mut(&mut self, session_id: Uuid) -> Result<&mut ClientSession, SessionError> {
        self.sessions
            .get_mut(&session_id)
            .ok_or(SessionError::SessionNotFound { session_id })
    }

    pub fn sessions(&self) -> impl Iterator<Item = &ClientSession> {
        self.sessions.values()
    }

    pub fn connected_sessions(&self) -> impl Iterator<Item = &ClientSession> {
        self.sessions
            .values()
            .filter(|s| s.status == SessionStatus::Connected)
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut ClientSession> {
        self.sessions.values_mut()
    }

    /// Smallest timeline cursor any live session still needs. The timeline
    /// refuses to evict below this. Sessions that can never come back
    /// (terminated, suspended, or disconnected without resume) do not hold
    /// the floor.
    pub fn min_live_cursor(&self) -> Option<u64> {
        self.sessions
            .values()
            .filter(|s| {
                s.status.is_attached()
                    || (s.status == SessionStatus::Disconnected && s.can_resume)
            })
            .map(|s| s.timeline_cursor)
            .min()
    }

    /// Create a session for a player, evicting their least-recently-active
    /// sessions beyond the per-player budget. The session starts in
    /// Connecting; its first ack or heartbeat promotes it to Connected.
    pub fn create_session(
        &mut self,
        player_id: PlayerId,
        table_id: TableId,
        club_id: Option<ClubId>,
        device: impl Into<String>,
        server_version: u64,
        server_cursor: u64,
        now: DateTime<Utc>,
    ) -> (ClientSession, Vec<Uuid>) {
        let mut live: Vec<(Uuid, DateTime<Utc>)> = self
            .sessions
            .values()
            .filter(|s| s.player_id == player_id && s.status != SessionStatus::Terminated)
            .map(|s| (s.session_id, s.last_activity))
            .collect();
        live.sort_by_key(|(_, activity)| *activity);

        let mut terminated = Vec::new();
        while live.len() + 1 > self.config.max_sessions_per_player {
            let (evict_id, _) = live.remove(0);
            if let Some(s) = self.sessions.get_mut(&evict_id) {
                s.status = SessionStatus::Terminated;
                s.can_resume = false;
                s.disconnect_reason = Some(DisconnectReason::DuplicateSession);
                s.disconnected_at = Some(now);
            }
            terminated.push(evict_id);
        }

        let session = ClientSession {
            session_id: Uuid::new_v4(),
            player_id: player_id.clone(),
            device: device.into(),
            table_id,
            club_id,
            status: SessionStatus::Connecting,
            current_version: server_version,
            timeline_cursor: server_cursor,
            pending_acks: Vec::new(),
            reconnect_attempts: 0,
            can_resume: true,
            disconnect_reason: None,
            connected_at: now,
            last_activity: now,
            disconnected_at: None,
        };
        info!(
            target: LOG_TARGET,
            session_id = %session.session_id,
            player_id = %player_id,
            evicted = terminated.len(),
            "session created"
        );
        self.sessions.insert(session.session_id, session.clone());
        (session, terminated)
    }

    pub fn mark_activity(&mut self, session_id: Uuid, now: DateTime<Utc>) -> Result<(), SessionError> {
        let session = self.get_mut(session_id)?;
        session.last_activity = now;
        if session.status == SessionStatus::Connecting {
            session.status = SessionStatus::Connected;
        }
        Ok(())
    }

    /// Move a session to Disconnected. Resumable disconnects get a signed
    /// token with the configured TTL; final ones clear `can_resume`.
    pub fn disconnect(
        &mut self,
        session_id: Uuid,
        reason: DisconnectReason,
        now: DateTime<Utc>,
    ) -> Result<Option<ResumeToken>, SessionError> {
        let ttl = Duration::milliseconds(self.config.resume_token_ttl_ms as i64);
        let session = self.get_mut(session_id)?;
        session.status = SessionStatus::Disconnected;
        session.disconnect_reason = Some(reason);
        session.disconnected_at = Some(now);
        session.last_activity = now;
        if !reason.resumable() {
            session.can_resume = false;
            debug!(
                target: LOG_TARGET,
                session_id = %session_id,
                ?reason,
                "session disconnected without resume"
            );
            return Ok(None);
        }

        let expires_at = now + ttl;
        let signature = ResumeToken::compute_signature(
            session.session_id,
            &session.player_id,
            &session.table_id,
            session.current_version,
            session.timeline_cursor,
            now,
            expires_at,
        );
        debug!(
            target: LOG_TARGET,
            session_id = %session_id,
            ?reason,
            expires_at = %expires_at,
            "session disconnected, resume token issued"
        );
        Ok(Some(ResumeToken {
            session_id: session.session_id,
            player_id: session.player_id.clone(),
            table_id: session.table_id.clone(),
            last_version: session.current_version,
            last_cursor: session.timeline_cursor,
            issued_at: now,
            expires_at,
            signature,
        }))
    }

    /// Validate a resume token and bring the session back to Connected.
    #[allow(clippy::too_many_arguments)]
    pub fn reconnect(
        &mut self,
        token: &ResumeToken,
        device: impl Into<String>,
        last_known_version: u64,
        last_known_cursor: u64,
        server_version: u64,
        force_snapshot_threshold: u64,
        now: DateTime<Utc>,
    ) -> Result<ReconnectResponse, SessionError> {
        if !token.verify_signature() {
            return Err(SessionError::InvalidResumeToken {
                reason: "signature mismatch".to_string(),
            });
        }
        if now > token.expires_at {
            return Err(SessionError::ResumeTokenExpired {
                expired_at: token.expires_at,
            });
        }

        let max_attempts = self.config.max_reconnect_attempts;
        let session = self.get_mut(token.session_id)?;
        if token.player_id != session.player_id || token.table_id != session.table_id {
            return Err(SessionError::InvalidResumeToken {
                reason: "token does not match session identity".to_string(),
            });
        }
        if session.status == SessionStatus::Terminated || !session.can_resume {
            return Err(SessionError::SessionNotResumable {
                session_id: session.session_id,
            });
        }

        // Identity established: the resumption attempt is underway. A
        // failure below leaves the session in Reconnecting until a retry
        // succeeds or the sweep winds it down.
        session.status = SessionStatus::Reconnecting;
        session.last_activity = now;
        if session.reconnect_attempts >= max_attempts {
            return Err(SessionError::MaxReconnectAttemptsExceeded {
                session_id: session.session_id,
                max_attempts,
            });
        }

        session.reconnect_attempts += 1;
        session.status = SessionStatus::Connected;
        session.device = device.into();
        session.current_version = last_known_version;
        session.timeline_cursor = last_known_cursor;
        session.disconnected_at = None;

        let missed_events = server_version.saturating_sub(last_known_version);
        info!(
            target: LOG_TARGET,
            session_id = %session.session_id,
            attempt = session.reconnect_attempts,
            missed_events,
            "session resumed"
        );
        Ok(ReconnectResponse {
            session_id: session.session_id,
            current_version: server_version,
            missed_events,
            requires_full_sync: missed_events > force_snapshot_threshold,
        })
    }

    /// One maintenance pass, caller-clocked: connected sessions whose
    /// heartbeat lapsed go to Disconnected; disconnected sessions past the
    /// reconnect window are suspended (resume gone, state kept for audit);
    /// suspended sessions past the session timeout are terminated for good.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepReport {
        let heartbeat = Duration::milliseconds(self.config.heartbeat_timeout_ms as i64);
        let window = Duration::milliseconds(self.config.reconnect_window_ms as i64);
        let timeout = Duration::milliseconds(self.config.session_timeout_ms as i64);
        let mut report = SweepReport::default();

        for session in self.sessions.values_mut() {
            match session.status {
                SessionStatus::Connected | SessionStatus::Connecting => {
                    if now.signed_duration_since(session.last_activity) > heartbeat {
                        session.status = SessionStatus::Disconnected;
                        session.disconnect_reason = Some(DisconnectReason::Timeout);
                        session.disconnected_at = Some(now);
                        report.timed_out.push(session.session_id);
                    }
                }
                SessionStatus::Disconnected | SessionStatus::Reconnecting => {
                    let since = session.disconnected_at.unwrap_or(session.last_activity);
                    if now.signed_duration_since(since) > window {
                        session.status = SessionStatus::Suspended;
                        session.can_resume = false;
                        report.suspended.push(session.session_id);
                    }
                }
                SessionStatus::Suspended => {
                    let since = session.disconnected_at.unwrap_or(session.last_activity);
                    if now.signed_duration_since(since) > timeout {
                        session.status = SessionStatus::Terminated;
                        report.terminated.push(session.session_id);
                    }
                }
                SessionStatus::Terminated => {}
            }
        }

        if !report.timed_out.is_empty()
            || !report.suspended.is_empty()
            || !report.terminated.is_empty()
        {
            info!(
                target: LOG_TARGET,
                timed_out = report.timed_out.len(),
                suspended = report.suspended.len(),
                terminated = report.terminated.len(),
                "maintenance sweep"
            );
        }
        report
    }
}
