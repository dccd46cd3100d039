//! The synchronization orchestrator.
//!
//! One context per table owns that table's snapshot manager, timeline, and
//! sessions; a table's mutations serialize behind its lock while separate
//! tables proceed in parallel. The table registry itself is a concurrent
//! map.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::types::{Chips, ClubId, PlayerId, TableId};

use super::diff::{DiffOp, StateDiff};
use super::errors::{SessionError, SyncError};
use super::session::{
    ClientSession, DisconnectReason, ReconnectResponse, ResumeToken, SessionManager,
    SessionStatus, SweepReport,
};
use super::snapshot::{SnapshotManager, StateSnapshot};
use super::timeline::{Attribution, TimelineManager};

const LOG_TARGET: &str = "holdem_core::sync::service";

/// Pending-ack depth beyond which the consistency check flags a session.
/// Sends still succeed past this point; the session is just reported.
const BACKPRESSURE_PENDING_ACKS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBlinds {
    pub small: Chips,
    pub big: Chips,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub session_id: Uuid,
    pub client_version: u64,
    pub client_cursor: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncResponse {
    NoChange {
        version: u64,
    },
    FullSnapshot {
        snapshot: StateSnapshot,
    },
    Incremental {
        diffs: Vec<StateDiff>,
        /// Set when the response was truncated to the configured maximum.
        has_gap: bool,
        version: u64,
        cursor: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectResponse {
    pub session: ClientSession,
    pub initial_sync: SyncResponse,
    pub terminated: Vec<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub session_id: Uuid,
    pub version_drift: u64,
    pub cursor_drift: u64,
    pub last_sync_age_ms: i64,
    pub pending_acks: usize,
    pub backpressured: bool,
    pub violations: Vec<String>,
}

struct TableContext {
    snapshots: SnapshotManager,
    timeline: TimelineManager,
    sessions: SessionManager,
    /// Internal token regenerated when the table is re-initialized.
    sync_token: Uuid,
}

pub struct SyncService {
    config: EngineConfig,
    tables: DashMap<TableId, Arc<RwLock<TableContext>>>,
    /// Session id to owning table, for request routing.
    session_index: DashMap<Uuid, TableId>,
}

impl SyncService {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            tables: DashMap::new(),
            session_index: DashMap::new(),
        }
    }

    /// Create the initial snapshot, timeline, and sync token for a table.
    pub fn initialize_table(
        &self,
        table_id: impl Into<TableId>,
        club_id: Option<ClubId>,
        name: impl Into<String>,
        blinds: TableBlinds,
        max_seats: u8,
    ) -> Result<StateSnapshot, SyncError> {
        let table_id = table_id.into();
        if self.tables.contains_key(&table_id) {
            return Err(SyncError::TableAlreadyExists { table_id });
        }

        let table = json!({
            "table_id": table_id.clone(),
            "club_id": club_id,
            "name": name.into(),
            "small_blind": blinds.small,
            "big_blind": blinds.big,
            "max_seats": max_seats,
        });
        let snapshots =
            SnapshotManager::new(self.config.snapshot.clone(), table, json!({}), json!({}));
        let initial = snapshots.current().clone();
        let context = TableContext {
            snapshots,
            timeline: TimelineManager::new(self.config.timeline.clone()),
            sessions: SessionManager::new(self.config.session.clone()),
            sync_token: Uuid::new_v4(),
        };
        info!(
            target: LOG_TARGET,
            table_id = %table_id,
            sync_token = %context.sync_token,
            "table initialized"
        );
        self.tables
            .insert(table_id, Arc::new(RwLock::new(context)));
        Ok(initial)
    }

    fn context(&self, table_id: &TableId) -> Result<Arc<RwLock<TableContext>>, SyncError> {
        self.tables
            .get(table_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SyncError::TableNotFound {
                table_id: table_id.clone(),
            })
    }

    fn context_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<(TableId, Arc<RwLock<TableContext>>), SyncError> {
        let table_id = self
            .session_index
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or(SyncError::Session(SessionError::SessionNotFound {
                session_id,
            }))?;
        Ok((table_id.clone(), self.context(&table_id)?))
    }

    /// Create a session at the server's current position and hand the
    /// client a full snapshot to start from. The session is Connecting
    /// until its first ack or heartbeat lands.
    pub fn connect_client(
        &self,
        player_id: impl Into<PlayerId>,
        table_id: &TableId,
        club_id: Option<ClubId>,
        device: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<ConnectResponse, SyncError> {
        let context = self.context(table_id)?;
        let mut ctx = context.write();
        let server_version = ctx.snapshots.version();
        let server_cursor = ctx.snapshots.cursor();
        let (session, terminated) = ctx.sessions.create_session(
            player_id.into(),
            table_id.clone(),
            club_id,
            device,
            server_version,
            server_cursor,
            now,
        );
        for evicted in &terminated {
            self.session_index.remove(evicted);
        }
        self.session_index
            .insert(session.session_id, table_id.clone());
        let snapshot = ctx.snapshots.current().clone();
        Ok(ConnectResponse {
            session,
            initial_sync: SyncResponse::FullSnapshot { snapshot },
            terminated,
        })
    }

    /// Decide between no-change, incremental, and full-snapshot delivery.
    pub fn handle_sync_request(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError> {
        let (_, context) = self.context_for_session(request.session_id)?;
        let ctx = context.read();
        ctx.sessions
            .get(request.session_id)
            .ok_or(SessionError::SessionNotFound {
                session_id: request.session_id,
            })?;

        let server_version = ctx.snapshots.version();
        if request.client_version == server_version {
            return Ok(SyncResponse::NoChange {
                version: server_version,
            });
        }

        let version_gap = server_version.saturating_sub(request.client_version);
        let gap = ctx.timeline.detect_gap(request.client_cursor);
        let force_full = request.client_version == 0
            || version_gap > self.config.sync.force_snapshot_threshold
            || gap.is_critical
            || !ctx.timeline.can_incremental_sync(request.client_cursor);
        if force_full {
            debug!(
                target: LOG_TARGET,
                session_id = %request.session_id,
                client_version = request.client_version,
                version_gap,
                gap_size = gap.gap_size,
                "promoting sync to full snapshot"
            );
            return Ok(SyncResponse::FullSnapshot {
                snapshot: ctx.snapshots.current().clone(),
            });
        }

        let entries = ctx.timeline.entries_since(request.client_cursor);
        let truncated = entries.len() > self.config.sync.max_diffs_in_response;
        let diffs: Vec<StateDiff> = entries
            .iter()
            .take(self.config.sync.max_diffs_in_response)
            .map(|e| e.diff.clone())
            .collect();
        Ok(SyncResponse::Incremental {
            diffs,
            has_gap: truncated,
            version: server_version,
            cursor: ctx.timeline.latest_cursor(),
        })
    }

    /// Record how far the client has caught up and drop acknowledged
    /// pending versions.
    pub fn handle_state_ack(
        &self,
        session_id: Uuid,
        ack_version: u64,
        ack_cursor: u64,
        now: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let (_, context) = self.context_for_session(session_id)?;
        let mut ctx = context.write();
        let session = ctx.sessions.get_mut(session_id)?;
        session.current_version = session.current_version.max(ack_version);
        session.timeline_cursor = session.timeline_cursor.max(ack_cursor);
        session.pending_acks.retain(|v| *v > ack_version);
        session.last_activity = now;
        if session.status == SessionStatus::Connecting {
            session.status = SessionStatus::Connected;
        }
        Ok(())
    }

    /// Funnel a state change through the snapshot manager and timeline,
    /// then enqueue the new version for every connected session. Sends are
    /// buffered: a slow session never fails the change, it just accrues
    /// pending acks until the consistency check flags it.
    pub fn apply_state_change(
        &self,
        table_id: &TableId,
        operations: Vec<DiffOp>,
        event_type: impl Into<String>,
        attribution: Attribution,
        now: DateTime<Utc>,
    ) -> Result<(StateSnapshot, StateDiff), SyncError> {
        let context = self.context(table_id)?;
        let mut ctx = context.write();
        let (snapshot, diff) = ctx.snapshots.apply_change(operations, attribution.event_id.clone())?;
        ctx.timeline
            .append(event_type, diff.clone(), attribution, now);

        let new_version = snapshot.version;
        let mut backpressured = 0usize;
        for session in ctx.sessions.sessions_mut() {
            if session.status.is_attached() {
                session.pending_acks.push(new_version);
                if session.pending_acks.len() > BACKPRESSURE_PENDING_ACKS {
                    backpressured += 1;
                }
            }
        }
        if backpressured > 0 {
            warn!(
                target: LOG_TARGET,
                table_id = %table_id,
                sessions = backpressured,
                "sessions exceeding pending-ack budget"
            );
        }

        let floor = ctx.sessions.min_live_cursor();
        ctx.timeline.evict(floor, now);
        Ok((snapshot, diff))
    }

    /// Drift report for one session, with violated thresholds listed.
    pub fn check_client_consistency(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ConsistencyReport, SyncError> {
        let (_, context) = self.context_for_session(session_id)?;
        let ctx = context.read();
        let session = ctx
            .sessions
            .get(session_id)
            .ok_or(SessionError::SessionNotFound { session_id })?;

        let version_drift = ctx.snapshots.version().saturating_sub(session.current_version);
        let cursor_drift = ctx
            .timeline
            .latest_cursor()
            .saturating_sub(session.timeline_cursor);
        let last_sync_age_ms = now
            .signed_duration_since(session.last_activity)
            .num_milliseconds();
        let backpressured = session.pending_acks.len() > BACKPRESSURE_PENDING_ACKS;

        let mut violations = Vec::new();
        if version_drift > self.config.sync.force_snapshot_threshold {
            violations.push(format!(
                "version drift {version_drift} exceeds {}",
                self.config.sync.force_snapshot_threshold
            ));
        }
        if cursor_drift > self.config.timeline.gap_threshold {
            violations.push(format!(
                "cursor drift {cursor_drift} exceeds {}",
                self.config.timeline.gap_threshold
            ));
        }
        if backpressured {
            violations.push(format!(
                "{} pending acks exceed {BACKPRESSURE_PENDING_ACKS}",
                session.pending_acks.len()
            ));
        }
        Ok(ConsistencyReport {
            session_id,
            version_drift,
            cursor_drift,
            last_sync_age_ms,
            pending_acks: session.pending_acks.len(),
            backpressured,
            violations,
        })
    }

    /// Reset a drifted client's view so its next sync request receives a
    /// full snapshot.
    pub fn force_resync(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<(), SyncError> {
        let (table_id, context) = self.context_for_session(session_id)?;
        let mut ctx = context.write();
        let session = ctx.sessions.get_mut(session_id)?;
        session.current_version = 0;
        session.timeline_cursor = 0;
        session.pending_acks.clear();
        session.last_activity = now;
        info!(
            target: LOG_TARGET,
            session_id = %session_id,
            table_id = %table_id,
            "client view reset, next sync will be a full snapshot"
        );
        Ok(())
    }

    pub fn disconnect_client(
        &self,
        session_id: Uuid,
        reason: DisconnectReason,
        now: DateTime<Utc>,
    ) -> Result<Option<ResumeToken>, SyncError> {
        let (_, context) = self.context_for_session(session_id)?;
        let mut ctx = context.write();
        Ok(ctx.sessions.disconnect(session_id, reason, now)?)
    }

    pub fn reconnect_client(
        &self,
        token: &ResumeToken,
        device: impl Into<String>,
        last_known_version: u64,
        last_known_cursor: u64,
        now: DateTime<Utc>,
    ) -> Result<ReconnectResponse, SyncError> {
        let context = self.context(&token.table_id)?;
        let mut ctx = context.write();
        let server_version = ctx.snapshots.version();
        let response = ctx.sessions.reconnect(
            token,
            device,
            last_known_version,
            last_known_cursor,
            server_version,
            self.config.sync.force_snapshot_threshold,
            now,
        )?;
        Ok(response)
    }

    pub fn heartbeat(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<(), SyncError> {
        let (_, context) = self.context_for_session(session_id)?;
        let mut ctx = context.write();
        Ok(ctx.sessions.mark_activity(session_id, now)?)
    }

    /// Run the maintenance sweep on every table.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<(TableId, SweepReport)> {
        let mut reports = Vec::new();
        for entry in self.tables.iter() {
            let mut ctx = entry.value().write();
            let report = ctx.sessions.sweep(now);
            if !report.timed_out.is_empty()
                || !report.suspended.is_empty()
                || !report.terminated.is_empty()
            {
                reports.push((entry.key().clone(), report));
            }
        }
        reports
    }

    pub fn server_version(&self, table_id: &TableId) -> Result<u64, SyncError> {
        Ok(self.context(table_id)?.read().snapshots.version())
    }
}
