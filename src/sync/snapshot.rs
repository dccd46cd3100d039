//! Authoritative state versioning and diff generation.
//!
//! The snapshot manager is an optimization layer over the committed event
//! history: it versions every accepted change and serves either full
//! snapshots or the diffs between two versions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::config::SnapshotConfig;

use super::diff::{self, DiffOp, StateDiff};
use super::errors::SyncError;

const LOG_TARGET: &str = "holdem_core::sync::snapshot";
const SNAPSHOT_DOMAIN: &[u8] = b"holdem_core/sync/snapshot/v1";

/// A versioned full snapshot of one table's state tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub snapshot_id: Uuid,
    pub version: u64,
    pub cursor: u64,
    pub table: Value,
    pub players: Value,
    pub hand: Value,
    pub checksum: String,
}

impl StateSnapshot {
    /// Checksum over the canonical serialization of table, hand, and the
    /// players map (whose keys serialize sorted).
    pub fn compute_checksum(table: &Value, hand: &Value, players: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(SNAPSHOT_DOMAIN);
        hasher.update(table.to_string().as_bytes());
        hasher.update(hand.to_string().as_bytes());
        hasher.update(players.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn state_tree(&self) -> Value {
        serde_json::json!({
            "table": self.table,
            "players": self.players,
            "hand": self.hand,
        })
    }

    fn from_state_tree(version: u64, cursor: u64, tree: Value) -> Self {
        let table = tree.get("table").cloned().unwrap_or(Value::Null);
        let players = tree.get("players").cloned().unwrap_or(Value::Null);
        let hand = tree.get("hand").cloned().unwrap_or(Value::Null);
        let checksum = Self::compute_checksum(&table, &hand, &players);
        Self {
            snapshot_id: Uuid::new_v4(),
            version,
            cursor,
            table,
            players,
            hand,
            checksum,
        }
    }
}

pub struct SnapshotManager {
    config: SnapshotConfig,
    current: StateSnapshot,
    /// Full snapshots retained at interval anchors (version 0 included).
    retained: BTreeMap<u64, StateSnapshot>,
    /// Diffs keyed by their `to_version`.
    diffs: BTreeMap<u64, StateDiff>,
}

impl SnapshotManager {
    /// Version 0 is the initial snapshot; every accepted change increments
    /// the version by one, so the version equals the count of accepted
    /// changes since initialization.
    pub fn new(config: SnapshotConfig, table: Value, players: Value, hand: Value) -> Self {
        let checksum = StateSnapshot::compute_checksum(&table, &hand, &players);
        let current = StateSnapshot {
            snapshot_id: Uuid::new_v4(),
            version: 0,
            cursor: 0,
            table,
            players,
            hand,
            checksum,
        };
        let retained = BTreeMap::from([(0, current.clone())]);
        Self {
            config,
            current,
            retained,
            diffs: BTreeMap::new(),
        }
    }

    pub fn current(&self) -> &StateSnapshot {
        &self.current
    }

    pub fn version(&self) -> u64 {
        self.current.version
    }

    pub fn cursor(&self) -> u64 {
        self.current.cursor
    }

    /// Apply an operation set to a fresh clone of the current state and
    /// version the result. Returns the new snapshot and the diff that
    /// produced it; on any operation failure the current state is unchanged.
    pub fn apply_change(
        &mut self,
        operations: Vec<DiffOp>,
        source_event_id: Option<String>,
    ) -> Result<(StateSnapshot, StateDiff), SyncError> {
        let mut tree = self.current.state_tree();
        diff::apply_operations(&mut tree, &operations)?;

        let from_version = self.current.version;
        let new_version = from_version + 1;
        let new_cursor = self.current.cursor + 1;

        let snapshot = StateSnapshot::from_state_tree(new_version, new_cursor, tree);
        let state_diff = StateDiff::new(from_version, new_version, operations, source_event_id);

        self.diffs.insert(new_version, state_diff.clone());
        if new_version % self.config.snapshot_interval == 0 {
            self.retained.insert(new_version, snapshot.clone());
        }
        self.evict();

        debug!(
            target: LOG_TARGET,
            version = new_version,
            cursor = new_cursor,
            operations = state_diff.operations.len(),
            "state change applied"
        );

        self.current = snapshot.clone();
        Ok((snapshot, state_diff))
    }

    /// Reconstruct the full snapshot at an arbitrary retained version by
    /// replaying diffs forward from the closest retained anchor.
    pub fn snapshot_at(&self, version: u64) -> Result<StateSnapshot, SyncError> {
        if version == self.current.version {
            return Ok(self.current.clone());
        }
        let (anchor_version, anchor) = self
            .retained
            .range(..=version)
            .next_back()
            .ok_or(SyncError::VersionNotRetained {
                version,
                oldest: self.oldest_reconstructable(),
            })?;

        let mut tree = anchor.state_tree();
        let mut cursor = anchor.cursor;
        for v in anchor_version + 1..=version {
            let diff = self
                .diffs
                .get(&v)
                .ok_or(SyncError::VersionNotRetained {
                    version,
                    oldest: self.oldest_reconstructable(),
                })?;
            diff::apply_operations(&mut tree, &diff.operations)?;
            cursor += 1;
        }
        Ok(StateSnapshot::from_state_tree(version, cursor, tree))
    }

    /// Structural diff between two retained versions. Oversized diffs are
    /// refused so the caller promotes to a full snapshot instead.
    pub fn diff_between(&self, from: u64, to: u64) -> Result<StateDiff, SyncError> {
        let from_snapshot = self.snapshot_at(from)?;
        let to_snapshot = self.snapshot_at(to)?;
        let operations =
            diff::structural_diff(&from_snapshot.state_tree(), &to_snapshot.state_tree());
        if operations.len() > self.config.max_diff_operations {
            return Err(SyncError::DiffTooLarge {
                operations: operations.len(),
                max: self.config.max_diff_operations,
            });
        }
        Ok(StateDiff::new(from, to, operations, None))
    }

    /// Stored diffs with `to_version > version`, oldest first.
    pub fn diffs_since(&self, version: u64) -> Vec<&StateDiff> {
        self.diffs
            .range(version + 1..)
            .map(|(_, diff)| diff)
            .collect()
    }

    fn oldest_reconstructable(&self) -> u64 {
        self.retained.keys().next().copied().unwrap_or(0)
    }

    /// Drop old retained snapshots above the cache budget, preferring to
    /// evict non-anchor state first and always keeping the newest anchors.
    fn evict(&mut self) {
        while self.retained.len() > self.config.max_cached_snapshots {
            let oldest = *self.retained.keys().next().expect("non-empty");
            if oldest == self.current.version {
                break;
            }
            self.retained.remove(&oldest);
            // Diffs at or below the new floor can no longer anchor a replay.
            let floor = self.oldest_reconstructable();
            self.diffs = self.diffs.split_off(&(floor + 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager(interval: u64, max_cached: usize) -> SnapshotManager {
        SnapshotManager::new(
            SnapshotConfig {
                snapshot_interval: interval,
                max_cached_snapshots: max_cached,
                max_diff_operations: 256,
            },
            json!({"table_id": "t1", "name": "main"}),
            json!({"alice": {"stack": 500}}),
            json!({"pot": 0}),
        )
    }

    fn bump_pot(mgr: &mut SnapshotManager, by: u64) -> (StateSnapshot, StateDiff) {
        mgr.apply_change(vec![DiffOp::increment(&["hand", "pot"], by)], None)
            .unwrap()
    }

    #[test]
    fn versions_and_cursors_advance_by_one() {
        let mut mgr = manager(5, 10);
        for expected in 1..=7u64 {
            let (snapshot, diff) = bump_pot(&mut mgr, 10);
            assert_eq!(snapshot.version, expected);
            assert_eq!(snapshot.cursor, expected);
            assert_eq!(diff.from_version, expected - 1);
            assert_eq!(diff.to_version, expected);
        }
        assert_eq!(mgr.current().hand["pot"], 70);
    }

    #[test]
    fn failed_operations_leave_state_unversioned() {
        let mut mgr = manager(5, 10);
        let err = mgr.apply_change(
            vec![DiffOp::decrement(&["hand", "pot"], 1)],
            None,
        );
        assert!(err.is_err());
        assert_eq!(mgr.version(), 0);
        assert_eq!(mgr.current().hand["pot"], 0);
    }

    #[test]
    fn snapshot_at_replays_diffs_from_the_nearest_anchor() {
        let mut mgr = manager(5, 10);
        for _ in 0..12 {
            bump_pot(&mut mgr, 10);
        }
        // Version 7 sits between the anchors at 5 and 10.
        let snapshot = mgr.snapshot_at(7).unwrap();
        assert_eq!(snapshot.version, 7);
        assert_eq!(snapshot.cursor, 7);
        assert_eq!(snapshot.hand["pot"], 70);
        assert_eq!(
            snapshot.checksum,
            StateSnapshot::compute_checksum(&snapshot.table, &snapshot.hand, &snapshot.players)
        );
    }

    #[test]
    fn diff_between_versions_is_structural() {
        let mut mgr = manager(5, 10);
        for _ in 0..4 {
            bump_pot(&mut mgr, 25);
        }
        let diff = mgr.diff_between(1, 4).unwrap();
        assert_eq!(diff.from_version, 1);
        assert_eq!(diff.to_version, 4);
        assert_eq!(diff.operations.len(), 1);
        assert_eq!(diff.operations[0].value, Some(json!(100)));
        assert_eq!(diff.operations[0].previous_value, Some(json!(25)));
    }

    #[test]
    fn snapshot_checksum_tracks_content() {
        let mut mgr = manager(5, 10);
        let (a, _) = bump_pot(&mut mgr, 10);
        let (b, _) = bump_pot(&mut mgr, 10);
        assert_ne!(a.checksum, b.checksum);
    }

    #[test]
    fn eviction_respects_the_cache_budget() {
        let mut mgr = manager(2, 3);
        for _ in 0..20 {
            bump_pot(&mut mgr, 1);
        }
        // Budget of 3 anchors; old versions fall out of reconstruction.
        assert!(mgr.snapshot_at(1).is_err());
        assert_eq!(mgr.snapshot_at(20).unwrap().hand["pot"], 20);
        let recent = mgr.snapshot_at(19).unwrap();
        assert_eq!(recent.hand["pot"], 19);
    }

    #[test]
    fn diffs_since_returns_the_tail() {
        let mut mgr = manager(5, 10);
        for _ in 0..6 {
            bump_pot(&mut mgr, 1);
        }
        let tail = mgr.diffs_since(4);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].to_version, 5);
        assert_eq!(tail[1].to_version, 6);
    }
}
