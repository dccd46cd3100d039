//! Per-table ordered timeline of state changes.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TimelineConfig;
use crate::engine::types::{HandId, PlayerId};

use super::diff::StateDiff;

const LOG_TARGET: &str = "holdem_core::sync::timeline";

/// Optional provenance attached to a timeline entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub event_id: Option<String>,
    pub player_id: Option<PlayerId>,
    pub hand_id: Option<HandId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub cursor: u64,
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub event_id: Option<String>,
    pub player_id: Option<PlayerId>,
    pub hand_id: Option<HandId>,
    pub diff: StateDiff,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    pub has_gap: bool,
    /// Entries the client missed that are no longer retained.
    pub gap_size: u64,
    pub is_critical: bool,
    /// Total entries the client has not seen yet.
    pub missed_entries: u64,
}

pub struct TimelineManager {
    config: TimelineConfig,
    entries: VecDeque<TimelineEntry>,
    last_cursor: u64,
    /// Cursor of the oldest entry still in memory; entries below it have
    /// been evicted and can only be covered by a full snapshot.
    oldest_retained: u64,
}

impl TimelineManager {
    pub fn new(config: TimelineConfig) -> Self {
        Self {
            config,
            entries: VecDeque::new(),
            last_cursor: 0,
            oldest_retained: 1,
        }
    }

    pub fn latest_cursor(&self) -> u64 {
        self.last_cursor
    }

    pub fn oldest_retained_cursor(&self) -> u64 {
        self.oldest_retained
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append the next entry; the cursor always advances by exactly one.
    pub fn append(
        &mut self,
        event_type: impl Into<String>,
        diff: StateDiff,
        attribution: Attribution,
        at: DateTime<Utc>,
    ) -> &TimelineEntry {
        self.last_cursor += 1;
        let entry = TimelineEntry {
            cursor: self.last_cursor,
            version: diff.to_version,
            timestamp: at,
            event_type: event_type.into(),
            event_id: attribution.event_id,
            player_id: attribution.player_id,
            hand_id: attribution.hand_id,
            diff,
        };
        self.entries.push_back(entry);
        self.entries.back().expect("just pushed")
    }

    pub fn entry_at(&self, cursor: u64) -> Option<&TimelineEntry> {
        if cursor < self.oldest_retained || cursor > self.last_cursor {
            return None;
        }
        self.entries
            .get((cursor - self.oldest_retained) as usize)
    }

    /// Entries with cursor strictly greater than `cursor`, oldest first.
    pub fn entries_since(&self, cursor: u64) -> Vec<&TimelineEntry> {
        self.entries
            .iter()
            .filter(|e| e.cursor > cursor)
            .collect()
    }

    /// Entries with `from <= cursor <= to`.
    pub fn entries_in_range(&self, from: u64, to: u64) -> Vec<&TimelineEntry> {
        self.entries
            .iter()
            .filter(|e| e.cursor >= from && e.cursor <= to)
            .collect()
    }

    pub fn detect_gap(&self, client_cursor: u64) -> GapReport {
        let missed_entries = self.last_cursor.saturating_sub(client_cursor);
        // Entries the client needs start at client_cursor + 1; anything
        // below the retention floor is permanently gone.
        let gap_size = self
            .oldest_retained
            .saturating_sub(client_cursor + 1)
            .min(missed_entries);
        GapReport {
            has_gap: gap_size > 0,
            gap_size,
            is_critical: gap_size > self.config.gap_threshold,
            missed_entries,
        }
    }

    /// Incremental sync is possible iff every entry after the client's
    /// cursor is still retained.
    pub fn can_incremental_sync(&self, client_cursor: u64) -> bool {
        client_cursor >= self.oldest_retained.saturating_sub(1)
    }

    /// Evict down to the in-memory budget and the entry TTL, but never past
    /// the minimum cursor still needed by a connected client.
    pub fn evict(&mut self, min_client_cursor: Option<u64>, now: DateTime<Utc>) {
        let ttl = Duration::milliseconds(self.config.entry_ttl_ms as i64);
        let floor = min_client_cursor.unwrap_or(u64::MAX);
        let mut evicted = 0usize;

        while self.entries.len() > self.config.max_entries_in_memory
            || self
                .entries
                .front()
                .is_some_and(|e| now.signed_duration_since(e.timestamp) > ttl)
        {
            let Some(front) = self.entries.front() else {
                break;
            };
            // A still-connected client at cursor c needs every entry with
            // cursor > c.
            if front.cursor > floor {
                break;
            }
            self.entries.pop_front();
            self.oldest_retained = front_cursor(&self.entries, self.last_cursor);
            evicted += 1;
        }

        if evicted > 0 {
            debug!(
                target: LOG_TARGET,
                evicted,
                oldest_retained = self.oldest_retained,
                remaining = self.entries.len(),
                "timeline eviction"
            );
        }
    }
}

fn front_cursor(entries: &VecDeque<TimelineEntry>, last_cursor: u64) -> u64 {
    entries
        .front()
        .map(|e| e.cursor)
        .unwrap_or(last_cursor + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn manager(max_entries: usize, gap_threshold: u64) -> TimelineManager {
        TimelineManager::new(TimelineConfig {
            max_entries_in_memory: max_entries,
            entry_ttl_ms: 3_600_000,
            gap_threshold,
        })
    }

    fn push(mgr: &mut TimelineManager, n: u64) {
        for i in 0..n {
            let version = mgr.latest_cursor() + 1;
            let diff = StateDiff::new(version - 1, version, vec![], None);
            mgr.append("state_change", diff, Attribution::default(), at(i as i64));
        }
    }

    #[test]
    fn cursors_are_contiguous_and_increase_by_one() {
        let mut mgr = manager(100, 10);
        push(&mut mgr, 5);
        let cursors: Vec<u64> = mgr.entries_since(0).iter().map(|e| e.cursor).collect();
        assert_eq!(cursors, vec![1, 2, 3, 4, 5]);
        assert_eq!(mgr.entry_at(3).unwrap().cursor, 3);
        assert_eq!(mgr.entry_at(6), None);
    }

    #[test]
    fn range_and_since_queries_agree() {
        let mut mgr = manager(100, 10);
        push(&mut mgr, 10);
        assert_eq!(mgr.entries_since(7).len(), 3);
        assert_eq!(mgr.entries_in_range(3, 5).len(), 3);
        assert_eq!(mgr.entries_in_range(9, 100).len(), 2);
    }

    #[test]
    fn gap_detection_distinguishes_lag_from_loss() {
        let mut mgr = manager(5, 2);
        push(&mut mgr, 12);
        mgr.evict(None, at(0));
        // Entries 1..=7 evicted, 8..=12 retained.
        assert_eq!(mgr.oldest_retained_cursor(), 8);

        // A client at cursor 9 is merely behind.
        let report = mgr.detect_gap(9);
        assert_eq!(report.missed_entries, 3);
        assert!(!report.has_gap);
        assert!(mgr.can_incremental_sync(9));

        // A client at cursor 2 lost entries 3..=7.
        let report = mgr.detect_gap(2);
        assert_eq!(report.missed_entries, 10);
        assert_eq!(report.gap_size, 5);
        assert!(report.has_gap);
        assert!(report.is_critical);
        assert!(!mgr.can_incremental_sync(2));

        // The boundary client at oldest-1 can still sync incrementally.
        assert!(mgr.can_incremental_sync(7));
    }

    #[test]
    fn eviction_never_outruns_a_connected_client() {
        let mut mgr = manager(5, 10);
        push(&mut mgr, 20);
        mgr.evict(Some(3), at(0));
        // Entries with cursor > 3 must survive for the client at cursor 3.
        assert_eq!(mgr.oldest_retained_cursor(), 4);
        assert!(mgr.len() > 5);

        mgr.evict(Some(18), at(0));
        assert_eq!(mgr.len(), 5);
        assert_eq!(mgr.oldest_retained_cursor(), 16);
    }

    #[test]
    fn expired_entries_fall_to_ttl() {
        let mut mgr = TimelineManager::new(TimelineConfig {
            max_entries_in_memory: 100,
            entry_ttl_ms: 1_000,
            gap_threshold: 10,
        });
        push(&mut mgr, 3);
        // Two seconds later everything is stale.
        mgr.evict(None, at(10));
        assert!(mgr.is_empty());
        assert_eq!(mgr.oldest_retained_cursor(), 4);
        // Appending keeps numbering from where it left off.
        push(&mut mgr, 1);
        assert_eq!(mgr.latest_cursor(), 4);
    }
}
