//! The append-only ledger book and its query surface.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::engine::types::{ClubId, HandId, PlayerId, TableId};

use super::hash::{self, GENESIS_HASH};
use super::types::{AgentId, EntryKind, LedgerEntry, Party, PartyKind, Sequence};

const LOG_TARGET: &str = "holdem_core::ledger::book";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("recording {delta} for {party:?} would leave balance {attempted}")]
    NegativeBalance {
        party: Party,
        delta: i64,
        attempted: i64,
    },
    #[error("club entry for `{party_club}` cross-references club `{entry_club}`")]
    ClubIsolation {
        party_club: ClubId,
        entry_club: ClubId,
    },
    #[error("empty batch")]
    EmptyBatch,
}

/// Fields a caller supplies; sequence, balance and hashes are computed on
/// append and cannot be chosen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    pub affected_party: Party,
    pub delta: i64,
    pub table_id: Option<TableId>,
    pub hand_id: Option<HandId>,
    pub club_id: Option<ClubId>,
    pub reason: String,
    pub metadata: serde_json::Value,
}

impl NewEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        kind: EntryKind,
        affected_party: Party,
        delta: i64,
    ) -> Self {
        Self {
            timestamp,
            kind,
            affected_party,
            delta,
            table_id: None,
            hand_id: None,
            club_id: None,
            reason: String::new(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_table(mut self, table_id: impl Into<TableId>) -> Self {
        self.table_id = Some(table_id.into());
        self
    }

    pub fn with_hand(mut self, hand_id: impl Into<HandId>) -> Self {
        self.hand_id = Some(hand_id.into());
        self
    }

    pub fn with_club(mut self, club_id: impl Into<ClubId>) -> Self {
        self.club_id = Some(club_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityReport {
    Valid,
    BrokenAt {
        sequence: Sequence,
        expected: String,
        actual: String,
    },
}

/// Revenue totals per attribution scope, over revenue entry kinds only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueReport {
    pub platform: i64,
    pub clubs: BTreeMap<ClubId, i64>,
    pub agents: BTreeMap<AgentId, i64>,
}

#[derive(Debug, Default)]
pub struct ValueLedger {
    entries: Vec<LedgerEntry>,
    balances: BTreeMap<Party, i64>,
}

impl ValueLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_sequence(&self) -> Sequence {
        self.entries.last().map(|e| e.sequence).unwrap_or(0)
    }

    pub fn balance(&self, party: &Party) -> i64 {
        self.balances.get(party).copied().unwrap_or(0)
    }

    /// Append one entry. Computes `sequence`, `prev_hash`, `hash`, and the
    /// party's `balance_after`; fails without mutating anything if the
    /// balance would go negative or club isolation would break.
    pub fn record(&mut self, new: NewEntry) -> Result<&LedgerEntry, LedgerError> {
        self.validate(&new, self.balance(&new.affected_party))?;
        Ok(self.append_unchecked(new))
    }

    /// Append a group of entries as a unit: every entry is validated against
    /// the balances the batch itself produces, and on any failure the ledger
    /// is left untouched. This is the primitive the settlement engine builds
    /// its transaction on.
    pub fn record_batch(
        &mut self,
        batch: Vec<NewEntry>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        if batch.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }

        // Phase one: simulate balances without touching the book.
        let mut projected: BTreeMap<Party, i64> = BTreeMap::new();
        for new in &batch {
            let balance = *projected
                .entry(new.affected_party.clone())
                .or_insert_with(|| self.balance(&new.affected_party));
            self.validate(new, balance)?;
            projected.insert(new.affected_party.clone(), balance + new.delta);
        }

        // Phase two: append.
        let start = self.entries.len();
        for new in batch {
            self.append_unchecked(new);
        }
        Ok(self.entries[start..].to_vec())
    }

    fn validate(&self, new: &NewEntry, current_balance: i64) -> Result<(), LedgerError> {
        if let Party::Club { club_id } = &new.affected_party {
            if let Some(entry_club) = &new.club_id {
                if entry_club != club_id {
                    return Err(LedgerError::ClubIsolation {
                        party_club: club_id.clone(),
                        entry_club: entry_club.clone(),
                    });
                }
            }
        }
        let attempted = current_balance + new.delta;
        if attempted < 0 && new.affected_party != Party::Reserve {
            return Err(LedgerError::NegativeBalance {
                party: new.affected_party.clone(),
                delta: new.delta,
                attempted,
            });
        }
        Ok(())
    }

    fn append_unchecked(&mut self, new: NewEntry) -> &LedgerEntry {
        let sequence = self.last_sequence() + 1;
        let prev_hash = self
            .entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let balance_after = self.balance(&new.affected_party) + new.delta;
        let entry_id = Uuid::new_v4();
        let hash = hash::entry_hash(
            entry_id,
            sequence,
            new.timestamp.timestamp_millis(),
            new.kind,
            &new.affected_party,
            new.delta,
            balance_after,
            new.table_id.as_deref(),
            new.hand_id.as_deref(),
            new.club_id.as_deref(),
            &new.reason,
            &new.metadata,
            &prev_hash,
        );

        self.balances
            .insert(new.affected_party.clone(), balance_after);
        debug!(
            target: LOG_TARGET,
            sequence,
            kind = ?new.kind,
            party = ?new.affected_party,
            delta = new.delta,
            balance_after,
            "ledger append"
        );
        self.entries.push(LedgerEntry {
            entry_id,
            sequence,
            timestamp: new.timestamp,
            kind: new.kind,
            affected_party: new.affected_party,
            delta: new.delta,
            balance_after,
            table_id: new.table_id,
            hand_id: new.hand_id,
            club_id: new.club_id,
            reason: new.reason,
            metadata: new.metadata,
            prev_hash,
            hash,
        });
        self.entries.last().expect("just pushed")
    }

    /// Chips enter the ledger's scope when a stack is bought onto a table:
    /// the reserve is debited and the player credited, keeping the book
    /// zero-sum end to end.
    pub fn record_buy_in(
        &mut self,
        player_id: impl Into<PlayerId>,
        amount: u64,
        table_id: impl Into<TableId>,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let player_id = player_id.into();
        let table_id = table_id.into();
        self.record_batch(vec![
            NewEntry::new(at, EntryKind::TableBuyIn, Party::Reserve, -(amount as i64))
                .with_table(table_id.clone())
                .with_reason(format!("buy-in for {player_id}")),
            NewEntry::new(
                at,
                EntryKind::TableBuyIn,
                Party::player(player_id),
                amount as i64,
            )
            .with_table(table_id)
            .with_reason("buy-in"),
        ])?;
        Ok(())
    }

    // ---- Queries --------------------------------------------------------

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn entry_at(&self, sequence: Sequence) -> Option<&LedgerEntry> {
        if sequence == 0 {
            return None;
        }
        self.entries.get(sequence as usize - 1)
    }

    pub fn entries_for_player(&self, player_id: &PlayerId) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| {
                matches!(&e.affected_party, Party::Player { player_id: p } if p == player_id)
            })
            .collect()
    }

    pub fn entries_for_table(&self, table_id: &TableId) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.table_id.as_ref() == Some(table_id))
            .collect()
    }

    pub fn entries_for_hand(&self, hand_id: &HandId) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.hand_id.as_ref() == Some(hand_id))
            .collect()
    }

    pub fn entries_by_party_kind(&self, kind: PartyKind) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.affected_party.kind() == kind)
            .collect()
    }

    pub fn entries_in_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.timestamp >= from && e.timestamp <= to)
            .collect()
    }

    /// Entries with `from <= sequence <= to`.
    pub fn entries_in_range(&self, from: Sequence, to: Sequence) -> &[LedgerEntry] {
        if from > to || from > self.last_sequence() || from == 0 {
            return &[];
        }
        let hi = to.min(self.last_sequence()) as usize;
        &self.entries[(from - 1) as usize..hi]
    }

    /// Net delta per entry kind over the whole book.
    pub fn aggregate_by_kind(&self) -> BTreeMap<EntryKind, i64> {
        let mut totals = BTreeMap::new();
        for e in &self.entries {
            *totals.entry(e.kind).or_insert(0) += e.delta;
        }
        totals
    }

    /// Revenue (rake and time fees) attributed per scope.
    pub fn revenue_by_scope(&self) -> RevenueReport {
        let mut report = RevenueReport::default();
        for e in self.entries.iter().filter(|e| e.kind.is_revenue()) {
            match &e.affected_party {
                Party::Platform => report.platform += e.delta,
                Party::Club { club_id } => {
                    *report.clubs.entry(club_id.clone()).or_insert(0) += e.delta
                }
                Party::Agent { agent_id } => {
                    *report.agents.entry(agent_id.clone()).or_insert(0) += e.delta
                }
                Party::Player { .. } | Party::Reserve => {}
            }
        }
        report
    }

    /// Walk the chain over `from..=to`, recomputing each hash and checking
    /// `prev_hash` linkage. Returns the first broken sequence, if any.
    pub fn verify_integrity(&self, from: Sequence, to: Sequence) -> IntegrityReport {
        let mut prev: Option<&LedgerEntry> = if from > 1 {
            self.entry_at(from - 1)
        } else {
            None
        };
        for entry in self.entries_in_range(from, to) {
            let expected_prev = match prev {
                Some(p) => p.hash.as_str(),
                None if entry.sequence == 1 => GENESIS_HASH,
                // Range started past a truncated head; accept the recorded
                // prev_hash as the anchor.
                None => entry.prev_hash.as_str(),
            };
            if entry.prev_hash != expected_prev {
                return IntegrityReport::BrokenAt {
                    sequence: entry.sequence,
                    expected: expected_prev.to_string(),
                    actual: entry.prev_hash.clone(),
                };
            }
            let recomputed = hash::recompute(entry);
            if recomputed != entry.hash {
                return IntegrityReport::BrokenAt {
                    sequence: entry.sequence,
                    expected: recomputed,
                    actual: entry.hash.clone(),
                };
            }
            prev = Some(entry);
        }
        IntegrityReport::Valid
    }

    /// Sum of deltas over `from..=to`. Zero for any range that only contains
    /// whole settlement groups and buy-in pairs.
    pub fn verify_zero_sum(&self, from: Sequence, to: Sequence) -> i64 {
        self.entries_in_range(from, to)
            .iter()
            .map(|e| e.delta)
            .sum()
    }

    #[cfg(test)]
    pub(crate) fn corrupt_hash_for_tests(&mut self, sequence: Sequence, bogus: &str) {
        let entry = self
            .entries
            .get_mut(sequence as usize - 1)
            .expect("sequence exists");
        entry.hash = bogus.to_string();
    }
}

/// Shared handle: appends serialize behind the write lock so sequence
/// numbers and the hash chain stay monotonic globally, while queries run
/// concurrently under read locks.
#[derive(Debug, Default)]
pub struct SharedLedger {
    inner: RwLock<ValueLedger>,
}

impl SharedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ValueLedger> {
        self.inner.read()
    }

    pub fn record(&self, new: NewEntry) -> Result<LedgerEntry, LedgerError> {
        self.inner.write().record(new).cloned()
    }

    pub fn record_batch(&self, batch: Vec<NewEntry>) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.inner.write().record_batch(batch)
    }

    pub fn record_buy_in(
        &self,
        player_id: impl Into<PlayerId>,
        amount: u64,
        table_id: impl Into<TableId>,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.inner.write().record_buy_in(player_id, amount, table_id, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn seeded_ledger() -> ValueLedger {
        let mut ledger = ValueLedger::new();
        ledger.record_buy_in("alice", 500, "t1", at(0)).unwrap();
        ledger.record_buy_in("bob", 500, "t1", at(1)).unwrap();
        ledger
    }

    #[test]
    fn sequences_are_contiguous_and_chain_links() {
        let ledger = seeded_ledger();
        for (i, entry) in ledger.entries().iter().enumerate() {
            assert_eq!(entry.sequence, i as u64 + 1);
            if i == 0 {
                assert_eq!(entry.prev_hash, GENESIS_HASH);
            } else {
                assert_eq!(entry.prev_hash, ledger.entries()[i - 1].hash);
            }
        }
        assert_eq!(ledger.verify_integrity(1, 4), IntegrityReport::Valid);
    }

    #[test]
    fn tampered_hash_is_pinpointed() {
        let mut ledger = ValueLedger::new();
        for i in 0..5 {
            ledger
                .record_buy_in(format!("p{i}"), 100, "t1", at(i))
                .unwrap();
        }
        assert_eq!(ledger.len(), 10);
        ledger.corrupt_hash_for_tests(5, "deadbeef");
        match ledger.verify_integrity(1, 10) {
            IntegrityReport::BrokenAt {
                sequence,
                expected,
                actual,
            } => {
                assert_eq!(sequence, 5);
                assert_eq!(actual, "deadbeef");
                assert_ne!(expected, actual);
            }
            IntegrityReport::Valid => panic!("tampering went undetected"),
        }
    }

    #[test]
    fn whole_book_is_zero_sum() {
        let ledger = seeded_ledger();
        assert_eq!(ledger.verify_zero_sum(1, ledger.last_sequence()), 0);
    }

    #[test]
    fn negative_player_balance_is_rejected() {
        let mut ledger = seeded_ledger();
        let err = ledger
            .record(NewEntry::new(
                at(10),
                EntryKind::Bet,
                Party::player("alice"),
                -501,
            ))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NegativeBalance { attempted: -1, .. }));
        // Book untouched.
        assert_eq!(ledger.len(), 4);
        assert_eq!(ledger.balance(&Party::player("alice")), 500);
    }

    #[test]
    fn failed_batch_leaves_no_partial_entries() {
        let mut ledger = seeded_ledger();
        let before = ledger.len();
        let err = ledger.record_batch(vec![
            NewEntry::new(at(10), EntryKind::Bet, Party::player("alice"), -100),
            NewEntry::new(at(10), EntryKind::Bet, Party::player("bob"), -600),
        ]);
        assert!(err.is_err());
        assert_eq!(ledger.len(), before);
        assert_eq!(ledger.balance(&Party::player("alice")), 500);
    }

    #[test]
    fn club_entries_never_cross_reference_other_clubs() {
        let mut ledger = ValueLedger::new();
        let err = ledger
            .record(
                NewEntry::new(at(0), EntryKind::RakeCollected, Party::club("club-a"), 5)
                    .with_club("club-b"),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::ClubIsolation { .. }));

        ledger
            .record(
                NewEntry::new(at(0), EntryKind::RakeCollected, Party::club("club-a"), 5)
                    .with_club("club-a"),
            )
            .unwrap();
    }

    #[test]
    fn revenue_aggregates_split_by_scope() {
        let mut ledger = ValueLedger::new();
        ledger
            .record(NewEntry::new(at(0), EntryKind::RakeCollected, Party::Platform, 3))
            .unwrap();
        ledger
            .record(
                NewEntry::new(at(1), EntryKind::RakeCollected, Party::club("club-a"), 2)
                    .with_club("club-a"),
            )
            .unwrap();
        ledger
            .record(NewEntry::new(at(2), EntryKind::TimeFee, Party::Platform, 7))
            .unwrap();

        let report = ledger.revenue_by_scope();
        assert_eq!(report.platform, 10);
        assert_eq!(report.clubs.get("club-a"), Some(&2));
        assert!(report.agents.is_empty());
    }

    #[test]
    fn queries_filter_by_key() {
        let ledger = seeded_ledger();
        assert_eq!(ledger.entries_for_player(&"alice".to_string()).len(), 1);
        assert_eq!(ledger.entries_for_table(&"t1".to_string()).len(), 4);
        assert_eq!(ledger.entries_by_party_kind(PartyKind::Reserve).len(), 2);
        assert_eq!(ledger.entries_in_range(2, 3).len(), 2);
        assert!(ledger.entries_in_range(0, 9).is_empty());
        assert_eq!(
            ledger.entries_in_time_range(at(1), at(1)).len(),
            2
        );
    }
}
