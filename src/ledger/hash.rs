//! Canonical entry hashing for the ledger chain.
//!
//! The encoding is frozen: field order, integer widths, and domain strings
//! must never change, or historical chains stop verifying.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::types::{EntryKind, LedgerEntry, Party};

const DOMAIN_ENTRY: &[u8] = b"holdem_core/ledger/entry/v1";

/// `prev_hash` of the first entry in a chain.
pub const GENESIS_HASH: &str = "genesis";

fn write_u64(hasher: &mut Sha256, value: u64) {
    hasher.update(value.to_be_bytes());
}

fn write_i64(hasher: &mut Sha256, value: i64) {
    hasher.update(value.to_be_bytes());
}

fn write_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    write_u64(hasher, bytes.len() as u64);
    hasher.update(bytes);
}

fn write_opt_str(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(s) => {
            hasher.update([1u8]);
            write_bytes(hasher, s.as_bytes());
        }
        None => hasher.update([0u8]),
    }
}

fn write_party(hasher: &mut Sha256, party: &Party) {
    match party {
        Party::Platform => hasher.update([0u8]),
        Party::Club { club_id } => {
            hasher.update([1u8]);
            write_bytes(hasher, club_id.as_bytes());
        }
        Party::Agent { agent_id } => {
            hasher.update([2u8]);
            write_bytes(hasher, agent_id.as_bytes());
        }
        Party::Player { player_id } => {
            hasher.update([3u8]);
            write_bytes(hasher, player_id.as_bytes());
        }
        Party::Reserve => hasher.update([4u8]),
    }
}

/// Fields covered by an entry hash, in canonical order.
#[allow(clippy::too_many_arguments)]
pub fn entry_hash(
    entry_id: Uuid,
    sequence: u64,
    timestamp_millis: i64,
    kind: EntryKind,
    affected_party: &Party,
    delta: i64,
    balance_after: i64,
    table_id: Option<&str>,
    hand_id: Option<&str>,
    club_id: Option<&str>,
    reason: &str,
    metadata: &serde_json::Value,
    prev_hash: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_ENTRY);
    hasher.update(entry_id.as_bytes());
    write_u64(&mut hasher, sequence);
    write_i64(&mut hasher, timestamp_millis);
    hasher.update([kind.as_byte()]);
    write_party(&mut hasher, affected_party);
    write_i64(&mut hasher, delta);
    write_i64(&mut hasher, balance_after);
    write_opt_str(&mut hasher, table_id);
    write_opt_str(&mut hasher, hand_id);
    write_opt_str(&mut hasher, club_id);
    write_bytes(&mut hasher, reason.as_bytes());
    // serde_json maps are BTree-backed, so this string is canonical.
    write_bytes(&mut hasher, metadata.to_string().as_bytes());
    write_bytes(&mut hasher, prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute the hash a completed entry should carry.
pub fn recompute(entry: &LedgerEntry) -> String {
    entry_hash(
        entry.entry_id,
        entry.sequence,
        entry.timestamp.timestamp_millis(),
        entry.kind,
        &entry.affected_party,
        entry.delta,
        entry.balance_after,
        entry.table_id.as_deref(),
        entry.hand_id.as_deref(),
        entry.club_id.as_deref(),
        &entry.reason,
        &entry.metadata,
        &entry.prev_hash,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hash_is_stable_for_equal_fields() {
        let id = Uuid::nil();
        let at = chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let a = entry_hash(
            id,
            1,
            at.timestamp_millis(),
            EntryKind::Bet,
            &Party::player("alice"),
            -50,
            450,
            Some("t1"),
            Some("h1"),
            None,
            "preflop raise",
            &serde_json::json!({}),
            GENESIS_HASH,
        );
        let b = entry_hash(
            id,
            1,
            at.timestamp_millis(),
            EntryKind::Bet,
            &Party::player("alice"),
            -50,
            450,
            Some("t1"),
            Some("h1"),
            None,
            "preflop raise",
            &serde_json::json!({}),
            GENESIS_HASH,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn any_field_change_moves_the_hash() {
        let id = Uuid::nil();
        let base = entry_hash(
            id,
            1,
            0,
            EntryKind::Bet,
            &Party::player("alice"),
            -50,
            450,
            None,
            None,
            None,
            "",
            &serde_json::json!({}),
            GENESIS_HASH,
        );
        let delta_changed = entry_hash(
            id,
            1,
            0,
            EntryKind::Bet,
            &Party::player("alice"),
            -51,
            450,
            None,
            None,
            None,
            "",
            &serde_json::json!({}),
            GENESIS_HASH,
        );
        let party_changed = entry_hash(
            id,
            1,
            0,
            EntryKind::Bet,
            &Party::player("bob"),
            -50,
            450,
            None,
            None,
            None,
            "",
            &serde_json::json!({}),
            GENESIS_HASH,
        );
        assert_ne!(base, delta_changed);
        assert_ne!(base, party_changed);
    }
}
