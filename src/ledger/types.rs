use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::types::{ClubId, HandId, PlayerId, TableId};

pub type Sequence = u64;
pub type AgentId = String;

/// Party whose balance an entry moves.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Party {
    Platform,
    Club { club_id: ClubId },
    Agent { agent_id: AgentId },
    Player { player_id: PlayerId },
    /// Chip float backing stacks in play. Buy-ins debit the reserve and
    /// credit the player, so the ledger sums to zero without minting chips.
    /// This is the one party whose balance runs negative.
    Reserve,
}

impl Party {
    pub fn kind(&self) -> PartyKind {
        match self {
            Party::Platform => PartyKind::Platform,
            Party::Club { .. } => PartyKind::Club,
            Party::Agent { .. } => PartyKind::Agent,
            Party::Player { .. } => PartyKind::Player,
            Party::Reserve => PartyKind::Reserve,
        }
    }

    pub fn player(player_id: impl Into<PlayerId>) -> Party {
        Party::Player {
            player_id: player_id.into(),
        }
    }

    pub fn club(club_id: impl Into<ClubId>) -> Party {
        Party::Club {
            club_id: club_id.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PartyKind {
    Platform,
    Club,
    Agent,
    Player,
    Reserve,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    TableBuyIn,
    TableCashOut,
    BlindPost,
    Bet,
    PotWin,
    PotReturn,
    RakeCollected,
    TimeFee,
}

impl EntryKind {
    pub fn as_byte(self) -> u8 {
        match self {
            EntryKind::TableBuyIn => 0,
            EntryKind::TableCashOut => 1,
            EntryKind::BlindPost => 2,
            EntryKind::Bet => 3,
            EntryKind::PotWin => 4,
            EntryKind::PotReturn => 5,
            EntryKind::RakeCollected => 6,
            EntryKind::TimeFee => 7,
        }
    }

    /// Revenue kinds feed the by-source aggregates.
    pub fn is_revenue(self) -> bool {
        matches!(self, EntryKind::RakeCollected | EntryKind::TimeFee)
    }
}

/// One immutable ledger entry. `hash` covers every field plus `prev_hash`;
/// the first entry's `prev_hash` is the literal string `"genesis"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub sequence: Sequence,
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    pub affected_party: Party,
    pub delta: i64,
    pub balance_after: i64,
    pub table_id: Option<TableId>,
    pub hand_id: Option<HandId>,
    pub club_id: Option<ClubId>,
    pub reason: String,
    pub metadata: serde_json::Value,
    pub prev_hash: String,
    pub hash: String,
}
