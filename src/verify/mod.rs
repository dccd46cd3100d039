//! Post-hoc verification of recorded hands.
//!
//! Given the recorded inputs and outputs of a settled hand, the verifier
//! re-executes the chip motion independently, re-applies the settlement
//! rules and rake policy, recomputes the audit hashes with the same frozen
//! serialization, and reports any divergence field by field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::engine::types::{Chips, HandId, PlayerId, SeatId, Street, TableId};
use crate::settlement::rake::{RakeContext, RakePolicy};

const LOG_TARGET: &str = "holdem_core::verify";
const ATTRIBUTION_DOMAIN: &[u8] = b"holdem_core/verify/attribution/v1";
const INTEGRITY_DOMAIN: &[u8] = b"holdem_core/verify/integrity/v1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedPlayer {
    pub player_id: PlayerId,
    pub seat: SeatId,
    pub starting_stack: Chips,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordedActionKind {
    PostSmallBlind,
    PostBigBlind,
    Bet,
    Call,
    Raise,
    AllIn,
    Check,
    Fold,
}

impl RecordedActionKind {
    fn as_byte(self) -> u8 {
        match self {
            RecordedActionKind::PostSmallBlind => 0,
            RecordedActionKind::PostBigBlind => 1,
            RecordedActionKind::Bet => 2,
            RecordedActionKind::Call => 3,
            RecordedActionKind::Raise => 4,
            RecordedActionKind::AllIn => 5,
            RecordedActionKind::Check => 6,
            RecordedActionKind::Fold => 7,
        }
    }

    fn moves_chips(self) -> bool {
        !matches!(self, RecordedActionKind::Check | RecordedActionKind::Fold)
    }
}

/// One recorded action. `amount` is the chips the action moved out of the
/// player's stack (zero for checks and folds).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedAction {
    pub player_id: PlayerId,
    pub kind: RecordedActionKind,
    pub amount: Chips,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedWinner {
    pub player_id: PlayerId,
    pub amount: Chips,
}

/// Everything recorded about a settled hand, inputs and claimed outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedHand {
    pub hand_id: HandId,
    pub table_id: TableId,
    pub players: Vec<RecordedPlayer>,
    pub dealer_seat: SeatId,
    pub actions: Vec<RecordedAction>,
    pub final_street: Street,
    pub flop_seen: bool,

    pub final_stacks: BTreeMap<PlayerId, Chips>,
    pub pot_total: Chips,
    pub rake: Chips,
    pub winners: Vec<RecordedWinner>,
    pub final_state_version: u64,
    pub ledger_attribution_hash: String,
    pub integrity_checksum: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Match,
    Mismatch { diffs: Vec<FieldDiff> },
    Error { message: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub total: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub errored: usize,
    pub results: Vec<(HandId, Verdict)>,
}

pub struct ReplayVerifier {
    rake_policy: RakePolicy,
}

impl ReplayVerifier {
    pub fn new(rake_policy: RakePolicy) -> Self {
        Self { rake_policy }
    }

    /// Re-execute one recorded hand and compare every recorded output.
    pub fn verify(&self, recorded: &RecordedHand) -> Verdict {
        let simulated = match simulate(recorded) {
            Ok(s) => s,
            Err(message) => return Verdict::Error { message },
        };

        let mut diffs = Vec::new();
        let mut check = |field: &str, expected: String, actual: String| {
            if expected != actual {
                diffs.push(FieldDiff {
                    field: field.to_string(),
                    expected,
                    actual,
                });
            }
        };

        check(
            "pot_total",
            simulated.pot_total.to_string(),
            recorded.pot_total.to_string(),
        );

        let rake = self.rake_policy.evaluate(&RakeContext {
            pot_size: simulated.pot_total,
            final_street: recorded.final_street,
            flop_seen: recorded.flop_seen,
            is_uncontested: simulated.contenders <= 1,
            players_in_hand: recorded.players.len(),
            players_at_showdown: simulated.contenders,
        });
        check(
            "rake",
            rake.rake_amount.to_string(),
            recorded.rake.to_string(),
        );

        // The winners themselves come from the recorded hand ranking; what
        // must re-derive is the distributed total and the stack arithmetic.
        let distributed: Chips = recorded.winners.iter().map(|w| w.amount).sum();
        check(
            "distributed",
            (simulated.pot_total - rake.rake_amount).to_string(),
            distributed.to_string(),
        );

        for player in &recorded.players {
            let contributed = simulated
                .contributions
                .get(&player.player_id)
                .copied()
                .unwrap_or(0);
            let won: Chips = recorded
                .winners
                .iter()
                .filter(|w| w.player_id == player.player_id)
                .map(|w| w.amount)
                .sum();
            let expected_stack = player.starting_stack - contributed + won;
            let actual_stack = recorded
                .final_stacks
                .get(&player.player_id)
                .copied()
                .unwrap_or(0);
            check(
                &format!("final_stack[{}]", player.player_id),
                expected_stack.to_string(),
                actual_stack.to_string(),
            );
        }

        let net_deltas = net_deltas(recorded, &simulated.contributions);
        check(
            "ledger_attribution_hash",
            attribution_hash(&recorded.hand_id, &net_deltas, recorded.rake),
            recorded.ledger_attribution_hash.clone(),
        );
        check(
            "integrity_checksum",
            integrity_checksum(recorded, &net_deltas),
            recorded.integrity_checksum.clone(),
        );

        if diffs.is_empty() {
            Verdict::Match
        } else {
            debug!(
                target: LOG_TARGET,
                hand_id = %recorded.hand_id,
                diffs = diffs.len(),
                "recorded hand diverges from re-execution"
            );
            Verdict::Mismatch { diffs }
        }
    }

    /// Verify a collection, tallying verdicts.
    pub fn verify_batch(&self, hands: &[RecordedHand]) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            total: hands.len(),
            ..BatchOutcome::default()
        };
        for hand in hands {
            let verdict = self.verify(hand);
            match &verdict {
                Verdict::Match => outcome.matched += 1,
                Verdict::Mismatch { .. } => outcome.mismatched += 1,
                Verdict::Error { .. } => outcome.errored += 1,
            }
            outcome.results.push((hand.hand_id.clone(), verdict));
        }
        outcome
    }
}

struct Simulated {
    contributions: BTreeMap<PlayerId, Chips>,
    pot_total: Chips,
    contenders: usize,
}

/// Walk the action list, moving chips out of stacks. Fails on references to
/// unknown players or wagers beyond a stack.
fn simulate(recorded: &RecordedHand) -> Result<Simulated, String> {
    let mut stacks: BTreeMap<&PlayerId, Chips> = recorded
        .players
        .iter()
        .map(|p| (&p.player_id, p.starting_stack))
        .collect();
    let mut contributions: BTreeMap<PlayerId, Chips> = recorded
        .players
        .iter()
        .map(|p| (p.player_id.clone(), 0))
        .collect();
    let mut folded: BTreeMap<&PlayerId, bool> = recorded
        .players
        .iter()
        .map(|p| (&p.player_id, false))
        .collect();

    for (index, action) in recorded.actions.iter().enumerate() {
        let stack = stacks
            .get_mut(&action.player_id)
            .ok_or_else(|| format!("action {index} references unknown player `{}`", action.player_id))?;
        if action.kind.moves_chips() {
            *stack = stack.checked_sub(action.amount).ok_or_else(|| {
                format!(
                    "action {index}: `{}` wagers {} with only {} behind",
                    action.player_id, action.amount, stack
                )
            })?;
            *contributions
                .get_mut(&action.player_id)
                .expect("seeded above") += action.amount;
        }
        if action.kind == RecordedActionKind::Fold {
            folded.insert(&action.player_id, true);
        }
    }

    let pot_total = contributions.values().sum();
    let contenders = folded.values().filter(|f| !**f).count();
    Ok(Simulated {
        contributions,
        pot_total,
        contenders,
    })
}

/// Simulate a recorded hand and return the per-player net deltas a recorder
/// hashes into `ledger_attribution_hash` and `integrity_checksum`.
pub fn recorded_net_deltas(recorded: &RecordedHand) -> Result<Vec<(PlayerId, i64)>, String> {
    let simulated = simulate(recorded)?;
    Ok(net_deltas(recorded, &simulated.contributions))
}

/// Per-player net delta (winnings minus contribution), sorted by player id.
fn net_deltas(
    recorded: &RecordedHand,
    contributions: &BTreeMap<PlayerId, Chips>,
) -> Vec<(PlayerId, i64)> {
    let mut deltas: Vec<(PlayerId, i64)> = recorded
        .players
        .iter()
        .map(|p| {
            let contributed = contributions.get(&p.player_id).copied().unwrap_or(0) as i64;
            let won: i64 = recorded
                .winners
                .iter()
                .filter(|w| w.player_id == p.player_id)
                .map(|w| w.amount as i64)
                .sum();
            (p.player_id.clone(), won - contributed)
        })
        .collect();
    deltas.sort();
    deltas
}

fn write_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_be_bytes());
    hasher.update(s.as_bytes());
}

fn write_deltas(hasher: &mut Sha256, deltas: &[(PlayerId, i64)]) {
    hasher.update((deltas.len() as u64).to_be_bytes());
    for (player_id, delta) in deltas {
        write_str(hasher, player_id);
        hasher.update(delta.to_be_bytes());
    }
}

fn write_actions(hasher: &mut Sha256, actions: &[RecordedAction]) {
    hasher.update((actions.len() as u64).to_be_bytes());
    for action in actions {
        write_str(hasher, &action.player_id);
        hasher.update([action.kind.as_byte()]);
        hasher.update(action.amount.to_be_bytes());
    }
}

/// Hash binding the hand to who gained and lost what.
pub fn attribution_hash(hand_id: &HandId, deltas: &[(PlayerId, i64)], rake: Chips) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ATTRIBUTION_DOMAIN);
    write_str(&mut hasher, hand_id);
    write_deltas(&mut hasher, deltas);
    hasher.update(rake.to_be_bytes());
    hex::encode(hasher.finalize())
}

/// Hash binding the hand's full recorded trajectory: action sequence, net
/// deltas, rake, and the final state version.
pub fn integrity_checksum(recorded: &RecordedHand, deltas: &[(PlayerId, i64)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(INTEGRITY_DOMAIN);
    write_str(&mut hasher, &recorded.hand_id);
    hasher.update(recorded.final_state_version.to_be_bytes());
    write_actions(&mut hasher, &recorded.actions);
    write_deltas(&mut hasher, deltas);
    hasher.update(recorded.rake.to_be_bytes());
    hex::encode(hasher.finalize())
}
