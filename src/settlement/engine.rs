//! Atomic hand settlement: pot layering, rake, distribution, ledger commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::cards::Card;
use crate::config::{OddChipRule, SettlementConfig};
use crate::engine::types::{Chips, ClubId, HandId, PlayerId, Pot, PotKind, SeatId, Street, TableId};
use crate::ledger::types::AgentId;
use crate::ledger::{EntryKind, NewEntry, Party, SharedLedger};

use super::errors::SettlementError;
use super::pots::{self, Contribution};
use super::rake::{RakeContext, RakeOutcome, RakePolicy};

const LOG_TARGET: &str = "holdem_core::settlement::engine";
const ODD_CHIP_DOMAIN: &[u8] = b"holdem_core/settlement/odd_chip/v1";

/// Relative strength of a showdown hand. Higher compares stronger; the
/// ranking scheme itself is an external collaborator's concern.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandRank {
    pub score: u32,
    pub label: String,
}

/// Pluggable hand-strength evaluation, consumed at showdown only.
pub trait HandRanker {
    fn rank(&self, hole: &[Card; 2], community: &[Card]) -> HandRank;
}

/// How the collected rake is attributed. The engine computes only the total
/// rake; the split across platform, club, and agent is policy owned by the
/// caller. Shares are in thousandths; the platform absorbs the remainder.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionPolicy {
    pub club_share_per_mille: u32,
    pub agent_share_per_mille: u32,
    pub agent_id: Option<AgentId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlePlayer {
    pub player_id: PlayerId,
    pub seat: SeatId,
    /// Total wagered over the hand, blinds included.
    pub contribution: Chips,
    pub folded: bool,
    pub all_in: bool,
    pub hole_cards: Option<[Card; 2]>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleRequest {
    pub hand_id: HandId,
    pub table_id: TableId,
    pub club_id: Option<ClubId>,
    pub dealer_seat: SeatId,
    pub players: Vec<SettlePlayer>,
    pub community: Vec<Card>,
    pub final_street: Street,
    pub flop_seen: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotAward {
    pub pot_index: usize,
    pub kind: PotKind,
    pub amount: Chips,
    pub rake: Chips,
    pub winners: Vec<PlayerId>,
    pub payouts: Vec<(PlayerId, Chips)>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub hand_id: HandId,
    pub table_id: TableId,
    pub pots: Vec<Pot>,
    pub total_pot: Chips,
    pub rake: RakeOutcome,
    pub awards: Vec<PotAward>,
    /// Total credited per player across all pots.
    pub payouts: BTreeMap<PlayerId, Chips>,
    /// True when this call returned a previously cached outcome.
    pub already_processed: bool,
}

pub struct SettlementEngine {
    config: SettlementConfig,
    rake_policy: RakePolicy,
    ledger: Arc<SharedLedger>,
    processed: Mutex<BTreeMap<(HandId, TableId), SettlementOutcome>>,
}

impl SettlementEngine {
    pub fn new(
        config: SettlementConfig,
        rake_policy: RakePolicy,
        ledger: Arc<SharedLedger>,
    ) -> Self {
        Self {
            config,
            rake_policy,
            ledger,
            processed: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<SharedLedger> {
        &self.ledger
    }

    /// Settle one hand. Idempotent: a second call with the same
    /// `(hand_id, table_id)` returns the first outcome unchanged, with
    /// `already_processed` set and the ledger untouched.
    pub fn settle(
        &self,
        request: &SettleRequest,
        ranker: &dyn HandRanker,
        attribution: &AttributionPolicy,
        at: DateTime<Utc>,
    ) -> Result<SettlementOutcome, SettlementError> {
        let key = (request.hand_id.clone(), request.table_id.clone());
        if self.config.enable_idempotency {
            if let Some(cached) = self.processed.lock().get(&key) {
                debug!(
                    target: LOG_TARGET,
                    hand_id = %request.hand_id,
                    "settlement already processed, returning cached outcome"
                );
                let mut outcome = cached.clone();
                outcome.already_processed = true;
                return Ok(outcome);
            }
        }

        // 1-2. Layer the pot from the request's contribution list.
        let contributions: Vec<Contribution> = request
            .players
            .iter()
            .map(|p| Contribution {
                player_id: p.player_id.clone(),
                amount: p.contribution,
                all_in: p.all_in,
                folded: p.folded,
            })
            .collect();
        let layering = pots::calculate(&contributions);

        // 3. Evaluate rake over the whole pot.
        let contenders = request.players.iter().filter(|p| !p.folded).count();
        let rake = if self.config.enable_rake {
            self.rake_policy.evaluate(&RakeContext {
                pot_size: layering.total,
                final_street: request.final_street,
                flop_seen: request.flop_seen,
                is_uncontested: contenders <= 1,
                players_in_hand: request.players.len(),
                players_at_showdown: contenders,
            })
        } else {
            RakeOutcome {
                rake_amount: 0,
                pot_after_rake: layering.total,
                percentage_applied: 0,
                cap_applied: false,
                waived: true,
                reason: "rake disabled by configuration".to_string(),
                policy_used: self.rake_policy.config().clone(),
                config_hash: self.rake_policy.config_hash(),
            }
        };

        // 4. Spread the rake across pots; the last pot absorbs the remainder.
        let pot_rakes = spread_rake(&layering.pots, rake.rake_amount, layering.total);

        // 5. Award each pot.
        let seat_of: BTreeMap<&PlayerId, SeatId> = request
            .players
            .iter()
            .map(|p| (&p.player_id, p.seat))
            .collect();
        let mut awards = Vec::with_capacity(layering.pots.len());
        let mut payouts: BTreeMap<PlayerId, Chips> = BTreeMap::new();
        for (pot_index, (pot, pot_rake)) in
            layering.pots.iter().zip(pot_rakes.iter()).enumerate()
        {
            let winners = self.winners_for_pot(request, pot, pot_index, ranker)?;
            let distributable = pot.amount - pot_rake;
            let per_winner = distributable / winners.len() as Chips;
            let remainder = distributable - per_winner * winners.len() as Chips;
            let odd_chip_to = self.odd_chip_recipient(
                &request.hand_id,
                request.dealer_seat,
                &winners,
                &seat_of,
            );

            let mut pot_payouts = Vec::with_capacity(winners.len());
            for winner in &winners {
                let mut share = per_winner;
                if remainder > 0 && winner == &odd_chip_to {
                    share += remainder;
                }
                if share > 0 {
                    pot_payouts.push((winner.clone(), share));
                    *payouts.entry(winner.clone()).or_insert(0) += share;
                }
            }
            awards.push(PotAward {
                pot_index,
                kind: pot.kind,
                amount: pot.amount,
                rake: *pot_rake,
                winners,
                payouts: pot_payouts,
            });
        }

        // 7 (before commit): conservation check over the prepared buffer.
        let distributed: Chips = payouts.values().sum();
        let contributed: Chips = contributions.iter().map(|c| c.amount).sum();
        if distributed + rake.rake_amount != contributed {
            return Err(SettlementError::ChipConservation {
                hand_id: request.hand_id.clone(),
                contributed,
                distributed,
                rake: rake.rake_amount,
            });
        }

        // 6. Commit the whole motion as one ledger batch.
        let batch = self.build_ledger_batch(request, &awards, &rake, attribution, at);
        self.ledger.record_batch(batch)?;

        let outcome = SettlementOutcome {
            hand_id: request.hand_id.clone(),
            table_id: request.table_id.clone(),
            pots: layering.pots,
            total_pot: layering.total,
            rake,
            awards,
            payouts,
            already_processed: false,
        };

        info!(
            target: LOG_TARGET,
            hand_id = %outcome.hand_id,
            table_id = %outcome.table_id,
            total_pot = outcome.total_pot,
            rake = outcome.rake.rake_amount,
            winners = outcome.payouts.len(),
            "hand settled"
        );

        // 8. Remember the outcome for idempotent replays of the request.
        if self.config.enable_idempotency {
            self.processed.lock().insert(key, outcome.clone());
        }
        Ok(outcome)
    }

    fn winners_for_pot(
        &self,
        request: &SettleRequest,
        pot: &Pot,
        pot_index: usize,
        ranker: &dyn HandRanker,
    ) -> Result<Vec<PlayerId>, SettlementError> {
        if pot.eligible.is_empty() {
            return Err(SettlementError::NoEligibleWinners { pot_index });
        }
        if pot.eligible.len() == 1 {
            return Ok(pot.eligible.clone());
        }

        let mut best: Option<HandRank> = None;
        let mut ranked: Vec<(PlayerId, HandRank)> = Vec::with_capacity(pot.eligible.len());
        for id in &pot.eligible {
            let player = request
                .players
                .iter()
                .find(|p| &p.player_id == id)
                .expect("eligible players come from the request");
            let hole = player.hole_cards.as_ref().ok_or_else(|| {
                SettlementError::MissingHoleCards {
                    player_id: id.clone(),
                }
            })?;
            let rank = ranker.rank(hole, &request.community);
            if best.as_ref().map_or(true, |b| rank > *b) {
                best = Some(rank.clone());
            }
            ranked.push((id.clone(), rank));
        }
        let best = best.expect("at least one eligible player");
        Ok(ranked
            .into_iter()
            .filter(|(_, rank)| *rank == best)
            .map(|(id, _)| id)
            .collect())
    }

    /// Winner receiving the odd chip when a split pot does not divide
    /// evenly.
    fn odd_chip_recipient(
        &self,
        hand_id: &HandId,
        dealer_seat: SeatId,
        winners: &[PlayerId],
        seat_of: &BTreeMap<&PlayerId, SeatId>,
    ) -> PlayerId {
        let seat = |id: &PlayerId| seat_of.get(id).copied().unwrap_or(0);
        match self.config.odd_chip_rule {
            OddChipRule::FirstWinner => winners
                .iter()
                .min_by_key(|id| clockwise_distance(dealer_seat, seat(id)))
                .expect("winners is non-empty")
                .clone(),
            OddChipRule::PositionOrder => winners
                .iter()
                .min_by_key(|id| seat(id))
                .expect("winners is non-empty")
                .clone(),
            OddChipRule::DeterministicRandom => {
                let mut hasher = Sha256::new();
                hasher.update(ODD_CHIP_DOMAIN);
                hasher.update(hand_id.as_bytes());
                let digest = hasher.finalize();
                let pick = u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
                    as usize
                    % winners.len();
                let mut by_seat: Vec<&PlayerId> = winners.iter().collect();
                by_seat.sort_by_key(|id| seat(id));
                by_seat[pick].clone()
            }
        }
    }

    fn build_ledger_batch(
        &self,
        request: &SettleRequest,
        awards: &[PotAward],
        rake: &RakeOutcome,
        attribution: &AttributionPolicy,
        at: DateTime<Utc>,
    ) -> Vec<NewEntry> {
        let tag = |entry: NewEntry| {
            let entry = entry
                .with_table(request.table_id.clone())
                .with_hand(request.hand_id.clone());
            match &request.club_id {
                Some(club) => entry.with_club(club.clone()),
                None => entry,
            }
        };

        let mut batch = Vec::new();
        for player in &request.players {
            if player.contribution == 0 {
                continue;
            }
            batch.push(tag(NewEntry::new(
                at,
                EntryKind::Bet,
                Party::player(player.player_id.clone()),
                -(player.contribution as i64),
            )
            .with_reason("hand contribution")));
        }
        for award in awards {
            let kind = if award.winners.len() == 1 && award.kind == PotKind::Side {
                // An uncontested side layer goes back to its sole funder.
                EntryKind::PotReturn
            } else {
                EntryKind::PotWin
            };
            for (player_id, amount) in &award.payouts {
                batch.push(tag(NewEntry::new(
                    at,
                    kind,
                    Party::player(player_id.clone()),
                    *amount as i64,
                )
                .with_reason(format!("pot {} award", award.pot_index))));
            }
        }

        if rake.rake_amount > 0 {
            for (party, share) in split_rake(rake.rake_amount, request.club_id.as_ref(), attribution)
            {
                batch.push(tag(NewEntry::new(at, EntryKind::RakeCollected, party, share as i64)
                    .with_reason(rake.reason.clone())));
            }
        }
        batch
    }
}

/// Steps clockwise from `from` to reach `to` around the seat ring. The
/// seat at `from` itself is the farthest away.
fn clockwise_distance(from: SeatId, to: SeatId) -> u16 {
    let from = from as u16;
    let to = to as u16;
    if to > from {
        to - from
    } else {
        to + 256 - from
    }
}

/// `floor(pot_i * total_rake / total)` for all but the last pot, which
/// absorbs the rounding remainder so the shares sum to the total rake.
/// No share may exceed its own pot: a tiny top layer can be smaller than
/// the rounding loss of the layers below it, so any remainder the last pot
/// cannot hold spills back onto earlier pots with spare capacity. The
/// upstream rake never exceeds the pot total, so the spill always lands.
fn spread_rake(pots: &[Pot], total_rake: Chips, total: Chips) -> Vec<Chips> {
    if pots.is_empty() || total == 0 {
        return vec![0; pots.len()];
    }
    let mut shares = Vec::with_capacity(pots.len());
    let mut assigned = 0;
    for pot in &pots[..pots.len() - 1] {
        let share = (pot.amount * total_rake / total).min(pot.amount);
        assigned += share;
        shares.push(share);
    }
    shares.push(0);

    let mut remaining = total_rake - assigned;
    for (share, pot) in shares.iter_mut().zip(pots).rev() {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(pot.amount - *share);
        *share += take;
        remaining -= take;
    }
    debug_assert_eq!(remaining, 0, "rake exceeds the pot total");
    shares
}

fn split_rake(
    total: Chips,
    club_id: Option<&ClubId>,
    attribution: &AttributionPolicy,
) -> Vec<(Party, Chips)> {
    let mut out = Vec::new();
    let mut remaining = total;

    if let Some(club) = club_id {
        let share = total * attribution.club_share_per_mille as Chips / 1000;
        if share > 0 {
            out.push((Party::club(club.clone()), share));
            remaining -= share;
        }
    }
    if let Some(agent) = &attribution.agent_id {
        let share = total * attribution.agent_share_per_mille as Chips / 1000;
        if share > 0 {
            out.push((
                Party::Agent {
                    agent_id: agent.clone(),
                },
                share,
            ));
            remaining -= share;
        }
    }
    if remaining > 0 {
        out.push((Party::Platform, remaining));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RakeConfig;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    /// Test ranker: hand strength is the best single-card value, ace high.
    struct HighCard;

    impl HandRanker for HighCard {
        fn rank(&self, hole: &[Card; 2], community: &[Card]) -> HandRank {
            let best = hole
                .iter()
                .chain(community.iter())
                .map(|c| c.rank.value() as u32)
                .max()
                .unwrap_or(0);
            HandRank {
                score: best,
                label: format!("high card {best}"),
            }
        }
    }

    fn seeded_engine(config: SettlementConfig, rake: RakeConfig) -> SettlementEngine {
        let ledger = Arc::new(SharedLedger::new());
        for (player, stack) in [("alice", 500u64), ("bob", 500), ("carol", 500)] {
            ledger.record_buy_in(player, stack, "t1", at()).unwrap();
        }
        SettlementEngine::new(config, RakePolicy::new(rake), ledger)
    }

    fn player(id: &str, seat: SeatId, contribution: Chips, folded: bool) -> SettlePlayer {
        SettlePlayer {
            player_id: id.to_string(),
            seat,
            contribution,
            folded,
            all_in: false,
            hole_cards: Some(["2c".parse().unwrap(), "3d".parse().unwrap()]),
        }
    }

    fn fold_out_request() -> SettleRequest {
        SettleRequest {
            hand_id: "h1".into(),
            table_id: "t1".into(),
            club_id: None,
            dealer_seat: 0,
            players: vec![
                player("alice", 0, 100, false),
                player("bob", 1, 100, true),
                player("carol", 2, 10, true),
            ],
            community: vec![],
            final_street: Street::River,
            flop_seen: true,
            }
    }

    #[test]
    fn uncontested_pot_goes_to_last_player_standing() {
        let engine = seeded_engine(
            SettlementConfig {
                enable_rake: false,
                ..SettlementConfig::default()
            },
            RakeConfig::default(),
        );
        let outcome = engine
            .settle(&fold_out_request(), &HighCard, &AttributionPolicy::default(), at())
            .unwrap();
        assert_eq!(outcome.total_pot, 210);
        assert_eq!(outcome.payouts.get("alice"), Some(&210));
        assert!(!outcome.already_processed);
    }

    #[test]
    fn settle_is_idempotent_and_leaves_ledger_unchanged() {
        let engine = seeded_engine(SettlementConfig::default(), RakeConfig::default());
        let first = engine
            .settle(&fold_out_request(), &HighCard, &AttributionPolicy::default(), at())
            .unwrap();
        let after_first = engine.ledger().read().last_sequence();

        let second = engine
            .settle(&fold_out_request(), &HighCard, &AttributionPolicy::default(), at())
            .unwrap();
        assert!(second.already_processed);
        assert_eq!(second.payouts, first.payouts);
        assert_eq!(engine.ledger().read().last_sequence(), after_first);
    }

    #[test]
    fn raked_pot_pays_winner_the_remainder() {
        // Pot 160, 5% raked, cap 4 => winner receives 156.
        let engine = seeded_engine(
            SettlementConfig::default(),
            RakeConfig {
                rate_per_mille: 50,
                cap: 4,
                waive_when_uncontested: false,
                ..RakeConfig::default()
            },
        );
        let request = SettleRequest {
            hand_id: "h2".into(),
            table_id: "t1".into(),
            club_id: None,
            dealer_seat: 0,
            players: vec![
                player("alice", 0, 80, false),
                player("bob", 1, 80, true),
            ],
            community: vec![],
            final_street: Street::River,
            flop_seen: true,
        };
        let outcome = engine
            .settle(&request, &HighCard, &AttributionPolicy::default(), at())
            .unwrap();
        assert_eq!(outcome.rake.rake_amount, 4);
        assert_eq!(outcome.payouts.get("alice"), Some(&156));

        let ledger = engine.ledger().read();
        let hand_entries = ledger.entries_for_hand(&"h2".to_string());
        let sum: i64 = hand_entries.iter().map(|e| e.delta).sum();
        assert_eq!(sum, 0, "settlement entries must be zero-sum");
    }

    #[test]
    fn split_pot_odd_chip_goes_first_clockwise_of_dealer() {
        let engine = seeded_engine(
            SettlementConfig {
                enable_rake: false,
                ..SettlementConfig::default()
            },
            RakeConfig::default(),
        );
        // Equal high cards, pot of 201 splits 100/101.
        let hole: [Card; 2] = ["Ah".parse().unwrap(), "2c".parse().unwrap()];
        let hole2: [Card; 2] = ["As".parse().unwrap(), "2d".parse().unwrap()];
        let request = SettleRequest {
            hand_id: "h3".into(),
            table_id: "t1".into(),
            club_id: None,
            dealer_seat: 1,
            players: vec![
                SettlePlayer {
                    player_id: "alice".into(),
                    seat: 0,
                    contribution: 100,
                    folded: false,
                    all_in: false,
                    hole_cards: Some(hole),
                },
                SettlePlayer {
                    player_id: "bob".into(),
                    seat: 2,
                    contribution: 100,
                    folded: false,
                    all_in: false,
                    hole_cards: Some(hole2),
                },
                SettlePlayer {
                    player_id: "carol".into(),
                    seat: 3,
                    contribution: 1,
                    folded: true,
                    all_in: false,
                    hole_cards: None,
                },
            ],
            community: vec![],
            final_street: Street::River,
            flop_seen: true,
        };
        let outcome = engine
            .settle(&request, &HighCard, &AttributionPolicy::default(), at())
            .unwrap();
        // Clockwise from dealer seat 1: seat 2 (bob) comes before seat 0.
        assert_eq!(outcome.payouts.get("bob"), Some(&101));
        assert_eq!(outcome.payouts.get("alice"), Some(&100));
    }

    #[test]
    fn rake_attribution_splits_across_club_and_platform() {
        let engine = seeded_engine(
            SettlementConfig::default(),
            RakeConfig {
                rate_per_mille: 50,
                cap: 100,
                waive_when_uncontested: false,
                ..RakeConfig::default()
            },
        );
        let mut request = fold_out_request();
        request.hand_id = "h4".into();
        request.club_id = Some("club-a".into());
        let attribution = AttributionPolicy {
            club_share_per_mille: 500,
            agent_share_per_mille: 0,
            agent_id: None,
        };
        let outcome = engine.settle(&request, &HighCard, &attribution, at()).unwrap();
        // Pot 210 => rake 10; half to the club, half to the platform.
        assert_eq!(outcome.rake.rake_amount, 10);
        let ledger = engine.ledger().read();
        assert_eq!(ledger.balance(&Party::club("club-a")), 5);
        assert_eq!(ledger.balance(&Party::Platform), 5);
    }

    #[test]
    fn spread_rake_clamps_every_share_to_its_pot() {
        // A top side layer of a single chip cannot absorb the rounding
        // loss of the layers below it; the spill lands on the middle pot.
        let pots = vec![
            Pot {
                amount: 3,
                eligible: vec!["a".into(), "b".into(), "c".into()],
                kind: PotKind::Main,
            },
            Pot {
                amount: 1998,
                eligible: vec!["b".into(), "c".into()],
                kind: PotKind::Side,
            },
            Pot {
                amount: 1,
                eligible: vec!["c".into()],
                kind: PotKind::Side,
            },
        ];
        let shares = spread_rake(&pots, 2001, 2002);
        assert_eq!(shares.iter().sum::<Chips>(), 2001);
        for (share, pot) in shares.iter().zip(&pots) {
            assert!(
                share <= &pot.amount,
                "share {share} exceeds pot of {}",
                pot.amount
            );
        }
    }

    #[test]
    fn rake_remainder_larger_than_the_last_pot_still_settles() {
        // All-in layers 1001/1000/1 produce pots [3, 1998, 1]; a full-rate
        // rake of 2001 rounds to more against the first two pots than the
        // one-chip top layer can hold.
        let ledger = Arc::new(SharedLedger::new());
        for (p, stack) in [("a", 1001u64), ("b", 1000), ("c", 1)] {
            ledger.record_buy_in(p, stack, "t1", at()).unwrap();
        }
        let engine = SettlementEngine::new(
            SettlementConfig::default(),
            RakePolicy::new(RakeConfig {
                rate_per_mille: 1000,
                cap: 2001,
                waive_when_no_flop: false,
                waive_when_uncontested: false,
                min_players_for_rake: 2,
            }),
            ledger,
        );
        let mk = |id: &str, seat: SeatId, amount: Chips, hole: [Card; 2]| SettlePlayer {
            player_id: id.into(),
            seat,
            contribution: amount,
            folded: false,
            all_in: true,
            hole_cards: Some(hole),
        };
        let request = SettleRequest {
            hand_id: "h6".into(),
            table_id: "t1".into(),
            club_id: None,
            dealer_seat: 0,
            players: vec![
                mk("a", 0, 1001, ["Ah".parse().unwrap(), "Kd".parse().unwrap()]),
                mk("b", 1, 1000, ["Qh".parse().unwrap(), "Jd".parse().unwrap()]),
                mk("c", 2, 1, ["9h".parse().unwrap(), "8d".parse().unwrap()]),
            ],
            community: vec![],
            final_street: Street::River,
            flop_seen: true,
        };
        let outcome = engine
            .settle(&request, &HighCard, &AttributionPolicy::default(), at())
            .unwrap();
        assert_eq!(outcome.rake.rake_amount, 2001);
        for award in &outcome.awards {
            assert!(award.rake <= award.amount);
        }
        let distributed: Chips = outcome.payouts.values().sum();
        assert_eq!(distributed + outcome.rake.rake_amount, 2002);

        let ledger = engine.ledger().read();
        let sum: i64 = ledger
            .entries_for_hand(&"h6".to_string())
            .iter()
            .map(|e| e.delta)
            .sum();
        assert_eq!(sum, 0, "settlement entries must be zero-sum");
    }

    #[test]
    fn three_way_all_in_settles_every_layer() {
        let ledger = Arc::new(SharedLedger::new());
        for (p, stack) in [("a", 100u64), ("b", 200), ("c", 300)] {
            ledger.record_buy_in(p, stack, "t1", at()).unwrap();
        }
        let engine = SettlementEngine::new(
            SettlementConfig {
                enable_rake: false,
                ..SettlementConfig::default()
            },
            RakePolicy::new(RakeConfig::default()),
            ledger,
        );
        let hole_a: [Card; 2] = ["Ah".parse().unwrap(), "Kd".parse().unwrap()];
        let hole_b: [Card; 2] = ["Qh".parse().unwrap(), "Jd".parse().unwrap()];
        let hole_c: [Card; 2] = ["9h".parse().unwrap(), "8d".parse().unwrap()];
        let mk = |id: &str, seat: SeatId, amount: Chips, hole: [Card; 2]| SettlePlayer {
            player_id: id.into(),
            seat,
            contribution: amount,
            folded: false,
            all_in: true,
            hole_cards: Some(hole),
        };
        let request = SettleRequest {
            hand_id: "h5".into(),
            table_id: "t1".into(),
            club_id: None,
            dealer_seat: 0,
            players: vec![
                mk("a", 0, 100, hole_a),
                mk("b", 1, 200, hole_b),
                mk("c", 2, 300, hole_c),
            ],
            community: vec![],
            final_street: Street::River,
            flop_seen: true,
        };
        let outcome = engine
            .settle(&request, &HighCard, &AttributionPolicy::default(), at())
            .unwrap();
        // a's ace wins the 300 main pot, b's queen the 200 side pot, and the
        // last 100 returns to c.
        assert_eq!(outcome.payouts.get("a"), Some(&300));
        assert_eq!(outcome.payouts.get("b"), Some(&200));
        assert_eq!(outcome.payouts.get("c"), Some(&100));
        let returned = outcome.awards.last().unwrap();
        assert_eq!(returned.winners, vec!["c".to_string()]);
    }
}
