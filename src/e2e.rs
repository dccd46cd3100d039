#![cfg(test)]

//! End-to-end flow: fold a hand from events, settle it against the ledger,
//! broadcast the state change to a client, and verify the recorded hand.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use crate::cards::Card;
use crate::config::{EngineConfig, RakeConfig, SettlementConfig};
use crate::engine::events::{BlindKind, EndReason, HandEvent, SeatedPlayer, WinnerAward};
use crate::engine::log::HandLog;
use crate::engine::types::Street;
use crate::ledger::{IntegrityReport, SharedLedger};
use crate::settlement::engine::{
    AttributionPolicy, HandRank, HandRanker, SettleRequest, SettlementEngine, SettlePlayer,
};
use crate::settlement::rake::RakePolicy;
use crate::sync::diff::DiffOp;
use crate::sync::service::{SyncRequest, SyncResponse, SyncService, TableBlinds};
use crate::sync::timeline::Attribution;
use crate::verify::{
    attribution_hash, integrity_checksum, recorded_net_deltas, RecordedAction,
    RecordedActionKind, RecordedHand, RecordedPlayer, RecordedWinner, ReplayVerifier, Verdict,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + chrono::Duration::milliseconds(ms)
}

fn card(code: &str) -> Card {
    code.parse().unwrap()
}

struct FlushBeatsPair;

impl HandRanker for FlushBeatsPair {
    fn rank(&self, hole: &[Card; 2], community: &[Card]) -> HandRank {
        let suited = |suit| {
            hole.iter().filter(|c| c.suit == suit).count()
                + community.iter().filter(|c| c.suit == suit).count()
        };
        let flush = crate::cards::Suit::ALL.iter().any(|s| suited(*s) >= 5);
        let paired = hole[0].rank == hole[1].rank;
        let score = if flush {
            500
        } else if paired {
            200 + hole[0].rank.value() as u32
        } else {
            hole.iter().map(|c| c.rank.value() as u32).max().unwrap_or(0)
        };
        HandRank {
            score,
            label: if flush { "flush" } else { "pair or high card" }.to_string(),
        }
    }
}

#[test]
fn heads_up_showdown_flows_through_every_subsystem() {
    init_tracing();
    let table_id = "t1".to_string();
    let hand_id = "h1".to_string();

    // Sync service and one connected client.
    let service = SyncService::new(EngineConfig::default());
    service
        .initialize_table(&table_id, None, "main", TableBlinds { small: 5, big: 10 }, 9)
        .unwrap();
    let connect = service
        .connect_client("alice", &table_id, None, "web", at(0))
        .unwrap();
    let session_id = connect.session.session_id;

    // Chips enter the ledger when stacks are bought in.
    let ledger = Arc::new(SharedLedger::new());
    ledger.record_buy_in("alice", 500, &table_id, at(0)).unwrap();
    ledger.record_buy_in("bob", 500, &table_id, at(0)).unwrap();

    // Replay: the S2 hand, folded from its event log.
    let mut log = HandLog::open(HandEvent::HandStart {
        hand_id: hand_id.clone(),
        players: vec![
            SeatedPlayer {
                player_id: "alice".into(),
                seat: 0,
                stack: 500,
            },
            SeatedPlayer {
                player_id: "bob".into(),
                seat: 1,
                stack: 500,
            },
        ],
        dealer_seat: 0,
        sb_seat: 0,
        bb_seat: 1,
        sb_amount: 5,
        bb_amount: 10,
    })
    .unwrap();
    let events = [
        HandEvent::PostBlind {
            player_id: "alice".into(),
            amount: 5,
            kind: BlindKind::Small,
        },
        HandEvent::PostBlind {
            player_id: "bob".into(),
            amount: 10,
            kind: BlindKind::Big,
        },
        HandEvent::DealHole {
            player_id: "alice".into(),
            cards: [card("Ks"), card("Qs")],
        },
        HandEvent::DealHole {
            player_id: "bob".into(),
            cards: [card("Ah"), card("Ad")],
        },
        HandEvent::Call {
            player_id: "alice".into(),
            amount: 10,
        },
        HandEvent::Check {
            player_id: "bob".into(),
        },
        HandEvent::DealCommunity {
            phase: Street::Flop,
            cards: vec![card("9s"), card("7s"), card("3s")],
        },
        HandEvent::Bet {
            player_id: "bob".into(),
            amount: 20,
        },
        HandEvent::Call {
            player_id: "alice".into(),
            amount: 20,
        },
        HandEvent::DealCommunity {
            phase: Street::Turn,
            cards: vec![card("2c")],
        },
        HandEvent::Check {
            player_id: "bob".into(),
        },
        HandEvent::Check {
            player_id: "alice".into(),
        },
        HandEvent::DealCommunity {
            phase: Street::River,
            cards: vec![card("4h")],
        },
        HandEvent::Bet {
            player_id: "bob".into(),
            amount: 30,
        },
        HandEvent::Raise {
            player_id: "alice".into(),
            amount: 80,
        },
        HandEvent::Call {
            player_id: "bob".into(),
            amount: 80,
        },
        HandEvent::Showdown,
    ];
    let mut snapshot = None;
    for event in events {
        snapshot = Some(log.submit(event).unwrap());
    }
    let showdown = snapshot.unwrap();
    assert_eq!(showdown.pot_total, 220);

    // Settlement: rake disabled for this hand, Alice's flush takes it all.
    let engine = SettlementEngine::new(
        SettlementConfig {
            enable_rake: false,
            ..SettlementConfig::default()
        },
        RakePolicy::new(RakeConfig::default()),
        Arc::clone(&ledger),
    );
    let request = SettleRequest {
        hand_id: hand_id.clone(),
        table_id: table_id.clone(),
        club_id: None,
        dealer_seat: 0,
        players: showdown
            .players
            .values()
            .map(|p| SettlePlayer {
                player_id: p.player_id.clone(),
                seat: p.seat,
                contribution: p.total_bet,
                folded: p.status == crate::engine::types::PlayerStatus::Folded,
                all_in: p.status == crate::engine::types::PlayerStatus::AllIn,
                hole_cards: p.hole_cards,
            })
            .collect(),
        community: showdown.community.clone(),
        final_street: Street::River,
        flop_seen: true,
    };
    let outcome = engine
        .settle(&request, &FlushBeatsPair, &AttributionPolicy::default(), at(100))
        .unwrap();
    assert_eq!(outcome.payouts.get("alice"), Some(&220));
    assert_eq!(outcome.rake.rake_amount, 0);

    // The hand end closes the log; the fold agrees with settlement.
    let final_snapshot = log
        .submit(HandEvent::HandEnd {
            reason: EndReason::Showdown,
            winners: vec![WinnerAward {
                player_id: "alice".into(),
                amount: 220,
                hand_rank: Some("flush".into()),
            }],
        })
        .unwrap();
    assert_eq!(final_snapshot.players["alice"].stack, 610);
    assert_eq!(final_snapshot.players["bob"].stack, 390);

    // The ledger stayed zero-sum and chain-valid through all of it.
    {
        let book = ledger.read();
        assert_eq!(book.verify_zero_sum(1, book.last_sequence()), 0);
        assert_eq!(
            book.verify_integrity(1, book.last_sequence()),
            IntegrityReport::Valid
        );
        let hand_sum: i64 = book
            .entries_for_hand(&hand_id)
            .iter()
            .map(|e| e.delta)
            .sum();
        assert_eq!(hand_sum, 0);
    }

    // Broadcast the settled stacks; the client catches up incrementally.
    service
        .apply_state_change(
            &table_id,
            vec![
                DiffOp::set(&["players", "alice"], json!({"stack": 610})),
                DiffOp::set(&["players", "bob"], json!({"stack": 390})),
            ],
            "hand_settled",
            Attribution {
                event_id: None,
                player_id: None,
                hand_id: Some(hand_id.clone()),
            },
            at(200),
        )
        .unwrap();
    let response = service
        .handle_sync_request(&SyncRequest {
            session_id,
            client_version: 0,
            client_cursor: 0,
        })
        .unwrap();
    // First-ever sync from version zero is a full snapshot of the result.
    match response {
        SyncResponse::FullSnapshot { snapshot } => {
            assert_eq!(snapshot.version, 1);
            assert_eq!(snapshot.players["alice"]["stack"], 610);
        }
        other => panic!("expected full snapshot, got {other:?}"),
    }
    service.handle_state_ack(session_id, 1, 1, at(210)).unwrap();

    // Post-hoc verification of the recorded hand reproduces everything.
    let actions = vec![
        RecordedAction {
            player_id: "alice".into(),
            kind: RecordedActionKind::PostSmallBlind,
            amount: 5,
        },
        RecordedAction {
            player_id: "bob".into(),
            kind: RecordedActionKind::PostBigBlind,
            amount: 10,
        },
        RecordedAction {
            player_id: "alice".into(),
            kind: RecordedActionKind::Call,
            amount: 5,
        },
        RecordedAction {
            player_id: "bob".into(),
            kind: RecordedActionKind::Bet,
            amount: 20,
        },
        RecordedAction {
            player_id: "alice".into(),
            kind: RecordedActionKind::Call,
            amount: 20,
        },
        RecordedAction {
            player_id: "bob".into(),
            kind: RecordedActionKind::Bet,
            amount: 30,
        },
        RecordedAction {
            player_id: "alice".into(),
            kind: RecordedActionKind::Raise,
            amount: 80,
        },
        RecordedAction {
            player_id: "bob".into(),
            kind: RecordedActionKind::Call,
            amount: 50,
        },
    ];
    let mut recorded = RecordedHand {
        hand_id: hand_id.clone(),
        table_id,
        players: vec![
            RecordedPlayer {
                player_id: "alice".into(),
                seat: 0,
                starting_stack: 500,
            },
            RecordedPlayer {
                player_id: "bob".into(),
                seat: 1,
                starting_stack: 500,
            },
        ],
        dealer_seat: 0,
        actions,
        final_street: Street::River,
        flop_seen: true,
        final_stacks: BTreeMap::from([
            ("alice".to_string(), 610),
            ("bob".to_string(), 390),
        ]),
        pot_total: 220,
        rake: 0,
        winners: vec![RecordedWinner {
            player_id: "alice".into(),
            amount: 220,
        }],
        final_state_version: final_snapshot.sequence,
        ledger_attribution_hash: String::new(),
        integrity_checksum: String::new(),
    };
    let deltas = recorded_net_deltas(&recorded).unwrap();
    recorded.ledger_attribution_hash =
        attribution_hash(&recorded.hand_id, &deltas, recorded.rake);
    recorded.integrity_checksum = integrity_checksum(&recorded, &deltas);

    let verifier = ReplayVerifier::new(RakePolicy::new(RakeConfig {
        rate_per_mille: 0,
        cap: 0,
        ..RakeConfig::default()
    }));
    assert_eq!(verifier.verify(&recorded), Verdict::Match);

    // Settlement is idempotent: replaying the request changes nothing.
    let before = ledger.read().last_sequence();
    let replayed = engine
        .settle(&request, &FlushBeatsPair, &AttributionPolicy::default(), at(300))
        .unwrap();
    assert!(replayed.already_processed);
    assert_eq!(ledger.read().last_sequence(), before);
}
