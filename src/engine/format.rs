//! Canonical one-sentence English rendering of hand events.
//!
//! Pure and deterministic; auxiliary log and UI surfaces rely on every
//! variant producing exactly one sentence. The `match` below is exhaustive
//! on purpose — an unhandled variant is a compile error, not runtime input.

use std::collections::BTreeMap;

use crate::cards::Card;

use super::events::{BlindKind, EndReason, HandEvent};
use super::types::{PlayerId, Street};

/// Resolve a player id to a display name, falling back to the id itself.
fn name<'a>(names: &'a BTreeMap<PlayerId, String>, id: &'a PlayerId) -> &'a str {
    names.get(id).map(String::as_str).unwrap_or(id.as_str())
}

fn card_list(cards: &[Card]) -> String {
    cards
        .iter()
        .map(Card::code)
        .collect::<Vec<_>>()
        .join(" ")
}

fn street_name(street: Street) -> &'static str {
    match street {
        Street::Preflop => "preflop",
        Street::Flop => "the flop",
        Street::Turn => "the turn",
        Street::River => "the river",
    }
}

/// Map an event and a player-name lookup to its canonical sentence.
pub fn describe_event(event: &HandEvent, names: &BTreeMap<PlayerId, String>) -> String {
    match event {
        HandEvent::HandStart {
            hand_id,
            players,
            dealer_seat,
            sb_amount,
            bb_amount,
            ..
        } => format!(
            "Hand {hand_id} begins with {count} players, dealer in seat {dealer_seat}, blinds {sb_amount}/{bb_amount}.",
            count = players.len()
        ),
        HandEvent::PostBlind {
            player_id,
            amount,
            kind,
        } => {
            let which = match kind {
                BlindKind::Small => "small",
                BlindKind::Big => "big",
            };
            format!(
                "{} posts the {which} blind of {amount}.",
                name(names, player_id)
            )
        }
        HandEvent::DealHole { player_id, .. } => {
            format!("{} is dealt two hole cards.", name(names, player_id))
        }
        HandEvent::StreetStart { street } => {
            format!("Betting opens on {}.", street_name(*street))
        }
        HandEvent::Bet { player_id, amount } => {
            format!("{} bets {amount}.", name(names, player_id))
        }
        HandEvent::Call { player_id, amount } => {
            format!("{} calls to {amount}.", name(names, player_id))
        }
        HandEvent::Raise { player_id, amount } => {
            format!("{} raises to {amount}.", name(names, player_id))
        }
        HandEvent::AllIn { player_id, amount } => {
            format!("{} moves all in for {amount}.", name(names, player_id))
        }
        HandEvent::Check { player_id } => format!("{} checks.", name(names, player_id)),
        HandEvent::Fold { player_id } => format!("{} folds.", name(names, player_id)),
        HandEvent::DealCommunity { phase, cards } => format!(
            "The dealer reveals {} on {}.",
            card_list(cards),
            street_name(*phase)
        ),
        HandEvent::Showdown => "The hand goes to showdown.".to_string(),
        HandEvent::HandEnd { reason, winners } => {
            let how = match reason {
                EndReason::Showdown => "at showdown",
                EndReason::AllFold => "after all opponents fold",
            };
            let awards = winners
                .iter()
                .map(|w| format!("{} wins {}", name(names, &w.player_id), w.amount))
                .collect::<Vec<_>>()
                .join(", ");
            format!("The hand ends {how}: {awards}.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::Card;
    use crate::engine::events::{SeatedPlayer, WinnerAward};

    fn names() -> BTreeMap<PlayerId, String> {
        BTreeMap::from([("p1".to_string(), "Alice".to_string())])
    }

    #[test]
    fn every_variant_renders_one_sentence() {
        let cards: [Card; 2] = ["As".parse().unwrap(), "Kd".parse().unwrap()];
        let events = vec![
            HandEvent::HandStart {
                hand_id: "h1".into(),
                players: vec![SeatedPlayer {
                    player_id: "p1".into(),
                    seat: 0,
                    stack: 100,
                }],
                dealer_seat: 0,
                sb_seat: 1,
                bb_seat: 2,
                sb_amount: 5,
                bb_amount: 10,
            },
            HandEvent::PostBlind {
                player_id: "p1".into(),
                amount: 5,
                kind: BlindKind::Small,
            },
            HandEvent::DealHole {
                player_id: "p1".into(),
                cards,
            },
            HandEvent::StreetStart {
                street: Street::Flop,
            },
            HandEvent::Bet {
                player_id: "p1".into(),
                amount: 20,
            },
            HandEvent::Call {
                player_id: "p1".into(),
                amount: 20,
            },
            HandEvent::Raise {
                player_id: "p1".into(),
                amount: 60,
            },
            HandEvent::AllIn {
                player_id: "p1".into(),
                amount: 95,
            },
            HandEvent::Check {
                player_id: "p1".into(),
            },
            HandEvent::Fold {
                player_id: "p1".into(),
            },
            HandEvent::DealCommunity {
                phase: Street::Flop,
                cards: cards.to_vec(),
            },
            HandEvent::Showdown,
            HandEvent::HandEnd {
                reason: EndReason::AllFold,
                winners: vec![WinnerAward {
                    player_id: "p1".into(),
                    amount: 40,
                    hand_rank: None,
                }],
            },
        ];
        for event in &events {
            let sentence = describe_event(event, &names());
            assert!(sentence.ends_with('.'), "no terminator: {sentence}");
            assert!(!sentence.contains("p1"), "unresolved id: {sentence}");
        }
    }

    #[test]
    fn unknown_players_fall_back_to_their_id() {
        let sentence = describe_event(
            &HandEvent::Check {
                player_id: "ghost".into(),
            },
            &names(),
        );
        assert_eq!(sentence, "ghost checks.");
    }
}
