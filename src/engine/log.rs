//! Append-only event log for one hand.
//!
//! The log is the submission surface for table operators: an event is
//! accepted only if folding the extended log still succeeds, so the stored
//! history always replays cleanly. Accepted events are never mutated or
//! reordered.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::errors::ReplayError;
use super::events::HandEvent;
use super::replay;
use super::snapshot::HandSnapshot;
use super::types::HandId;

const LOG_TARGET: &str = "holdem_core::engine::log";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandLog {
    hand_id: HandId,
    events: Vec<HandEvent>,
}

impl HandLog {
    /// Open a log with its `HandStart` event. The first event is validated
    /// by folding it immediately.
    pub fn open(start: HandEvent) -> Result<Self, ReplayError> {
        let HandEvent::HandStart { hand_id, .. } = &start else {
            return Err(ReplayError::MissingHandStart {
                found: start.kind(),
            });
        };
        let hand_id = hand_id.clone();
        let log = Self {
            hand_id,
            events: vec![start],
        };
        log.latest()?;
        Ok(log)
    }

    pub fn hand_id(&self) -> &HandId {
        &self.hand_id
    }

    pub fn events(&self) -> &[HandEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append one event, returning the snapshot after it. A rejected event
    /// leaves the log untouched.
    pub fn submit(&mut self, event: HandEvent) -> Result<HandSnapshot, ReplayError> {
        self.events.push(event);
        match replay::process(&self.events, self.events.len() - 1) {
            Ok(snapshot) => {
                debug!(
                    target: LOG_TARGET,
                    hand_id = %self.hand_id,
                    sequence = snapshot.sequence,
                    kind = self.events.last().map(HandEvent::kind).unwrap_or(""),
                    "event accepted"
                );
                Ok(snapshot)
            }
            Err(err) => {
                self.events.pop();
                Err(err)
            }
        }
    }

    /// Snapshot after `events[0..=index]`.
    pub fn snapshot_at(&self, index: usize) -> Result<HandSnapshot, ReplayError> {
        replay::process(&self.events, index)
    }

    /// Snapshot after the last accepted event.
    pub fn latest(&self) -> Result<HandSnapshot, ReplayError> {
        replay::process(&self.events, self.events.len().saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::{BlindKind, SeatedPlayer};

    fn start() -> HandEvent {
        HandEvent::HandStart {
            hand_id: "h1".to_string(),
            players: vec![
                SeatedPlayer {
                    player_id: "alice".into(),
                    seat: 0,
                    stack: 100,
                },
                SeatedPlayer {
                    player_id: "bob".into(),
                    seat: 1,
                    stack: 100,
                },
            ],
            dealer_seat: 0,
            sb_seat: 0,
            bb_seat: 1,
            sb_amount: 1,
            bb_amount: 2,
        }
    }

    #[test]
    fn log_must_open_with_hand_start() {
        assert!(matches!(
            HandLog::open(HandEvent::Showdown),
            Err(ReplayError::MissingHandStart { .. })
        ));
        assert!(HandLog::open(start()).is_ok());
    }

    #[test]
    fn rejected_events_leave_the_log_untouched() {
        let mut log = HandLog::open(start()).unwrap();
        let snapshot = log
            .submit(HandEvent::PostBlind {
                player_id: "alice".into(),
                amount: 1,
                kind: BlindKind::Small,
            })
            .unwrap();
        assert_eq!(snapshot.sequence, 2);

        let err = log.submit(HandEvent::Check {
            player_id: "ghost".into(),
        });
        assert!(err.is_err());
        assert_eq!(log.len(), 2);
        // The surviving log still folds to the same snapshot.
        assert_eq!(log.latest().unwrap(), snapshot);
    }

    #[test]
    fn every_prefix_of_an_accepted_log_replays() {
        let mut log = HandLog::open(start()).unwrap();
        log.submit(HandEvent::PostBlind {
            player_id: "alice".into(),
            amount: 1,
            kind: BlindKind::Small,
        })
        .unwrap();
        log.submit(HandEvent::PostBlind {
            player_id: "bob".into(),
            amount: 2,
            kind: BlindKind::Big,
        })
        .unwrap();
        for index in 0..log.len() {
            let snapshot = log.snapshot_at(index).unwrap();
            assert_eq!(snapshot.sequence, index as u64 + 1);
        }
    }
}
