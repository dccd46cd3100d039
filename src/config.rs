//! Engine-wide configuration surface.
//!
//! Every tunable named by the synchronization, timeline, session, rake, and
//! settlement layers lives here. All durations are plain millisecond counts;
//! the core never reads a clock, so these are compared against timestamps
//! supplied by the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
    #[error("rake rate {rate}\u{2030} exceeds 1000\u{2030}")]
    RakeRateOutOfRange { rate: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub session_timeout_ms: u64,
    pub reconnect_window_ms: u64,
    pub max_reconnect_attempts: u32,
    pub resume_token_ttl_ms: u64,
    pub max_sessions_per_player: usize,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: 300_000,
            reconnect_window_ms: 120_000,
            max_reconnect_attempts: 5,
            resume_token_ttl_ms: 120_000,
            max_sessions_per_player: 3,
            heartbeat_interval_ms: 15_000,
            heartbeat_timeout_ms: 45_000,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("session_timeout_ms", self.session_timeout_ms),
            ("reconnect_window_ms", self.reconnect_window_ms),
            ("resume_token_ttl_ms", self.resume_token_ttl_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("heartbeat_timeout_ms", self.heartbeat_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue { field });
            }
        }
        if self.max_sessions_per_player == 0 {
            return Err(ConfigError::ZeroValue {
                field: "max_sessions_per_player",
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    pub max_cached_snapshots: usize,
    /// A full snapshot is retained every this many versions; in between only
    /// the diff is kept.
    pub snapshot_interval: u64,
    pub max_diff_operations: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_cached_snapshots: 50,
            snapshot_interval: 10,
            max_diff_operations: 256,
        }
    }
}

impl SnapshotConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snapshot_interval == 0 {
            return Err(ConfigError::ZeroValue {
                field: "snapshot_interval",
            });
        }
        if self.max_cached_snapshots == 0 {
            return Err(ConfigError::ZeroValue {
                field: "max_cached_snapshots",
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub max_diffs_in_response: usize,
    /// Version gaps beyond this force a full snapshot instead of diffs.
    pub force_snapshot_threshold: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_diffs_in_response: 50,
            force_snapshot_threshold: 100,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_diffs_in_response == 0 {
            return Err(ConfigError::ZeroValue {
                field: "max_diffs_in_response",
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineConfig {
    pub max_entries_in_memory: usize,
    pub entry_ttl_ms: u64,
    pub gap_threshold: u64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            max_entries_in_memory: 1000,
            entry_ttl_ms: 3_600_000,
            gap_threshold: 50,
        }
    }
}

impl TimelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries_in_memory == 0 {
            return Err(ConfigError::ZeroValue {
                field: "max_entries_in_memory",
            });
        }
        if self.entry_ttl_ms == 0 {
            return Err(ConfigError::ZeroValue {
                field: "entry_ttl_ms",
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RakeConfig {
    /// Fraction of the pot in thousandths (50 = 5%).
    pub rate_per_mille: u32,
    pub cap: u64,
    pub waive_when_no_flop: bool,
    pub waive_when_uncontested: bool,
    pub min_players_for_rake: usize,
}

impl Default for RakeConfig {
    fn default() -> Self {
        Self {
            rate_per_mille: 50,
            cap: 4,
            waive_when_no_flop: true,
            waive_when_uncontested: true,
            min_players_for_rake: 2,
        }
    }
}

impl RakeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_per_mille > 1000 {
            return Err(ConfigError::RakeRateOutOfRange {
                rate: self.rate_per_mille,
            });
        }
        Ok(())
    }
}

/// Who receives the odd chip when a split pot does not divide evenly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OddChipRule {
    /// First eligible winner clockwise from the dealer.
    #[default]
    FirstWinner,
    /// Lowest seat index among the winners.
    PositionOrder,
    /// Winner picked by a seed derived from the hand id. Deterministic for a
    /// given hand, uniform across hands.
    DeterministicRandom,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    pub odd_chip_rule: OddChipRule,
    pub enable_rake: bool,
    pub enable_idempotency: bool,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            odd_chip_rule: OddChipRule::FirstWinner,
            enable_rake: true,
            enable_idempotency: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub session: SessionConfig,
    pub snapshot: SnapshotConfig,
    pub sync: SyncConfig,
    pub timeline: TimelineConfig,
    pub rake: RakeConfig,
    pub settlement: SettlementConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;
        self.snapshot.validate()?;
        self.sync.validate()?;
        self.timeline.validate()?;
        self.rake.validate()?;
        Ok(())
    }
}
