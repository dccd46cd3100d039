//! Configurable rake evaluation with waivers and caps.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::RakeConfig;
use crate::engine::types::{Chips, Street};

const CONFIG_DOMAIN: &[u8] = b"holdem_core/rake/config/v1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RakeContext {
    pub pot_size: Chips,
    pub final_street: Street,
    pub flop_seen: bool,
    pub is_uncontested: bool,
    pub players_in_hand: usize,
    pub players_at_showdown: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaiveReason {
    NoFlop,
    Uncontested,
    TooFewPlayers,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RakeOutcome {
    pub rake_amount: Chips,
    pub pot_after_rake: Chips,
    /// Rate actually applied, in thousandths.
    pub percentage_applied: u32,
    pub cap_applied: bool,
    pub waived: bool,
    pub reason: String,
    pub policy_used: RakeConfig,
    /// Digest of the effective parameters, so auditors can confirm which
    /// policy was in force for a given settlement.
    pub config_hash: String,
}

#[derive(Clone, Debug, Default)]
pub struct RakePolicy {
    config: RakeConfig,
}

impl RakePolicy {
    pub fn new(config: RakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RakeConfig {
        &self.config
    }

    /// Digest of the effective parameters. Frozen encoding: field order and
    /// widths must never change.
    pub fn config_hash(&self) -> String {
        let cfg = &self.config;
        let mut hasher = Sha256::new();
        hasher.update(CONFIG_DOMAIN);
        hasher.update(cfg.rate_per_mille.to_be_bytes());
        hasher.update(cfg.cap.to_be_bytes());
        hasher.update([cfg.waive_when_no_flop as u8]);
        hasher.update([cfg.waive_when_uncontested as u8]);
        hasher.update((cfg.min_players_for_rake as u64).to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// Waivers apply first, each zeroing the rake with a reason; otherwise
    /// `floor(pot * rate / 1000)` clamped by the cap.
    pub fn evaluate(&self, ctx: &RakeContext) -> RakeOutcome {
        let cfg = &self.config;

        if let Some(waive) = self.waiver_for(ctx) {
            let reason = match waive {
                WaiveReason::NoFlop => "no flop was dealt".to_string(),
                WaiveReason::Uncontested => "pot was uncontested".to_string(),
                WaiveReason::TooFewPlayers => format!(
                    "{} players in hand, minimum for rake is {}",
                    ctx.players_in_hand, cfg.min_players_for_rake
                ),
            };
            return RakeOutcome {
                rake_amount: 0,
                pot_after_rake: ctx.pot_size,
                percentage_applied: 0,
                cap_applied: false,
                waived: true,
                reason,
                policy_used: cfg.clone(),
                config_hash: self.config_hash(),
            };
        }

        let raw = ctx.pot_size * cfg.rate_per_mille as Chips / 1000;
        let cap_applied = raw > cfg.cap;
        let rake_amount = raw.min(cfg.cap);
        RakeOutcome {
            rake_amount,
            pot_after_rake: ctx.pot_size - rake_amount,
            percentage_applied: cfg.rate_per_mille,
            cap_applied,
            waived: false,
            reason: if cap_applied {
                format!("raked at {}\u{2030}, capped at {}", cfg.rate_per_mille, cfg.cap)
            } else {
                format!("raked at {}\u{2030}", cfg.rate_per_mille)
            },
            policy_used: cfg.clone(),
            config_hash: self.config_hash(),
        }
    }

    fn waiver_for(&self, ctx: &RakeContext) -> Option<WaiveReason> {
        let cfg = &self.config;
        if cfg.waive_when_no_flop && !ctx.flop_seen {
            return Some(WaiveReason::NoFlop);
        }
        if cfg.waive_when_uncontested && ctx.is_uncontested {
            return Some(WaiveReason::Uncontested);
        }
        if ctx.players_in_hand < cfg.min_players_for_rake {
            return Some(WaiveReason::TooFewPlayers);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pot: Chips) -> RakeContext {
        RakeContext {
            pot_size: pot,
            final_street: Street::River,
            flop_seen: true,
            is_uncontested: false,
            players_in_hand: 3,
            players_at_showdown: 2,
        }
    }

    #[test]
    fn five_percent_of_160_caps_at_4() {
        let policy = RakePolicy::new(RakeConfig {
            rate_per_mille: 50,
            cap: 4,
            ..RakeConfig::default()
        });
        let outcome = policy.evaluate(&ctx(160));
        assert_eq!(outcome.rake_amount, 4);
        assert_eq!(outcome.pot_after_rake, 156);
        assert!(outcome.cap_applied);
        assert!(!outcome.waived);
    }

    #[test]
    fn uncapped_rake_floors_the_fraction() {
        let policy = RakePolicy::new(RakeConfig {
            rate_per_mille: 50,
            cap: 1000,
            ..RakeConfig::default()
        });
        // floor(79 * 50 / 1000) = 3
        let outcome = policy.evaluate(&ctx(79));
        assert_eq!(outcome.rake_amount, 3);
        assert!(!outcome.cap_applied);
    }

    #[test]
    fn no_flop_waiver_zeroes_the_rake() {
        let policy = RakePolicy::new(RakeConfig::default());
        let mut context = ctx(500);
        context.flop_seen = false;
        let outcome = policy.evaluate(&context);
        assert!(outcome.waived);
        assert_eq!(outcome.rake_amount, 0);
        assert_eq!(outcome.pot_after_rake, 500);
    }

    #[test]
    fn uncontested_waiver_applies_after_flop_waiver() {
        let policy = RakePolicy::new(RakeConfig::default());
        let mut context = ctx(500);
        context.is_uncontested = true;
        let outcome = policy.evaluate(&context);
        assert!(outcome.waived);
        assert!(outcome.reason.contains("uncontested"));
    }

    #[test]
    fn short_handed_pot_is_not_raked() {
        let policy = RakePolicy::new(RakeConfig {
            min_players_for_rake: 4,
            ..RakeConfig::default()
        });
        let outcome = policy.evaluate(&ctx(500));
        assert!(outcome.waived);
        assert_eq!(outcome.rake_amount, 0);
    }

    #[test]
    fn config_hash_tracks_parameters() {
        let a = RakePolicy::new(RakeConfig::default());
        let b = RakePolicy::new(RakeConfig {
            cap: 5,
            ..RakeConfig::default()
        });
        assert_eq!(a.config_hash(), a.config_hash());
        assert_ne!(a.config_hash(), b.config_hash());
    }
}
