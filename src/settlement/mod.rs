//! Side-pot layering, rake evaluation, and atomic hand settlement.

pub mod engine;
pub mod errors;
pub mod pots;
pub mod rake;

pub use engine::{
    AttributionPolicy, HandRank, HandRanker, PotAward, SettleRequest, SettlementEngine,
    SettlementOutcome, SettlePlayer,
};
pub use errors::SettlementError;
pub use pots::{Contribution, PotLayering};
pub use rake::{RakeContext, RakeOutcome, RakePolicy, WaiveReason};
