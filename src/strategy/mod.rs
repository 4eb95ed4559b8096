//! Trading strategy implementation.
//!
//! Contains the core logic for:
//! - The generic order state tracker and rebalance decision engine
//! - The quoting target policy (dynamic spread off the reference book)
//! - The hedging target policy (synthetic position band)

mod engine;
mod hedging;
mod quoting;

pub use engine::{ActionKind, LegPhase, SentAction, StrategyLeg, Target, TargetPolicy};
pub use hedging::HedgingPolicy;
pub use quoting::{automatic_spread, QuotingPolicy};

/// A quoting leg: one per (mini contract, side).
pub type QuotingLeg = StrategyLeg<QuotingPolicy>;

/// The hedging leg working the standard contract.
pub type HedgingLeg = StrategyLeg<HedgingPolicy>;
