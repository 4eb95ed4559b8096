//! Position snapshot and change-event types.

use crate::gateway::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Accumulated position in common units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub buy_qty: Decimal,
    pub sell_qty: Decimal,
    /// Always `buy_qty - sell_qty`.
    pub net_qty: Decimal,
}

impl PositionSnapshot {
    pub fn new(buy_qty: Decimal, sell_qty: Decimal) -> Self {
        Self {
            buy_qty,
            sell_qty,
            net_qty: buy_qty - sell_qty,
        }
    }

    pub(crate) fn apply(&mut self, side: Side, qty: Decimal) {
        match side {
            Side::Buy => self.buy_qty += qty,
            Side::Sell => self.sell_qty += qty,
        }
        self.net_qty = self.buy_qty - self.sell_qty;
    }
}

/// Old/new snapshot pair published to subscribers so they can diff.
///
/// `version` increases by one per applied execution; consumers ignore any
/// event not newer than the last one they applied, so an event observed out
/// of order can never roll a leg's view backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionEvent {
    pub old: PositionSnapshot,
    pub new: PositionSnapshot,
    pub version: u64,
}
