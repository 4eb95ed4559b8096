//! Hedging (balancer) target policy.

use super::engine::{Target, TargetPolicy};
use crate::config::HedgingConfig;
use crate::gateway::{Instrument, Side};
use crate::position::PositionEvent;
use rust_decimal::Decimal;
use tracing::debug;

/// Target policy for the hedging leg.
///
/// Quantity and side come from the synthetic position crossing the band:
/// long past the threshold sells the hedge quantity, short past it buys.
/// The order is priced where the mini contract last traded.
pub struct HedgingPolicy {
    instrument: Instrument,
    config: HedgingConfig,
    side: Side,
    qty: Decimal,
    last_trade_price: Decimal,
}

impl HedgingPolicy {
    pub fn new(instrument: Instrument, config: HedgingConfig) -> Self {
        Self {
            instrument,
            config,
            side: Side::Buy,
            qty: Decimal::ZERO,
            last_trade_price: Decimal::ZERO,
        }
    }
}

impl TargetPolicy for HedgingPolicy {
    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn target(&self) -> Target {
        Target {
            price: self.last_trade_price,
            qty: self.qty,
            side: self.side,
        }
    }

    fn apply_position(&mut self, event: &PositionEvent) {
        let net = event.new.net_qty;
        if net >= self.config.threshold {
            self.side = Side::Sell;
            self.qty = self.config.hedge_qty;
        } else if net <= -self.config.threshold {
            self.side = Side::Buy;
            self.qty = self.config.hedge_qty;
        } else {
            self.qty = Decimal::ZERO;
        }
        debug!(net = %net, side = %self.side, qty = %self.qty, "hedge target recomputed");
    }

    fn apply_signal_execution(&mut self, price: Decimal) {
        self.last_trade_price = price;
    }

    fn set_qty_override(&mut self, qty: Decimal) {
        self.config.hedge_qty = qty;
        if !self.qty.is_zero() {
            self.qty = qty;
        }
    }
}
