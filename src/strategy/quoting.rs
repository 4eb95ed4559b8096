//! Quote calculation and the quoting (market-making) target policy.

use super::engine::{Target, TargetPolicy};
use crate::config::{QuotingConfig, SpreadConfig};
use crate::gateway::{Instrument, Side};
use crate::market::TopOfBook;
use crate::position::PositionEvent;
use rust_decimal::Decimal;

/// Dynamic spread for the current reference book.
///
/// Recomputed from scratch on every tick: an empty book yields no spread, a
/// one-sided book yields the configured single-sided value, and a two-sided
/// book maps its raw width through the configured table.
pub fn automatic_spread(book: &TopOfBook, config: &SpreadConfig) -> Decimal {
    match (book.top(Side::Buy), book.top(Side::Sell)) {
        (None, None) => Decimal::ZERO,
        (Some(_), None) | (None, Some(_)) => config.single_sided,
        (Some(bid), Some(ask)) => {
            let width = ask.price - bid.price;
            if width > config.wide_width {
                config.wide
            } else if width < config.tight_width {
                config.tight
            } else {
                Decimal::ZERO
            }
        }
    }
}

/// Target policy for one quoting leg.
///
/// Prices off the standard contract's book (the reference), quotes the mini.
/// Quoting is suppressed while the synthetic position sits outside the hedge
/// band so the two legs never fight each other.
pub struct QuotingPolicy {
    instrument: Instrument,
    side: Side,
    config: QuotingConfig,
    /// Hedge band, shared with the hedging leg.
    threshold: Decimal,
    book: Option<TopOfBook>,
    spread: Decimal,
    qty_override: Option<Decimal>,
    unbalanced: bool,
}

impl QuotingPolicy {
    pub fn new(
        instrument: Instrument,
        side: Side,
        config: QuotingConfig,
        threshold: Decimal,
    ) -> Self {
        Self {
            instrument,
            side,
            config,
            threshold,
            book: None,
            spread: Decimal::ZERO,
            qty_override: None,
            unbalanced: false,
        }
    }

    fn price(&self) -> Decimal {
        let Some(book) = &self.book else {
            return Decimal::ZERO;
        };
        let Some(own_top) = book.top(self.side) else {
            return Decimal::ZERO;
        };

        if self.config.automatic_spread {
            let Some(reference) = book.reference_price() else {
                return Decimal::ZERO;
            };
            match self.side {
                Side::Buy => reference - self.spread,
                Side::Sell => reference + self.spread,
            }
        } else {
            own_top.price
        }
    }

    fn qty(&self) -> Decimal {
        if self.unbalanced {
            return Decimal::ZERO;
        }
        self.qty_override.unwrap_or(self.config.default_qty)
    }
}

impl TargetPolicy for QuotingPolicy {
    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn target(&self) -> Target {
        Target {
            price: self.price(),
            qty: self.qty(),
            side: self.side,
        }
    }

    fn apply_position(&mut self, event: &PositionEvent) {
        self.unbalanced = event.new.net_qty.abs() >= self.threshold;
    }

    fn apply_book(&mut self, book: &TopOfBook) -> bool {
        self.spread = automatic_spread(book, &self.config.spread);
        self.book = Some(book.clone());
        book.top(self.side).is_some()
    }

    fn set_qty_override(&mut self, qty: Decimal) {
        self.qty_override = Some(qty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InstrumentId;
    use crate::market::Quote;
    use crate::position::PositionSnapshot;
    use rust_decimal_macros::dec;

    fn book(bid: Option<Quote>, ask: Option<Quote>) -> TopOfBook {
        TopOfBook::new(InstrumentId::new("ROS"), bid, ask)
    }

    fn two_sided(bid: Decimal, ask: Decimal) -> TopOfBook {
        book(
            Some(Quote::new(bid, dec!(5))),
            Some(Quote::new(ask, dec!(5))),
        )
    }

    fn policy(side: Side) -> QuotingPolicy {
        QuotingPolicy::new(
            Instrument::new("MIN", dec!(10)),
            side,
            QuotingConfig::default(),
            dec!(60),
        )
    }

    fn position(net: Decimal) -> PositionEvent {
        PositionEvent {
            old: PositionSnapshot::default(),
            new: PositionSnapshot::new(net.max(Decimal::ZERO), (-net).max(Decimal::ZERO)),
            version: 1,
        }
    }

    #[test]
    fn test_spread_table() {
        let config = SpreadConfig::default();

        assert_eq!(automatic_spread(&book(None, None), &config), dec!(0));
        assert_eq!(
            automatic_spread(&book(Some(Quote::new(dec!(100), dec!(5))), None), &config),
            dec!(0.5)
        );
        assert_eq!(
            automatic_spread(&two_sided(dec!(100), dec!(101.5)), &config),
            dec!(0.3)
        );
        assert_eq!(
            automatic_spread(&two_sided(dec!(100), dec!(100.5)), &config),
            dec!(0.1)
        );
        assert_eq!(
            automatic_spread(&two_sided(dec!(100), dec!(100.95)), &config),
            dec!(0)
        );
        // Boundary widths fall in the middle band.
        assert_eq!(
            automatic_spread(&two_sided(dec!(100), dec!(101)), &config),
            dec!(0)
        );
        assert_eq!(
            automatic_spread(&two_sided(dec!(100), dec!(100.9)), &config),
            dec!(0)
        );
    }

    #[test]
    fn test_buy_target_is_mid_minus_spread() {
        let mut policy = policy(Side::Buy);
        assert!(policy.apply_book(&two_sided(dec!(100.0), dec!(100.5))));

        let target = policy.target();
        // Width 0.5 < 0.9: spread 0.1; mid 100.25.
        assert_eq!(target.price, dec!(100.15));
        assert_eq!(target.qty, dec!(10));
        assert_eq!(target.side, Side::Buy);
    }

    #[test]
    fn test_sell_target_is_mid_plus_spread() {
        let mut policy = policy(Side::Sell);
        assert!(policy.apply_book(&two_sided(dec!(100.0), dec!(100.5))));
        assert_eq!(policy.target().price, dec!(100.35));
    }

    #[test]
    fn test_manual_mode_quotes_raw_own_side_top() {
        let mut policy = QuotingPolicy::new(
            Instrument::new("MIN", dec!(10)),
            Side::Buy,
            QuotingConfig {
                automatic_spread: false,
                ..QuotingConfig::default()
            },
            dec!(60),
        );
        policy.apply_book(&two_sided(dec!(100.0), dec!(100.5)));
        assert_eq!(policy.target().price, dec!(100.0));
    }

    #[test]
    fn test_missing_own_side_withdraws() {
        let mut policy = policy(Side::Buy);
        let one_sided = book(None, Some(Quote::new(dec!(100.5), dec!(5))));

        assert!(!policy.apply_book(&one_sided));
        assert_eq!(policy.target().price, dec!(0));
    }

    #[test]
    fn test_unbalanced_position_suppresses_quoting() {
        let mut policy = policy(Side::Buy);
        policy.apply_book(&two_sided(dec!(100.0), dec!(100.5)));

        policy.apply_position(&position(dec!(65)));
        assert_eq!(policy.target().qty, dec!(0));

        policy.apply_position(&position(dec!(-70)));
        assert_eq!(policy.target().qty, dec!(0));

        policy.apply_position(&position(dec!(59)));
        assert_eq!(policy.target().qty, dec!(10));
    }

    #[test]
    fn test_qty_override_persists_across_ticks() {
        let mut policy = policy(Side::Buy);
        policy.set_qty_override(dec!(3));
        policy.apply_book(&two_sided(dec!(100.0), dec!(100.5)));
        policy.apply_book(&two_sided(dec!(100.1), dec!(100.6)));
        assert_eq!(policy.target().qty, dec!(3));
    }
}
