//! Market data types consumed by the quoting side of the strategy.
//!
//! Book construction happens outside this crate; the strategy only sees the
//! top of book per subscribed instrument plus security status transitions.

use crate::gateway::{InstrumentId, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One level of the book: best price and the quantity resting there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: Decimal,
    pub qty: Decimal,
}

impl Quote {
    pub fn new(price: Decimal, qty: Decimal) -> Self {
        Self { price, qty }
    }

    /// Zero or negative price/quantity marks an empty level.
    pub fn is_live(&self) -> bool {
        self.price > Decimal::ZERO && self.qty > Decimal::ZERO
    }
}

/// Top bid/ask of a subscribed instrument's book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub instrument: InstrumentId,
    pub bid: Option<Quote>,
    pub ask: Option<Quote>,
}

impl TopOfBook {
    pub fn new(instrument: InstrumentId, bid: Option<Quote>, ask: Option<Quote>) -> Self {
        Self {
            instrument,
            bid,
            ask,
        }
    }

    /// The live quote on `side`, if any.
    pub fn top(&self, side: Side) -> Option<Quote> {
        let quote = match side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        };
        quote.filter(Quote::is_live)
    }

    /// Midpoint when both sides are live, the single live side otherwise.
    pub fn reference_price(&self) -> Option<Decimal> {
        match (self.top(Side::Buy), self.top(Side::Sell)) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            (Some(bid), None) => Some(bid.price),
            (None, Some(ask)) => Some(ask.price),
            (None, None) => None,
        }
    }

    /// Raw book width (`ask - bid`) when both sides are live.
    pub fn width(&self) -> Option<Decimal> {
        match (self.top(Side::Buy), self.top(Side::Sell)) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }
}

/// Trading status of a subscribed instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingStatus {
    Trading,
    Halted,
    Closed,
}

/// Security status transition event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityStatus {
    pub instrument: InstrumentId,
    pub status: TradingStatus,
}

/// Market data callbacks, dispatched on an unspecified thread.
pub trait MarketDataHandler: Send + Sync {
    fn on_book_updated(&self, book: &TopOfBook);
    fn on_security_status(&self, _status: &SecurityStatus) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book(bid: Option<Quote>, ask: Option<Quote>) -> TopOfBook {
        TopOfBook::new(InstrumentId::new("ROS"), bid, ask)
    }

    #[test]
    fn test_zero_levels_are_not_live() {
        let top = book(
            Some(Quote::new(dec!(0), dec!(5))),
            Some(Quote::new(dec!(100.5), dec!(0))),
        );
        assert!(top.top(Side::Buy).is_none());
        assert!(top.top(Side::Sell).is_none());
        assert_eq!(top.reference_price(), None);
    }

    #[test]
    fn test_reference_price_is_mid_with_both_sides() {
        let top = book(
            Some(Quote::new(dec!(100.0), dec!(5))),
            Some(Quote::new(dec!(100.5), dec!(5))),
        );
        assert_eq!(top.reference_price(), Some(dec!(100.25)));
        assert_eq!(top.width(), Some(dec!(0.5)));
    }

    #[test]
    fn test_reference_price_falls_back_to_single_side() {
        let top = book(None, Some(Quote::new(dec!(101), dec!(3))));
        assert_eq!(top.reference_price(), Some(dec!(101)));
        assert_eq!(top.width(), None);
    }
}
