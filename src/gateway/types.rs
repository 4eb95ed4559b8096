//! Order and instrument types shared across the gateway seam.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a tradable instrument (the exchange symbol).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static instrument metadata the strategy needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    /// Conversion factor from native execution quantity to common units.
    pub lot_multiplier: Decimal,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, lot_multiplier: Decimal) -> Self {
        Self {
            id: InstrumentId::new(symbol),
            lot_multiplier,
        }
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
}

/// Order validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Validity {
    Day,
    GoodTillCancelled,
}

/// Client order id, unique per placement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    /// Generate a fresh random id for a new placement.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An order as known to the strategy.
///
/// Plain value type: state only ever crosses the gateway seam by copy, never
/// by aliasing an object the gateway also holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account: String,
    pub instrument: InstrumentId,
    pub side: Side,
    pub price: Decimal,
    pub qty: Decimal,
    /// Cumulative filled quantity reported by the venue.
    pub cum_qty: Decimal,
    pub order_type: OrderType,
    pub validity: Validity,
}

impl Order {
    /// Quantity still working at the venue.
    pub fn remaining_qty(&self) -> Decimal {
        if self.cum_qty >= self.qty {
            Decimal::ZERO
        } else {
            self.qty - self.cum_qty
        }
    }
}

/// Request to place a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub order_id: OrderId,
    pub account: String,
    pub instrument: InstrumentId,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub order_type: OrderType,
    pub validity: Validity,
}

impl PlaceOrderRequest {
    /// The handle the venue will confirm against.
    pub fn into_order(self) -> Order {
        Order {
            id: self.order_id,
            account: self.account,
            instrument: self.instrument,
            side: self.side,
            price: self.price,
            qty: self.qty,
            cum_qty: Decimal::ZERO,
            order_type: self.order_type,
            validity: self.validity,
        }
    }
}

/// Request to modify a resting order's price and/or quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceOrderRequest {
    pub order_id: OrderId,
    pub price: Decimal,
    pub qty: Decimal,
}

/// Request to cancel a resting order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderRequest {
    pub order_id: OrderId,
}

/// A single execution attributable to an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub instrument: InstrumentId,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
}

/// Payload delivered with every order lifecycle callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order: Order,
    /// Present on fill callbacks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
    /// Present on rejection callbacks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OrderEvent {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            execution: None,
            reason: None,
        }
    }

    pub fn with_execution(order: Order, execution: Execution) -> Self {
        Self {
            order,
            execution: Some(execution),
            reason: None,
        }
    }

    pub fn with_reason(order: Order, reason: impl Into<String>) -> Self {
        Self {
            order,
            execution: None,
            reason: Some(reason.into()),
        }
    }
}

/// Everything a gateway session can deliver back to the strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    Placed(OrderEvent),
    PlaceRejected(OrderEvent),
    Replaced(OrderEvent),
    ReplaceRejected(OrderEvent),
    Cancelled(OrderEvent),
    CancelRejected(OrderEvent),
    Filled(OrderEvent),
    PartiallyFilled(OrderEvent),
    Registered(OrderEvent),
    TradeCancel(OrderEvent),
    TradeFromAnotherAccount(OrderEvent),
    StartFinish { exchange: String },
    Disconnect { exchange: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limit_order(qty: Decimal, cum_qty: Decimal) -> Order {
        Order {
            id: OrderId::new("o-1"),
            account: "acct".to_string(),
            instrument: InstrumentId::new("MIN"),
            side: Side::Buy,
            price: dec!(100),
            qty,
            cum_qty,
            order_type: OrderType::Limit,
            validity: Validity::Day,
        }
    }

    #[test]
    fn test_remaining_qty_never_negative() {
        assert_eq!(limit_order(dec!(10), dec!(4)).remaining_qty(), dec!(6));
        assert_eq!(limit_order(dec!(10), dec!(10)).remaining_qty(), dec!(0));
        assert_eq!(limit_order(dec!(10), dec!(12)).remaining_qty(), dec!(0));
    }

    #[test]
    fn test_place_request_round_trips_into_handle() {
        let request = PlaceOrderRequest {
            order_id: OrderId::new("o-2"),
            account: "acct".to_string(),
            instrument: InstrumentId::new("MIN"),
            side: Side::Sell,
            qty: dec!(10),
            price: dec!(101.5),
            order_type: OrderType::Limit,
            validity: Validity::Day,
        };

        let order = request.into_order();
        assert_eq!(order.id.as_str(), "o-2");
        assert_eq!(order.cum_qty, Decimal::ZERO);
        assert_eq!(order.remaining_qty(), dec!(10));
    }

    #[test]
    fn test_gateway_event_serde_tagging() {
        let event = GatewayEvent::Filled(OrderEvent::with_execution(
            limit_order(dec!(10), dec!(10)),
            Execution {
                instrument: InstrumentId::new("MIN"),
                side: Side::Buy,
                qty: dec!(10),
                price: dec!(100),
            },
        ));

        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"type\":\"filled\""));

        let back: GatewayEvent = serde_json::from_str(&json).expect("deserialize");
        assert!(matches!(back, GatewayEvent::Filled(_)));
    }
}
