//! Mock gateway for paper trading and tests.

use super::error::GatewayError;
use super::traits::OrderGateway;
use super::types::{
    CancelOrderRequest, Execution, GatewayEvent, Order, OrderEvent, OrderId, PlaceOrderRequest,
    ReplaceOrderRequest, Side,
};
use crate::market::TopOfBook;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// A submission captured by the mock.
#[derive(Debug, Clone)]
pub enum Submission {
    Place(PlaceOrderRequest),
    Replace(ReplaceOrderRequest),
    Cancel(CancelOrderRequest),
}

#[derive(Default)]
struct MockState {
    submissions: Vec<Submission>,
    open_orders: HashMap<OrderId, Order>,
    fail_submissions: bool,
    reject_next_place: bool,
    reject_next_replace: bool,
    reject_next_cancel: bool,
}

/// In-process gateway simulation.
///
/// Two modes:
/// - recording only ([`MockGateway::new`]): submissions are captured for
///   inspection and nothing is acknowledged; tests drive the callbacks by
///   hand;
/// - auto-acknowledge ([`MockGateway::with_events`]): every submission is
///   confirmed through the event channel, and [`MockGateway::mark`] fills
///   resting orders that cross the opposite top of book.
pub struct MockGateway {
    state: Mutex<MockState>,
    events: Option<UnboundedSender<GatewayEvent>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            events: None,
        }
    }

    pub fn with_events(events: UnboundedSender<GatewayEvent>) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            events: Some(events),
        }
    }

    /// Drain the captured submissions.
    pub fn take_submissions(&self) -> Vec<Submission> {
        std::mem::take(&mut self.state.lock().submissions)
    }

    /// Number of orders currently simulated as resting.
    pub fn open_order_count(&self) -> usize {
        self.state.lock().open_orders.len()
    }

    /// Make every subsequent submission fail at the transport level.
    pub fn set_fail_submissions(&self, fail: bool) {
        self.state.lock().fail_submissions = fail;
    }

    /// Reject (via callback) the next place instead of confirming it.
    pub fn reject_next_place(&self) {
        self.state.lock().reject_next_place = true;
    }

    /// Reject (via callback) the next replace instead of confirming it.
    pub fn reject_next_replace(&self) {
        self.state.lock().reject_next_replace = true;
    }

    /// Reject (via callback) the next cancel instead of confirming it.
    pub fn reject_next_cancel(&self) {
        self.state.lock().reject_next_cancel = true;
    }

    /// Fill resting orders that cross the opposite top of `book`.
    ///
    /// Buys execute against the ask, sells against the bid; each order fills
    /// at its own limit price for at most the quantity shown at the top.
    pub fn mark(&self, book: &TopOfBook) {
        let mut fills = Vec::new();
        {
            let mut state = self.state.lock();
            let order_ids: Vec<OrderId> = state
                .open_orders
                .values()
                .filter(|order| order.instrument == book.instrument)
                .map(|order| order.id.clone())
                .collect();

            for id in order_ids {
                let Some(order) = state.open_orders.get_mut(&id) else {
                    continue;
                };
                let opposite = match order.side {
                    Side::Buy => book.top(Side::Sell),
                    Side::Sell => book.top(Side::Buy),
                };
                let Some(opposite) = opposite else { continue };

                let crosses = match order.side {
                    Side::Buy => opposite.price <= order.price,
                    Side::Sell => opposite.price >= order.price,
                };
                if !crosses {
                    continue;
                }

                let remaining = order.remaining_qty();
                let fill_qty = remaining.min(opposite.qty);
                order.cum_qty += fill_qty;

                let execution = Execution {
                    instrument: order.instrument.clone(),
                    side: order.side,
                    qty: fill_qty,
                    price: order.price,
                };
                let full = order.remaining_qty().is_zero();
                let snapshot = order.clone();
                if full {
                    state.open_orders.remove(&id);
                }
                fills.push((snapshot, execution, full));
            }
        }

        for (order, execution, full) in fills {
            let event = OrderEvent::with_execution(order, execution);
            if full {
                self.emit(GatewayEvent::Filled(event));
            } else {
                self.emit(GatewayEvent::PartiallyFilled(event));
            }
        }
    }

    fn emit(&self, event: GatewayEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderGateway for MockGateway {
    fn place_order(&self, request: PlaceOrderRequest) -> Result<Order, GatewayError> {
        let (order, rejected) = {
            let mut state = self.state.lock();
            if state.fail_submissions {
                return Err(GatewayError::NotConnected);
            }
            state.submissions.push(Submission::Place(request.clone()));

            let order = request.into_order();
            let rejected = std::mem::take(&mut state.reject_next_place);
            if self.events.is_some() && !rejected {
                state.open_orders.insert(order.id.clone(), order.clone());
            }
            (order, rejected)
        };

        debug!(order_id = %order.id, instrument = %order.instrument, "mock place submitted");
        if rejected {
            self.emit(GatewayEvent::PlaceRejected(OrderEvent::with_reason(
                order.clone(),
                "rejected by mock",
            )));
        } else {
            self.emit(GatewayEvent::Placed(OrderEvent::new(order.clone())));
        }
        Ok(order)
    }

    fn replace_order(&self, request: ReplaceOrderRequest) -> Result<(), GatewayError> {
        let outcome = {
            let mut state = self.state.lock();
            if state.fail_submissions {
                return Err(GatewayError::NotConnected);
            }
            state.submissions.push(Submission::Replace(request.clone()));

            if self.events.is_none() {
                None
            } else {
                let rejected = std::mem::take(&mut state.reject_next_replace);
                let Some(order) = state.open_orders.get_mut(&request.order_id) else {
                    return Err(GatewayError::UnknownOrder(request.order_id));
                };
                if !rejected {
                    order.price = request.price;
                    order.qty = request.qty;
                }
                Some((order.clone(), rejected))
            }
        };

        if let Some((order, rejected)) = outcome {
            if rejected {
                self.emit(GatewayEvent::ReplaceRejected(OrderEvent::with_reason(
                    order,
                    "rejected by mock",
                )));
            } else {
                self.emit(GatewayEvent::Replaced(OrderEvent::new(order)));
            }
        }
        Ok(())
    }

    fn cancel_order(&self, request: CancelOrderRequest) -> Result<(), GatewayError> {
        let outcome = {
            let mut state = self.state.lock();
            if state.fail_submissions {
                return Err(GatewayError::NotConnected);
            }
            state.submissions.push(Submission::Cancel(request.clone()));

            if self.events.is_none() {
                None
            } else {
                let rejected = std::mem::take(&mut state.reject_next_cancel);
                if rejected {
                    let Some(order) = state.open_orders.get(&request.order_id) else {
                        return Err(GatewayError::UnknownOrder(request.order_id));
                    };
                    Some((order.clone(), true))
                } else {
                    let Some(order) = state.open_orders.remove(&request.order_id) else {
                        return Err(GatewayError::UnknownOrder(request.order_id));
                    };
                    Some((order, false))
                }
            }
        };

        if let Some((order, rejected)) = outcome {
            if rejected {
                self.emit(GatewayEvent::CancelRejected(OrderEvent::with_reason(
                    order,
                    "rejected by mock",
                )));
            } else {
                self.emit(GatewayEvent::Cancelled(OrderEvent::new(order)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::types::{InstrumentId, OrderType, Validity};
    use crate::market::Quote;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    fn place_request(price: rust_decimal::Decimal, qty: rust_decimal::Decimal) -> PlaceOrderRequest {
        PlaceOrderRequest {
            order_id: OrderId::generate(),
            account: "acct".to_string(),
            instrument: InstrumentId::new("MIN"),
            side: Side::Buy,
            qty,
            price,
            order_type: OrderType::Limit,
            validity: Validity::Day,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<GatewayEvent>) -> Vec<GatewayEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_recording_mode_captures_without_acking() {
        let gateway = MockGateway::new();
        gateway
            .place_order(place_request(dec!(100), dec!(10)))
            .expect("place");

        let submissions = gateway.take_submissions();
        assert_eq!(submissions.len(), 1);
        assert!(matches!(submissions[0], Submission::Place(_)));
        assert_eq!(gateway.open_order_count(), 0);
    }

    #[test]
    fn test_auto_ack_confirms_place_replace_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gateway = MockGateway::with_events(tx);

        let order = gateway
            .place_order(place_request(dec!(100), dec!(10)))
            .expect("place");
        gateway
            .replace_order(ReplaceOrderRequest {
                order_id: order.id.clone(),
                price: dec!(99.5),
                qty: dec!(10),
            })
            .expect("replace");
        gateway
            .cancel_order(CancelOrderRequest {
                order_id: order.id.clone(),
            })
            .expect("cancel");

        let events = drain(&mut rx);
        assert!(matches!(events[0], GatewayEvent::Placed(_)));
        assert!(matches!(events[1], GatewayEvent::Replaced(_)));
        assert!(matches!(events[2], GatewayEvent::Cancelled(_)));
        assert_eq!(gateway.open_order_count(), 0);
    }

    #[test]
    fn test_mark_partially_then_fully_fills_crossing_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gateway = MockGateway::with_events(tx);
        gateway
            .place_order(place_request(dec!(100), dec!(10)))
            .expect("place");
        drain(&mut rx);

        let thin = TopOfBook::new(
            InstrumentId::new("MIN"),
            None,
            Some(Quote::new(dec!(99.5), dec!(4))),
        );
        gateway.mark(&thin);

        let events = drain(&mut rx);
        match &events[0] {
            GatewayEvent::PartiallyFilled(event) => {
                assert_eq!(event.order.cum_qty, dec!(4));
                let execution = event.execution.as_ref().expect("execution");
                assert_eq!(execution.qty, dec!(4));
                assert_eq!(execution.price, dec!(100));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let deep = TopOfBook::new(
            InstrumentId::new("MIN"),
            None,
            Some(Quote::new(dec!(99.5), dec!(50))),
        );
        gateway.mark(&deep);

        let events = drain(&mut rx);
        assert!(matches!(events[0], GatewayEvent::Filled(_)));
        assert_eq!(gateway.open_order_count(), 0);
    }

    #[test]
    fn test_reject_and_fail_injection() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gateway = MockGateway::with_events(tx);

        gateway.reject_next_place();
        gateway
            .place_order(place_request(dec!(100), dec!(10)))
            .expect("submission itself succeeds");
        assert!(matches!(
            drain(&mut rx)[0],
            GatewayEvent::PlaceRejected(_)
        ));
        assert_eq!(gateway.open_order_count(), 0);

        gateway.set_fail_submissions(true);
        let err = gateway
            .place_order(place_request(dec!(100), dec!(10)))
            .expect_err("transport failure");
        assert!(matches!(err, GatewayError::NotConnected));
    }
}
