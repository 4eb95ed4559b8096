//! Traits at the order gateway seam.

use super::error::GatewayError;
use super::types::{CancelOrderRequest, Order, OrderEvent, PlaceOrderRequest, ReplaceOrderRequest};

/// Fire-and-forget order entry.
///
/// All three calls return as soon as the action has been handed to the
/// session: `Ok` means "submitted", never "acknowledged by the venue".
/// Confirmations, rejections and fills arrive asynchronously through
/// [`OrderEventHandler`].
#[cfg_attr(test, mockall::automock)]
pub trait OrderGateway: Send + Sync {
    /// Submit a new order. Returns the handle the venue will confirm against.
    fn place_order(&self, request: PlaceOrderRequest) -> Result<Order, GatewayError>;

    /// Submit a price/quantity modification for a resting order.
    fn replace_order(&self, request: ReplaceOrderRequest) -> Result<(), GatewayError>;

    /// Submit a cancellation for a resting order.
    fn cancel_order(&self, request: CancelOrderRequest) -> Result<(), GatewayError>;
}

/// Asynchronous order lifecycle callbacks.
///
/// Dispatched on an unspecified thread; implementations must take their own
/// lock on entry. Callbacks the strategy has no use for default to no-ops.
pub trait OrderEventHandler: Send + Sync {
    fn on_order_placed(&self, event: &OrderEvent);
    fn on_order_place_rejected(&self, event: &OrderEvent);
    fn on_order_replaced(&self, event: &OrderEvent);
    fn on_order_replace_rejected(&self, event: &OrderEvent);
    fn on_order_cancelled(&self, event: &OrderEvent);
    fn on_order_cancel_rejected(&self, event: &OrderEvent);
    fn on_order_filled(&self, event: &OrderEvent);
    fn on_order_partially_filled(&self, event: &OrderEvent);

    fn on_order_registered(&self, _event: &OrderEvent) {}
    fn on_trade_cancel(&self, _event: &OrderEvent) {}
    fn on_trade_from_another_account(&self, _event: &OrderEvent) {}
    fn on_start_finish(&self, _exchange: &str) {}
    fn on_disconnect(&self, _exchange: &str) {}
}
