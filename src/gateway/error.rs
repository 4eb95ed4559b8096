//! Gateway submission errors.

use super::types::OrderId;
use thiserror::Error;

/// Errors returned synchronously by order submission calls.
///
/// These cover the submission path only; venue-side rejections are not
/// errors and arrive later through the callback surface.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No live session to the venue.
    #[error("gateway is not connected")]
    NotConnected,
    /// The order id is not known to the gateway.
    #[error("unknown order {0}")]
    UnknownOrder(OrderId),
    /// The request failed local validation before submission.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
