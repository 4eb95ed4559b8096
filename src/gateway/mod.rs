//! Order gateway abstraction.
//!
//! Broker connectivity and FIX session handling live outside this crate; the
//! strategy consumes them through:
//! - [`OrderGateway`]: fire-and-forget place/replace/cancel
//! - [`OrderEventHandler`]: the asynchronous callback surface
//! - [`MockGateway`]: in-process simulation for paper trading and tests

mod error;
pub mod mock;
mod traits;
mod types;

pub use error::GatewayError;
pub use mock::{MockGateway, Submission};
#[cfg(test)]
pub use traits::MockOrderGateway;
pub use traits::{OrderEventHandler, OrderGateway};
pub use types::*;
