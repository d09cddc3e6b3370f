//! Rule evaluation engine.
//!
//! Pure decision functions: given a quote, a subscription and the current
//! time, decide whether the subscription fires and render the message.
//! Persistence and delivery live in `pricebell-alerts`.

pub mod evaluator;
pub mod message;

pub use evaluator::*;
pub use message::*;
