//! Core data types for the price notification bot.

pub mod format;
pub mod quote;
pub mod rule;
pub mod subscription;

pub use format::*;
pub use quote::*;
pub use rule::*;
pub use subscription::*;
