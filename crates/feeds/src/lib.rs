//! Quote feed collection.
//!
//! - `feed` - the `QuoteSource` seam the poller fetches through
//! - `rest` - REST fetcher and response parser for the ticker endpoint
//! - `error` - `FeedError`

pub mod error;
pub mod feed;
pub mod rest;

pub use error::*;
pub use feed::*;
pub use rest::*;
