//! Multi-venue order book feed.
//!
//! Ingests real-time book updates from OKX, Bybit, and Deribit,
//! normalizes each venue's wire format into one snapshot shape, and
//! publishes the latest coherent state through [`OrderBookStore`].
//! Streaming is the primary transport; a REST polling fallback takes
//! over transparently when the stream fails.

pub mod book;
pub mod config;
pub mod domain;
pub mod error;
pub mod poller;
pub mod session;
pub mod store;
pub mod transport;
pub mod venues;

// Re-export commonly used types for convenience

pub use config::{load_config_from_str, FeedConfig, TransportConfig, VenueEndpoints};
pub use domain::{
    ConnectionStatus, FeedKind, OrderBookSnapshot, PriceLevel, StoreState, Symbol, Venue,
};
pub use error::{ConfigError, FeedError, ProtocolError, TransportError};
pub use store::OrderBookStore;
pub use venues::{VenueFeed, VenueRegistry};
