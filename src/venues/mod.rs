//! Venue adapters behind one polymorphic contract.
//!
//! Each venue implements [`VenueFeed`]: subscription construction,
//! symbol translation, inbound message parsing against the session's
//! book buffer, and the REST fetch used by the polling fallback. The
//! store selects adapters through an explicit [`VenueRegistry`] table.

mod bybit;
mod deribit;
mod okx;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::book::BookBuffer;
use crate::config::FeedConfig;
use crate::domain::{OrderBookSnapshot, Symbol, Venue};
use crate::error::{ConfigError, FeedError, ProtocolError};

pub use bybit::BybitFeed;
pub use deribit::DeribitFeed;
pub use okx::OkxFeed;

#[async_trait]
pub trait VenueFeed: std::fmt::Debug + Send + Sync {
    fn venue(&self) -> Venue;

    fn ws_url(&self) -> &str;

    /// Translate a canonical `BASE-QUOTE` symbol into this venue's
    /// instrument identifier. Pure and idempotent; computed once per
    /// session.
    fn instrument(&self, symbol: &Symbol) -> String;

    /// The subscription payload sent once per successful open.
    fn subscribe_message(&self, instrument: &str) -> serde_json::Value;

    /// Parse one inbound frame and reconcile it into `book`.
    ///
    /// `Ok(Some(_))` carries the reprojected snapshot after a book
    /// message; `Ok(None)` covers acks, heartbeats, and unrecognized
    /// shapes, which are discarded without error. `Err` means the
    /// frame was malformed where a payload was expected — the caller
    /// logs and skips it, the stream keeps running.
    fn handle_message(
        &self,
        book: &mut BookBuffer,
        raw: &str,
    ) -> Result<Option<OrderBookSnapshot>, ProtocolError>;

    /// One REST fetch of the current book, used by the polling
    /// fallback.
    async fn fetch_book(
        &self,
        client: &reqwest::Client,
        instrument: &str,
    ) -> Result<OrderBookSnapshot, FeedError>;
}

/// Explicit venue→adapter table, built once at startup.
pub struct VenueRegistry {
    feeds: HashMap<Venue, Arc<dyn VenueFeed>>,
}

impl VenueRegistry {
    pub fn new() -> Self {
        VenueRegistry {
            feeds: HashMap::new(),
        }
    }

    /// All built-in venues, wired to the configured endpoints.
    pub fn with_defaults(config: &FeedConfig) -> Self {
        let mut registry = VenueRegistry::new();
        registry.register(Arc::new(OkxFeed::new(config.endpoints(Venue::Okx))));
        registry.register(Arc::new(BybitFeed::new(config.endpoints(Venue::Bybit))));
        registry.register(Arc::new(DeribitFeed::new(config.endpoints(Venue::Deribit))));
        registry
    }

    pub fn register(&mut self, feed: Arc<dyn VenueFeed>) {
        self.feeds.insert(feed.venue(), feed);
    }

    pub fn get(&self, venue: Venue) -> Result<Arc<dyn VenueFeed>, ConfigError> {
        self.feeds
            .get(&venue)
            .cloned()
            .ok_or_else(|| ConfigError::UnsupportedVenue(venue.to_string()))
    }

    pub fn venues(&self) -> Vec<Venue> {
        self.feeds.keys().copied().collect()
    }
}

impl Default for VenueRegistry {
    fn default() -> Self {
        VenueRegistry::new()
    }
}

/// Parse one `[price, size]` string pair; unparsable levels are
/// dropped by the callers.
pub(crate) fn parse_level(price: &str, size: &str) -> Option<(Decimal, Decimal)> {
    let price = price.parse().ok()?;
    let size = size.parse().ok()?;
    Some((price, size))
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_with_defaults_covers_all_venues() {
        let registry = VenueRegistry::with_defaults(&FeedConfig::default());
        for venue in Venue::ALL {
            assert!(registry.get(venue).is_ok());
        }
        assert_eq!(registry.venues().len(), 3);
    }

    #[test]
    fn test_empty_registry_reports_unsupported_venue() {
        let registry = VenueRegistry::new();
        match registry.get(Venue::Okx) {
            Err(ConfigError::UnsupportedVenue(name)) => assert_eq!(name, "okx"),
            other => panic!("expected unsupported venue, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(
            parse_level("50000.5", "1.25"),
            Some(("50000.5".parse().unwrap(), "1.25".parse().unwrap()))
        );
        assert!(parse_level("not-a-price", "1").is_none());
    }
}
