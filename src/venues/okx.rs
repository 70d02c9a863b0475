//! OKX adapter. The `books` channel carries the full top-of-book in
//! every message, so reconstruction is a straight replace per tick.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::book::BookBuffer;
use crate::config::VenueEndpoints;
use crate::domain::{OrderBookSnapshot, Symbol, Venue};
use crate::error::{FeedError, ProtocolError};

use super::{now_ms, parse_level, VenueFeed};

#[derive(Debug)]
pub struct OkxFeed {
    ws_url: String,
    rest_url: String,
}

impl OkxFeed {
    pub fn new(endpoints: &VenueEndpoints) -> Self {
        OkxFeed {
            ws_url: endpoints.ws_url.clone(),
            rest_url: endpoints.rest_url.clone(),
        }
    }
}

/// Streaming message. `event` marks subscription acks and error
/// notices; book payloads arrive under `data`.
#[derive(Debug, Deserialize)]
struct WsMessage {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Vec<BookPayload>,
}

/// Levels are `[price, size, ...]` string arrays; trailing elements
/// (liquidation and order counts) are ignored.
#[derive(Debug, Deserialize)]
struct BookPayload {
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
    #[serde(default)]
    ts: Option<String>,
}

impl BookPayload {
    fn into_snapshot(self, book: &mut BookBuffer) -> OrderBookSnapshot {
        let bids: Vec<_> = parse_side(&self.bids);
        let asks: Vec<_> = parse_side(&self.asks);
        let ts_ms = self
            .ts
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or_else(now_ms);
        book.replace(&bids, &asks);
        book.project(ts_ms)
    }
}

#[derive(Debug, Deserialize)]
struct RestResponse {
    code: String,
    #[serde(default)]
    data: Vec<BookPayload>,
}

fn parse_side(levels: &[Vec<String>]) -> Vec<(rust_decimal::Decimal, rust_decimal::Decimal)> {
    levels
        .iter()
        .filter(|level| level.len() >= 2)
        .filter_map(|level| parse_level(&level[0], &level[1]))
        .collect()
}

#[async_trait]
impl VenueFeed for OkxFeed {
    fn venue(&self) -> Venue {
        Venue::Okx
    }

    fn ws_url(&self) -> &str {
        &self.ws_url
    }

    fn instrument(&self, symbol: &Symbol) -> String {
        symbol.to_string()
    }

    fn subscribe_message(&self, instrument: &str) -> serde_json::Value {
        json!({
            "op": "subscribe",
            "args": [{"channel": "books", "instId": instrument}],
        })
    }

    fn handle_message(
        &self,
        book: &mut BookBuffer,
        raw: &str,
    ) -> Result<Option<OrderBookSnapshot>, ProtocolError> {
        let msg: WsMessage = serde_json::from_str(raw)?;
        if msg.event.is_some() {
            return Ok(None);
        }
        let Some(payload) = msg.data.into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(payload.into_snapshot(book)))
    }

    async fn fetch_book(
        &self,
        client: &reqwest::Client,
        instrument: &str,
    ) -> Result<OrderBookSnapshot, FeedError> {
        let url = format!(
            "{}/api/v5/market/books?instId={}&sz=50",
            self.rest_url, instrument
        );
        let response: RestResponse = client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.code != "0" {
            return Err(ProtocolError::UnexpectedShape("okx rest error code").into());
        }
        let Some(payload) = response.data.into_iter().next() else {
            return Err(ProtocolError::UnexpectedShape("okx rest response without book").into());
        };
        Ok(payload.into_snapshot(&mut BookBuffer::new()))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn feed() -> OkxFeed {
        OkxFeed {
            ws_url: "ws://localhost".to_string(),
            rest_url: "http://localhost".to_string(),
        }
    }

    #[test]
    fn test_instrument_is_canonical_form() {
        let feed = feed();
        let symbol: Symbol = "btc-usdt".parse().unwrap();
        assert_eq!(feed.instrument(&symbol), "BTC-USDT");
        // Pure and idempotent.
        assert_eq!(feed.instrument(&symbol), feed.instrument(&symbol));
    }

    #[test]
    fn test_subscribe_message_shape() {
        let msg = feed().subscribe_message("BTC-USDT");
        assert_eq!(msg["op"], "subscribe");
        assert_eq!(msg["args"][0]["channel"], "books");
        assert_eq!(msg["args"][0]["instId"], "BTC-USDT");
    }

    #[test]
    fn test_full_snapshot_replaces_view() {
        let feed = feed();
        let mut book = BookBuffer::new();

        let first = r#"{"data":[{"bids":[["100","2","0","1"]],"asks":[["101","3","0","1"]],"ts":"1700000000000"}]}"#;
        let snap = feed.handle_message(&mut book, first).unwrap().unwrap();
        assert_eq!(snap.best_bid().unwrap().price, dec!(100));
        assert_eq!(snap.ts_ms, 1_700_000_000_000);

        // The next tick fully replaces the previous view.
        let second = r#"{"data":[{"bids":[["90","1"]],"asks":[["91","1"]],"ts":"1700000001000"}]}"#;
        let snap = feed.handle_message(&mut book, second).unwrap().unwrap();
        assert_eq!(snap.bids.len(), 1);
        assert_eq!(snap.best_bid().unwrap().price, dec!(90));
        assert_eq!(snap.best_ask().unwrap().price, dec!(91));
    }

    #[test]
    fn test_subscribe_ack_is_discarded() {
        let feed = feed();
        let mut book = BookBuffer::new();
        let ack = r#"{"event":"subscribe","arg":{"channel":"books","instId":"BTC-USDT"}}"#;
        assert!(feed.handle_message(&mut book, ack).unwrap().is_none());
    }

    #[test]
    fn test_empty_data_is_discarded() {
        let feed = feed();
        let mut book = BookBuffer::new();
        assert!(feed.handle_message(&mut book, r#"{"data":[]}"#).unwrap().is_none());
    }

    #[test]
    fn test_malformed_json_is_an_error_not_a_panic() {
        let feed = feed();
        let mut book = BookBuffer::new();
        assert!(feed.handle_message(&mut book, "{not json").is_err());
    }

    #[test]
    fn test_unparsable_levels_are_skipped() {
        let feed = feed();
        let mut book = BookBuffer::new();
        let raw = r#"{"data":[{"bids":[["100","2"],["bad","2"],["99"]],"asks":[],"ts":"1"}]}"#;
        let snap = feed.handle_message(&mut book, raw).unwrap().unwrap();
        assert_eq!(snap.bids.len(), 1);
    }
}
