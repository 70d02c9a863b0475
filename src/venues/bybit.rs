//! Bybit adapter. The only snapshot+delta feed: an initial `snapshot`
//! message seeds the session buffer, `delta` messages mutate it level
//! by level, with size zero deleting a price. Sides arrive tagged
//! (`b`/`a`), so the buffer is side-tagged too — no side-classification
//! heuristic is involved.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::book::{BookBuffer, Side};
use crate::config::VenueEndpoints;
use crate::domain::{OrderBookSnapshot, Symbol, Venue};
use crate::error::{FeedError, ProtocolError};

use super::{now_ms, parse_level, VenueFeed};

#[derive(Debug)]
pub struct BybitFeed {
    ws_url: String,
    rest_url: String,
}

impl BybitFeed {
    pub fn new(endpoints: &VenueEndpoints) -> Self {
        BybitFeed {
            ws_url: endpoints.ws_url.clone(),
            rest_url: endpoints.rest_url.clone(),
        }
    }
}

/// Streaming message. `op` marks subscription acks and pong
/// heartbeats; book traffic carries `type` and `data`.
#[derive(Debug, Deserialize)]
struct WsMessage {
    #[serde(default)]
    op: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Option<BookData>,
    #[serde(default)]
    ts: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BookData {
    #[serde(default)]
    b: Vec<[String; 2]>,
    #[serde(default)]
    a: Vec<[String; 2]>,
}

impl BookData {
    fn apply_to(&self, book: &mut BookBuffer) {
        for [price, size] in &self.b {
            if let Some((price, size)) = parse_level(price, size) {
                book.apply(Side::Bid, price, size);
            }
        }
        for [price, size] in &self.a {
            if let Some((price, size)) = parse_level(price, size) {
                book.apply(Side::Ask, price, size);
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RestResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    result: Option<RestResult>,
}

#[derive(Debug, Deserialize)]
struct RestResult {
    #[serde(default)]
    b: Vec<[String; 2]>,
    #[serde(default)]
    a: Vec<[String; 2]>,
    #[serde(default)]
    ts: Option<i64>,
}

#[async_trait]
impl VenueFeed for BybitFeed {
    fn venue(&self) -> Venue {
        Venue::Bybit
    }

    fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Linear-perpetual naming: the dash is dropped, e.g. `BTCUSDT`.
    fn instrument(&self, symbol: &Symbol) -> String {
        format!("{}{}", symbol.base(), symbol.quote())
    }

    fn subscribe_message(&self, instrument: &str) -> serde_json::Value {
        json!({
            "op": "subscribe",
            "args": [format!("orderbook.50.{instrument}")],
        })
    }

    fn handle_message(
        &self,
        book: &mut BookBuffer,
        raw: &str,
    ) -> Result<Option<OrderBookSnapshot>, ProtocolError> {
        let msg: WsMessage = serde_json::from_str(raw)?;
        if msg.op.is_some() {
            // Subscription ack or pong.
            return Ok(None);
        }
        let (Some(kind), Some(data)) = (msg.kind.as_deref(), msg.data) else {
            return Ok(None);
        };

        match kind {
            "snapshot" => {
                book.clear();
                data.apply_to(book);
            }
            "delta" => data.apply_to(book),
            _ => return Ok(None),
        }

        Ok(Some(book.project(msg.ts.unwrap_or_else(now_ms))))
    }

    async fn fetch_book(
        &self,
        client: &reqwest::Client,
        instrument: &str,
    ) -> Result<OrderBookSnapshot, FeedError> {
        let url = format!(
            "{}/v5/market/orderbook?category=linear&symbol={}&limit=50",
            self.rest_url, instrument
        );
        let response: RestResponse = client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.ret_code != 0 {
            return Err(ProtocolError::UnexpectedShape("bybit rest error code").into());
        }
        let Some(result) = response.result else {
            return Err(ProtocolError::UnexpectedShape("bybit rest response without book").into());
        };

        let mut book = BookBuffer::new();
        BookData {
            b: result.b,
            a: result.a,
        }
        .apply_to(&mut book);
        Ok(book.project(result.ts.unwrap_or_else(now_ms)))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::domain::PriceLevel;

    use super::*;

    fn feed() -> BybitFeed {
        BybitFeed {
            ws_url: "ws://localhost".to_string(),
            rest_url: "http://localhost".to_string(),
        }
    }

    #[test]
    fn test_instrument_drops_dash() {
        let feed = feed();
        let symbol: Symbol = "BTC-USDT".parse().unwrap();
        assert_eq!(feed.instrument(&symbol), "BTCUSDT");
        assert_eq!(feed.instrument(&symbol), feed.instrument(&symbol));
    }

    #[test]
    fn test_subscribe_message_shape() {
        let msg = feed().subscribe_message("BTCUSDT");
        assert_eq!(msg["op"], "subscribe");
        assert_eq!(msg["args"][0], "orderbook.50.BTCUSDT");
    }

    #[test]
    fn test_snapshot_then_delta_with_deletion() {
        let feed = feed();
        let mut book = BookBuffer::new();

        let snapshot = r#"{"type":"snapshot","data":{"b":[["100","2"]],"a":[["101","3"]]},"ts":1}"#;
        let snap = feed.handle_message(&mut book, snapshot).unwrap().unwrap();
        assert_eq!(snap.bids, vec![PriceLevel::new(dec!(100), dec!(2))]);

        let delta = r#"{"type":"delta","data":{"b":[["100","0"],["99","1"]],"a":[]},"ts":2}"#;
        let snap = feed.handle_message(&mut book, delta).unwrap().unwrap();
        assert_eq!(snap.bids, vec![PriceLevel::new(dec!(99), dec!(1))]);
        assert_eq!(snap.asks, vec![PriceLevel::new(dec!(101), dec!(3))]);
        assert_eq!(snap.ts_ms, 2);
    }

    #[test]
    fn test_snapshot_resets_previous_buffer() {
        let feed = feed();
        let mut book = BookBuffer::new();

        let first = r#"{"type":"snapshot","data":{"b":[["90","1"],["89","1"]],"a":[["95","1"]]},"ts":1}"#;
        feed.handle_message(&mut book, first).unwrap();

        let second = r#"{"type":"snapshot","data":{"b":[["100","2"]],"a":[["101","3"]]},"ts":2}"#;
        let snap = feed.handle_message(&mut book, second).unwrap().unwrap();
        assert_eq!(snap.bids, vec![PriceLevel::new(dec!(100), dec!(2))]);
        assert_eq!(snap.asks, vec![PriceLevel::new(dec!(101), dec!(3))]);
    }

    #[test]
    fn test_delta_update_overwrites_size() {
        let feed = feed();
        let mut book = BookBuffer::new();

        let snapshot = r#"{"type":"snapshot","data":{"b":[["100","2"]],"a":[]},"ts":1}"#;
        feed.handle_message(&mut book, snapshot).unwrap();

        let delta = r#"{"type":"delta","data":{"b":[["100","7"]],"a":[]},"ts":2}"#;
        let snap = feed.handle_message(&mut book, delta).unwrap().unwrap();
        assert_eq!(snap.bids, vec![PriceLevel::new(dec!(100), dec!(7))]);
    }

    #[test]
    fn test_ack_and_pong_are_discarded() {
        let feed = feed();
        let mut book = BookBuffer::new();
        let ack = r#"{"op":"subscribe","success":true,"conn_id":"abc"}"#;
        assert!(feed.handle_message(&mut book, ack).unwrap().is_none());
        let pong = r#"{"op":"pong"}"#;
        assert!(feed.handle_message(&mut book, pong).unwrap().is_none());
    }

    #[test]
    fn test_unknown_type_is_discarded() {
        let feed = feed();
        let mut book = BookBuffer::new();
        let raw = r#"{"type":"heartbeat","data":{"b":[],"a":[]}}"#;
        assert!(feed.handle_message(&mut book, raw).unwrap().is_none());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let feed = feed();
        let mut book = BookBuffer::new();
        assert!(feed.handle_message(&mut book, "][").is_err());
    }
}
