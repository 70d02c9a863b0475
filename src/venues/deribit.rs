//! Deribit adapter. JSON-RPC framing: one subscribe call answered by
//! an id-tagged ack, then `subscription` notifications carrying the
//! full book per message. Level values arrive as numbers or strings
//! depending on endpoint.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::book::BookBuffer;
use crate::config::VenueEndpoints;
use crate::domain::{OrderBookSnapshot, Symbol, Venue};
use crate::error::{FeedError, ProtocolError};

use super::{now_ms, VenueFeed};

const RPC_ID: i64 = 42;

#[derive(Debug)]
pub struct DeribitFeed {
    ws_url: String,
    rest_url: String,
}

impl DeribitFeed {
    pub fn new(endpoints: &VenueEndpoints) -> Self {
        DeribitFeed {
            ws_url: endpoints.ws_url.clone(),
            rest_url: endpoints.rest_url.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WsMessage {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Params>,
}

#[derive(Debug, Deserialize)]
struct Params {
    #[serde(default)]
    data: Option<BookData>,
}

#[derive(Debug, Deserialize)]
struct BookData {
    #[serde(default)]
    bids: Vec<Vec<WireNumber>>,
    #[serde(default)]
    asks: Vec<Vec<WireNumber>>,
    #[serde(default)]
    timestamp: Option<i64>,
}

/// Price/size cell that may be a JSON number or a decimal string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireNumber {
    Num(f64),
    Text(String),
}

impl WireNumber {
    fn to_decimal(&self) -> Option<Decimal> {
        match self {
            WireNumber::Num(n) => Decimal::try_from(*n).ok(),
            WireNumber::Text(s) => s.parse().ok(),
        }
    }
}

impl BookData {
    fn into_snapshot(self, book: &mut BookBuffer) -> OrderBookSnapshot {
        let bids = parse_side(&self.bids);
        let asks = parse_side(&self.asks);
        let ts_ms = self.timestamp.unwrap_or_else(now_ms);
        book.replace(&bids, &asks);
        book.project(ts_ms)
    }
}

fn parse_side(levels: &[Vec<WireNumber>]) -> Vec<(Decimal, Decimal)> {
    levels
        .iter()
        .filter(|level| level.len() >= 2)
        .filter_map(|level| {
            let price = level[level.len() - 2].to_decimal()?;
            let size = level[level.len() - 1].to_decimal()?;
            Some((price, size))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RestResponse {
    result: Option<BookData>,
}

#[async_trait]
impl VenueFeed for DeribitFeed {
    fn venue(&self) -> Venue {
        Venue::Deribit
    }

    fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Perpetual-future naming: the quote asset is replaced by the
    /// `PERPETUAL` suffix, e.g. `BTC-USDT` → `BTC-PERPETUAL`.
    fn instrument(&self, symbol: &Symbol) -> String {
        format!("{}-PERPETUAL", symbol.base())
    }

    fn subscribe_message(&self, instrument: &str) -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "id": RPC_ID,
            "method": "public/subscribe",
            "params": {"channels": [format!("book.{instrument}.25")]},
        })
    }

    fn handle_message(
        &self,
        book: &mut BookBuffer,
        raw: &str,
    ) -> Result<Option<OrderBookSnapshot>, ProtocolError> {
        let msg: WsMessage = serde_json::from_str(raw)?;
        if msg.id.is_some() {
            // RPC ack for the subscribe call.
            return Ok(None);
        }
        if msg.method.as_deref() != Some("subscription") {
            return Ok(None);
        }
        let Some(data) = msg.params.and_then(|p| p.data) else {
            return Ok(None);
        };
        Ok(Some(data.into_snapshot(book)))
    }

    async fn fetch_book(
        &self,
        client: &reqwest::Client,
        instrument: &str,
    ) -> Result<OrderBookSnapshot, FeedError> {
        let url = format!(
            "{}/api/v2/public/get_order_book?instrument_name={}&depth=25",
            self.rest_url, instrument
        );
        let response: RestResponse = client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(data) = response.result else {
            return Err(ProtocolError::UnexpectedShape("deribit rest response without book").into());
        };
        Ok(data.into_snapshot(&mut BookBuffer::new()))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn feed() -> DeribitFeed {
        DeribitFeed {
            ws_url: "ws://localhost".to_string(),
            rest_url: "http://localhost".to_string(),
        }
    }

    #[test]
    fn test_instrument_uses_perpetual_suffix() {
        let feed = feed();
        let symbol: Symbol = "BTC-USDT".parse().unwrap();
        assert_eq!(feed.instrument(&symbol), "BTC-PERPETUAL");
        assert_eq!(feed.instrument(&symbol), feed.instrument(&symbol));

        let eth: Symbol = "eth-usdc".parse().unwrap();
        assert_eq!(feed.instrument(&eth), "ETH-PERPETUAL");
    }

    #[test]
    fn test_subscribe_message_shape() {
        let msg = feed().subscribe_message("BTC-PERPETUAL");
        assert_eq!(msg["jsonrpc"], "2.0");
        assert_eq!(msg["method"], "public/subscribe");
        assert_eq!(msg["params"]["channels"][0], "book.BTC-PERPETUAL.25");
    }

    #[test]
    fn test_subscription_notification_with_numeric_levels() {
        let feed = feed();
        let mut book = BookBuffer::new();
        let raw = r#"{
            "method": "subscription",
            "params": {"data": {
                "bids": [[50000.0, 1.5]],
                "asks": [[50010.5, 0.5]],
                "timestamp": 1700000000000
            }}
        }"#;

        let snap = feed.handle_message(&mut book, raw).unwrap().unwrap();
        assert_eq!(snap.best_bid().unwrap().price, dec!(50000));
        assert_eq!(snap.best_ask().unwrap().price, dec!(50010.5));
        assert_eq!(snap.ts_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_string_levels_also_parse() {
        let feed = feed();
        let mut book = BookBuffer::new();
        let raw = r#"{
            "method": "subscription",
            "params": {"data": {
                "bids": [["50000", "1.5"]],
                "asks": [["50010", "0.5"]],
                "timestamp": 1
            }}
        }"#;

        let snap = feed.handle_message(&mut book, raw).unwrap().unwrap();
        assert_eq!(snap.best_bid().unwrap().size, dec!(1.5));
    }

    #[test]
    fn test_change_tagged_levels_take_trailing_pair() {
        // The raw-interval channel prefixes levels with a change tag;
        // the trailing (price, size) pair is what counts.
        let feed = feed();
        let mut book = BookBuffer::new();
        let raw = r#"{
            "method": "subscription",
            "params": {"data": {
                "bids": [["new", 50000.0, 2.0]],
                "asks": [["delete", 50010.0, 0.0]],
                "timestamp": 1
            }}
        }"#;

        let snap = feed.handle_message(&mut book, raw).unwrap().unwrap();
        assert_eq!(snap.best_bid().unwrap().price, dec!(50000));
        assert!(snap.asks.is_empty());
    }

    #[test]
    fn test_rpc_ack_is_discarded() {
        let feed = feed();
        let mut book = BookBuffer::new();
        let ack = r#"{"jsonrpc":"2.0","id":42,"result":["book.BTC-PERPETUAL.25"]}"#;
        assert!(feed.handle_message(&mut book, ack).unwrap().is_none());
    }

    #[test]
    fn test_other_methods_are_discarded() {
        let feed = feed();
        let mut book = BookBuffer::new();
        let raw = r#"{"method":"heartbeat","params":{"type":"test_request"}}"#;
        assert!(feed.handle_message(&mut book, raw).unwrap().is_none());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let feed = feed();
        let mut book = BookBuffer::new();
        assert!(feed.handle_message(&mut book, "nope").is_err());
    }
}
