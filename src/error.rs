//! Error types, split by layer: transport, wire protocol, and feed.

use std::time::Duration;

use thiserror::Error;

use crate::domain::Venue;

/// Connection-level failures. Recoverable inside the transport
/// connector (retry, then fallback); never surfaced past the session
/// except as connection status.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no open within {0:?}")]
    ConnectTimeout(Duration),

    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// A single malformed or unexpected inbound message. Recovered by
/// discarding that message; the stream keeps running.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected message shape: {0}")]
    UnexpectedShape(&'static str),
}

/// Unsupported venue/symbol selection. The only error the store
/// raises synchronously; everything else flows through `StoreState`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported venue {0:?}")]
    UnsupportedVenue(String),

    #[error("invalid symbol {symbol:?}: {reason}")]
    InvalidSymbol { symbol: String, reason: String },
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{venue}: venue unavailable: {reason}")]
    VenueUnavailable { venue: Venue, reason: String },

    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, FeedError>;
