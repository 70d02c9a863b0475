use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::snapshot::OrderBookSnapshot;
use super::venue::{Symbol, Venue};

/// Connection status as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No active session.
    Disconnected,
    /// Session started, no data published yet.
    Connecting,
    /// Data is flowing; `FeedKind` says over which transport.
    Connected,
    /// Both streaming and fallback are failing.
    Error,
}

/// Which transport produced the published data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    None,
    Streaming,
    Polling,
}

/// The single published state. Replaced wholesale on every publish,
/// never mutated in place; consumers hold read-only clones.
#[derive(Debug, Clone)]
pub struct StoreState {
    pub venue: Venue,
    pub symbol: Symbol,
    pub snapshot: Option<Arc<OrderBookSnapshot>>,
    pub status: ConnectionStatus,
    pub feed: FeedKind,
    pub last_error: Option<String>,
}

impl StoreState {
    pub fn disconnected(venue: Venue, symbol: Symbol) -> Self {
        StoreState {
            venue,
            symbol,
            snapshot: None,
            status: ConnectionStatus::Disconnected,
            feed: FeedKind::None,
            last_error: None,
        }
    }
}
