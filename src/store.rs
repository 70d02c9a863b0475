//! Process-wide order book store.
//!
//! Owns at most one active feed session, drives the
//! connect/disconnect/venue-switch lifecycle, debounces bursty book
//! updates, and publishes `StoreState` wholesale through a watch
//! channel. Constructed once at startup with an injected venue
//! registry; consumers read, never mutate.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::FeedConfig;
use crate::domain::{ConnectionStatus, FeedKind, OrderBookSnapshot, StoreState, Symbol, Venue};
use crate::error::{ConfigError, FeedError};
use crate::session::{FeedSession, SessionEvent};
use crate::venues::VenueRegistry;

pub struct OrderBookStore {
    registry: VenueRegistry,
    config: FeedConfig,
    inner: Mutex<StoreInner>,
    state_tx: Arc<watch::Sender<Arc<StoreState>>>,
}

struct StoreInner {
    venue: Venue,
    symbol: Symbol,
    active: Option<ActiveSession>,
}

struct ActiveSession {
    session: FeedSession,
    publisher_shutdown: watch::Sender<bool>,
    publisher: JoinHandle<()>,
}

impl OrderBookStore {
    /// Store with the default market selection (OKX, BTC-USDT).
    pub fn new(registry: VenueRegistry, config: FeedConfig) -> Self {
        OrderBookStore::with_market(registry, config, Venue::Okx, Symbol::btc_usdt())
    }

    pub fn with_market(
        registry: VenueRegistry,
        config: FeedConfig,
        venue: Venue,
        symbol: Symbol,
    ) -> Self {
        let initial = Arc::new(StoreState::disconnected(venue, symbol.clone()));
        let (state_tx, _state_rx) = watch::channel(initial);
        OrderBookStore {
            registry,
            config,
            inner: Mutex::new(StoreInner {
                venue,
                symbol,
                active: None,
            }),
            state_tx: Arc::new(state_tx),
        }
    }

    /// The latest published state.
    pub fn state(&self) -> Arc<StoreState> {
        self.state_tx.borrow().clone()
    }

    /// A receiver that observes every published state change.
    pub fn watch(&self) -> watch::Receiver<Arc<StoreState>> {
        self.state_tx.subscribe()
    }

    /// Start a session for the current venue and symbol. Unsupported
    /// selections fail synchronously; every other failure surfaces
    /// through the published status. Idempotent while connected.
    pub async fn connect(&self) -> Result<(), ConfigError> {
        let mut inner = self.inner.lock().await;
        if inner.active.is_some() {
            debug!("connect ignored, session already active");
            return Ok(());
        }
        self.start_session(&mut inner)
    }

    /// Tear the active session down. When this returns, nothing from
    /// the old session — including an update sitting in the debounce
    /// window — can be published anymore.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        self.teardown(&mut inner).await;
        self.publish(|state| {
            state.status = ConnectionStatus::Disconnected;
            state.feed = FeedKind::None;
        });
    }

    /// Switch venue: the old session is fully released before the
    /// venue changes and the new session starts.
    pub async fn set_venue(&self, venue: Venue) -> Result<(), ConfigError> {
        let mut inner = self.inner.lock().await;
        info!(old = %inner.venue, new = %venue, "switching venue");
        self.teardown(&mut inner).await;
        inner.venue = venue;
        self.start_session(&mut inner)
    }

    /// Switch symbol, with the same teardown-first contract as
    /// [`OrderBookStore::set_venue`]. Rejects malformed symbols
    /// before touching the active session.
    pub async fn set_symbol(&self, symbol: &str) -> Result<(), ConfigError> {
        let symbol: Symbol = symbol.parse()?;
        let mut inner = self.inner.lock().await;
        info!(old = %inner.symbol, new = %symbol, "switching symbol");
        self.teardown(&mut inner).await;
        inner.symbol = symbol;
        self.start_session(&mut inner)
    }

    fn start_session(&self, inner: &mut StoreInner) -> Result<(), ConfigError> {
        let feed = match self.registry.get(inner.venue) {
            Ok(feed) => feed,
            Err(e) => {
                self.publish(|state| {
                    state.venue = inner.venue;
                    state.status = ConnectionStatus::Error;
                    state.feed = FeedKind::None;
                    state.last_error = Some(e.to_string());
                });
                return Err(e);
            }
        };

        let venue = inner.venue;
        let symbol = inner.symbol.clone();
        self.publish(move |state| {
            state.venue = venue;
            state.symbol = symbol;
            state.snapshot = None;
            state.status = ConnectionStatus::Connecting;
            state.feed = FeedKind::None;
            state.last_error = None;
        });

        let (events_tx, events_rx) = mpsc::channel(64);
        let session = FeedSession::spawn(feed, &inner.symbol, &self.config, events_tx);

        let (publisher_shutdown, shutdown_rx) = watch::channel(false);
        let publisher = tokio::spawn(publish_loop(
            events_rx,
            Arc::clone(&self.state_tx),
            inner.venue,
            self.config.debounce(),
            shutdown_rx,
        ));

        inner.active = Some(ActiveSession {
            session,
            publisher_shutdown,
            publisher,
        });
        Ok(())
    }

    async fn teardown(&self, inner: &mut StoreInner) {
        let Some(active) = inner.active.take() else {
            return;
        };
        // Stop the publisher first so a pending debounced update is
        // discarded, then release the session's transport resources.
        let _ = active.publisher_shutdown.send(true);
        active.session.shutdown().await;
        let _ = active.publisher.await;
    }

    fn publish(&self, mutate: impl FnOnce(&mut StoreState)) {
        publish_with(&self.state_tx, mutate);
    }
}

fn publish_with(
    state_tx: &watch::Sender<Arc<StoreState>>,
    mutate: impl FnOnce(&mut StoreState),
) {
    let mut next = {
        let current = state_tx.borrow();
        (**current).clone()
    };
    mutate(&mut next);
    state_tx.send_replace(Arc::new(next));
}

/// The debounce and status-derivation stage of one session.
///
/// Collapses a burst of book updates to the most recent one inside a
/// fixed quiet window, then publishes it. Also derives the connection
/// status: the first published update decides streaming vs fallback,
/// and a fallback fetch failure after stream failure — before any
/// fallback data — marks the venue unavailable.
async fn publish_loop(
    mut events: mpsc::Receiver<SessionEvent>,
    state_tx: Arc<watch::Sender<Arc<StoreState>>>,
    venue: Venue,
    debounce: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut stream_failed = false;
    let mut fallback_published = false;
    let mut pending: Option<(FeedKind, OrderBookSnapshot)> = None;
    let mut deadline = tokio::time::Instant::now();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                // Anything still pending is discarded, never published.
                return;
            }

            // Flush ahead of the event branch so a continuous burst
            // cannot starve the window: once the deadline passes, the
            // most recent update goes out.
            _ = tokio::time::sleep_until(deadline), if pending.is_some() => {
                if let Some((feed, snapshot)) = pending.take() {
                    if feed == FeedKind::Polling {
                        fallback_published = true;
                    }
                    publish_with(&state_tx, |state| {
                        state.status = ConnectionStatus::Connected;
                        state.feed = feed;
                        state.snapshot = Some(Arc::new(snapshot));
                        state.last_error = None;
                    });
                }
            }

            event = events.recv() => match event {
                Some(SessionEvent::Book { feed, snapshot }) => {
                    if pending.is_none() {
                        deadline = tokio::time::Instant::now() + debounce;
                    }
                    pending = Some((feed, snapshot));
                }
                Some(SessionEvent::StreamFailed { error }) => {
                    stream_failed = true;
                    publish_with(&state_tx, |state| state.last_error = Some(error));
                }
                Some(SessionEvent::PollFailed { error }) => {
                    if stream_failed && !fallback_published {
                        let unavailable = FeedError::VenueUnavailable {
                            venue,
                            reason: error,
                        };
                        publish_with(&state_tx, |state| {
                            state.status = ConnectionStatus::Error;
                            state.last_error = Some(unavailable.to_string());
                        });
                    } else {
                        publish_with(&state_tx, |state| state.last_error = Some(error));
                    }
                }
                None => return,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_empty_registry() -> OrderBookStore {
        OrderBookStore::new(VenueRegistry::new(), FeedConfig::default())
    }

    #[tokio::test]
    async fn test_initial_state() {
        let store = store_with_empty_registry();
        let state = store.state();
        assert_eq!(state.venue, Venue::Okx);
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert!(state.snapshot.is_none());
    }

    #[tokio::test]
    async fn test_connect_on_unregistered_venue_fails_synchronously() {
        let store = store_with_empty_registry();

        let result = store.connect().await;
        assert!(matches!(result, Err(ConfigError::UnsupportedVenue(_))));

        // The failure is also mirrored into the published state.
        let state = store.state();
        assert_eq!(state.status, ConnectionStatus::Error);
        assert!(state.last_error.as_deref().unwrap().contains("okx"));
    }

    #[tokio::test]
    async fn test_set_symbol_rejects_malformed_input() {
        let store = store_with_empty_registry();
        let before = store.state();

        let result = store.set_symbol("BTCUSDT").await;
        assert!(matches!(result, Err(ConfigError::InvalidSymbol { .. })));

        // Nothing changed: the bad selection never reached a session.
        let after = store.state();
        assert_eq!(after.symbol, before.symbol);
        assert_eq!(after.status, before.status);
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_a_no_op() {
        let store = store_with_empty_registry();
        store.disconnect().await;
        assert_eq!(store.state().status, ConnectionStatus::Disconnected);
    }
}
